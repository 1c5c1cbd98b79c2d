//! Method handlers and the per-scope handler table.
//!
//! A handler is an async function from call arguments to a result. Each
//! scope (the service's global scope, or one connection) owns one
//! [`HandlerTable`]; a method name may be registered at most once per table.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::RpcError;

/// Boxed future returned by a handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, String>> + Send>>;

/// A registered method implementation.
pub type MethodHandler = Arc<dyn Fn(serde_json::Value) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`MethodHandler`].
///
/// ```ignore
/// let echo = handler_fn(|args| async move { Ok(args) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> MethodHandler
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
{
    Arc::new(move |args| -> HandlerFuture { Box::pin(f(args)) })
}

#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<String, MethodHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: &str, handler: MethodHandler) -> Result<(), RpcError> {
        if self.handlers.contains_key(method) {
            return Err(RpcError::DuplicateHandler(method.to_string()));
        }
        self.handlers.insert(method.to_string(), handler);
        Ok(())
    }

    pub fn get(&self, method: &str) -> Option<MethodHandler> {
        self.handlers.get(method).cloned()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Look up `method` in `table` and run it with `args`.
pub(crate) async fn invoke(
    table: &tokio::sync::RwLock<HandlerTable>,
    method: &str,
    args: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    // Clone the handler out so the table lock isn't held while it runs.
    let handler = table
        .read()
        .await
        .get(method)
        .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;

    handler(args).await.map_err(|message| RpcError::HandlerFailed {
        method: method.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut table = HandlerTable::new();
        assert!(table.is_empty());
        table
            .register("Echo", handler_fn(|args| async move { Ok(args) }))
            .unwrap();

        let err = table
            .register("Echo", handler_fn(|_| async { Ok(json!(null)) }))
            .unwrap_err();
        assert!(matches!(err, RpcError::DuplicateHandler(m) if m == "Echo"));
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_runs_handler() {
        let table = tokio::sync::RwLock::new(HandlerTable::new());
        table
            .write()
            .await
            .register("Double", handler_fn(|args| async move {
                match args["n"].as_i64() {
                    Some(n) => Ok(json!(n * 2)),
                    None => Err("n must be an integer".to_string()),
                }
            }))
            .unwrap();

        assert_eq!(invoke(&table, "Double", json!({ "n": 21 })).await.unwrap(), json!(42));

        let err = invoke(&table, "Double", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::HandlerFailed { ref message, .. } if message == "n must be an integer"
        ));

        let err = invoke(&table, "Missing", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::UnknownMethod(m) if m == "Missing"));
    }

    #[test]
    fn test_methods_sorted() {
        let mut table = HandlerTable::new();
        table.register("b", handler_fn(|a| async move { Ok(a) })).unwrap();
        table.register("a", handler_fn(|a| async move { Ok(a) })).unwrap();
        assert_eq!(table.methods(), vec!["a".to_string(), "b".to_string()]);
    }
}
