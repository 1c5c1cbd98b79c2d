//! Correlation table for outstanding calls.
//!
//! Each entry is resolved by whoever removes it from the table first: a
//! matching response, its deadline timer, or closing the table. Removal
//! happens under the table lock, so the other paths find nothing and
//! become no-ops.
//!
//! The deadline is a spawned sleep whose abort handle lives in the entry;
//! resolving an entry any other way aborts the timer.
//!
//! An expiring entry may leave a settled marker behind (see
//! [`PendingTable::insert`]). The marker stays for one more deadline period
//! so that late deliveries can still be recognised.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::envelope::CorrelationId;

/// The table was closed (its connection went away).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableClosed;

/// What [`PendingTable::advance`] should do with an entry after updating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Pending,
    Done,
}

struct Slot<S> {
    state: S,
    timer: AbortHandle,
}

struct Inner<S> {
    slots: HashMap<CorrelationId, Slot<S>>,
    closed: bool,
}

/// Pending calls keyed by correlation id. `S` carries whatever the call needs
/// to resolve its waiter (usually a `oneshot::Sender`).
pub struct PendingTable<S> {
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S: Send + 'static> Default for PendingTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + 'static> PendingTable<S> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                slots: HashMap::new(),
                closed: false,
            })),
        }
    }

    /// Register `state` under `id` and arm its deadline. If the deadline
    /// fires before anything else resolves the entry, its state is passed to
    /// `on_expire` under the table lock. Returning `Some(settled)` keeps
    /// `settled` in place of the entry for one more `deadline`; `None`
    /// removes it.
    pub async fn insert<F>(
        &self,
        id: CorrelationId,
        state: S,
        deadline: Duration,
        on_expire: F,
    ) -> Result<(), TableClosed>
    where
        F: FnOnce(S) -> Option<S> + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(TableClosed);
        }

        let table = Arc::clone(&self.inner);
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            {
                let mut inner = table.lock().await;
                let Some(slot) = inner.slots.remove(&timer_id) else {
                    return;
                };
                tracing::debug!("Pending call {} reached its deadline", timer_id);
                match on_expire(slot.state) {
                    Some(settled) => {
                        inner.slots.insert(
                            timer_id.clone(),
                            Slot {
                                state: settled,
                                timer: slot.timer,
                            },
                        );
                    }
                    None => return,
                }
            }
            tokio::time::sleep(deadline).await;
            table.lock().await.slots.remove(&timer_id);
        });

        inner.slots.insert(
            id,
            Slot {
                state,
                timer: timer.abort_handle(),
            },
        );
        Ok(())
    }

    /// Remove the entry for `id`, cancelling its deadline.
    pub async fn take(&self, id: &CorrelationId) -> Result<Option<S>, TableClosed> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(TableClosed);
        }
        Ok(inner.slots.remove(id).map(|slot| {
            slot.timer.abort();
            slot.state
        }))
    }

    /// Update the entry for `id` in place. When `f` returns [`Step::Done`]
    /// the entry is removed and returned as `Some(Some(state))`; `Some(None)`
    /// means it is still pending; `None` means no such entry.
    pub async fn advance<F>(&self, id: &CorrelationId, f: F) -> Option<Option<S>>
    where
        F: FnOnce(&mut S) -> Step,
    {
        let mut inner = self.inner.lock().await;
        let slot = inner.slots.get_mut(id)?;
        match f(&mut slot.state) {
            Step::Pending => Some(None),
            Step::Done => {
                let slot = inner.slots.remove(id)?;
                slot.timer.abort();
                Some(Some(slot.state))
            }
        }
    }

    /// Close the table and hand back every outstanding entry. Later inserts
    /// and takes fail with [`TableClosed`]. Returns `None` if it was already
    /// closed.
    pub async fn close(&self) -> Option<Vec<S>> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return None;
        }
        inner.closed = true;
        Some(
            inner
                .slots
                .drain()
                .map(|(_, slot)| {
                    slot.timer.abort();
                    slot.state
                })
                .collect(),
        )
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    pub async fn contains(&self, id: &CorrelationId) -> bool {
        self.inner.lock().await.slots.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    /// Number of entries whose state matches `f`.
    pub async fn count_where<F>(&self, f: F) -> usize
    where
        F: Fn(&S) -> bool,
    {
        self.inner
            .lock()
            .await
            .slots
            .values()
            .filter(|slot| f(&slot.state))
            .count()
    }
}
