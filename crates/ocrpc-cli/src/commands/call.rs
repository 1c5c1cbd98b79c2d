//! `ocrpc call` - Call a method through a running server's `/api/call`.

use serde::Serialize;

use super::print_json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallRequest<'a> {
    method: &'a str,
    args: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<&'a str>,
}

pub async fn run(
    url: &str,
    method: &str,
    args_str: &str,
    job_id: Option<&str>,
) -> Result<(), String> {
    let args: serde_json::Value =
        serde_json::from_str(args_str).map_err(|e| format!("Invalid JSON args: {}", e))?;

    let endpoint = format!("{}/api/call", url.trim_end_matches('/'));
    tracing::debug!("POST {} method={} jobId={:?}", endpoint, method, job_id);

    let response = reqwest::Client::new()
        .post(&endpoint)
        .json(&CallRequest { method, args, job_id })
        .send()
        .await
        .map_err(|e| format!("Failed to reach {}: {}", endpoint, e))?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("Invalid response from {}: {}", endpoint, e))?;

    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("unknown error");
        return Err(format!("{} ({})", message, status));
    }

    print_json(&body);
    Ok(())
}
