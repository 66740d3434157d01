//! Configuration reload notification
//!
//! After a deployment changes a monitoring agent's configuration, the
//! collector is told to re-read it with an empty `POST` (Prometheus'
//! `/-/reload` lifecycle endpoint by default).

use std::time::Duration;

use crate::error::ReloadError;

/// Reload endpoint of a local collector
pub const DEFAULT_RELOAD_URL: &str = "http://127.0.0.1:9090/-/reload";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// POST an empty body to `url`.
///
/// A 2xx response yields its (possibly empty) body as diagnostic text.
pub async fn notify(url: &str) -> Result<String, ReloadError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ReloadError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .post(url)
        .send()
        .await
        .map_err(|e| ReloadError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.is_success() {
        tracing::info!("Reload accepted by {} ({})", url, status);
        Ok(body)
    } else {
        Err(ReloadError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
