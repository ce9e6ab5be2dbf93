use std::time::Duration;

use tokio::time::Instant;

use crate::error::HealthError;

const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Probe `url` once per second until it answers 200 or the deadline passes.
///
/// Transport errors and non-200 statuses both count as "not ready yet".
/// Response bodies are drained before being discarded so the child's
/// connection is reusable.
pub async fn wait_healthy(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<(), HealthError> {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let _ = resp.bytes().await;
                if status == reqwest::StatusCode::OK {
                    return Ok(());
                }
                tracing::debug!(url, %status, "health probe not ready, retrying");
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "health probe failed, retrying");
            }
        }
        tokio::time::sleep(PROBE_INTERVAL).await;
    }

    Err(HealthError::Timeout {
        url: url.to_string(),
        timeout,
    })
}
