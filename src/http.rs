//! JSON POST with retry, shared by the embedding and chat providers.
//!
//! - HTTP 429 and 5xx: retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
//! - other 4xx: fail immediately
//! - connection errors: retry

use anyhow::{bail, Result};
use std::time::Duration;

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` to `url` and return the parsed JSON response.
///
/// `label` names the service in error messages (e.g. `"OpenAI"`).
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(
                "{} request failed, retrying in {}s (attempt {}/{})",
                label,
                delay.as_secs(),
                attempt,
                max_retries
            );
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        for (name, value) in headers {
            req = req.header(*name, value);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        label,
                        status,
                        body_text
                    ));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    label,
                    url,
                    e
                ));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", label)))
}

/// Read `name` from the environment or fail with a hint.
pub fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => bail!("{} environment variable not set", name),
    }
}

pub fn trim_base_url(url: &str) -> &str {
    url.trim_end_matches('/')
}
