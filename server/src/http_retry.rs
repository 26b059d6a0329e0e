use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use reqwest::{header::RETRY_AFTER, RequestBuilder, Response, StatusCode};

const MAX_ATTEMPTS: u32 = 6;
const BACKOFF_CAP: Duration = Duration::from_secs(30);

fn jitter() -> Duration {
    // spread retries out so concurrent workers do not stampede
    Duration::from_millis(rand::thread_rng().gen_range(250..=750))
}

fn retry_after_hint(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Send a request, retrying 429 and 5xx with exponential backoff.
///
/// 429 sleeps at least the `Retry-After` duration when the header is present;
/// other 4xx are returned to the caller untouched.
pub async fn send_with_retry(req: RequestBuilder) -> anyhow::Result<Response> {
    let mut backoff = Duration::from_secs(1);

    for attempt in 0..MAX_ATTEMPTS {
        let this_attempt = match req.try_clone() {
            Some(clone) => clone,
            // streaming bodies cannot be retried; send once
            None => return req.send().await.context("request failed"),
        };

        match this_attempt.send().await {
            Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                let wait = retry_after_hint(&resp).unwrap_or(backoff);
                tracing::warn!("Rate limited, sleeping {:?} before retry", wait);
                tokio::time::sleep(wait + jitter()).await;
            }
            Ok(resp) if resp.status().is_server_error() && attempt + 1 < MAX_ATTEMPTS => {
                tracing::warn!(
                    "Upstream {} error, retrying in {:?}",
                    resp.status(),
                    backoff
                );
                tokio::time::sleep(backoff + jitter()).await;
            }
            Ok(resp) => return Ok(resp),
            Err(err) if attempt + 1 < MAX_ATTEMPTS => {
                tracing::warn!("Request error: {:?}, retrying in {:?}", err, backoff);
                tokio::time::sleep(backoff + jitter()).await;
            }
            Err(err) => return Err(err).context("request failed after retries"),
        }

        backoff = (backoff * 2).min(BACKOFF_CAP);
    }

    anyhow::bail!("retries exhausted")
}
