//! Health-check prober: synchronous and collective. Retry policy is
//! deliberately left to the caller (spec §9) — one attempt per URL, no
//! retry here.

use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

pub async fn probe_all(urls: &[String], timeout: Duration) -> bool {
    if urls.is_empty() {
        return true;
    }

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("reqwest client builds with a fixed timeout");

    let checks = urls.iter().map(|url| {
        let client = client.clone();
        let url = url.clone();
        async move {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    warn!(url, status = %response.status(), "health check non-2xx");
                    false
                }
                Err(e) => {
                    warn!(url, error = %e, "health check request failed");
                    false
                }
            }
        }
    });

    join_all(checks).await.into_iter().all(|ok| ok)
}
