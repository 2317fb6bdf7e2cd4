//! Upload placement transport: HTTP multipart to the target peer with
//! fixed-base back-off retry (spec.md §4.4, §7: "up to 3 attempts with
//! fixed-base back-off (`~2^attempt` s)").
//!
//! The container-filesystem-copy path mentioned in spec.md §9 as an
//! "operational shortcut" is deliberately not implemented — only the
//! portable HTTP path is part of the contract.

use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use crate::error::AppError;
use crate::httpclient::PeerHttpClient;

const MAX_ATTEMPTS: u32 = 3;

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

pub async fn place_on_peer(
    http: &dyn PeerHttpClient,
    base_url: &str,
    filename: &str,
    file_hash: &str,
    bytes: Bytes,
    per_attempt_timeout: Duration,
) -> Result<(), AppError> {
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match http
            .upload(base_url, filename, file_hash, bytes.clone(), per_attempt_timeout)
            .await
        {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(attempt, %err, base_url, "upload attempt failed");
                last_err = Some(err);
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| AppError::TransportFailure("upload exhausted retries".into())))
}
