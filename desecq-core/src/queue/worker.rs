//! The queue's single background worker.
//!
//! Suspends only at the three points named in §5: waiting on the
//! priority queue, the rate limiter's inter-request sleep (inside
//! `ApiClient::dispatch`), and the retry sleep after a rate-limited
//! response.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::model::QueueStatus;

use super::{ApiQueue, AUTO_RETRY_CEILING_SECS, MAX_RETRIES};

pub(super) fn spawn(queue: Arc<ApiQueue>) {
    tokio::spawn(run(queue));
}

async fn run(queue: Arc<ApiQueue>) {
    loop {
        let id = match queue.dequeue() {
            Some(id) => id,
            None => {
                queue.notify.notified().await;
                continue;
            }
        };

        let Some(snapshot) = queue.mark_running(id) else {
            continue;
        };

        let client = queue.client();
        let result = client.dispatch(&snapshot.request).await;

        match result {
            Ok(value) => {
                queue.complete(id, QueueStatus::Ok, Some(value), None);
            }
            Err(crate::error::ApiError::RateLimited {
                retry_after,
                message,
                body,
            }) => {
                let retry_count = snapshot.retry_count + 1;
                if retry_after <= AUTO_RETRY_CEILING_SECS && retry_count <= MAX_RETRIES {
                    warn!(id, retry_after, retry_count, "rate limited, auto-retrying");
                    client.adapt_rate_limit(retry_after);
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    queue.requeue(id, retry_count);
                } else {
                    info!(id, retry_after, "rate limit exceeds auto-retry ceiling, entering cooldown");
                    queue.complete(
                        id,
                        QueueStatus::RateLimited,
                        None,
                        Some(crate::error::ApiError::RateLimited {
                            retry_after,
                            message,
                            body,
                        }),
                    );
                    enter_cooldown(queue.clone(), retry_after);
                }
            }
            Err(err) => {
                queue.complete(id, QueueStatus::Failed, None, Some(err));
            }
        }
    }
}

/// §4.2 cooldown: pause the queue and schedule an unconditional resume
/// after `retry_after` seconds, even if no caller intervenes.
fn enter_cooldown(queue: Arc<ApiQueue>, retry_after: u64) {
    queue.pause();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(retry_after)).await;
        queue.resume();
    });
}
