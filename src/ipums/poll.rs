//! Fixed-interval polling until an extract reaches a terminal state.

use std::time::{Duration, Instant};

use tracing::info;

use crate::domain::PollConfig;
use crate::error::{AppError, ErrorKind};
use crate::ipums::extract::{ExtractInfo, ExtractStatus};

/// Poll `fetch` until the extract is `completed`.
///
/// `failed`/`canceled` and running past `poll.timeout` are errors. A failing
/// `fetch` is returned as-is; individual polls are never retried.
pub fn wait_until_complete<F, S>(
    number: u64,
    poll: PollConfig,
    mut fetch: F,
    mut sleep: S,
) -> Result<ExtractInfo, AppError>
where
    F: FnMut(u64) -> Result<ExtractInfo, AppError>,
    S: FnMut(Duration),
{
    let start = Instant::now();
    loop {
        let info = fetch(number)?;
        info!(extract = number, status = %info.status, "polled extract");

        match info.status {
            ExtractStatus::Completed => return Ok(info),
            ExtractStatus::Failed | ExtractStatus::Canceled => {
                return Err(AppError::new(
                    ErrorKind::RemoteFailed,
                    format!(
                        "Extract {number} ended with status={}: {}",
                        info.status, info.raw
                    ),
                ));
            }
            _ => {}
        }

        if start.elapsed() >= poll.timeout {
            return Err(AppError::new(
                ErrorKind::Timeout,
                format!("Timed out waiting for extract {number}"),
            ));
        }

        sleep(poll.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(status: &str) -> ExtractInfo {
        ExtractInfo::from_value(json!({"number": 1, "status": status})).unwrap()
    }

    fn long_poll() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(3600),
        }
    }

    #[test]
    fn returns_completed_record_after_intermediate_states() {
        let mut script = vec!["queued", "started", "produced", "completed"].into_iter();
        let mut sleeps = Vec::new();

        let out = wait_until_complete(
            1,
            long_poll(),
            |_| Ok(info(script.next().unwrap())),
            |d| sleeps.push(d),
        )
        .unwrap();

        assert_eq!(out.status, ExtractStatus::Completed);
        assert_eq!(sleeps, vec![Duration::from_secs(15); 3]);
    }

    #[test]
    fn failed_and_canceled_are_fatal() {
        for status in ["failed", "Canceled"] {
            let err = wait_until_complete(1, long_poll(), |_| Ok(info(status)), |_| {}).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RemoteFailed);
            assert!(err.message().contains("Extract 1 ended"), "{err}");
        }
    }

    #[test]
    fn times_out_without_sleeping_past_budget() {
        let poll = PollConfig {
            interval: Duration::from_secs(15),
            timeout: Duration::ZERO,
        };
        let mut slept = 0;
        let err = wait_until_complete(9, poll, |_| Ok(info("queued")), |_| slept += 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(slept, 0);
    }

    #[test]
    fn fetch_errors_propagate() {
        let err = wait_until_complete(
            1,
            long_poll(),
            |_| Err(AppError::http("connection reset")),
            |_| {},
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Http);
    }
}
