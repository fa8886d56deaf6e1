//! Job polling — drive a submitted simulation to a terminal state.
//!
//! The status location answers with a `Retry-After` header while the job is
//! still queued or running; the poller sleeps for exactly that hint (falling
//! back to a configured default) and queries again. Terminal responses carry
//! a `status` field and, on success, the identifier of the produced alpha.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::session::{ApiError, SessionManager};
use crate::submit::JobHandle;
use crate::transport::ApiRequest;

/// Timing knobs for the poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between queries when the server sends no `Retry-After` hint.
    pub default_interval: Duration,
    /// Give up on a job that has not reached a terminal state by then.
    pub max_wait: Duration,
    /// After cancellation is requested, keep polling this long so jobs on
    /// the verge of completion still land a result.
    pub cancel_grace: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(30 * 60),
            cancel_grace: Duration::from_secs(30),
        }
    }
}

impl PollConfig {
    /// Zero-delay variant for tests.
    pub fn immediate() -> Self {
        Self {
            default_interval: Duration::ZERO,
            max_wait: Duration::from_secs(5),
            cancel_grace: Duration::ZERO,
        }
    }
}

/// Terminal outcome classes for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// The simulation ran to completion, possibly with warnings.
    Succeeded,
    /// The platform simulated the expression and rejected it.
    Failed,
    /// The job never produced a verdict: platform error, timeout, or
    /// cancellation.
    Error,
}

/// What a finished (or abandoned) job resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResolution {
    pub state: JobState,
    /// Identifier of the produced alpha, present on success.
    pub alpha_id: Option<String>,
    /// Human-readable reason for non-success outcomes.
    pub detail: Option<String>,
    /// Final response body, kept for reporting.
    pub payload: Value,
}

impl JobResolution {
    fn abandoned(detail: impl Into<String>) -> Self {
        Self {
            state: JobState::Error,
            alpha_id: None,
            detail: Some(detail.into()),
            payload: Value::Null,
        }
    }
}

/// Polling failures that are not a property of the job itself.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("status query failed (HTTP {status}): {body}")]
    Http { status: u16, body: String },
}

/// Poll `handle` until the job reaches a terminal state, the wait budget
/// runs out, or `cancel` is raised and the grace period elapses.
///
/// Timeouts and cancellation resolve to [`JobState::Error`] rather than an
/// error return: the job's fate is unknown, not the poll itself broken.
pub fn poll(
    session: &SessionManager,
    handle: &JobHandle,
    config: &PollConfig,
    cancel: Option<&AtomicBool>,
) -> Result<JobResolution, PollError> {
    let started = Instant::now();
    let mut cancelled_at: Option<Instant> = None;

    loop {
        if started.elapsed() > config.max_wait {
            return Ok(JobResolution::abandoned(format!(
                "job did not finish within {}s",
                config.max_wait.as_secs()
            )));
        }
        if let Some(flag) = cancel {
            if flag.load(Ordering::SeqCst) {
                let since = *cancelled_at.get_or_insert_with(Instant::now);
                if since.elapsed() > config.cancel_grace {
                    return Ok(JobResolution::abandoned("cancelled"));
                }
            }
        }

        let resp = session.call(&ApiRequest::get(handle.as_str()))?;
        if !resp.is_success() {
            return Err(PollError::Http {
                status: resp.status,
                body: resp.body_excerpt(),
            });
        }

        // A positive Retry-After hint always means "not done yet", whatever
        // the body says. The hint is remote-controlled: non-finite values
        // are ignored and finite ones are capped at the wait budget.
        if let Some(hint) = resp.retry_after {
            if hint.is_finite() && hint > 0.0 {
                let hint = Duration::from_secs_f64(hint.min(config.max_wait.as_secs_f64()));
                sleep_capped(hint, config);
                continue;
            }
        }

        let status = resp
            .body
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);
        match status.as_deref() {
            Some("PENDING") | Some("RUNNING") => {
                sleep_capped(config.default_interval, config);
                continue;
            }
            Some(s) => return Ok(resolve(s, resp.body)),
            None => {
                // Some responses omit the status once the alpha exists.
                if resp.body.get("alpha").and_then(Value::as_str).is_some() {
                    return Ok(resolve("COMPLETE", resp.body));
                }
                sleep_capped(config.default_interval, config);
            }
        }
    }
}

fn resolve(status: &str, payload: Value) -> JobResolution {
    let alpha_id = payload
        .get("alpha")
        .and_then(Value::as_str)
        .map(str::to_string);
    match status {
        "COMPLETE" | "WARNING" => JobResolution {
            state: JobState::Succeeded,
            alpha_id,
            detail: None,
            payload,
        },
        "FAIL" | "FAILED" => JobResolution {
            state: JobState::Failed,
            alpha_id,
            detail: extract_detail(&payload).or_else(|| Some(status.to_string())),
            payload,
        },
        other => JobResolution {
            state: JobState::Error,
            alpha_id,
            detail: extract_detail(&payload).or_else(|| Some(other.to_string())),
            payload,
        },
    }
}

fn extract_detail(payload: &Value) -> Option<String> {
    payload
        .get("message")
        .or_else(|| payload.get("detail"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn sleep_capped(wanted: Duration, config: &PollConfig) {
    // Never sleep past the wait budget in one go.
    let capped = wanted.min(config.max_wait);
    if !capped.is_zero() {
        std::thread::sleep(capped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::session::{Credentials, SessionConfig};
    use crate::testing::StubTransport;
    use crate::transport::Method;
    use serde_json::json;
    use std::sync::Arc;

    const LOCATION: &str = "https://api.example.test/simulations/abc123";

    fn session_with(transport: Arc<StubTransport>) -> SessionManager {
        SessionManager::login(
            transport,
            Credentials::new("u", "p"),
            SessionConfig {
                retry: RetryPolicy::immediate(2),
                ..SessionConfig::default()
            },
        )
        .unwrap()
    }

    fn handle() -> JobHandle {
        JobHandle::new(LOCATION)
    }

    #[test]
    fn pending_running_then_complete() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::in_progress(0.01, json!({"status": "PENDING"})),
        );
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::in_progress(0.01, json!({"status": "RUNNING"})),
        );
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::ok(json!({"status": "COMPLETE", "alpha": "aL9x2"})),
        );
        let session = session_with(transport.clone());

        let res = poll(&session, &handle(), &PollConfig::immediate(), None).unwrap();
        assert_eq!(res.state, JobState::Succeeded);
        assert_eq!(res.alpha_id.as_deref(), Some("aL9x2"));
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn warning_counts_as_success() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::ok(json!({"status": "WARNING", "alpha": "w1"})),
        );
        let session = session_with(transport);

        let res = poll(&session, &handle(), &PollConfig::immediate(), None).unwrap();
        assert_eq!(res.state, JobState::Succeeded);
        assert_eq!(res.alpha_id.as_deref(), Some("w1"));
    }

    #[test]
    fn fail_status_maps_to_failed() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::ok(json!({"status": "FAIL", "message": "low sharpe"})),
        );
        let session = session_with(transport);

        let res = poll(&session, &handle(), &PollConfig::immediate(), None).unwrap();
        assert_eq!(res.state, JobState::Failed);
        assert_eq!(res.alpha_id, None);
        assert_eq!(res.detail.as_deref(), Some("low sharpe"));
    }

    #[test]
    fn error_status_maps_to_error() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::ok(json!({"status": "ERROR", "detail": "engine crash"})),
        );
        let session = session_with(transport);

        let res = poll(&session, &handle(), &PollConfig::immediate(), None).unwrap();
        assert_eq!(res.state, JobState::Error);
        assert_eq!(res.detail.as_deref(), Some("engine crash"));
    }

    #[test]
    fn pending_without_retry_after_uses_default_interval() {
        let transport = Arc::new(StubTransport::new());
        transport.push(Method::Get, LOCATION, StubTransport::ok(json!({"status": "PENDING"})));
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::ok(json!({"status": "COMPLETE", "alpha": "a1"})),
        );
        let session = session_with(transport.clone());

        let res = poll(&session, &handle(), &PollConfig::immediate(), None).unwrap();
        assert_eq!(res.state, JobState::Succeeded);
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn bare_alpha_body_is_success() {
        let transport = Arc::new(StubTransport::new());
        transport.push(Method::Get, LOCATION, StubTransport::ok(json!({"alpha": "a7"})));
        let session = session_with(transport);

        let res = poll(&session, &handle(), &PollConfig::immediate(), None).unwrap();
        assert_eq!(res.state, JobState::Succeeded);
        assert_eq!(res.alpha_id.as_deref(), Some("a7"));
    }

    #[test]
    fn wait_budget_exhaustion_resolves_to_error() {
        let transport = Arc::new(StubTransport::new());
        for _ in 0..200 {
            transport.push(Method::Get, LOCATION, StubTransport::ok(json!({"status": "PENDING"})));
        }
        let session = session_with(transport);

        let config = PollConfig {
            default_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(20),
            cancel_grace: Duration::ZERO,
        };
        let res = poll(&session, &handle(), &config, None).unwrap();
        assert_eq!(res.state, JobState::Error);
        assert!(res.detail.unwrap().contains("did not finish"));
    }

    #[test]
    fn cancellation_after_grace_resolves_to_error() {
        let transport = Arc::new(StubTransport::new());
        for _ in 0..200 {
            transport.push(Method::Get, LOCATION, StubTransport::ok(json!({"status": "RUNNING"})));
        }
        let session = session_with(transport);

        let cancel = AtomicBool::new(true);
        let config = PollConfig {
            default_interval: Duration::from_millis(1),
            max_wait: Duration::from_secs(5),
            cancel_grace: Duration::from_millis(10),
        };
        let res = poll(&session, &handle(), &config, Some(&cancel)).unwrap();
        assert_eq!(res.state, JobState::Error);
        assert_eq!(res.detail.as_deref(), Some("cancelled"));
    }

    #[test]
    fn grace_period_lets_a_finishing_job_land() {
        let transport = Arc::new(StubTransport::new());
        transport.push(Method::Get, LOCATION, StubTransport::ok(json!({"status": "RUNNING"})));
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::ok(json!({"status": "COMPLETE", "alpha": "late1"})),
        );
        let session = session_with(transport);

        let cancel = AtomicBool::new(true);
        let config = PollConfig {
            default_interval: Duration::ZERO,
            max_wait: Duration::from_secs(5),
            cancel_grace: Duration::from_secs(2),
        };
        let res = poll(&session, &handle(), &config, Some(&cancel)).unwrap();
        assert_eq!(res.state, JobState::Succeeded);
        assert_eq!(res.alpha_id.as_deref(), Some("late1"));
    }

    #[test]
    fn oversized_retry_after_hint_is_capped_at_wait_budget() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::in_progress(1e20, json!({"status": "RUNNING"})),
        );
        let session = session_with(transport);

        let config = PollConfig {
            default_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(20),
            cancel_grace: Duration::ZERO,
        };
        // Must not panic converting the hint; the capped sleep then runs
        // out the wait budget.
        let res = poll(&session, &handle(), &config, None).unwrap();
        assert_eq!(res.state, JobState::Error);
        assert!(res.detail.unwrap().contains("did not finish"));
    }

    #[test]
    fn non_finite_retry_after_hint_is_ignored() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::in_progress(f64::NAN, json!({"status": "RUNNING"})),
        );
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::in_progress(f64::INFINITY, json!({"status": "RUNNING"})),
        );
        transport.push(
            Method::Get,
            LOCATION,
            StubTransport::ok(json!({"status": "COMPLETE", "alpha": "a9"})),
        );
        let session = session_with(transport.clone());

        let res = poll(&session, &handle(), &PollConfig::immediate(), None).unwrap();
        assert_eq!(res.state, JobState::Succeeded);
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn non_success_status_query_is_a_poll_error() {
        let transport = Arc::new(StubTransport::new());
        transport.push(Method::Get, LOCATION, StubTransport::status(404, json!({"detail": "gone"})));
        let session = session_with(transport);

        let err = poll(&session, &handle(), &PollConfig::immediate(), None).unwrap_err();
        assert!(matches!(err, PollError::Http { status: 404, .. }));
    }
}
