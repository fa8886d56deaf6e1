//! Simulation submission — turn an expression into an asynchronous job.
//!
//! `POST /simulations` with the expression embedded in a typed payload; the
//! platform answers 201 with a `Location` header that becomes the opaque job
//! handle polled by [`crate::poll`]. Submission never waits for completion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generator::AlphaExpression;
use crate::session::{ApiError, SessionManager};
use crate::transport::ApiRequest;

/// Fixed simulation parameters attached uniformly to every job in a batch.
/// Field names and defaults follow the platform's simulation schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationSettings {
    pub instrument_type: String,
    pub region: String,
    pub universe: String,
    pub delay: u32,
    pub decay: u32,
    pub neutralization: String,
    pub truncation: f64,
    pub pasteurization: String,
    pub unit_handling: String,
    pub nan_handling: String,
    pub language: String,
    pub visualization: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            instrument_type: "EQUITY".to_string(),
            region: "USA".to_string(),
            universe: "TOP3000".to_string(),
            delay: 1,
            decay: 0,
            neutralization: "SUBINDUSTRY".to_string(),
            truncation: 0.08,
            pasteurization: "ON".to_string(),
            unit_handling: "VERIFY".to_string(),
            nan_handling: "ON".to_string(),
            language: "FASTEXPR".to_string(),
            visualization: false,
        }
    }
}

#[derive(Serialize)]
struct SimulationRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    settings: &'a SimulationSettings,
    regular: &'a str,
}

/// Opaque reference to a submitted job: the status location to poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission failures for a single expression — recorded, never fatal to
/// the batch.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("simulation rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("submission accepted (HTTP {status}) but no Location header")]
    MissingLocation { status: u16 },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Submit one expression for simulation and return its job handle.
pub fn submit(
    session: &SessionManager,
    expression: &AlphaExpression,
    settings: &SimulationSettings,
) -> Result<JobHandle, SubmissionError> {
    let payload = SimulationRequest {
        kind: "REGULAR",
        settings,
        regular: &expression.expression,
    };
    let body = serde_json::to_value(&payload).expect("simulation payload serializes");

    let resp = session.call(&ApiRequest::post("/simulations", body))?;
    if !resp.is_success() {
        return Err(SubmissionError::Rejected {
            status: resp.status,
            body: resp.body_excerpt(),
        });
    }

    match resp.location {
        Some(location) => Ok(JobHandle::new(location)),
        None => Err(SubmissionError::MissingLocation {
            status: resp.status,
        }),
    }
}
