//! AlphaForge Core — platform client, expression generation, simulation lifecycle.
//!
//! This crate contains the building blocks of the alpha-search pipeline:
//! - Transport boundary over the remote research platform's REST API
//! - Session manager with transparent re-authentication
//! - Shared retry policy with exponential backoff
//! - Paginated data-field catalog client
//! - Pure combinatorial expression generator
//! - Simulation submitter (Location-header job handles)
//! - Retry-After-driven job poller
//!
//! Orchestration of whole batches lives in the runner crate; this crate never
//! spawns threads of its own.

pub mod catalog;
pub mod generator;
pub mod poll;
pub mod retry;
pub mod session;
pub mod submit;
pub mod testing;
pub mod transport;

pub use catalog::{fetch_fields, FieldDescriptor, FieldFilters, FieldType};
pub use generator::{generate, AlphaExpression, GenerationGrammar};
pub use poll::{poll, JobResolution, JobState, PollConfig};
pub use session::{ApiError, AuthError, Credentials, SessionConfig, SessionManager};
pub use submit::{submit, JobHandle, SimulationSettings};
pub use transport::{HttpTransport, Transport};
