//! Scripted transport stub shared by unit and integration tests.
//!
//! Responses are queued per (method, path) and popped in order; an empty
//! queue surfaces as a network error so a test that under-scripts fails
//! loudly instead of hanging. Authentication has its own queue and defaults
//! to 201 Created.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::session::Credentials;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport, TransportError};

#[derive(Default)]
struct Script {
    auth: VecDeque<ApiResponse>,
    routes: HashMap<(Method, String), VecDeque<ApiResponse>>,
    requests: Vec<ApiRequest>,
}

/// In-memory [`Transport`] with scripted responses and call recording.
pub struct StubTransport {
    script: Mutex<Script>,
    auth_calls: AtomicUsize,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            auth_calls: AtomicUsize::new(0),
        }
    }

    /// A 200 response with the given JSON body.
    pub fn ok(body: Value) -> ApiResponse {
        Self::status(200, body)
    }

    /// A response with an arbitrary status.
    pub fn status(status: u16, body: Value) -> ApiResponse {
        ApiResponse {
            status,
            location: None,
            retry_after: None,
            body,
        }
    }

    /// A 201 response carrying a Location header, as the simulation-submit
    /// endpoint answers.
    pub fn created_at(location: impl Into<String>) -> ApiResponse {
        ApiResponse {
            status: 201,
            location: Some(location.into()),
            retry_after: None,
            body: Value::Null,
        }
    }

    /// An in-progress poll response: 200 with a Retry-After hint.
    pub fn in_progress(retry_after: f64, body: Value) -> ApiResponse {
        ApiResponse {
            status: 200,
            location: None,
            retry_after: Some(retry_after),
            body,
        }
    }

    /// Queue a response for the authentication endpoint.
    pub fn push_auth(&self, response: ApiResponse) {
        self.script.lock().unwrap().auth.push_back(response);
    }

    /// Queue a response for a (method, path) route.
    pub fn push(&self, method: Method, path: impl Into<String>, response: ApiResponse) {
        self.script
            .lock()
            .unwrap()
            .routes
            .entry((method, path.into()))
            .or_default()
            .push_back(response);
    }

    /// How many times `authenticate` was called.
    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    /// Every request passed to `execute`, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.script.lock().unwrap().requests.clone()
    }
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StubTransport {
    fn authenticate(&self, _credentials: &Credentials) -> Result<ApiResponse, TransportError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().auth.pop_front();
        Ok(scripted.unwrap_or_else(|| Self::status(201, Value::Null)))
    }

    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request.clone());

        let key = (request.method, request.path.clone());
        match script.routes.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(response) => Ok(response),
            None => Err(TransportError::Network(format!(
                "no scripted response for {:?} {}",
                request.method, request.path
            ))),
        }
    }
}
