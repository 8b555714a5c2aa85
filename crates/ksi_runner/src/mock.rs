//! Mock tool runner for testing.
//!
//! Provides a configurable implementation of the ToolRunner trait for unit
//! tests that must not depend on Terraform being installed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::ToolInvocation;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ExecutionResult, ToolRunner};

/// Predefined mock response for a tool execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// What the mock does when a call matches.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Respond(MockResponse),
    NotFound,
    Timeout(u64),
}

impl From<MockResponse> for MockOutcome {
    fn from(response: MockResponse) -> Self {
        Self::Respond(response)
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout_seconds: u64,
}

impl CapturedCall {
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// Mock tool runner for testing.
///
/// Responses are picked by subcommand first (`respond_to("validate", ..)`),
/// then from the sequential queue, and default to an empty success.
#[derive(Clone, Default)]
pub struct MockRunner {
    /// Responses keyed by the invocation's first argument.
    by_subcommand: Arc<RwLock<BTreeMap<String, MockOutcome>>>,
    /// Sequential responses for unmatched calls.
    responses: Arc<RwLock<Vec<MockOutcome>>>,
    /// Index of next sequential response.
    response_index: Arc<AtomicUsize>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Failure returned for every call, if set.
    simulate_failure: Arc<RwLock<Option<MockOutcome>>>,
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sequential response.
    pub fn add_response(self, response: impl Into<MockOutcome>) -> Self {
        self.responses.write().push(response.into());
        self
    }

    /// Set multiple sequential responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses.into_iter().map(MockOutcome::from).collect();
        self
    }

    /// Respond to every call whose first argument is `subcommand`.
    pub fn respond_to(self, subcommand: impl Into<String>, outcome: impl Into<MockOutcome>) -> Self {
        self.by_subcommand
            .write()
            .insert(subcommand.into(), outcome.into());
        self
    }

    /// Behave as if the binary is not installed.
    pub fn simulate_not_found(self) -> Self {
        *self.simulate_failure.write() = Some(MockOutcome::NotFound);
        self
    }

    /// Behave as if every call timed out.
    pub fn simulate_timeout(self, seconds: u64) -> Self {
        *self.simulate_failure.write() = Some(MockOutcome::Timeout(seconds));
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a specific subcommand was called.
    pub fn was_called(&self, subcommand: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.subcommand() == Some(subcommand))
    }

    /// Get calls for a specific subcommand.
    pub fn get_subcommand_calls(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    fn record_call(&self, invocation: &ToolInvocation) {
        self.captured_calls.write().push(CapturedCall {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            workdir: invocation.workdir.clone(),
            env: invocation.env.clone(),
            timeout_seconds: invocation.timeout_seconds,
        });
    }

    fn next_outcome(&self, invocation: &ToolInvocation) -> MockOutcome {
        if let Some(failure) = self.simulate_failure.read().clone() {
            return failure;
        }
        if let Some(sub) = invocation.subcommand() {
            if let Some(outcome) = self.by_subcommand.read().get(sub) {
                return outcome.clone();
            }
        }
        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("").into();
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or_else(|| MockResponse::success("").into())
    }
}

#[async_trait]
impl ToolRunner for MockRunner {
    async fn run(&self, invocation: &ToolInvocation) -> RunnerResult<ExecutionResult> {
        self.record_call(invocation);

        let response = match self.next_outcome(invocation) {
            MockOutcome::Respond(response) => response,
            MockOutcome::NotFound => return Err(RunnerError::NotFound(invocation.program.clone())),
            MockOutcome::Timeout(secs) => return Err(RunnerError::Timeout(secs)),
        };

        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}
