//! Request/response lifecycle: `idle -> analyzing -> complete | error`,
//! and `error -> idle` on retry.
//!
//! The controller is the only owner of the current state, result and error.
//! At most one request is in flight; `begin` refuses while analyzing.

use crate::domain::analysis::{
    AnalysisRequest, AnalysisResult, AnalysisState, AnalysisType, BacktestStrategy,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

mod session;
pub mod view;

pub use session::AnalysisSession;
pub use view::{ActionButton, ActionGroup, View};

pub const FALLBACK_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// The request currently (or most recently) dispatched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRequest {
    pub request_id: Uuid,
    #[serde(rename = "type")]
    pub analysis_type: AnalysisType,
    pub backtest_strategy: Option<BacktestStrategy>,
    pub backtest_period: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Proof that `begin` accepted a request. Needed to record its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    request_id: Uuid,
}

impl Ticket {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub state: AnalysisState,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub active: Option<ActiveRequest>,
}

#[derive(Debug, Default)]
pub struct AnalysisController {
    state: AnalysisState,
    result: Option<AnalysisResult>,
    error: Option<String>,
    active: Option<ActiveRequest>,
}

impl AnalysisController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    /// Only meaningful when the state is `Complete`.
    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// Only meaningful when the state is `Error`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn active(&self) -> Option<&ActiveRequest> {
        self.active.as_ref()
    }

    pub fn is_analyzing(&self) -> bool {
        self.state == AnalysisState::Analyzing
    }

    pub fn begin(&mut self, request: &AnalysisRequest) -> Option<Ticket> {
        if self.is_analyzing() {
            tracing::debug!(
                analysis_type = %request.analysis_type(),
                "analysis already in flight; ignoring action"
            );
            return None;
        }

        let request_id = Uuid::new_v4();
        self.result = None;
        self.error = None;
        self.active = Some(ActiveRequest {
            request_id,
            analysis_type: request.analysis_type(),
            backtest_strategy: request.backtest_strategy(),
            backtest_period: request.backtest_period().map(str::to_string),
            started_at: Utc::now(),
        });
        self.state = AnalysisState::Analyzing;

        tracing::info!(
            %request_id,
            analysis_type = %request.analysis_type(),
            backtest_period = request.backtest_period(),
            "analysis started"
        );
        Some(Ticket { request_id })
    }

    /// Returns false when the ticket is not the in-flight request.
    pub fn complete(&mut self, ticket: Ticket, result: AnalysisResult) -> bool {
        if !self.owns(ticket) {
            tracing::warn!(request_id = %ticket.request_id, "dropping result for a request that is no longer in flight");
            return false;
        }

        tracing::info!(
            request_id = %ticket.request_id,
            analysis_type = %result.analysis_type,
            stocks = result.stocks.len(),
            elapsed_ms = self.elapsed_ms(),
            "analysis complete"
        );
        self.result = Some(result);
        self.state = AnalysisState::Complete;
        true
    }

    /// Stores the error's display text, or the fallback message when it is blank.
    pub fn fail(&mut self, ticket: Ticket, err: &anyhow::Error) -> bool {
        if !self.owns(ticket) {
            tracing::warn!(request_id = %ticket.request_id, error = %err, "dropping failure for a request that is no longer in flight");
            return false;
        }

        let message = display_message(err);
        tracing::error!(
            request_id = %ticket.request_id,
            elapsed_ms = self.elapsed_ms(),
            error = %format!("{err:#}"),
            "analysis failed"
        );
        self.error = Some(message);
        self.state = AnalysisState::Error;
        true
    }

    /// `error -> idle`. Any other state is left alone.
    pub fn retry(&mut self) -> bool {
        if self.state != AnalysisState::Error {
            return false;
        }
        self.error = None;
        self.result = None;
        self.active = None;
        self.state = AnalysisState::Idle;
        true
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            result: self.result.clone(),
            error: self.error.clone(),
            active: self.active.clone(),
        }
    }

    fn owns(&self, ticket: Ticket) -> bool {
        self.is_analyzing()
            && self
                .active
                .as_ref()
                .is_some_and(|a| a.request_id == ticket.request_id)
    }

    fn elapsed_ms(&self) -> i64 {
        self.active
            .as_ref()
            .map(|a| (Utc::now() - a.started_at).num_milliseconds())
            .unwrap_or_default()
    }
}

fn display_message(err: &anyhow::Error) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        FALLBACK_ERROR_MESSAGE.to_string()
    } else {
        message
    }
}
