//! Approval handling for confirmation pauses.
//!
//! A runtime pauses an invocation by emitting a function call named
//! [`REQUEST_CONFIRMATION`]. The caller answers with a function response
//! carrying the same call id and a `confirmed` flag.

use agent_sessions_core::{Content, Event, FunctionCall, FunctionResponse, Part, Role};
use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

/// Reserved function name for confirmation requests.
pub const REQUEST_CONFIRMATION: &str = "adk_request_confirmation";

/// A pending confirmation extracted from produced events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    /// Id of the confirmation function call.
    pub approval_id: String,
    /// Invocation that is paused waiting for the answer.
    pub invocation_id: String,
    /// Human-readable description of what needs approval, if the runtime sent one.
    pub hint: Option<String>,
}

/// Find the first confirmation request in `events`.
///
/// Events without content or parts are skipped. Returns `None` when no event
/// asks for confirmation.
pub fn check_for_approval<'a, I>(events: I) -> Option<ApprovalRequest>
where
    I: IntoIterator<Item = &'a Event>,
{
    events.into_iter().find_map(|event| {
        event
            .parts()
            .iter()
            .filter_map(|part| part.function_call.as_ref())
            .find(|call| call.name == REQUEST_CONFIRMATION)
            .map(|call| ApprovalRequest {
                approval_id: call.id.clone(),
                invocation_id: event.invocation_id.clone(),
                hint: call.args.get("hint").and_then(Value::as_str).map(str::to_string),
            })
    })
}

/// Build the message that answers `request`.
#[must_use]
pub fn create_approval_response(request: &ApprovalRequest, approved: bool) -> Content {
    Content {
        role: Role::User,
        parts: vec![Part::function_response(FunctionResponse {
            id: request.approval_id.clone(),
            name: REQUEST_CONFIRMATION.to_string(),
            response: json!({ "confirmed": approved }),
        })],
    }
}

/// Build a confirmation function call.
#[must_use]
pub fn confirmation_call(id: impl Into<String>, hint: &str) -> FunctionCall {
    FunctionCall {
        id: id.into(),
        name: REQUEST_CONFIRMATION.to_string(),
        args: json!({ "hint": hint }),
    }
}

/// Read a confirmation answer out of a message: `(call id, confirmed)`.
///
/// A response without a boolean `confirmed` field counts as a rejection.
#[must_use]
pub fn confirmation_decision(content: &Content) -> Option<(String, bool)> {
    content
        .parts
        .iter()
        .filter_map(|part| part.function_response.as_ref())
        .find(|response| response.name == REQUEST_CONFIRMATION)
        .map(|response| {
            let confirmed = response
                .response
                .get("confirmed")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            (response.id.clone(), confirmed)
        })
}

/// Approval error.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval service unavailable")]
    ServiceUnavailable,
    #[error("Approval request failed: {0}")]
    RequestFailed(String),
}

/// Trait for deciding confirmation requests.
///
/// Implement this trait to integrate with your approval UI/system.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Decide whether the paused invocation may proceed.
    async fn decide(&self, request: &ApprovalRequest) -> Result<bool, ApprovalError>;
}

/// Handler that approves everything.
#[derive(Debug, Default, Clone)]
pub struct AutoApproveHandler;

#[async_trait]
impl ApprovalHandler for AutoApproveHandler {
    async fn decide(&self, _request: &ApprovalRequest) -> Result<bool, ApprovalError> {
        Ok(true)
    }
}

/// Handler that rejects everything.
#[derive(Debug, Default, Clone)]
pub struct AutoRejectHandler;

#[async_trait]
impl ApprovalHandler for AutoRejectHandler {
    async fn decide(&self, _request: &ApprovalRequest) -> Result<bool, ApprovalError> {
        Ok(false)
    }
}
