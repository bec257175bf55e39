//! Agent runtime support.
//!
//! Provides:
//! - Approval gate helpers and the approval handler trait
//! - `ScriptedRuntime` - A runtime driven by canned replies

pub mod approvals;
pub mod scripted;

pub use approvals::{
    ApprovalError, ApprovalHandler, ApprovalRequest, AutoApproveHandler, AutoRejectHandler,
    REQUEST_CONFIRMATION, check_for_approval, create_approval_response,
};
pub use scripted::{EchoResponder, Reply, Responder, ScriptedRuntime};
