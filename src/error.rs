//! Unified error handling for chatterd.
//!
//! One taxonomy covers intent processing end to end; each variant carries a
//! stable code used for failure acks and metric labeling.

use crate::store::StoreError;
use chatter_proto::{AckBody, ServerEvent, ServerFrame};
use thiserror::Error;

/// Errors that can occur while validating or applying a client intent.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad or missing credential at handshake. Fatal to the connection;
    /// never produced after registration.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Actor lacks the role the operation requires.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Operation is role-allowed but violates a policy rule (recall window,
    /// terminal status, creator protection).
    #[error("policy violation: {0}")]
    Policy(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// A mirrored friend-edge write landed on one side only. Logged and
    /// repaired on next access.
    #[error("partial consistency: {0}")]
    PartialConsistency(String),

    /// Structurally valid frame with semantically unusable fields.
    #[error("invalid intent: {0}")]
    Invalid(String),
}

impl EngineError {
    /// Stable error code for acks and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::NotFound(_) => "not_found",
            Self::Permission(_) => "permission",
            Self::Policy(_) => "policy",
            Self::Persistence(_) => "persistence",
            Self::PartialConsistency(_) => "partial_consistency",
            Self::Invalid(_) => "invalid",
        }
    }

    /// Build the failure ack for this error, echoing the intent's `seq`.
    pub fn to_ack(&self, seq: Option<u64>) -> ServerFrame {
        ServerFrame {
            seq,
            event: ServerEvent::Ack(AckBody {
                ok: false,
                code: Some(self.code().to_string()),
                message: Some(self.to_string()),
                data: None,
            }),
        }
    }
}

/// Result type for intent handlers.
pub type EngineResult<T> = Result<T, EngineError>;

/// Build the success ack for an intent, with an optional data payload.
pub fn success_ack(seq: Option<u64>, data: Option<serde_json::Value>) -> ServerFrame {
    ServerFrame {
        seq,
        event: ServerEvent::Ack(AckBody {
            ok: true,
            code: None,
            message: None,
            data,
        }),
    }
}
