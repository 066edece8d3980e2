//! Request/response contract between callers and the reset flow.
//!
//! Callers only ever see two shapes: the static acceptance response, identical whether or not an
//! account matched, and an infrastructure failure.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::Error;

/// Message returned for every accepted reset request.
pub const RESET_ACCEPTED_MESSAGE: &str =
    "If an account is registered for this address, its password has been reset.";

/// HTTP-style status of an accepted request.
pub const STATUS_OK: u16 = 200;
/// HTTP-style status of an infrastructure failure.
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Incoming reset request.
///
/// The validation rule is for the caller's benefit; the reset flow itself accepts any string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ResetRequest {
    /// Address to look up.
    #[validate(email)]
    pub email: String,
}

impl ResetRequest {
    /// Creates a request for the given address.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Marker returned by a reset that completed without an infrastructure failure.
///
/// Deliberately carries no data: a found account and an unknown address are indistinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetAccepted;

/// Response handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Human-readable message.
    pub message: String,
    /// Request identifier, present on failures so operators can find the log entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ResetResponse {
    /// The uniform acceptance response.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            status: STATUS_OK,
            message: RESET_ACCEPTED_MESSAGE.to_string(),
            request_id: None,
        }
    }

    /// A failure response that only names the failing operation.
    #[must_use]
    pub fn failure(error: &Error, request_id: Option<String>) -> Self {
        Self {
            status: STATUS_INTERNAL_ERROR,
            message: error.public_message().to_string(),
            request_id,
        }
    }

    /// Returns true for the acceptance response.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

impl From<ResetAccepted> for ResetResponse {
    fn from(_: ResetAccepted) -> Self {
        Self::accepted()
    }
}
