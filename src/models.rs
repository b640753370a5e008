// =============================================================================
// MODELS MODULE
// =============================================================================
// This module defines the data structures used throughout the service.
//
// NOTES:
// - `ContactForm` is whatever the browser sent, unchecked
// - `NewMessage` only exists after validation succeeded
// - `Message` is a stored row, including the database-generated id
// =============================================================================

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// =============================================================================
// MESSAGE
// =============================================================================
// A contact message as stored in the `message` table.
//
// DERIVE MACROS:
// - FromRow: Allows SQLx to map database rows to this struct
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Message {
    /// Database-generated identifier, assigned once at insert
    pub id: i64,

    /// Submitter's name (at most 100 characters)
    pub name: String,

    /// Submitter's email (at most 120 characters)
    pub email: String,

    /// Message body (at most 2000 characters)
    pub message: String,
}

// -----------------------------------------------------------------------------
// NEW MESSAGE
// -----------------------------------------------------------------------------
/// A message that passed validation but has not been stored yet.
///
/// The fields are private so that the only way to obtain one is through
/// `validation::validate`; `Database::insert_message` accepts nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    name: String,
    email: String,
    message: String,
}

impl NewMessage {
    /// Callers must have checked every field rule first.
    pub(crate) fn new(name: String, email: String, message: String) -> Self {
        Self {
            name,
            email,
            message,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// =============================================================================
// FORM INPUT
// =============================================================================
/// Raw `application/x-www-form-urlencoded` body of `POST /`.
///
/// Every field defaults to an empty string, so a missing field surfaces as a
/// "required" validation error instead of an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,

    /// Hidden field echoing the CSRF cookie
    pub csrf_token: String,
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================
// The flash message shown once on the page after a redirect.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Failure,
}

impl NotificationKind {
    /// CSS class used by the page template
    pub fn css_class(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    /// Confirmation addressed to the submitter by name.
    pub fn received(name: &str) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: format!("Thanks {}! We received your message.", name),
        }
    }

    /// Generic failure text; storage details stay in the server log.
    pub fn not_saved() -> Self {
        Self {
            kind: NotificationKind::Failure,
            message: "Sorry, we could not save your message. Please try again later."
                .to_string(),
        }
    }
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Detailed readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

/// Individual dependency health checks
#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub database: bool,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
