// =============================================================================
// VALIDATION MODULE
// =============================================================================
// Field rules for the contact form.
//
// NOTES:
// - Invalid input is an expected outcome, not an error: validate() returns
//   every violation at once so the page can show them all
// - Lengths are counted in characters, not bytes
// =============================================================================

use std::collections::BTreeMap;

use email_address::{EmailAddress, Options};

use crate::models::{ContactForm, NewMessage};

pub const NAME_MAX_CHARS: usize = 100;
pub const EMAIL_MAX_CHARS: usize = 120;
pub const MESSAGE_MAX_CHARS: usize = 2000;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_EMAIL: &str = "Invalid email address.";
pub const CSRF_MISSING: &str = "The CSRF token is missing.";
pub const CSRF_INVALID: &str = "The CSRF token is invalid.";
pub const UNREADABLE_FORM: &str = "The submitted form could not be read. Please try again.";

// -----------------------------------------------------------------------------
// FIELD ERRORS
// -----------------------------------------------------------------------------

/// Form fields that can carry errors, in page order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Name,
    Email,
    Message,
    CsrfToken,
    /// Problems with the submission as a whole
    Form,
}

impl Field {
    /// The form-encoded field name
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Message => "message",
            Field::CsrfToken => "csrf_token",
            Field::Form => "form",
        }
    }
}

/// Error messages keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: BTreeMap<Field, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.errors.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Messages for one field; empty when the field is fine.
    pub fn get(&self, field: Field) -> &[String] {
        self.errors.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of messages over all fields
    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }
}

// =============================================================================
// VALIDATE
// =============================================================================

/// Checks a submitted form.
///
/// Rules (all fields are checked, nothing short-circuits):
/// - `name`: required, at most 100 characters
/// - `email`: required, valid address, at most 120 characters
/// - `message`: required, at most 2000 characters
///
/// Whitespace-only values count as missing. Accepted values are stored
/// exactly as submitted.
pub fn validate(form: &ContactForm) -> Result<NewMessage, FieldErrors> {
    let mut errors = FieldErrors::new();

    check_text(&mut errors, Field::Name, &form.name, NAME_MAX_CHARS);
    check_text(&mut errors, Field::Email, &form.email, EMAIL_MAX_CHARS);
    check_text(&mut errors, Field::Message, &form.message, MESSAGE_MAX_CHARS);

    if !is_blank(&form.email) && !is_valid_email(&form.email) {
        errors.add(Field::Email, INVALID_EMAIL);
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewMessage::new(
        form.name.clone(),
        form.email.clone(),
        form.message.clone(),
    ))
}

fn check_text(errors: &mut FieldErrors, field: Field, value: &str, max_chars: usize) {
    if is_blank(value) {
        errors.add(field, REQUIRED);
        return;
    }

    if value.chars().count() > max_chars {
        errors.add(
            field,
            format!("Field cannot be longer than {} characters.", max_chars),
        );
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Plain `local@domain` only: no display name (`Ann <ann@example.com>`), no
/// quoted local part and no `[127.0.0.1]` domain literal. The domain must be
/// a dotted hostname made of letter/digit/hyphen labels.
fn is_valid_email(value: &str) -> bool {
    let options = Options::default()
        .without_display_text()
        .without_domain_literal();

    match EmailAddress::parse_with_options(value, options) {
        Ok(address) => !address.local_part().starts_with('"') && is_hostname(address.domain()),
        Err(_) => false,
    }
}

fn is_hostname(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();

    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}
