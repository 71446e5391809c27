//! Submission parsing and validation.
//!
//! The wire shape (`RawSubmission`) is a loosely-typed object carrying an
//! `action` string and optional payload objects. `validate` turns it into a
//! `Submission`, a sum type with exactly one payload per action, so that the
//! dispatcher matches on variants instead of comparing strings.

mod examples;

pub use examples::{action_examples, request_format_example};

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Actions
// ============================================================================

/// Action tag of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Credential check against the auth service.
    Auth,
    /// Log entry published onto the broker exchange.
    Log,
    /// Log entry sent straight to the logging service.
    LogDirect,
    /// Mail handed to the mail-composition service.
    Mail,
}

impl Action {
    /// Every accepted action, in the order they are advertised to clients.
    pub const ALL: [Action; 4] = [Action::Auth, Action::Log, Action::LogDirect, Action::Mail];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Auth => "auth",
            Action::Log => "log",
            Action::LogDirect => "logdirect",
            Action::Mail => "mail",
        }
    }

    /// Name of the payload field this action reads.
    pub fn payload_field(&self) -> &'static str {
        match self {
            Action::Auth => "auth",
            Action::Log | Action::LogDirect => "log",
            Action::Mail => "mail",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == value)
    }

    /// Comma-separated list of valid action names.
    pub fn valid_list() -> String {
        Self::ALL
            .iter()
            .map(Action::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Validated payloads
// ============================================================================

/// Credentials forwarded to the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub email: String,
    pub password: String,
}

/// Log entry, used by both `log` and `logdirect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    pub name: String,
    pub data: String,
}

/// Mail request. More than one recipient makes it a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailPayload {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub message: String,
}

impl MailPayload {
    pub fn is_batch(&self) -> bool {
        self.to.len() > 1
    }
}

/// A validated submission: one variant per action, carrying only its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Auth(AuthPayload),
    Log(LogPayload),
    LogDirect(LogPayload),
    Mail(MailPayload),
}

impl Submission {
    pub fn action(&self) -> Action {
        match self {
            Submission::Auth(_) => Action::Auth,
            Submission::Log(_) => Action::Log,
            Submission::LogDirect(_) => Action::LogDirect,
            Submission::Mail(_) => Action::Mail,
        }
    }
}

// ============================================================================
// Wire shape
// ============================================================================

/// Submission body as received on the wire, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSubmission {
    pub action: String,
    pub auth: Option<RawAuth>,
    pub log: Option<RawLog>,
    pub mail: Option<RawMail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuth {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLog {
    pub name: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMail {
    pub from: Option<String>,
    pub to: Recipients,
    pub subject: String,
    pub message: String,
}

/// `to` accepts either a single address or a list of addresses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::Many(Vec::new())
    }
}

impl Recipients {
    fn into_trimmed(self) -> Vec<String> {
        let list = match self {
            Recipients::One(one) => vec![one],
            Recipients::Many(many) => many,
        };
        list.into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

impl RawSubmission {
    /// Parse a request body. Malformed JSON (including trailing data after the
    /// object) is reported separately from validation failures.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Reasons a structurally valid body is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("action is required. Valid actions: {}", Action::valid_list())]
    MissingAction,

    #[error("invalid action '{}'. Valid actions: {}", .0, Action::valid_list())]
    InvalidAction(String),

    #[error("{} payload is required for action '{action}'", .action.payload_field())]
    MissingPayload { action: Action },

    #[error("email is required for authentication")]
    EmailRequired,

    #[error("password is required for authentication")]
    PasswordRequired,

    #[error("invalid email format")]
    InvalidEmail,

    #[error("log name is required")]
    LogNameRequired,

    #[error("log data is required")]
    LogDataRequired,

    #[error("recipient email (to) is required")]
    RecipientRequired,

    #[error("email subject is required")]
    SubjectRequired,

    #[error("email message is required")]
    MessageRequired,

    #[error("invalid recipient email format: '{0}'")]
    InvalidRecipient(String),

    #[error("invalid sender email format")]
    InvalidSender,
}

/// Validate a raw submission.
///
/// Rules are applied in order: action present and known, matching payload
/// present, then payload field checks. Payloads for other actions are ignored.
/// String fields that identify something (addresses, names, subject) are
/// trimmed; free-form content is kept as sent.
pub fn validate(raw: RawSubmission) -> Result<Submission, ValidationError> {
    let action_name = raw.action.trim();
    if action_name.is_empty() {
        return Err(ValidationError::MissingAction);
    }
    let action = Action::parse(action_name)
        .ok_or_else(|| ValidationError::InvalidAction(action_name.to_string()))?;

    let missing = || ValidationError::MissingPayload { action };

    match action {
        Action::Auth => validate_auth(raw.auth.ok_or_else(missing)?).map(Submission::Auth),
        Action::Log => validate_log(raw.log.ok_or_else(missing)?).map(Submission::Log),
        Action::LogDirect => validate_log(raw.log.ok_or_else(missing)?).map(Submission::LogDirect),
        Action::Mail => validate_mail(raw.mail.ok_or_else(missing)?).map(Submission::Mail),
    }
}

fn validate_auth(raw: RawAuth) -> Result<AuthPayload, ValidationError> {
    let email = raw.email.trim().to_string();
    if email.is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if raw.password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    if !email.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(AuthPayload {
        email,
        password: raw.password,
    })
}

fn validate_log(raw: RawLog) -> Result<LogPayload, ValidationError> {
    let name = raw.name.trim().to_string();
    if name.is_empty() {
        return Err(ValidationError::LogNameRequired);
    }
    if raw.data.trim().is_empty() {
        return Err(ValidationError::LogDataRequired);
    }
    Ok(LogPayload {
        name,
        data: raw.data,
    })
}

fn validate_mail(raw: RawMail) -> Result<MailPayload, ValidationError> {
    let to = raw.to.into_trimmed();
    if to.is_empty() {
        return Err(ValidationError::RecipientRequired);
    }
    let subject = raw.subject.trim().to_string();
    if subject.is_empty() {
        return Err(ValidationError::SubjectRequired);
    }
    if raw.message.trim().is_empty() {
        return Err(ValidationError::MessageRequired);
    }
    if let Some(bad) = to.iter().find(|r| !r.contains('@')) {
        return Err(ValidationError::InvalidRecipient(bad.clone()));
    }
    let from = raw
        .from
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
    if matches!(&from, Some(f) if !f.contains('@')) {
        return Err(ValidationError::InvalidSender);
    }
    Ok(MailPayload {
        from,
        to,
        subject,
        message: raw.message,
    })
}
