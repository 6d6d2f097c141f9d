//! Fault rules: which request gets which misbehavior.
//!
//! A policy is an ordered list of `[[rule]]` tables. The first rule whose
//! trigger matches a request's number decides its action; requests no rule
//! matches get the default echo.
//!
//! ```toml
//! [[rule]]
//! trigger = { kind = "nth", n = 3 }
//! action = { kind = "respond", status = 500, body = '{"status": 0' }
//!
//! [[rule]]
//! trigger = { kind = "every_nth", n = 10 }
//! action = { kind = "delay", delay_ms = 2000 }
//! ```

use std::path::Path;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;

/// Which requests a rule applies to. Request numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Always,
    /// Exactly the `n`th request.
    Nth { n: u64 },
    /// Requests `n`, `2n`, `3n`, ...
    EveryNth { n: u64 },
    /// Requests `from..=to`.
    Range { from: u64, to: u64 },
}

impl Trigger {
    pub fn matches(&self, request_number: u64) -> bool {
        match *self {
            Self::Always => true,
            Self::Nth { n } => request_number == n,
            Self::EveryNth { n } => n != 0 && request_number % n == 0,
            Self::Range { from, to } => (from..=to).contains(&request_number),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Nth { n: 0 } | Self::EveryNth { n: 0 } => {
                Err("request numbers start at 1, n must be positive".to_string())
            }
            Self::Range { from, to } if from == 0 || from > to => {
                Err(format!("range {from}..={to} matches no request"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultAction {
    /// Answers with exactly this status and body. Without a content type
    /// the response carries no Content-Type header.
    Respond {
        status: u16,
        #[serde(default)]
        body: String,
        #[serde(default)]
        content_type: Option<String>,
    },
    /// Sleeps, then performs `then`, or the default echo.
    Delay {
        delay_ms: u64,
        #[serde(default)]
        then: Option<Box<FaultAction>>,
    },
    /// Closes the connection without writing anything.
    DropConnection,
    /// Declares a Content-Length other than the number of body bytes
    /// written, then closes the connection.
    LengthMismatch {
        status: u16,
        #[serde(default)]
        body: String,
        declared_length: usize,
    },
}

impl FaultAction {
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Respond { status, .. } => validate_status(*status),
            Self::Delay { then, .. } => then.as_deref().map_or(Ok(()), Self::validate),
            Self::DropConnection => Ok(()),
            Self::LengthMismatch {
                status,
                body,
                declared_length,
            } => {
                validate_status(*status)?;
                if *declared_length == body.len() {
                    return Err(format!(
                        "declared_length {declared_length} equals the body length"
                    ));
                }
                Ok(())
            }
        }
    }
}

fn validate_status(status: u16) -> Result<(), String> {
    StatusCode::from_u16(status)
        .map(|_| ())
        .map_err(|_| format!("{status} is not an HTTP status code"))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FaultRule {
    pub trigger: Trigger,
    pub action: FaultAction,
}

/// Immutable once loaded; the server shares it read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FaultPolicy {
    #[serde(rename = "rule")]
    rules: Vec<FaultRule>,
}

#[derive(Deserialize)]
struct PolicyFile {
    #[serde(default, rename = "rule")]
    rules: Vec<FaultRule>,
}

impl FaultPolicy {
    pub fn new(rules: Vec<FaultRule>) -> Result<Self, PolicyError> {
        for (index, rule) in rules.iter().enumerate() {
            rule.trigger
                .validate()
                .and_then(|()| rule.action.validate())
                .map_err(|reason| PolicyError::InvalidRule { index, reason })?;
        }
        Ok(Self { rules })
    }

    pub fn from_toml_str(source: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile = toml::from_str(source)?;
        Self::new(file.rules)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let source = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Deterministic mix of everything Apple's endpoint has been seen to do
    /// wrong: unexpected HTTP codes, garbage JSON, error statuses, slowness
    /// and broken connections. Every request that no rule catches (1, 19,
    /// 23, 29, ...) gets a valid echo.
    pub fn chaos() -> Self {
        const GARBAGE: &str = "{I [you}";
        let respond = |status: u16, body: &str| FaultAction::Respond {
            status,
            body: body.to_string(),
            content_type: Some("application/json".to_string()),
        };
        let every = |n: u64, action: FaultAction| FaultRule {
            trigger: Trigger::EveryNth { n },
            action,
        };
        Self {
            rules: vec![
                every(17, FaultAction::DropConnection),
                every(
                    13,
                    FaultAction::LengthMismatch {
                        status: 200,
                        body: r#"{"status": 0}"#.to_string(),
                        declared_length: 64,
                    },
                ),
                every(
                    11,
                    FaultAction::Delay {
                        delay_ms: 1500,
                        then: Some(Box::new(respond(200, r#"{"status": 21005}"#))),
                    },
                ),
                every(7, respond(200, r#"{"status": 21008}"#)),
                every(5, respond(500, GARBAGE)),
                every(4, respond(404, r#"{"status": 21003}"#)),
                every(3, respond(304, r#"{"status": 21002}"#)),
                every(2, respond(200, GARBAGE)),
            ],
        }
    }

    pub fn rules(&self) -> &[FaultRule] {
        &self.rules
    }

    /// The action for the `request_number`th request, `None` for the echo.
    pub fn action_for(&self, request_number: u64) -> Option<&FaultAction> {
        self.rules
            .iter()
            .find(|rule| rule.trigger.matches(request_number))
            .map(|rule| &rule.action)
    }
}
