use serde::Serialize;

use super::{
    receipt::{PurchaseEntry, Receipt},
    verification_request::Environment,
};
use crate::errors::TransportError;

/// Normalized classification of a verifyReceipt response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    Valid,
    InvalidSignature,
    MalformedReceipt,
    /// The only kind a caller should retry automatically.
    ServerUnavailable,
    SandboxReceiptSentToProduction,
    ProductionReceiptSentToSandbox,
    Unknown,
}

impl OutcomeKind {
    /// Apple's documented status table. Codes not listed here, including
    /// 21004, 21006 and the 211xx range, are `Unknown`.
    pub fn from_status(status: i64) -> Self {
        match status {
            0 => Self::Valid,
            21000 | 21002 => Self::MalformedReceipt,
            21003 => Self::InvalidSignature,
            21005 => Self::ServerUnavailable,
            21007 => Self::SandboxReceiptSentToProduction,
            21008 => Self::ProductionReceiptSentToSandbox,
            _ => Self::Unknown,
        }
    }

    /// The environment to re-send to, for receipts sent to the wrong one.
    pub fn retry_hint(self) -> Option<Environment> {
        match self {
            Self::SandboxReceiptSentToProduction => Some(Environment::Sandbox),
            Self::ProductionReceiptSentToSandbox => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Human-readable explanation of an Apple status code.
pub fn status_description(status: i64) -> String {
    match status {
        0 => "The receipt is valid.".to_string(),
        21000 => "The App Store could not read the JSON object you provided.".to_string(),
        21002 => "The data in the receipt-data property was malformed or missing.".to_string(),
        21003 => "The receipt could not be authenticated.".to_string(),
        21004 => "The shared secret you provided does not match the shared secret on file for your account.".to_string(),
        21005 => "The receipt server is not currently available.".to_string(),
        21006 => "This receipt is valid but the subscription has expired. The receipt data is also decoded and returned as part of the response.".to_string(),
        21007 => "This receipt is from the test environment, but it was sent to the production environment for verification. Send it to the test environment instead.".to_string(),
        21008 => "This receipt is from the production environment, but it was sent to the test environment for verification. Send it to the production environment instead.".to_string(),
        21009 | 21100..=21199 => "Internal data access error. Try again later.".to_string(),
        21010 => "The user account cannot be found or has been deleted.".to_string(),
        other => format!("Unknown Apple status code received: {other}"),
    }
}

/// Outcome of one verification attempt. Failures are data here: a caller
/// always receives one of these, whatever the endpoint sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// `None` when no HTTP response was received.
    pub http_status: Option<u16>,
    /// Apple's `status` field, when the body had a numeric one.
    pub status: Option<i64>,
    pub kind: OutcomeKind,
    /// The response body exactly as received.
    pub raw_payload: Vec<u8>,
    /// Present only for a `Valid` response whose receipt could be read.
    pub receipt: Option<Receipt>,
    pub latest_receipt_info: Vec<PurchaseEntry>,
    /// Base64 of the latest receipt, as returned by Apple.
    pub latest_receipt: Option<String>,
    /// The environment Apple reported the receipt belongs to.
    pub environment: Option<Environment>,
    pub retry_hint: Option<Environment>,
    /// Diagnostics: status description, parse failures, transport errors.
    pub detail: Option<String>,
}

impl VerificationResult {
    pub(crate) fn unknown(http_status: Option<u16>, raw_payload: Vec<u8>) -> Self {
        Self {
            http_status,
            status: None,
            kind: OutcomeKind::Unknown,
            raw_payload,
            receipt: None,
            latest_receipt_info: Vec::new(),
            latest_receipt: None,
            environment: None,
            retry_hint: None,
            detail: None,
        }
    }

    /// The callout never got a response. Reported like an unavailable
    /// server so callers can retry it.
    pub fn transport_failure(error: &TransportError) -> Self {
        Self {
            kind: OutcomeKind::ServerUnavailable,
            detail: Some(error.to_string()),
            ..Self::unknown(None, Vec::new())
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind == OutcomeKind::Valid
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == OutcomeKind::ServerUnavailable
    }

    /// The payload as JSON, if it is JSON.
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.raw_payload).ok()
    }

    /// One-line explanation suitable for an error message.
    pub fn message(&self) -> String {
        match (&self.detail, self.status) {
            (Some(detail), _) => detail.clone(),
            (None, Some(status)) => status_description(status),
            (None, None) => format!("{:?}", self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        let table = [
            (0, OutcomeKind::Valid),
            (21000, OutcomeKind::MalformedReceipt),
            (21002, OutcomeKind::MalformedReceipt),
            (21003, OutcomeKind::InvalidSignature),
            (21004, OutcomeKind::Unknown),
            (21005, OutcomeKind::ServerUnavailable),
            (21006, OutcomeKind::Unknown),
            (21007, OutcomeKind::SandboxReceiptSentToProduction),
            (21008, OutcomeKind::ProductionReceiptSentToSandbox),
            (21010, OutcomeKind::Unknown),
            (21150, OutcomeKind::Unknown),
            (-1, OutcomeKind::Unknown),
        ];
        for (status, kind) in table {
            assert_eq!(OutcomeKind::from_status(status), kind, "status {status}");
        }
    }

    #[test]
    fn only_misrouted_receipts_carry_a_hint() {
        assert_eq!(
            OutcomeKind::SandboxReceiptSentToProduction.retry_hint(),
            Some(Environment::Sandbox)
        );
        assert_eq!(
            OutcomeKind::ProductionReceiptSentToSandbox.retry_hint(),
            Some(Environment::Production)
        );
        assert_eq!(OutcomeKind::ServerUnavailable.retry_hint(), None);
    }

    #[test]
    fn transport_failure_is_retryable() {
        let result = VerificationResult::transport_failure(&TransportError {
            url: "https://example.invalid".to_string(),
            reason: "connection refused".to_string(),
        });
        assert!(result.is_retryable());
        assert_eq!(result.http_status, None);
        assert!(result.message().contains("connection refused"));
    }
}
