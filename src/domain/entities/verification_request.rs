use serde::Serialize;

use crate::{
    constants::{PRODUCTION_VERIFY_URL, SANDBOX_VERIFY_URL},
    secrets::SharedSecret,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Environment {
    Production,
    Sandbox,
}

impl Environment {
    pub fn from_sandbox_flag(sandbox: bool) -> Self {
        if sandbox {
            Self::Sandbox
        } else {
            Self::Production
        }
    }

    /// The environment a misrouted receipt should be re-sent to.
    pub fn other(self) -> Self {
        match self {
            Self::Production => Self::Sandbox,
            Self::Sandbox => Self::Production,
        }
    }

    /// Apple's verifyReceipt endpoint for this environment.
    pub fn verify_url(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_VERIFY_URL,
            Self::Sandbox => SANDBOX_VERIFY_URL,
        }
    }
}

/// One verifyReceipt call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// The receipt, base64 encoded.
    pub receipt_data: String,
    pub shared_secret: Option<SharedSecret>,
    pub environment: Environment,
    /// Ask Apple to return only the latest renewal transaction of each
    /// auto-renewable subscription.
    pub exclude_old_transactions: bool,
}

impl VerificationRequest {
    pub fn new(
        receipt_data: impl Into<String>,
        shared_secret: Option<SharedSecret>,
        sandbox: bool,
    ) -> Self {
        Self {
            receipt_data: receipt_data.into().trim().to_string(),
            shared_secret: shared_secret.filter(|s| !s.is_empty()),
            environment: Environment::from_sandbox_flag(sandbox),
            exclude_old_transactions: false,
        }
    }

    pub fn with_exclude_old_transactions(mut self, exclude: bool) -> Self {
        self.exclude_old_transactions = exclude;
        self
    }
}
