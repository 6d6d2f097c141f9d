use std::{convert::Infallible, fmt, str::FromStr};

/// Environment variable the CLI reads the shared secret from when `--secret`
/// is not given.
pub const SHARED_SECRET_ENV: &str = "IAP_SHARED_SECRET";

/// App-specific shared secret, required to verify auto-renewable
/// subscription receipts.
///
/// Never printed: `Debug` and `Display` are redacted so the secret cannot
/// leak through error messages or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

impl fmt::Display for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl FromStr for SharedSecret {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
