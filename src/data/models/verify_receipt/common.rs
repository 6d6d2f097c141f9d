use serde::{Deserialize, Serialize};

use crate::domain::entities::verification_request;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) enum Environment {
    /// Indicates that the receipt belongs to the sandbox environment.
    Sandbox,
    /// Indicates that the receipt belongs to the production environment.
    Production,

    #[serde(untagged)]
    Unknown(String),
}

impl Environment {
    pub(crate) fn known(self) -> Option<verification_request::Environment> {
        match self {
            Self::Sandbox => Some(verification_request::Environment::Sandbox),
            Self::Production => Some(verification_request::Environment::Production),
            Self::Unknown(_) => None,
        }
    }
}

impl From<verification_request::Environment> for Environment {
    fn from(environment: verification_request::Environment) -> Self {
        match environment {
            verification_request::Environment::Sandbox => Self::Sandbox,
            verification_request::Environment::Production => Self::Production,
        }
    }
}
