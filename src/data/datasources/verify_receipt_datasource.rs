use async_trait::async_trait;
use tracing::debug;

use crate::{
    constants::{DEFAULT_CALLOUT_TIMEOUT, PRODUCTION_VERIFY_URL, SANDBOX_VERIFY_URL},
    data::models::verify_receipt::request_body_model::RequestBodyModel,
    domain::entities::verification_request::{Environment, VerificationRequest},
    errors::{HttpClientError, TransportError},
};

/// An HTTP response from verifyReceipt, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub http_status: u16,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait VerifyReceiptDatasource: Send + Sync {
    /// Verify Receipt:
    /// https://developer.apple.com/documentation/appstorereceipts/verifyreceipt
    ///
    /// Sends the receipt to the endpoint of `request.environment`. Any HTTP
    /// response is returned as-is, whatever its status; only a failure to
    /// get a response at all is an error.
    async fn verify(&self, request: &VerificationRequest) -> Result<RawResponse, TransportError>;
}

pub struct VerifyReceiptDatasourceImpl {
    client: reqwest::Client,
    production_url: String,
    sandbox_url: String,
}

#[async_trait]
impl VerifyReceiptDatasource for VerifyReceiptDatasourceImpl {
    async fn verify(&self, request: &VerificationRequest) -> Result<RawResponse, TransportError> {
        let url = self.url_for(request.environment);
        let body = RequestBodyModel {
            receipt_data: request.receipt_data.clone(),
            password: request
                .shared_secret
                .as_ref()
                .map(|secret| secret.expose().to_string()),
            exclude_old_transactions: request.exclude_old_transactions,
        };
        debug!(url, environment = ?request.environment, "calling verifyReceipt");
        self.callout(url, &body).await
    }
}

impl VerifyReceiptDatasourceImpl {
    pub(crate) fn new() -> Result<Self, HttpClientError> {
        Self::with_endpoints(PRODUCTION_VERIFY_URL, SANDBOX_VERIFY_URL)
    }

    /// Points both environments at custom URLs, e.g. a local fault server.
    pub(crate) fn with_endpoints(
        production_url: impl Into<String>,
        sandbox_url: impl Into<String>,
    ) -> Result<Self, HttpClientError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(DEFAULT_CALLOUT_TIMEOUT)
                .build()?,
            production_url: production_url.into(),
            sandbox_url: sandbox_url.into(),
        })
    }

    fn url_for(&self, environment: Environment) -> &str {
        match environment {
            Environment::Production => &self.production_url,
            Environment::Sandbox => &self.sandbox_url,
        }
    }

    async fn callout(
        &self,
        url: &str,
        body: &RequestBodyModel,
    ) -> Result<RawResponse, TransportError> {
        let transport_error = |e: reqwest::Error| TransportError {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let http_status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(RawResponse {
            http_status,
            body: body.to_vec(),
        })
    }
}
