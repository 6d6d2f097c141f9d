use crate::{
    data::{
        datasources::verify_receipt_datasource::VerifyReceiptDatasourceImpl,
        repositories::receipt_repository_impl::ReceiptRepositoryImpl,
    },
    domain::{
        entities::{
            receipt::Receipt, verification_request::VerificationRequest,
            verification_result::VerificationResult,
        },
        repositories::receipt_repository::ReceiptRepository,
    },
    errors::{HttpClientError, ReceiptError},
};

pub struct ReceiptUtil<R: ReceiptRepository> {
    receipt_repository: R,
}

impl<R: ReceiptRepository> ReceiptUtil<R> {
    pub fn decode_receipt(&self, receipt_data: &str) -> Result<Receipt, ReceiptError> {
        self.receipt_repository.decode(receipt_data)
    }

    pub async fn verify_receipt(&self, request: &VerificationRequest) -> VerificationResult {
        self.receipt_repository.verify(request).await
    }
}

/// The client that talks to real verifyReceipt endpoints over HTTPS.
pub type AppleReceiptUtil = ReceiptUtil<ReceiptRepositoryImpl<VerifyReceiptDatasourceImpl>>;

impl AppleReceiptUtil {
    /// Verifies against Apple's production and sandbox endpoints.
    pub fn new() -> Result<Self, HttpClientError> {
        Ok(Self {
            receipt_repository: ReceiptRepositoryImpl::new(VerifyReceiptDatasourceImpl::new()?),
        })
    }

    /// Verifies against custom endpoints, e.g. a fault server.
    pub fn with_endpoints(
        production_url: impl Into<String>,
        sandbox_url: impl Into<String>,
    ) -> Result<Self, HttpClientError> {
        Ok(Self {
            receipt_repository: ReceiptRepositoryImpl::new(
                VerifyReceiptDatasourceImpl::with_endpoints(production_url, sandbox_url)?,
            ),
        })
    }
}
