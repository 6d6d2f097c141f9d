use async_trait::async_trait;

use crate::{
    domain::entities::{
        receipt::Receipt, verification_request::VerificationRequest,
        verification_result::VerificationResult,
    },
    errors::ReceiptError,
};

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Decodes a base64 receipt locally, without contacting Apple.
    fn decode(&self, receipt_data: &str) -> Result<Receipt, ReceiptError>;

    /// Sends the receipt to Apple's verifyReceipt endpoint and classifies the
    /// answer. Never fails: transport and response errors are reported
    /// through the returned [`VerificationResult`].
    async fn verify(&self, request: &VerificationRequest) -> VerificationResult;
}
