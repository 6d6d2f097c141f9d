use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    data::{
        builders::receipt_builder::decode_receipt,
        datasources::verify_receipt_datasource::VerifyReceiptDatasource,
        interpreters::verification_interpreter::interpret,
    },
    domain::{
        entities::{
            receipt::Receipt, verification_request::VerificationRequest,
            verification_result::VerificationResult,
        },
        repositories::receipt_repository::ReceiptRepository,
    },
    errors::ReceiptError,
};

pub struct ReceiptRepositoryImpl<D: VerifyReceiptDatasource> {
    verify_receipt_datasource: D,
}

#[async_trait]
impl<D: VerifyReceiptDatasource> ReceiptRepository for ReceiptRepositoryImpl<D> {
    fn decode(&self, receipt_data: &str) -> Result<Receipt, ReceiptError> {
        decode_receipt(receipt_data)
    }

    async fn verify(&self, request: &VerificationRequest) -> VerificationResult {
        match self.verify_receipt_datasource.verify(request).await {
            Ok(response) => {
                let result = interpret(response.http_status, &response.body);
                info!(
                    http_status = response.http_status,
                    status = ?result.status,
                    kind = ?result.kind,
                    "verifyReceipt answered"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "verifyReceipt callout failed");
                VerificationResult::transport_failure(&e)
            }
        }
    }
}

impl<D: VerifyReceiptDatasource> ReceiptRepositoryImpl<D> {
    pub(crate) fn new(verify_receipt_datasource: D) -> Self {
        Self {
            verify_receipt_datasource,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        data::{
            codec::field_encoder::FieldEncoder, datasources::verify_receipt_datasource::RawResponse,
        },
        domain::entities::{
            verification_request::Environment, verification_result::OutcomeKind,
        },
        errors::TransportError,
        secrets::SharedSecret,
    };

    struct FakeDatasource {
        response: Result<RawResponse, TransportError>,
        seen: Mutex<Vec<VerificationRequest>>,
    }

    impl FakeDatasource {
        fn answering(http_status: u16, body: &str) -> Self {
            Self {
                response: Ok(RawResponse {
                    http_status,
                    body: body.as_bytes().to_vec(),
                }),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(TransportError {
                    url: "http://127.0.0.1:1/verifyReceipt".to_string(),
                    reason: "connection refused".to_string(),
                }),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VerifyReceiptDatasource for FakeDatasource {
        async fn verify(
            &self,
            request: &VerificationRequest,
        ) -> Result<RawResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn verify_interprets_the_response() {
        let repository =
            ReceiptRepositoryImpl::new(FakeDatasource::answering(200, r#"{"status": 21007}"#));
        let request = VerificationRequest::new("MIIT", Some(SharedSecret::new("abc")), false);

        let result = repository.verify(&request).await;

        assert_eq!(result.kind, OutcomeKind::SandboxReceiptSentToProduction);
        assert_eq!(result.retry_hint, Some(Environment::Sandbox));
        let seen = repository.verify_receipt_datasource.seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "no automatic retry");
        assert_eq!(seen[0].environment, Environment::Production);
    }

    #[tokio::test]
    async fn transport_failure_becomes_server_unavailable() {
        let repository = ReceiptRepositoryImpl::new(FakeDatasource::failing());
        let request = VerificationRequest::new("MIIT", None, true);

        let result = repository.verify(&request).await;

        assert_eq!(result.kind, OutcomeKind::ServerUnavailable);
        assert_eq!(result.http_status, None);
        assert!(result.message().contains("connection refused"));
    }

    #[test]
    fn decode_runs_locally() {
        let repository = ReceiptRepositoryImpl::new(FakeDatasource::failing());
        let receipt_data = FieldEncoder::default()
            .string(2, "com.example.app")
            .string(3, "3")
            .finish_base64();

        let receipt = repository.decode(&receipt_data).unwrap();

        assert_eq!(receipt.bundle_id, "com.example.app");
        assert!(repository
            .verify_receipt_datasource
            .seen
            .lock()
            .unwrap()
            .is_empty());
    }
}
