//! The well-formed answer the fault server gives when no rule fires.

use base64::{prelude::BASE64_STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::{
    data::{
        codec::field_encoder::encode_receipt,
        models::verify_receipt::{
            common::Environment,
            request_body_model::RequestBodyModel,
            response_body_model::{
                InAppModel, PendingRenewalInfoModel, ReceiptModel, ResponseBodyModel,
            },
        },
    },
    domain::entities::receipt::{PurchaseEntry, Receipt},
};

/// A sandbox receipt for a single subscription purchase of
/// `com.example.sub` in `com.example.app` that expires on 2030-01-01.
pub static EXAMPLE_RECEIPT: Lazy<Receipt> = Lazy::new(|| Receipt {
    receipt_type: Some("ProductionSandbox".to_string()),
    bundle_id: "com.example.app".to_string(),
    application_version: "3".to_string(),
    original_application_version: Some("1.0".to_string()),
    opaque_value: None,
    sha1_hash: None,
    creation_date: Some(at(1_704_067_200)),
    expiration_date: None,
    in_app: vec![PurchaseEntry {
        quantity: 1,
        product_id: "com.example.sub".to_string(),
        transaction_id: "1000000000000001".to_string(),
        original_transaction_id: "1000000000000001".to_string(),
        purchase_date: at(1_704_067_200),
        original_purchase_date: Some(at(1_704_067_200)),
        expires_date: Some(at(1_893_456_000)),
        cancellation_date: None,
        web_order_line_item_id: Some(1_000_000_000_000_001),
        is_trial_period: true,
        is_in_intro_offer_period: false,
    }],
    pending_renewal_info: Vec::new(),
});

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// A status 0 response for [`EXAMPLE_RECEIPT`]. `latest_receipt` echoes the
/// request's receipt-data when the request body has one.
pub(crate) fn echo_body(request_body: &[u8]) -> Vec<u8> {
    let receipt_data = serde_json::from_slice::<RequestBodyModel>(request_body)
        .ok()
        .map(|request| request.receipt_data)
        .filter(|data| !data.is_empty());
    let receipt = &*EXAMPLE_RECEIPT;
    let in_app: Vec<InAppModel> = receipt.in_app.iter().map(InAppModel::from).collect();
    let response = ResponseBodyModel {
        status: 0,
        environment: Some(Environment::Sandbox),
        receipt: Some(ReceiptModel::from(receipt)),
        latest_receipt_info: in_app,
        pending_renewal_info: receipt
            .in_app
            .iter()
            .map(|entry| PendingRenewalInfoModel {
                auto_renew_product_id: Some(entry.product_id.clone()),
                auto_renew_status: Some(1),
                expiration_intent: None,
                is_in_billing_retry_period: None,
                original_transaction_id: Some(entry.original_transaction_id.clone()),
                product_id: Some(entry.product_id.clone()),
            })
            .collect(),
        latest_receipt: Some(
            receipt_data.unwrap_or_else(|| BASE64_STANDARD.encode(encode_receipt(receipt))),
        ),
    };
    serde_json::to_vec(&response).unwrap_or_else(|_| br#"{"status": 0}"#.to_vec())
}

impl From<&Receipt> for ReceiptModel {
    fn from(receipt: &Receipt) -> Self {
        ReceiptModel {
            receipt_type: receipt.receipt_type.clone(),
            bundle_id: Some(receipt.bundle_id.clone()),
            application_version: Some(receipt.application_version.clone()),
            original_application_version: receipt.original_application_version.clone(),
            receipt_creation_date_ms: receipt.creation_date.map(|d| d.timestamp_millis()),
            expiration_date_ms: receipt.expiration_date.map(|d| d.timestamp_millis()),
            in_app: receipt.in_app.iter().map(InAppModel::from).collect(),
        }
    }
}

impl From<&PurchaseEntry> for InAppModel {
    fn from(entry: &PurchaseEntry) -> Self {
        InAppModel {
            quantity: Some(entry.quantity),
            product_id: Some(entry.product_id.clone()),
            transaction_id: Some(entry.transaction_id.clone()),
            original_transaction_id: Some(entry.original_transaction_id.clone()),
            purchase_date_ms: Some(entry.purchase_date.timestamp_millis()),
            original_purchase_date_ms: entry.original_purchase_date.map(|d| d.timestamp_millis()),
            expires_date_ms: entry.expires_date.map(|d| d.timestamp_millis()),
            cancellation_date_ms: entry.cancellation_date.map(|d| d.timestamp_millis()),
            web_order_line_item_id: entry.web_order_line_item_id,
            is_trial_period: Some(entry.is_trial_period),
            is_in_intro_offer_period: Some(entry.is_in_intro_offer_period),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        builders::receipt_builder::decode_receipt,
        interpreters::verification_interpreter::interpret,
    };

    #[test]
    fn echo_is_a_valid_response_for_the_example_receipt() {
        let body = echo_body(br#"{"receipt-data": "MIIT"}"#);
        let result = interpret(200, &body);

        assert!(result.is_valid());
        assert_eq!(result.latest_receipt.as_deref(), Some("MIIT"));
        let receipt = result.receipt.unwrap();
        assert_eq!(receipt.bundle_id, EXAMPLE_RECEIPT.bundle_id);
        assert_eq!(receipt.in_app, EXAMPLE_RECEIPT.in_app);
        assert_eq!(result.latest_receipt_info, EXAMPLE_RECEIPT.in_app);
    }

    #[test]
    fn echo_without_request_data_returns_the_encoded_example() {
        let body = echo_body(b"not json");
        let result = interpret(200, &body);

        let latest = result.latest_receipt.unwrap();
        assert_eq!(decode_receipt(&latest).unwrap(), *EXAMPLE_RECEIPT);
    }

    #[test]
    fn numbers_are_written_as_strings_like_apple_does() {
        let body: serde_json::Value = serde_json::from_slice(&echo_body(b"{}")).unwrap();
        assert_eq!(body["status"], 0);
        assert_eq!(body["receipt"]["in_app"][0]["expires_date_ms"], "1893456000000");
        assert_eq!(body["receipt"]["in_app"][0]["is_trial_period"], "true");
    }
}
