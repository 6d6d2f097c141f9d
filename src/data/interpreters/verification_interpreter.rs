//! Classifies verifyReceipt responses.
//!
//! [`interpret`] never fails: whatever the endpoint sends back becomes a
//! [`VerificationResult`], with unreadable bodies classified as
//! [`OutcomeKind::Unknown`] and kept verbatim for diagnostics. It performs no
//! retries; 21007/21008 only set a retry hint.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    constants::{in_app_field, receipt_field},
    data::models::verify_receipt::response_body_model::{
        InAppModel, PendingRenewalInfoModel, ReceiptModel, ResponseBodyModel,
    },
    domain::entities::{
        receipt::{ExpirationIntent, PurchaseEntry, Receipt, RenewalInfo},
        verification_result::{status_description, OutcomeKind, VerificationResult},
    },
    errors::ModelError,
};

pub fn interpret(http_status: u16, body: &[u8]) -> VerificationResult {
    let mut result = VerificationResult::unknown(Some(http_status), body.to_vec());

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            result.detail = Some(format!("response body is not valid JSON: {e}"));
            return result;
        }
    };
    result.status = extract_status(&value);

    if !(200..300).contains(&http_status) {
        if (500..600).contains(&http_status) {
            result.kind = OutcomeKind::ServerUnavailable;
        }
        result.detail = Some(format!(
            "verification endpoint returned HTTP status {http_status}"
        ));
        return result;
    }

    let Some(status) = result.status else {
        result.detail = Some("response has no numeric status".to_string());
        return result;
    };
    result.kind = OutcomeKind::from_status(status);
    result.retry_hint = result.kind.retry_hint();
    result.detail = Some(status_description(status));

    let model: ResponseBodyModel = match serde_json::from_value(value) {
        Ok(model) => model,
        Err(e) => {
            debug!(status, error = %e, "response body does not match the documented shape");
            if result.is_valid() {
                result.detail = Some(format!("could not read the returned receipt: {e}"));
            }
            return result;
        }
    };
    result.environment = model.environment.and_then(|e| e.known());
    if !result.is_valid() {
        return result;
    }

    result.latest_receipt = model.latest_receipt;
    let renewal_info = model
        .pending_renewal_info
        .into_iter()
        .map(RenewalInfo::from)
        .collect();
    let latest_receipt_info = model
        .latest_receipt_info
        .into_iter()
        .map(PurchaseEntry::from_in_app_model)
        .collect::<Result<Vec<_>, _>>();
    let receipt = model
        .receipt
        .map(|m| Receipt::from_receipt_model(m, renewal_info))
        .transpose();

    match (receipt, latest_receipt_info) {
        (Ok(receipt), Ok(latest_receipt_info)) => {
            result.receipt = receipt;
            result.latest_receipt_info = latest_receipt_info;
        }
        (Err(e), _) | (_, Err(e)) => {
            result.detail = Some(format!("could not read the returned receipt: {e}"));
        }
    }
    result
}

/// Apple's `status`, as a JSON number or a numeric string.
fn extract_status(value: &serde_json::Value) -> Option<i64> {
    let status = value.get("status")?;
    status
        .as_i64()
        .or_else(|| status.as_str().and_then(|s| s.trim().parse().ok()))
}

fn date_from_ms(field_id: i64, ms: Option<i64>) -> Result<Option<DateTime<Utc>>, ModelError> {
    ms.map(|ms| {
        DateTime::from_timestamp_millis(ms).ok_or(ModelError::InvalidDate {
            field_id,
            value: ms.to_string(),
        })
    })
    .transpose()
}

fn required<T>(value: Option<T>, field_id: i64, name: &'static str) -> Result<T, ModelError> {
    value.ok_or(ModelError::MissingRequiredField { field_id, name })
}

impl Receipt {
    fn from_receipt_model(
        m: ReceiptModel,
        pending_renewal_info: Vec<RenewalInfo>,
    ) -> Result<Self, ModelError> {
        Ok(Receipt {
            receipt_type: m.receipt_type,
            bundle_id: required(
                m.bundle_id.filter(|s| !s.is_empty()),
                receipt_field::BUNDLE_ID,
                "bundle id",
            )?,
            application_version: required(
                m.application_version.filter(|s| !s.is_empty()),
                receipt_field::APPLICATION_VERSION,
                "application version",
            )?,
            original_application_version: m.original_application_version,
            opaque_value: None,
            sha1_hash: None,
            creation_date: date_from_ms(receipt_field::CREATION_DATE, m.receipt_creation_date_ms)?,
            expiration_date: date_from_ms(receipt_field::EXPIRATION_DATE, m.expiration_date_ms)?,
            in_app: m
                .in_app
                .into_iter()
                .map(PurchaseEntry::from_in_app_model)
                .collect::<Result<_, _>>()?,
            pending_renewal_info,
        })
    }
}

impl PurchaseEntry {
    fn from_in_app_model(m: InAppModel) -> Result<Self, ModelError> {
        Ok(PurchaseEntry {
            quantity: m.quantity.unwrap_or(1),
            product_id: required(m.product_id, in_app_field::PRODUCT_ID, "product id")?,
            transaction_id: required(
                m.transaction_id,
                in_app_field::TRANSACTION_ID,
                "transaction id",
            )?,
            original_transaction_id: required(
                m.original_transaction_id,
                in_app_field::ORIGINAL_TRANSACTION_ID,
                "original transaction id",
            )?,
            purchase_date: required(
                date_from_ms(in_app_field::PURCHASE_DATE, m.purchase_date_ms)?,
                in_app_field::PURCHASE_DATE,
                "purchase date",
            )?,
            original_purchase_date: date_from_ms(
                in_app_field::ORIGINAL_PURCHASE_DATE,
                m.original_purchase_date_ms,
            )?,
            expires_date: date_from_ms(in_app_field::EXPIRES_DATE, m.expires_date_ms)?,
            cancellation_date: date_from_ms(
                in_app_field::CANCELLATION_DATE,
                m.cancellation_date_ms,
            )?,
            web_order_line_item_id: m.web_order_line_item_id,
            is_trial_period: m.is_trial_period.unwrap_or(false),
            is_in_intro_offer_period: m.is_in_intro_offer_period.unwrap_or(false),
        })
    }
}

impl From<PendingRenewalInfoModel> for RenewalInfo {
    fn from(m: PendingRenewalInfoModel) -> Self {
        RenewalInfo {
            product_id: m.product_id,
            auto_renew_product_id: m.auto_renew_product_id,
            original_transaction_id: m.original_transaction_id,
            auto_renew_status: m.auto_renew_status == Some(1),
            expiration_intent: m.expiration_intent.map(ExpirationIntent::from_code),
            is_in_billing_retry_period: m.is_in_billing_retry_period == Some(1),
        }
    }
}
