use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::{base64::Base64, serde_as};

/// Structured view of an App Store receipt.
///
/// Built either from the binary container (see
/// [`build`](crate::data::builders::receipt_builder::build)) or from the
/// `receipt` object of a verification response.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// "Production", "ProductionSandbox", etc. Not always present.
    pub receipt_type: Option<String>,
    pub bundle_id: String,
    /// The app's CFBundleVersion at the time the receipt was issued.
    pub application_version: String,
    pub original_application_version: Option<String>,
    /// Opaque value used, with the bundle id and device identifier, to
    /// compute the SHA-1 hash. Absent in verification responses.
    #[serde_as(as = "Option<Base64>")]
    pub opaque_value: Option<Vec<u8>>,
    #[serde_as(as = "Option<Base64>")]
    pub sha1_hash: Option<Vec<u8>>,
    pub creation_date: Option<DateTime<Utc>>,
    /// Only volume purchase program receipts expire.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Empty for a pure app receipt.
    pub in_app: Vec<PurchaseEntry>,
    /// Subscription renewal status. Only verification responses carry it.
    pub pending_renewal_info: Vec<RenewalInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseEntry {
    pub quantity: u32,
    pub product_id: String,
    pub transaction_id: String,
    /// For renewals and restores, the transaction id of the first purchase.
    pub original_transaction_id: String,
    pub purchase_date: DateTime<Utc>,
    pub original_purchase_date: Option<DateTime<Utc>>,
    /// Present only for auto-renewable subscriptions.
    pub expires_date: Option<DateTime<Utc>>,
    /// Set when Apple customer support refunded the transaction.
    pub cancellation_date: Option<DateTime<Utc>>,
    pub web_order_line_item_id: Option<i64>,
    pub is_trial_period: bool,
    pub is_in_intro_offer_period: bool,
}

impl PurchaseEntry {
    pub fn is_subscription(&self) -> bool {
        self.expires_date.is_some()
    }

    /// Whether the entry grants access at `now`: not cancelled and, for
    /// subscriptions, not yet expired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.cancellation_date.is_none() && self.expires_date.map_or(true, |d| d > now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenewalInfo {
    pub product_id: Option<String>,
    /// The product the subscription renews to at the next billing period.
    pub auto_renew_product_id: Option<String>,
    pub original_transaction_id: Option<String>,
    pub auto_renew_status: bool,
    pub expiration_intent: Option<ExpirationIntent>,
    pub is_in_billing_retry_period: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExpirationIntent {
    /// The customer voluntarily canceled their subscription.
    Cancelled,
    /// Billing error; for example, the customer's payment information was no
    /// longer valid.
    BillingError,
    /// The customer did not agree to a recent price increase.
    PriceIncreaseDeclined,
    /// The product was not available for purchase at the time of renewal.
    ProductUnavailable,
    /// Unknown error.
    Other,
}

impl ExpirationIntent {
    pub(crate) fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Cancelled,
            2 => Self::BillingError,
            3 => Self::PriceIncreaseDeclined,
            4 => Self::ProductUnavailable,
            _ => Self::Other,
        }
    }
}
