use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none, DisplayFromStr, PickFirst};

use super::common::Environment;

/// JSON body returned by verifyReceipt.
///
/// https://developer.apple.com/documentation/appstorereceipts/responsebody
///
/// Apple sends most numbers, booleans and millisecond timestamps as strings.
/// Both string and native JSON forms are accepted; strings are written.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct ResponseBodyModel {
    /// Either 0 if the receipt is valid, or a status code if there is an
    /// error.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub(crate) status: i64,
    /// The environment for which the receipt was generated.
    pub(crate) environment: Option<Environment>,
    /// A JSON representation of the receipt that was sent for verification.
    pub(crate) receipt: Option<ReceiptModel>,
    /// An array that contains all in-app purchase transactions. Only returned
    /// for receipts that contain auto-renewable subscriptions.
    #[serde(default)]
    pub(crate) latest_receipt_info: Vec<InAppModel>,
    /// In the JSON file, an array where each element contains the pending
    /// renewal information for each auto-renewable subscription identified by
    /// the product_id.
    #[serde(default)]
    pub(crate) pending_renewal_info: Vec<PendingRenewalInfoModel>,
    /// The latest Base64 encoded app receipt. Only returned for receipts that
    /// contain auto-renewable subscriptions.
    pub(crate) latest_receipt: Option<String>,
}

/// https://developer.apple.com/documentation/appstorereceipts/responsebody/receipt
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct ReceiptModel {
    /// The type of receipt generated, e.g. "Production" or
    /// "ProductionSandbox".
    pub(crate) receipt_type: Option<String>,
    /// The bundle identifier for the app to which the receipt belongs.
    pub(crate) bundle_id: Option<String>,
    /// The app's version number.
    pub(crate) application_version: Option<String>,
    /// The version of the app that the user originally purchased.
    pub(crate) original_application_version: Option<String>,
    /// The time the App Store generated the receipt, in UNIX epoch time
    /// format, in milliseconds.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) receipt_creation_date_ms: Option<i64>,
    /// The time the receipt expires for apps purchased through the Volume
    /// Purchase Program, in milliseconds.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) expiration_date_ms: Option<i64>,
    /// An array that contains the in-app purchase receipt fields for all
    /// in-app purchase transactions.
    #[serde(default)]
    pub(crate) in_app: Vec<InAppModel>,
}

/// https://developer.apple.com/documentation/appstorereceipts/responsebody/receipt/in_app
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct InAppModel {
    /// The number of consumable products purchased.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) quantity: Option<u32>,
    /// The unique identifier of the product purchased.
    pub(crate) product_id: Option<String>,
    /// A unique identifier for a transaction such as a purchase, restore, or
    /// renewal.
    pub(crate) transaction_id: Option<String>,
    /// The transaction identifier of the original purchase.
    pub(crate) original_transaction_id: Option<String>,
    /// The time the App Store charged the user's account for a purchased or
    /// restored product, in milliseconds.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) purchase_date_ms: Option<i64>,
    /// The time of the original in-app purchase, in milliseconds.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) original_purchase_date_ms: Option<i64>,
    /// The time a subscription expires or when it will renew, in
    /// milliseconds.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) expires_date_ms: Option<i64>,
    /// The time Apple customer support canceled a transaction, in
    /// milliseconds.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) cancellation_date_ms: Option<i64>,
    /// A unique identifier for purchase events across devices, including
    /// subscription-renewal events.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) web_order_line_item_id: Option<i64>,
    /// An indicator of whether a subscription is in the free trial period.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) is_trial_period: Option<bool>,
    /// An indicator of whether an auto-renewable subscription is in the
    /// introductory price period.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) is_in_intro_offer_period: Option<bool>,
}

/// https://developer.apple.com/documentation/appstorereceipts/responsebody/pending_renewal_info
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct PendingRenewalInfoModel {
    /// The current renewal preference for the auto-renewable subscription.
    pub(crate) auto_renew_product_id: Option<String>,
    /// The current renewal status: "1" renews at the end of the current
    /// period, "0" the customer has turned off automatic renewal.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) auto_renew_status: Option<i64>,
    /// The reason a subscription expired.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) expiration_intent: Option<i64>,
    /// A flag that indicates Apple is attempting to renew an expired
    /// subscription automatically.
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub(crate) is_in_billing_retry_period: Option<i64>,
    /// The transaction identifier of the original purchase.
    pub(crate) original_transaction_id: Option<String>,
    /// The unique identifier of the product purchased.
    pub(crate) product_id: Option<String>,
}
