use serde::{Deserialize, Serialize};

/// JSON body POSTed to verifyReceipt.
///
/// https://developer.apple.com/documentation/appstorereceipts/requestbody
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RequestBodyModel {
    /// The Base64-encoded receipt data.
    #[serde(rename = "receipt-data")]
    pub(crate) receipt_data: String,
    /// Your app's shared secret, which is a hexadecimal string. Only needed
    /// for auto-renewable subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) password: Option<String>,
    /// Set this value to true for the response to include only the latest
    /// renewal transaction for any subscriptions.
    #[serde(
        rename = "exclude-old-transactions",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub(crate) exclude_old_transactions: bool,
}
