use std::time::Duration;

pub const PRODUCTION_VERIFY_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
pub const SANDBOX_VERIFY_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

/// Path the fault server answers on, matching Apple's endpoints.
pub const VERIFY_RECEIPT_PATH: &str = "/verifyReceipt";

pub const DEFAULT_CALLOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum request body the fault server reads: 10 MB.
pub const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

/// Maximum size of a request head the fault server reads.
pub const MAX_REQUEST_HEAD: usize = 64 * 1024;

/// Top-level receipt field ids.
///
/// https://developer.apple.com/library/archive/releasenotes/General/ValidateAppStoreReceipt/Chapters/ReceiptFields.html
pub mod receipt_field {
    pub const RECEIPT_TYPE: i64 = 0;
    pub const BUNDLE_ID: i64 = 2;
    pub const APPLICATION_VERSION: i64 = 3;
    pub const OPAQUE_VALUE: i64 = 4;
    pub const SHA1_HASH: i64 = 5;
    pub const CREATION_DATE: i64 = 12;
    pub const IN_APP: i64 = 17;
    pub const ORIGINAL_APPLICATION_VERSION: i64 = 19;
    pub const EXPIRATION_DATE: i64 = 21;
}

/// Field ids inside an in-app purchase container.
pub mod in_app_field {
    pub const QUANTITY: i64 = 1701;
    pub const PRODUCT_ID: i64 = 1702;
    pub const TRANSACTION_ID: i64 = 1703;
    pub const PURCHASE_DATE: i64 = 1704;
    pub const ORIGINAL_TRANSACTION_ID: i64 = 1705;
    pub const ORIGINAL_PURCHASE_DATE: i64 = 1706;
    pub const EXPIRES_DATE: i64 = 1708;
    pub const WEB_ORDER_LINE_ITEM_ID: i64 = 1711;
    pub const CANCELLATION_DATE: i64 = 1712;
    pub const IS_TRIAL_PERIOD: i64 = 1713;
    pub const IS_IN_INTRO_OFFER_PERIOD: i64 = 1719;
}
