use chrono::{DateTime, Utc};

use crate::domain::entities::{
    receipt::{PurchaseEntry, Receipt},
    verification_result::VerificationResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub name: &'static str,
    pub value: String,
}

/// Key facts of a receipt as ordered name/value lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub lines: Vec<SummaryLine>,
}

impl ReceiptSummary {
    /// Summary of a verification result. `None` unless Apple accepted the
    /// receipt and returned it.
    pub fn from_result(
        result: &VerificationResult,
        technical: bool,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if !result.is_valid() {
            return None;
        }
        let receipt = result.receipt.as_ref()?;
        Some(Self::from_receipt(
            receipt,
            &result.latest_receipt_info,
            technical,
            now,
        ))
    }

    /// `latest_receipt_info` may be empty, e.g. for a receipt decoded
    /// locally; the receipt's own purchases are used instead.
    pub fn from_receipt(
        receipt: &Receipt,
        latest_receipt_info: &[PurchaseEntry],
        technical: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let mut summary = Self { lines: Vec::new() };

        let (original, several_originals) = original_purchase(&receipt.in_app);
        if several_originals {
            summary.push(
                "Warning",
                "Multiple in-app receipts found with the original transaction id",
            );
        }
        let latest = latest_purchase(latest_receipt_info)
            .or_else(|| latest_purchase(&receipt.in_app));

        let (Some(original), Some(latest)) = (original, latest) else {
            summary.push("Bundle ID", &receipt.bundle_id);
            summary.push("Application version", &receipt.application_version);
            summary.push("In-app purchases", "none");
            return summary;
        };

        if technical {
            summary.push("Bundle ID", &receipt.bundle_id);
            summary.push("Original transaction ID", &original.transaction_id);
            summary.push("Original product ID", &original.product_id);
            summary.push("Original purchase date (UTC)", apple_date(original.purchase_date));
            summary.push(
                "Original purchase date (Unix)",
                original.purchase_date.timestamp().to_string(),
            );
            summary.push("Latest transaction ID", &latest.transaction_id);
            summary.push("Latest product ID", &latest.product_id);
            summary.push("Latest purchase date (UTC)", apple_date(latest.purchase_date));
            summary.push(
                "Latest purchase date (Unix)",
                latest.purchase_date.timestamp().to_string(),
            );
            if let Some(expires) = latest.expires_date {
                summary.push("Expiration (UTC)", apple_date(expires));
                summary.push("Expiration (Unix)", expires.timestamp().to_string());
            }
        } else if original.product_id != latest.product_id {
            summary.push("Original product ID", &original.product_id);
            summary.push("Latest product ID", &latest.product_id);
        } else {
            summary.push("Product ID", &latest.product_id);
        }
        if let Some(expires) = latest.expires_date {
            summary.push("Subscription expires", friendly_relative(expires, now));
        }
        summary
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|line| line.name == name)
            .map(|line| line.value.as_str())
    }

    fn push(&mut self, name: &'static str, value: impl Into<String>) {
        self.lines.push(SummaryLine {
            name,
            value: value.into(),
        });
    }
}

/// The first purchase whose transaction is its own original, or the first
/// purchase when none is. The flag is set when several qualify.
fn original_purchase(in_app: &[PurchaseEntry]) -> (Option<&PurchaseEntry>, bool) {
    let mut originals = in_app
        .iter()
        .filter(|entry| entry.transaction_id == entry.original_transaction_id);
    match originals.next() {
        Some(first) => (Some(first), originals.next().is_some()),
        None => (in_app.first(), false),
    }
}

/// The purchase that expires last, or the last one purchased when none
/// expires.
fn latest_purchase(entries: &[PurchaseEntry]) -> Option<&PurchaseEntry> {
    entries
        .iter()
        .filter(|entry| entry.expires_date.is_some())
        .max_by_key(|entry| entry.expires_date)
        .or_else(|| entries.iter().max_by_key(|entry| entry.purchase_date))
}

/// Formats a date the way Apple's JSON does, e.g.
/// `2030-01-01 00:00:00 Etc/GMT`.
pub fn apple_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S Etc/GMT").to_string()
}

/// "in 3 days", "2 hours ago", ...
pub fn friendly_relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = then - now;
    let future = delta.num_seconds() >= 0;
    let delta = delta.abs();
    let (amount, unit) = if delta.num_days() >= 1 {
        (delta.num_days(), "day")
    } else if delta.num_hours() >= 1 {
        (delta.num_hours(), "hour")
    } else if delta.num_minutes() >= 1 {
        (delta.num_minutes(), "minute")
    } else {
        (delta.num_seconds(), "second")
    };
    let plural = if amount == 1 { "" } else { "s" };
    if future {
        format!("in {amount} {unit}{plural}")
    } else {
        format!("{amount} {unit}{plural} ago")
    }
}
