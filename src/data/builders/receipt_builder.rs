//! Turns decoded field records into a [`Receipt`].
//!
//! Known top-level fields may appear at most once. Each in-app purchase
//! record (field 17) holds a self-contained nested container that is decoded
//! on its own and resolved into one [`PurchaseEntry`]. Unknown field ids are
//! skipped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::{
    constants::{in_app_field, receipt_field},
    data::codec::{
        der_reader::decode_integer,
        field_decoder::{decode, decode_base64, decode_payload},
    },
    domain::entities::{
        field_record::{FieldRecord, FieldType},
        receipt::{PurchaseEntry, Receipt},
    },
    errors::{ModelError, ReceiptError},
};

const KNOWN_RECEIPT_FIELDS: &[i64] = &[
    receipt_field::RECEIPT_TYPE,
    receipt_field::BUNDLE_ID,
    receipt_field::APPLICATION_VERSION,
    receipt_field::OPAQUE_VALUE,
    receipt_field::SHA1_HASH,
    receipt_field::CREATION_DATE,
    receipt_field::ORIGINAL_APPLICATION_VERSION,
    receipt_field::EXPIRATION_DATE,
];

const KNOWN_IN_APP_FIELDS: &[i64] = &[
    in_app_field::QUANTITY,
    in_app_field::PRODUCT_ID,
    in_app_field::TRANSACTION_ID,
    in_app_field::PURCHASE_DATE,
    in_app_field::ORIGINAL_TRANSACTION_ID,
    in_app_field::ORIGINAL_PURCHASE_DATE,
    in_app_field::EXPIRES_DATE,
    in_app_field::WEB_ORDER_LINE_ITEM_ID,
    in_app_field::CANCELLATION_DATE,
    in_app_field::IS_TRIAL_PERIOD,
    in_app_field::IS_IN_INTRO_OFFER_PERIOD,
];

/// Base64 text to [`Receipt`] in one step.
pub fn decode_receipt(input: &str) -> Result<Receipt, ReceiptError> {
    let raw = decode_base64(input)?;
    let records = decode(&raw)?;
    Ok(build(&records)?)
}

pub fn build(records: &[FieldRecord]) -> Result<Receipt, ModelError> {
    let fields = KnownFields::collect(records, KNOWN_RECEIPT_FIELDS)?;
    let in_app = records
        .iter()
        .filter(|r| r.field_id == receipt_field::IN_APP)
        .map(build_purchase)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Receipt {
        receipt_type: fields.string(receipt_field::RECEIPT_TYPE)?,
        bundle_id: fields.required_string(receipt_field::BUNDLE_ID, "bundle id")?,
        application_version: fields
            .required_string(receipt_field::APPLICATION_VERSION, "application version")?,
        original_application_version: fields
            .string(receipt_field::ORIGINAL_APPLICATION_VERSION)?,
        opaque_value: fields.bytes(receipt_field::OPAQUE_VALUE),
        sha1_hash: fields.bytes(receipt_field::SHA1_HASH),
        creation_date: fields.date(receipt_field::CREATION_DATE)?,
        expiration_date: fields.date(receipt_field::EXPIRATION_DATE)?,
        in_app,
        pending_renewal_info: Vec::new(),
    })
}

fn build_purchase(record: &FieldRecord) -> Result<PurchaseEntry, ModelError> {
    if record.field_type != FieldType::Set {
        return Err(ModelError::UnexpectedFieldType {
            field_id: record.field_id,
            expected: FieldType::Set,
            found: record.field_type,
        });
    }
    let records = decode_payload(&record.raw_value).map_err(|source| ModelError::NestedDecode {
        field_id: record.field_id,
        source,
    })?;
    if records.iter().any(|r| r.field_id == receipt_field::IN_APP) {
        return Err(ModelError::InconsistentPurchaseGrouping {
            field_id: record.field_id,
            reason: "purchase container nested inside a purchase container".to_string(),
        });
    }

    let fields = KnownFields::collect(&records, KNOWN_IN_APP_FIELDS)?;
    let quantity = match fields.integer(in_app_field::QUANTITY)? {
        Some(q) => u32::try_from(q).map_err(|_| ModelError::InvalidValue {
            field_id: in_app_field::QUANTITY,
            reason: format!("quantity {q} is out of range"),
        })?,
        None => 1,
    };

    Ok(PurchaseEntry {
        quantity,
        product_id: fields.required_string(in_app_field::PRODUCT_ID, "product id")?,
        transaction_id: fields.required_string(in_app_field::TRANSACTION_ID, "transaction id")?,
        original_transaction_id: fields.required_string(
            in_app_field::ORIGINAL_TRANSACTION_ID,
            "original transaction id",
        )?,
        purchase_date: fields
            .date(in_app_field::PURCHASE_DATE)?
            .ok_or(ModelError::MissingRequiredField {
                field_id: in_app_field::PURCHASE_DATE,
                name: "purchase date",
            })?,
        original_purchase_date: fields.date(in_app_field::ORIGINAL_PURCHASE_DATE)?,
        expires_date: fields.date(in_app_field::EXPIRES_DATE)?,
        cancellation_date: fields.date(in_app_field::CANCELLATION_DATE)?,
        web_order_line_item_id: fields.integer(in_app_field::WEB_ORDER_LINE_ITEM_ID)?,
        is_trial_period: fields.flag(in_app_field::IS_TRIAL_PERIOD)?,
        is_in_intro_offer_period: fields.flag(in_app_field::IS_IN_INTRO_OFFER_PERIOD)?,
    })
}

/// Known fields of one container, keyed by id. A second occurrence of a
/// known id is rejected instead of overwriting the first.
struct KnownFields<'a> {
    fields: HashMap<i64, &'a FieldRecord>,
}

impl<'a> KnownFields<'a> {
    fn collect(records: &'a [FieldRecord], known: &[i64]) -> Result<Self, ModelError> {
        let mut fields = HashMap::new();
        for record in records {
            if !known.contains(&record.field_id) {
                trace!(field_id = record.field_id, "skipping unrecognized field");
                continue;
            }
            if fields.insert(record.field_id, record).is_some() {
                return Err(ModelError::InconsistentPurchaseGrouping {
                    field_id: record.field_id,
                    reason: format!("field appears more than once (offset {})", record.offset),
                });
            }
        }
        Ok(Self { fields })
    }

    fn typed(&self, field_id: i64, expected: FieldType) -> Result<Option<&'a FieldRecord>, ModelError> {
        match self.fields.get(&field_id) {
            None => Ok(None),
            Some(record) if record.field_type == expected => Ok(Some(*record)),
            Some(record) => Err(ModelError::UnexpectedFieldType {
                field_id,
                expected,
                found: record.field_type,
            }),
        }
    }

    fn text(&self, field_id: i64, expected: FieldType) -> Result<Option<String>, ModelError> {
        self.typed(field_id, expected)?
            .map(|record| {
                String::from_utf8(record.content().to_vec()).map_err(|_| ModelError::InvalidValue {
                    field_id,
                    reason: "value is not valid UTF-8".to_string(),
                })
            })
            .transpose()
    }

    fn string(&self, field_id: i64) -> Result<Option<String>, ModelError> {
        self.text(field_id, FieldType::String)
    }

    fn required_string(&self, field_id: i64, name: &'static str) -> Result<String, ModelError> {
        self.string(field_id)?
            .filter(|s| !s.is_empty())
            .ok_or(ModelError::MissingRequiredField { field_id, name })
    }

    /// An empty date string means the date is absent.
    fn date(&self, field_id: i64) -> Result<Option<DateTime<Utc>>, ModelError> {
        let Some(value) = self.text(field_id, FieldType::Date)? else {
            return Ok(None);
        };
        if value.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&value)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| ModelError::InvalidDate { field_id, value })
    }

    fn integer(&self, field_id: i64) -> Result<Option<i64>, ModelError> {
        self.typed(field_id, FieldType::Integer)?
            .map(|record| {
                decode_integer(record.content()).ok_or_else(|| ModelError::InvalidValue {
                    field_id,
                    reason: format!("integer of {} bytes", record.content().len()),
                })
            })
            .transpose()
    }

    fn flag(&self, field_id: i64) -> Result<bool, ModelError> {
        Ok(self.integer(field_id)?.is_some_and(|v| v != 0))
    }

    /// Opaque bytes are taken as stored, whatever their apparent type.
    fn bytes(&self, field_id: i64) -> Option<Vec<u8>> {
        self.fields.get(&field_id).map(|r| r.raw_value.clone())
    }
}
