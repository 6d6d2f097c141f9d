//! Builds receipt containers in the format [`decode`] reads.
//!
//! Used to produce the fault server's example receipt and to construct
//! fixtures. The PKCS#7 envelope it writes has no certificates and no signer
//! infos, so Apple would reject it, but it is structurally identical to a
//! real one.
//!
//! [`decode`]: crate::data::codec::field_decoder::decode

use base64::{prelude::BASE64_STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    constants::{in_app_field, receipt_field},
    data::codec::{
        der_reader::{
            TAG_CONTEXT_0, TAG_IA5_STRING, TAG_INTEGER, TAG_OCTET_STRING,
            TAG_OCTET_STRING_CONSTRUCTED, TAG_OID, TAG_SEQUENCE, TAG_SET, TAG_UTF8_STRING,
        },
        field_decoder::{OID_DATA, OID_SIGNED_DATA},
    },
    domain::entities::receipt::{PurchaseEntry, Receipt},
};

const RECORD_VERSION: i64 = 1;

#[derive(Debug, Clone, Default)]
pub struct FieldEncoder {
    records: Vec<u8>,
}

impl FieldEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record whose value octets are written verbatim.
    pub fn raw_value(mut self, field_id: i64, version: i64, value: &[u8]) -> Self {
        let mut record = Vec::new();
        write_tlv(&mut record, TAG_INTEGER, &integer_content(field_id));
        write_tlv(&mut record, TAG_INTEGER, &integer_content(version));
        write_tlv(&mut record, TAG_OCTET_STRING, value);
        write_tlv(&mut self.records, TAG_SEQUENCE, &record);
        self
    }

    /// Appends a record whose value is a single element with `tag`.
    pub fn tagged(self, field_id: i64, tag: u8, content: &[u8]) -> Self {
        let mut value = Vec::new();
        write_tlv(&mut value, tag, content);
        self.raw_value(field_id, RECORD_VERSION, &value)
    }

    pub fn integer(self, field_id: i64, value: i64) -> Self {
        self.tagged(field_id, TAG_INTEGER, &integer_content(value))
    }

    pub fn string(self, field_id: i64, value: &str) -> Self {
        self.tagged(field_id, TAG_UTF8_STRING, value.as_bytes())
    }

    pub fn date(self, field_id: i64, value: DateTime<Utc>) -> Self {
        self.date_str(
            field_id,
            &value.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }

    /// Date field with arbitrary text, including text that is not a date.
    pub fn date_str(self, field_id: i64, value: &str) -> Self {
        self.tagged(field_id, TAG_IA5_STRING, value.as_bytes())
    }

    /// Opaque bytes stored directly in the value octets, the way Apple
    /// stores the opaque value and SHA-1 hash.
    pub fn bytes(self, field_id: i64, value: &[u8]) -> Self {
        self.raw_value(field_id, RECORD_VERSION, value)
    }

    pub fn nested(self, field_id: i64, inner: FieldEncoder) -> Self {
        let inner = inner.finish();
        self.raw_value(field_id, RECORD_VERSION, &inner)
    }

    /// The bare payload SET.
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_tlv(&mut out, TAG_SET, &self.records);
        out
    }

    /// The payload wrapped in an unsigned PKCS#7 signedData envelope.
    pub fn finish_signed(&self) -> Vec<u8> {
        let mut octets = Vec::new();
        write_tlv(&mut octets, TAG_OCTET_STRING, &self.finish());
        envelope(&octets, write_tlv)
    }

    /// The payload in the BER envelope the App Store issues: indefinite
    /// lengths on every envelope layer, and the payload split into
    /// `chunk_len`-byte pieces of a constructed OCTET STRING.
    pub fn finish_signed_ber(&self, chunk_len: usize) -> Vec<u8> {
        let mut chunks = Vec::new();
        for chunk in self.finish().chunks(chunk_len.max(1)) {
            write_tlv(&mut chunks, TAG_OCTET_STRING, chunk);
        }
        let mut octets = Vec::new();
        write_indefinite(&mut octets, TAG_OCTET_STRING_CONSTRUCTED, &chunks);
        envelope(&octets, write_indefinite)
    }

    pub fn finish_base64(&self) -> String {
        BASE64_STANDARD.encode(self.finish_signed())
    }
}

/// Encodes `receipt` as an enveloped container. Renewal info has no binary
/// representation and is not written.
pub fn encode_receipt(receipt: &Receipt) -> Vec<u8> {
    let mut encoder = FieldEncoder::new();
    if let Some(receipt_type) = &receipt.receipt_type {
        encoder = encoder.string(receipt_field::RECEIPT_TYPE, receipt_type);
    }
    encoder = encoder
        .string(receipt_field::BUNDLE_ID, &receipt.bundle_id)
        .string(receipt_field::APPLICATION_VERSION, &receipt.application_version);
    if let Some(opaque_value) = &receipt.opaque_value {
        encoder = encoder.bytes(receipt_field::OPAQUE_VALUE, opaque_value);
    }
    if let Some(sha1_hash) = &receipt.sha1_hash {
        encoder = encoder.bytes(receipt_field::SHA1_HASH, sha1_hash);
    }
    if let Some(creation_date) = receipt.creation_date {
        encoder = encoder.date(receipt_field::CREATION_DATE, creation_date);
    }
    for entry in &receipt.in_app {
        encoder = encoder.nested(receipt_field::IN_APP, encode_purchase(entry));
    }
    if let Some(version) = &receipt.original_application_version {
        encoder = encoder.string(receipt_field::ORIGINAL_APPLICATION_VERSION, version);
    }
    if let Some(expiration_date) = receipt.expiration_date {
        encoder = encoder.date(receipt_field::EXPIRATION_DATE, expiration_date);
    }
    encoder.finish_signed()
}

fn encode_purchase(entry: &PurchaseEntry) -> FieldEncoder {
    let mut encoder = FieldEncoder::new()
        .integer(in_app_field::QUANTITY, i64::from(entry.quantity))
        .string(in_app_field::PRODUCT_ID, &entry.product_id)
        .string(in_app_field::TRANSACTION_ID, &entry.transaction_id)
        .date(in_app_field::PURCHASE_DATE, entry.purchase_date)
        .string(
            in_app_field::ORIGINAL_TRANSACTION_ID,
            &entry.original_transaction_id,
        );
    if let Some(date) = entry.original_purchase_date {
        encoder = encoder.date(in_app_field::ORIGINAL_PURCHASE_DATE, date);
    }
    if let Some(date) = entry.expires_date {
        encoder = encoder.date(in_app_field::EXPIRES_DATE, date);
    }
    if let Some(id) = entry.web_order_line_item_id {
        encoder = encoder.integer(in_app_field::WEB_ORDER_LINE_ITEM_ID, id);
    }
    if let Some(date) = entry.cancellation_date {
        encoder = encoder.date(in_app_field::CANCELLATION_DATE, date);
    }
    encoder
        .integer(in_app_field::IS_TRIAL_PERIOD, i64::from(entry.is_trial_period))
        .integer(
            in_app_field::IS_IN_INTRO_OFFER_PERIOD,
            i64::from(entry.is_in_intro_offer_period),
        )
}

/// `ContentInfo { signedData { version 1, {}, { data, [0] octets }, {} } }`,
/// with every constructed layer written by `wrap`.
fn envelope(octets: &[u8], wrap: fn(&mut Vec<u8>, u8, &[u8])) -> Vec<u8> {
    let mut encapsulated = Vec::new();
    write_tlv(&mut encapsulated, TAG_OID, OID_DATA);
    wrap(&mut encapsulated, TAG_CONTEXT_0, octets);

    let mut signed_data = Vec::new();
    write_tlv(&mut signed_data, TAG_INTEGER, &integer_content(1));
    write_tlv(&mut signed_data, TAG_SET, &[]);
    wrap(&mut signed_data, TAG_SEQUENCE, &encapsulated);
    write_tlv(&mut signed_data, TAG_SET, &[]);
    let mut explicit = Vec::new();
    wrap(&mut explicit, TAG_SEQUENCE, &signed_data);

    let mut content_info = Vec::new();
    write_tlv(&mut content_info, TAG_OID, OID_SIGNED_DATA);
    wrap(&mut content_info, TAG_CONTEXT_0, &explicit);
    let mut out = Vec::new();
    wrap(&mut out, TAG_SEQUENCE, &content_info);
    out
}

fn write_indefinite(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.extend_from_slice(&[tag, 0x80]);
    out.extend_from_slice(content);
    out.extend_from_slice(&[0x00, 0x00]);
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u64).to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
}

/// Minimal two's-complement encoding.
fn integer_content(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::codec::der_reader::decode_integer;

    #[test]
    fn integers_use_minimal_encoding() {
        assert_eq!(integer_content(0), vec![0x00]);
        assert_eq!(integer_content(127), vec![0x7f]);
        assert_eq!(integer_content(128), vec![0x00, 0x80]);
        assert_eq!(integer_content(-1), vec![0xff]);
        assert_eq!(integer_content(1701), vec![0x06, 0xa5]);
        for value in [0, 1, -1, 255, -129, 1713, i64::MAX, i64::MIN] {
            assert_eq!(decode_integer(&integer_content(value)), Some(value));
        }
    }

    #[test]
    fn ber_envelope_matches_app_store_layout() {
        let out = FieldEncoder::new().string(2, "a").finish_signed_ber(4);
        let mut prefix = vec![0x30, 0x80, TAG_OID, 0x09];
        prefix.extend_from_slice(OID_SIGNED_DATA);
        prefix.extend_from_slice(&[0xa0, 0x80, 0x30, 0x80, 0x02, 0x01, 0x01, 0x31, 0x00]);
        prefix.extend_from_slice(&[0x30, 0x80, TAG_OID, 0x09]);
        prefix.extend_from_slice(OID_DATA);
        prefix.extend_from_slice(&[0xa0, 0x80, 0x24, 0x80, 0x04, 0x04]);
        assert_eq!(&out[..prefix.len()], &prefix[..]);
        // Three end-of-contents, the empty signer infos SET, three more.
        assert!(out.ends_with(&[0, 0, 0, 0, 0, 0, 0x31, 0, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn long_lengths_use_long_form() {
        let mut out = Vec::new();
        write_tlv(&mut out, TAG_OCTET_STRING, &[0u8; 300]);
        assert_eq!(&out[..4], &[TAG_OCTET_STRING, 0x82, 0x01, 0x2c]);
        assert_eq!(out.len(), 304);
    }
}
