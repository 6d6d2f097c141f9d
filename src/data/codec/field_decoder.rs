//! Binary field decoder for App Store receipt containers.
//!
//! A receipt is a DER structure. The outer envelope is either a PKCS#7
//! `ContentInfo` carrying signedData, whose encapsulated content is the
//! payload, or the bare payload itself:
//!
//! ```text
//! Payload ::= SET OF SEQUENCE {
//!     field-id  INTEGER,
//!     version   INTEGER,
//!     value     OCTET STRING
//! }
//! ```
//!
//! The value octets usually hold one more DER element whose tag gives the
//! field's type. Dates stay as strings here; the receipt builder parses them.
//!
//! Receipts issued by the App Store encode the envelope in BER: every layer
//! uses an indefinite length and the encapsulated content is a constructed
//! OCTET STRING split into chunks. The envelope is read leniently to accept
//! that. The payload itself must be strict DER.

use std::borrow::Cow;

use base64::{prelude::BASE64_STANDARD, Engine as _};
use tracing::debug;

use crate::{
    data::codec::der_reader::{
        read_integer, single_tlv, DerReader, Tlv, TAG_CONTEXT_0, TAG_IA5_STRING, TAG_INTEGER,
        TAG_OCTET_STRING, TAG_OCTET_STRING_CONSTRUCTED, TAG_OID, TAG_SEQUENCE, TAG_SET,
        TAG_UTF8_STRING,
    },
    domain::entities::field_record::{FieldRecord, FieldType},
    errors::DecodeError,
};

/// 1.2.840.113549.1.7.2 (PKCS#7 signedData).
pub(crate) const OID_SIGNED_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
/// 1.2.840.113549.1.7.1 (PKCS#7 data).
pub(crate) const OID_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];

/// Deepest nesting of constructed OCTET STRINGs accepted in the eContent.
const MAX_CHUNK_DEPTH: usize = 4;

/// Decodes the base64 text a receipt is transported as. Whitespace, such as
/// the line breaks some tools insert, is ignored.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(raw)
}

/// Decodes a complete receipt, enveloped or bare, into its records in input
/// order.
pub fn decode(raw: &[u8]) -> Result<Vec<FieldRecord>, DecodeError> {
    let outer = read_outer(raw, true)?;
    match outer.tag {
        TAG_SET if outer.indefinite => Err(DecodeError::BadLength {
            offset: outer.offset,
            reason: "payload SET must have a definite length".to_string(),
        }),
        TAG_SET => decode_records(&outer),
        TAG_SEQUENCE => {
            let (octets, base) = unwrap_signed_data(&outer)?;
            let mut payload_reader = DerReader::nested(&octets, base);
            let payload = payload_reader.read_tlv()?;
            payload_reader.finish()?;
            if payload.tag != TAG_SET {
                return Err(DecodeError::EnvelopeMismatch(format!(
                    "signed content is not a payload SET (tag {:#04x})",
                    payload.tag
                )));
            }
            decode_records(&payload)
        }
        other => Err(DecodeError::EnvelopeMismatch(format!(
            "expected a PKCS#7 ContentInfo or a payload SET, found tag {other:#04x}"
        ))),
    }
}

/// Decodes a bare payload SET. Nested in-app purchase containers are decoded
/// with this.
pub fn decode_payload(raw: &[u8]) -> Result<Vec<FieldRecord>, DecodeError> {
    let outer = read_outer(raw, false)?;
    if outer.tag != TAG_SET {
        return Err(DecodeError::EnvelopeMismatch(format!(
            "expected a payload SET, found tag {:#04x}",
            outer.tag
        )));
    }
    decode_records(&outer)
}

fn read_outer(raw: &[u8], ber: bool) -> Result<Tlv<'_>, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut reader = DerReader::new(raw);
    let outer = if ber {
        reader.read_ber_tlv()?
    } else {
        reader.read_tlv()?
    };
    reader.finish()?;
    Ok(outer)
}

/// Walks `ContentInfo -> SignedData -> EncapsulatedContentInfo` down to the
/// payload octets and the input offset they start at. Certificates and
/// signer infos are not inspected.
///
/// A chunked eContent is reassembled; offsets inside it then count through
/// the joined octets from the start of the constructed string's content.
fn unwrap_signed_data<'a>(
    content_info: &Tlv<'a>,
) -> Result<(Cow<'a, [u8]>, usize), DecodeError> {
    let mut reader = content_info.reader();
    expect_oid(&mut reader, OID_SIGNED_DATA, "ContentInfo is not PKCS#7 signedData")?;
    let explicit = envelope_element(&mut reader, TAG_CONTEXT_0, "signedData content")?;

    let signed_data = envelope_element(&mut explicit.reader(), TAG_SEQUENCE, "SignedData")?;
    let mut signed_data = signed_data.reader();
    envelope_element(&mut signed_data, TAG_INTEGER, "SignedData version")?;
    envelope_element(&mut signed_data, TAG_SET, "SignedData digestAlgorithms")?;
    let encapsulated = envelope_element(&mut signed_data, TAG_SEQUENCE, "encapContentInfo")?;

    let mut encapsulated = encapsulated.reader();
    expect_oid(
        &mut encapsulated,
        OID_DATA,
        "encapsulated content is not PKCS#7 data",
    )?;
    let explicit = envelope_element(&mut encapsulated, TAG_CONTEXT_0, "eContent")?;
    let octets = explicit.reader().read_ber_tlv()?;
    match octets.tag {
        TAG_OCTET_STRING => Ok((Cow::Borrowed(octets.content), octets.content_offset())),
        TAG_OCTET_STRING_CONSTRUCTED => {
            let mut joined = Vec::new();
            join_chunks(&octets, &mut joined, 0)?;
            debug!(len = joined.len(), "reassembled chunked eContent");
            Ok((Cow::Owned(joined), octets.content_offset()))
        }
        found => Err(DecodeError::EnvelopeMismatch(format!(
            "eContent octets: expected tag {TAG_OCTET_STRING:#04x} or \
             {TAG_OCTET_STRING_CONSTRUCTED:#04x}, found {found:#04x}"
        ))),
    }
}

/// Appends the primitive chunks of a constructed OCTET STRING to `out`.
fn join_chunks(octets: &Tlv<'_>, out: &mut Vec<u8>, depth: usize) -> Result<(), DecodeError> {
    if depth >= MAX_CHUNK_DEPTH {
        return Err(DecodeError::BadLength {
            offset: octets.offset,
            reason: "constructed OCTET STRING is nested too deeply".to_string(),
        });
    }
    let mut chunks = octets.reader();
    while !chunks.is_empty() {
        let chunk = chunks.read_ber_tlv()?;
        match chunk.tag {
            TAG_OCTET_STRING => out.extend_from_slice(chunk.content),
            TAG_OCTET_STRING_CONSTRUCTED => join_chunks(&chunk, out, depth + 1)?,
            found => {
                return Err(DecodeError::UnsupportedType {
                    offset: chunk.offset,
                    expected: TAG_OCTET_STRING,
                    found,
                })
            }
        }
    }
    Ok(())
}

/// Reads the next envelope element, BER lengths allowed, and requires `tag`.
fn envelope_element<'a>(
    reader: &mut DerReader<'a>,
    tag: u8,
    what: &str,
) -> Result<Tlv<'a>, DecodeError> {
    let tlv = reader.read_ber_tlv()?;
    if tlv.tag != tag {
        return Err(DecodeError::EnvelopeMismatch(format!(
            "{what}: expected tag {tag:#04x}, found {:#04x}",
            tlv.tag
        )));
    }
    Ok(tlv)
}

fn expect_oid(reader: &mut DerReader<'_>, oid: &[u8], message: &str) -> Result<(), DecodeError> {
    let tlv = envelope_element(reader, TAG_OID, "content type")?;
    if tlv.content != oid {
        return Err(DecodeError::EnvelopeMismatch(message.to_string()));
    }
    Ok(())
}

fn decode_records(payload: &Tlv<'_>) -> Result<Vec<FieldRecord>, DecodeError> {
    let mut reader = payload.reader();
    let mut records = Vec::new();
    while !reader.is_empty() {
        let record = reader.expect(TAG_SEQUENCE)?;
        records.push(decode_record(&record)?);
    }
    debug!(
        offset = payload.offset,
        records = records.len(),
        "decoded receipt payload"
    );
    Ok(records)
}

fn decode_record(record: &Tlv<'_>) -> Result<FieldRecord, DecodeError> {
    let mut fields = record.reader();
    let field_id = read_integer(&fields.expect(TAG_INTEGER)?)?;
    let version = read_integer(&fields.expect(TAG_INTEGER)?)?;
    let value = fields.expect(TAG_OCTET_STRING)?;
    fields.finish()?;

    let (field_type, content_start) = classify(value.content);
    if let FieldType::Unknown(tag) = field_type {
        debug!(field_id, tag, "keeping field with unrecognized value tag");
    }
    Ok(FieldRecord::new(
        field_id,
        version,
        field_type,
        value.content.to_vec(),
        record.offset,
        content_start,
    ))
}

fn classify(octets: &[u8]) -> (FieldType, usize) {
    let Some(inner) = single_tlv(octets) else {
        return (FieldType::Bytes, 0);
    };
    let field_type = match inner.tag {
        TAG_INTEGER => FieldType::Integer,
        TAG_UTF8_STRING => FieldType::String,
        TAG_IA5_STRING => FieldType::Date,
        TAG_OCTET_STRING => FieldType::Bytes,
        TAG_SET => FieldType::Set,
        other => FieldType::Unknown(other),
    };
    (field_type, inner.header_len)
}
