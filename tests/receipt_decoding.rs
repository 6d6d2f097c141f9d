//! End-to-end decoding of encoder-built receipts.

use base64::{prelude::BASE64_STANDARD, Engine as _};
use chrono::{TimeZone, Utc};
use iap_tool::{
    data::{
        builders::receipt_builder::decode_receipt,
        codec::{
            field_decoder::{decode, decode_base64},
            field_encoder::FieldEncoder,
        },
        interpreters::verification_interpreter::interpret,
    },
    domain::entities::{field_record::FieldType, verification_result::OutcomeKind},
    errors::{DecodeError, ModelError, ReceiptError},
};

fn subscription(product_id: &str, transaction_id: &str) -> FieldEncoder {
    FieldEncoder::new()
        .integer(1701, 1)
        .string(1702, product_id)
        .string(1703, transaction_id)
        .string(1705, transaction_id)
        .date(1704, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .date(1708, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        .integer(1713, 0)
}

#[test]
fn example_receipt_decodes_and_verifies() {
    let receipt_data = FieldEncoder::new()
        .string(2, "com.example.app")
        .string(3, "3")
        .nested(17, subscription("com.example.sub", "1000000001"))
        .finish_base64();

    let receipt = decode_receipt(&receipt_data).unwrap();
    assert_eq!(receipt.bundle_id, "com.example.app");
    assert_eq!(receipt.application_version, "3");
    assert_eq!(receipt.in_app.len(), 1);
    assert_eq!(
        receipt.in_app[0].expires_date,
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
    );

    let response = format!(
        r#"{{"status": 0, "receipt": {{"bundle_id": "com.example.app", "application_version": "3",
            "in_app": [{{"product_id": "com.example.sub", "transaction_id": "1000000001",
            "original_transaction_id": "1000000001", "purchase_date_ms": "1704067200000",
            "expires_date_ms": "1893456000000"}}]}}, "latest_receipt": "{receipt_data}"}}"#
    );
    let result = interpret(200, response.as_bytes());
    assert_eq!(result.kind, OutcomeKind::Valid);
    let verified = result.receipt.unwrap();
    assert_eq!(verified.in_app.len(), 1);
    assert_eq!(verified.in_app[0].expires_date, receipt.in_app[0].expires_date);
}

#[test]
fn app_store_ber_envelope_decodes() {
    let encoder = FieldEncoder::new()
        .string(2, "com.example.app")
        .string(3, "3")
        .nested(17, subscription("com.example.sub", "1000000001"))
        .nested(17, subscription("com.example.sub", "1000000002"));
    let receipt_data = BASE64_STANDARD.encode(encoder.finish_signed_ber(32));
    assert!(receipt_data.starts_with("MIAGCSqGSIb3DQEHAqCAMIACAQEx"));

    let receipt = decode_receipt(&receipt_data).unwrap();

    assert_eq!(receipt, decode_receipt(&encoder.finish_base64()).unwrap());
    assert_eq!(receipt.bundle_id, "com.example.app");
    assert_eq!(receipt.in_app.len(), 2);
    assert_eq!(receipt.in_app[1].transaction_id, "1000000002");
}

#[test]
fn unknown_types_survive_decoding() {
    let raw = FieldEncoder::new()
        .string(2, "com.example.app")
        .tagged(9000, 0x13, b"printable")
        .bytes(4, &[0xde, 0xad, 0xbe, 0xef])
        .finish_signed();

    let records = decode(&raw).unwrap();

    let types: Vec<_> = records.iter().map(|r| (r.field_id, r.field_type)).collect();
    assert_eq!(
        types,
        vec![
            (2, FieldType::String),
            (9000, FieldType::Unknown(0x13)),
            (4, FieldType::Bytes),
        ]
    );
    assert_eq!(records[1].content(), b"printable");
    assert_eq!(records[2].content(), &[0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn every_cut_of_a_receipt_is_truncated() {
    let raw = FieldEncoder::new()
        .string(2, "com.example.app")
        .string(3, "3")
        .nested(17, subscription("com.example.sub", "1"))
        .finish_signed();

    for len in 1..raw.len() {
        match decode(&raw[..len]) {
            Err(DecodeError::Truncated { .. }) => {}
            other => panic!("cut at {len}: expected Truncated, got {other:?}"),
        }
    }
}

#[test]
fn garbage_input_is_rejected_before_field_parsing() {
    assert!(matches!(
        decode_base64("not base64!"),
        Err(DecodeError::InvalidBase64(_))
    ));
    assert_eq!(decode_base64(" \n "), Err(DecodeError::Empty));
    assert!(matches!(
        decode(&[0x04, 0x01, 0x00]),
        Err(DecodeError::EnvelopeMismatch(_))
    ));
}

#[test]
fn receipt_without_bundle_id_is_rejected() {
    let receipt_data = FieldEncoder::new().string(3, "3").finish_base64();
    assert!(matches!(
        decode_receipt(&receipt_data),
        Err(ReceiptError::Model(ModelError::MissingRequiredField {
            field_id: 2,
            ..
        }))
    ));
}

#[test]
fn concurrent_decodes_do_not_interfere() {
    let inputs: Vec<(String, String)> = (0..100)
        .map(|i| {
            let bundle_id = format!("com.example.app{i}");
            let data = FieldEncoder::new()
                .string(2, &bundle_id)
                .string(3, &i.to_string())
                .nested(17, subscription(&format!("com.example.sub{i}"), &i.to_string()))
                .finish_base64();
            (bundle_id, data)
        })
        .collect();

    std::thread::scope(|scope| {
        for (i, (bundle_id, data)) in inputs.iter().enumerate() {
            scope.spawn(move || {
                let receipt = decode_receipt(data).unwrap();
                assert_eq!(&receipt.bundle_id, bundle_id);
                assert_eq!(receipt.application_version, i.to_string());
                assert_eq!(receipt.in_app[0].product_id, format!("com.example.sub{i}"));
            });
        }
    });
}
