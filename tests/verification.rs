//! The verification client against a local fault server.

use iap_tool::{
    domain::entities::{
        verification_request::{Environment, VerificationRequest},
        verification_result::OutcomeKind,
    },
    fault_server::{FaultAction, FaultPolicy, FaultRule, FaultServer, Trigger, EXAMPLE_RECEIPT},
    secrets::SharedSecret,
    util::AppleReceiptUtil,
};
use tokio::sync::oneshot;

/// A client whose production and sandbox endpoints are both a fault server
/// running `rules`. The server stops when the sender is dropped.
async fn client_for(rules: Vec<FaultRule>) -> (AppleReceiptUtil, oneshot::Sender<()>) {
    let server = FaultServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        FaultPolicy::new(rules).unwrap(),
    )
    .await
    .unwrap();
    let url = format!("http://{}/verifyReceipt", server.local_addr().unwrap());
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(server.serve(async {
        let _ = stopped.await;
    }));
    (AppleReceiptUtil::with_endpoints(&url, &url).unwrap(), stop)
}

fn respond(status: u16, body: &str) -> FaultAction {
    FaultAction::Respond {
        status,
        body: body.to_string(),
        content_type: Some("application/json".to_string()),
    }
}

fn request() -> VerificationRequest {
    VerificationRequest::new("MIIT", Some(SharedSecret::new("0123456789abcdef")), false)
}

#[tokio::test]
async fn echo_is_valid() {
    let (util, _stop) = client_for(Vec::new()).await;

    let result = util.verify_receipt(&request()).await;

    assert_eq!(result.kind, OutcomeKind::Valid);
    assert_eq!(result.http_status, Some(200));
    assert_eq!(result.environment, Some(Environment::Sandbox));
    assert_eq!(result.latest_receipt.as_deref(), Some("MIIT"));
    let receipt = result.receipt.unwrap();
    assert_eq!(receipt.bundle_id, "com.example.app");
    assert_eq!(receipt.in_app, EXAMPLE_RECEIPT.in_app);
}

#[tokio::test]
async fn faults_map_to_outcomes() {
    let (util, _stop) = client_for(vec![
        FaultRule {
            trigger: Trigger::Nth { n: 1 },
            action: respond(200, r#"{"status": 21007}"#),
        },
        FaultRule {
            trigger: Trigger::Nth { n: 2 },
            action: respond(500, "{I [you}"),
        },
        FaultRule {
            trigger: Trigger::Nth { n: 3 },
            action: respond(200, "{I [you}"),
        },
        FaultRule {
            trigger: Trigger::Nth { n: 4 },
            action: FaultAction::DropConnection,
        },
        FaultRule {
            trigger: Trigger::Nth { n: 5 },
            action: FaultAction::LengthMismatch {
                status: 200,
                body: r#"{"status": 0}"#.to_string(),
                declared_length: 64,
            },
        },
        FaultRule {
            trigger: Trigger::Nth { n: 6 },
            action: respond(200, r#"{"status": 21003, "receipt": {"bundle_id": "x"}}"#),
        },
    ])
    .await;

    let first = util.verify_receipt(&request()).await;
    assert_eq!(first.kind, OutcomeKind::SandboxReceiptSentToProduction);
    assert_eq!(first.retry_hint, Some(Environment::Sandbox));

    let second = util.verify_receipt(&request()).await;
    assert_eq!(second.kind, OutcomeKind::Unknown);
    assert_eq!(second.http_status, Some(500));
    assert_eq!(second.raw_payload, b"{I [you}");

    let third = util.verify_receipt(&request()).await;
    assert_eq!(third.kind, OutcomeKind::Unknown);

    let fourth = util.verify_receipt(&request()).await;
    assert_eq!(fourth.kind, OutcomeKind::ServerUnavailable);
    assert_eq!(fourth.http_status, None);

    let fifth = util.verify_receipt(&request()).await;
    assert_eq!(fifth.kind, OutcomeKind::ServerUnavailable);
    assert_eq!(fifth.http_status, None);

    let sixth = util.verify_receipt(&request()).await;
    assert_eq!(sixth.kind, OutcomeKind::InvalidSignature);
    assert_eq!(sixth.receipt, None);
}

#[tokio::test]
async fn shared_secret_never_appears_in_results() {
    let (util, _stop) = client_for(vec![FaultRule {
        trigger: Trigger::Always,
        action: FaultAction::DropConnection,
    }])
    .await;

    let result = util.verify_receipt(&request()).await;

    assert!(!result.message().contains("0123456789abcdef"));
    assert!(!format!("{result:?}").contains("0123456789abcdef"));
}
