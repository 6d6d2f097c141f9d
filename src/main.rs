use std::{
    io::Read,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    process,
};

use chrono::Utc;
use clap::{CommandFactory, Parser};
use iap_tool::{
    data::{
        builders::receipt_builder::build,
        codec::field_decoder::{decode, decode_base64},
    },
    domain::entities::verification_request::{Environment, VerificationRequest},
    errors::ReceiptError,
    fault_server::{FaultPolicy, FaultServer},
    presentation::{
        report::{render_dump, render_fields, render_summary},
        summary::ReceiptSummary,
        web_ui::WebUi,
    },
    secrets::{SharedSecret, SHARED_SECRET_ENV},
    util::AppleReceiptUtil,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A command line App Store receipt verifier with a web based GUI.
#[derive(Parser)]
#[command(name = "iap-tool", version, about)]
struct Cli {
    /// Base64 receipt data, or `-` to read it from stdin
    receipt: Option<String>,

    /// Read the receipt data from a file
    #[arg(long, value_name = "PATH", conflicts_with = "receipt")]
    file: Option<PathBuf>,

    /// The app's shared secret, needed for auto-renewable subscriptions
    #[arg(long, value_name = "KEY", env = SHARED_SECRET_ENV, hide_env_values = true)]
    secret: Option<SharedSecret>,

    /// Verify against Apple's sandbox instead of production
    #[arg(long)]
    sandbox: bool,

    /// Print the full response after the summary
    #[arg(long)]
    dump: bool,

    /// Decode the receipt locally without contacting Apple
    #[arg(long, conflicts_with_all = ["endpoint", "sandbox"])]
    offline: bool,

    /// Send verification requests to this URL instead of Apple's
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Start the web interface on <PORT>
    #[arg(long, value_name = "PORT", conflicts_with_all = ["receipt", "file", "offline", "badapple"])]
    webserver: Option<u16>,

    /// Start a faulty verifyReceipt server on <PORT>
    #[arg(long, value_name = "PORT", conflicts_with_all = ["receipt", "file", "offline", "endpoint"])]
    badapple: Option<u16>,

    /// Fault policy TOML for --badapple; the built-in chaos policy otherwise
    #[arg(long, value_name = "PATH", requires = "badapple")]
    policy: Option<PathBuf>,

    /// Log filter, e.g. `info` or `iap_tool=debug`
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(message) = run(cli).await {
        eprintln!("{message}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if let Some(port) = cli.webserver {
        let util = build_util(cli.endpoint.as_deref())?;
        let web_ui = WebUi::bind(localhost(port), util)
            .await
            .map_err(|e| e.to_string())?;
        println!(
            "Web interface on http://{}/",
            web_ui.local_addr().map_err(|e| e.to_string())?
        );
        return web_ui
            .serve(shutdown_signal())
            .await
            .map_err(|e| e.to_string());
    }

    if let Some(port) = cli.badapple {
        let policy = match &cli.policy {
            Some(path) => FaultPolicy::load(path).map_err(|e| e.to_string())?,
            None => FaultPolicy::chaos(),
        };
        let server = FaultServer::bind(localhost(port), policy)
            .await
            .map_err(|e| e.to_string())?;
        println!(
            "Faulty verifyReceipt server on http://{}/verifyReceipt",
            server.local_addr().map_err(|e| e.to_string())?
        );
        return server
            .serve(shutdown_signal())
            .await
            .map_err(|e| e.to_string());
    }

    let Some(receipt) = read_receipt(&cli)? else {
        Cli::command().print_help().map_err(|e| e.to_string())?;
        return Ok(());
    };

    if cli.offline {
        return decode_offline(&receipt, cli.dump).map_err(|e| e.to_string());
    }

    let util = build_util(cli.endpoint.as_deref())?;
    let request = VerificationRequest::new(receipt, cli.secret, cli.sandbox);
    let result = util.verify_receipt(&request).await;
    if !result.is_valid() {
        let mut message = result.message();
        match result.retry_hint {
            Some(Environment::Sandbox) => message.push_str("\nhint: retry with --sandbox"),
            Some(Environment::Production) => message.push_str("\nhint: retry without --sandbox"),
            None => {}
        }
        return Err(message);
    }

    if let Some(summary) = ReceiptSummary::from_result(&result, true, Utc::now()) {
        print!("{}", render_summary(&summary));
    }
    if result.receipt.is_none() {
        if let Some(detail) = &result.detail {
            eprintln!("warning: {detail}");
        }
    }
    if cli.dump {
        if let Some(json) = result.payload_json() {
            print!("{}", render_dump("JSON Receipt Data", &json));
        }
    }
    Ok(())
}

fn read_receipt(cli: &Cli) -> Result<Option<String>, String> {
    let receipt = match (&cli.file, cli.receipt.as_deref()) {
        (Some(path), _) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        (None, Some("-")) => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            input
        }
        (None, Some(receipt)) => receipt.to_string(),
        (None, None) => return Ok(None),
    };
    Ok(Some(receipt).filter(|r| !r.trim().is_empty()))
}

fn decode_offline(receipt: &str, dump: bool) -> Result<(), ReceiptError> {
    let records = decode(&decode_base64(receipt)?)?;
    print!("{}", render_fields(&records));
    let receipt = build(&records)?;
    let summary = ReceiptSummary::from_receipt(&receipt, &[], true, Utc::now());
    print!("{}", render_summary(&summary));
    if dump {
        if let Ok(json) = serde_json::to_value(&receipt) {
            print!("{}", render_dump("Decoded Receipt", &json));
        }
    }
    Ok(())
}

fn build_util(endpoint: Option<&str>) -> Result<AppleReceiptUtil, String> {
    match endpoint {
        Some(url) => AppleReceiptUtil::with_endpoints(url, url),
        None => AppleReceiptUtil::new(),
    }
    .map_err(|e| e.to_string())
}

fn localhost(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
