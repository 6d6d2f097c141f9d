//! Single-page HTML front end: paste a receipt, see what Apple says about it.
//!
//! The secret and checkbox choices persist in cookies for 30 days. With
//! "externals" on, the page loads highlight.js from its CDN to color the
//! JSON.

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
    routing::get,
    Form, Router,
};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

use super::{report::pretty_json, summary::ReceiptSummary};
use crate::{
    domain::{
        entities::{verification_request::VerificationRequest, verification_result::VerificationResult},
        repositories::receipt_repository::ReceiptRepository,
    },
    errors::ServeError,
    secrets::SharedSecret,
    util::ReceiptUtil,
};

const COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 30;

pub struct WebUi {
    listener: TcpListener,
    router: Router,
}

impl WebUi {
    pub async fn bind<R>(addr: SocketAddr, util: ReceiptUtil<R>) -> Result<Self, ServeError>
    where
        R: ReceiptRepository + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::PortUnavailable { addr, source })?;
        Ok(Self {
            listener,
            router: router(util),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServeError> {
        info!(addr = ?self.listener.local_addr().ok(), "web interface listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

fn router<R>(util: ReceiptUtil<R>) -> Router
where
    R: ReceiptRepository + 'static,
{
    Router::new()
        .route("/", get(show_form).post(check::<R>))
        .with_state(Arc::new(util))
}

#[derive(Debug, Default, Deserialize)]
struct FormInput {
    secret: Option<String>,
    sandbox: Option<String>,
    externals: Option<String>,
    technical: Option<String>,
    receipt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    secret: String,
    sandbox: bool,
    externals: bool,
    technical: bool,
}

impl Settings {
    fn from_cookies(headers: &HeaderMap) -> Self {
        let mut settings = Self {
            secret: String::new(),
            sandbox: false,
            externals: true,
            technical: true,
        };
        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='));
        for (name, value) in cookies {
            match name {
                "secret" => {
                    settings.secret = BASE64_URL_SAFE_NO_PAD
                        .decode(value)
                        .ok()
                        .and_then(|bytes| String::from_utf8(bytes).ok())
                        .unwrap_or_default()
                }
                "sandbox" => settings.sandbox = value == "yes",
                "externals" => settings.externals = value == "yes",
                "technical" => settings.technical = value == "yes",
                _ => {}
            }
        }
        settings
    }

    /// Unchecked checkboxes are absent from a submitted form.
    fn apply_form(&mut self, form: &FormInput) {
        if let Some(secret) = &form.secret {
            self.secret = secret.trim().to_string();
        }
        let checked = |field: &Option<String>| field.as_deref() == Some("yes");
        self.sandbox = checked(&form.sandbox);
        self.externals = checked(&form.externals);
        self.technical = checked(&form.technical);
    }

    fn cookie_headers(&self) -> HeaderMap {
        let yes_no = |flag: bool| if flag { "yes" } else { "no" };
        let secret = BASE64_URL_SAFE_NO_PAD.encode(&self.secret);
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("secret", secret.as_str()),
            ("sandbox", yes_no(self.sandbox)),
            ("externals", yes_no(self.externals)),
            ("technical", yes_no(self.technical)),
        ] {
            let cookie = format!("{name}={value}; Max-Age={COOKIE_MAX_AGE_SECS}; Path=/; HttpOnly");
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.append(SET_COOKIE, value);
            }
        }
        headers
    }
}

async fn show_form(headers: HeaderMap) -> Response {
    let settings = Settings::from_cookies(&headers);
    page(&settings, &render_page(&settings, "", None))
}

async fn check<R>(
    State(util): State<Arc<ReceiptUtil<R>>>,
    headers: HeaderMap,
    Form(form): Form<FormInput>,
) -> Response
where
    R: ReceiptRepository + 'static,
{
    let mut settings = Settings::from_cookies(&headers);
    settings.apply_form(&form);
    let receipt = form.receipt.unwrap_or_default();
    let receipt = receipt.trim();
    if receipt.is_empty() {
        return page(&settings, &render_page(&settings, "", None));
    }

    let request = VerificationRequest::new(
        receipt,
        Some(SharedSecret::new(settings.secret.as_str())),
        settings.sandbox,
    );
    let result = util.verify_receipt(&request).await;
    let decoded = match util.decode_receipt(receipt) {
        Ok(decoded) => serde_json::to_value(&decoded)
            .map(|value| pretty_json(&value))
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let checked = Checked {
        result: &result,
        decoded,
    };
    let textarea = result.latest_receipt.as_deref().unwrap_or(receipt);
    page(&settings, &render_page(&settings, textarea, Some(&checked)))
}

fn page(settings: &Settings, html: &str) -> Response {
    let mut headers = settings.cookie_headers();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    (headers, html.to_string()).into_response()
}

struct Checked<'a> {
    result: &'a VerificationResult,
    /// Pretty JSON of the locally decoded receipt, or why decoding failed.
    decoded: Result<String, String>,
}

fn render_page(settings: &Settings, receipt: &str, checked: Option<&Checked<'_>>) -> String {
    let checkbox = |name: &str, on: bool| {
        format!(
            r#"<input type="checkbox" name="{name}" value="yes"{} />"#,
            if on { " checked" } else { "" }
        )
    };
    let mut out = String::from("<!DOCTYPE html>\n<html>\n<head>\n<title>App Store receipt</title>\n");
    if settings.externals {
        out.push_str(concat!(
            r#"<link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/highlight.js/11.9.0/styles/default.min.css">"#,
            "\n",
            r#"<script src="https://cdnjs.cloudflare.com/ajax/libs/highlight.js/11.9.0/highlight.min.js"></script>"#,
            "\n<script>hljs.highlightAll();</script>\n",
        ));
    }
    out.push_str("</head>\n<body>\n<form action=\"/\" method=\"post\">\n");
    out.push_str("<fieldset>\n<legend>App Store Parameters</legend>\n<table>\n");
    out.push_str(&format!(
        "<tr><td><label for=\"secret\">App Key (secret):</label></td><td><input name=\"secret\" type=\"text\" placeholder=\"app store hash\" value=\"{}\" /></td></tr>\n",
        escape(&settings.secret)
    ));
    out.push_str(&format!(
        "<tr><td><label for=\"sandbox\">Sandbox:</label></td><td>{}</td></tr>\n",
        checkbox("sandbox", settings.sandbox)
    ));
    out.push_str(&format!(
        "<tr><td><label for=\"externals\">Externals:</label></td><td>{}</td></tr>\n",
        checkbox("externals", settings.externals)
    ));
    out.push_str(&format!(
        "<tr><td><label for=\"technical\">Technical output:</label></td><td>{}</td></tr>\n",
        checkbox("technical", settings.technical)
    ));
    out.push_str("</table>\n</fieldset>\n");
    out.push_str(&format!(
        "<fieldset>\n<legend>Receipt</legend>\n<textarea name=\"receipt\" wrap=\"soft\" placeholder=\"base64 encoded receipt\" rows=\"10\" style=\"width: 99%;\" autofocus>{}</textarea>\n</fieldset>\n",
        escape(receipt)
    ));
    out.push_str("<input name=\"validate\" type=\"submit\" value=\"Validate\" style=\"width: 100%; margin-top: 8px; margin-bottom: 20px; height: 30px;\"/>\n</form>\n");

    if let Some(checked) = checked {
        render_checked(&mut out, settings, checked);
    }
    out.push_str("</body>\n</html>\n");
    out
}

fn render_checked(out: &mut String, settings: &Settings, checked: &Checked<'_>) {
    let result = checked.result;
    let summary = ReceiptSummary::from_result(result, settings.technical, Utc::now());
    match summary {
        Some(summary) => {
            out.push_str("<fieldset>\n<legend>Summary</legend>\n<table>\n");
            for line in &summary.lines {
                out.push_str(&format!(
                    "<tr><td>{}:</td><td>{}</td></tr>\n",
                    escape(line.name),
                    escape(&line.value)
                ));
            }
            out.push_str("</table>\n</fieldset>\n");
        }
        None => {
            out.push_str(&format!(
                "<fieldset>\n<legend>Error</legend>\n<p style=\"color: red\"><strong>{}</strong></p>\n</fieldset>\n",
                escape(&result.message())
            ));
        }
    }
    if !settings.technical {
        return;
    }
    let response = match result.payload_json() {
        Some(json) => pretty_json(&json),
        None => String::from_utf8_lossy(&result.raw_payload).into_owned(),
    };
    if !response.is_empty() {
        push_code(out, "Response", &response);
    }
    match &checked.decoded {
        Ok(decoded) => push_code(out, "Decoded locally", decoded),
        Err(e) => out.push_str(&format!(
            "<fieldset>\n<legend>Decoded locally</legend>\n<p>{}</p>\n</fieldset>\n",
            escape(e)
        )),
    }
}

fn push_code(out: &mut String, legend: &str, code: &str) {
    out.push_str(&format!(
        "<fieldset>\n<legend>{legend}</legend>\n<pre><code class=\"language-json\">{}</code></pre>\n</fieldset>\n",
        escape(code)
    ));
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Settings {
        Settings::from_cookies(&HeaderMap::new())
    }

    #[test]
    fn cookies_round_trip() {
        let settings = Settings {
            secret: "0123; abc".to_string(),
            sandbox: true,
            externals: false,
            technical: true,
        };
        let mut request = HeaderMap::new();
        let cookie = settings
            .cookie_headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().split(';').next().unwrap().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        request.insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());

        assert_eq!(Settings::from_cookies(&request), settings);
    }

    #[test]
    fn cookies_last_thirty_days() {
        let headers = defaults().cookie_headers();
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 4);
        for value in headers.get_all(SET_COOKIE) {
            assert!(value.to_str().unwrap().contains("Max-Age=2592000"));
        }
    }

    #[test]
    fn submitted_form_overrides_checkboxes() {
        let mut settings = defaults();
        assert!(settings.externals && settings.technical && !settings.sandbox);

        settings.apply_form(&FormInput {
            secret: Some(" s3cret ".to_string()),
            sandbox: Some("yes".to_string()),
            ..FormInput::default()
        });

        assert_eq!(settings.secret, "s3cret");
        assert!(settings.sandbox);
        assert!(!settings.externals);
        assert!(!settings.technical);
    }

    #[test]
    fn user_input_is_escaped() {
        let mut settings = defaults();
        settings.secret = "\"><script>".to_string();
        let html = render_page(&settings, "</textarea><b>", None);
        assert!(!html.contains("<script>"));
        assert!(!html.contains("</textarea><b>"));
        assert!(html.contains("&lt;/textarea&gt;&lt;b&gt;"));
    }

    #[test]
    fn externals_toggle_highlighting() {
        let mut settings = defaults();
        assert!(render_page(&settings, "", None).contains("highlight.min.js"));
        settings.externals = false;
        assert!(!render_page(&settings, "", None).contains("highlight.min.js"));
    }

    #[test]
    fn failed_verification_shows_the_error() {
        let result = crate::data::interpreters::verification_interpreter::interpret(
            200,
            br#"{"status": 21003}"#,
        );
        let checked = Checked {
            result: &result,
            decoded: Err("malformed receipt".to_string()),
        };
        let html = render_page(&defaults(), "MIIT", Some(&checked));
        assert!(html.contains("The receipt could not be authenticated."));
        assert!(html.contains("malformed receipt"));
    }
}
