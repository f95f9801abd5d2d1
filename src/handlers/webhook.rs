use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::services::inbound;
use crate::state::AppState;

/// Twilio signs the full webhook URL followed by every POST param, sorted by key.
fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &[(String, String)],
) -> bool {
    let mut sorted_params: Vec<&(String, String)> = params.iter().collect();
    sorted_params.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = url.to_string();
    for (key, value) in sorted_params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    expected == signature
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> &'a str {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

/// Webhook URL as the gateway saw it, honouring proxy headers.
fn public_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}/webhook/sms")
}

pub async fn sms_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Response {
    let params = match form {
        Ok(Form(params)) => params,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "unreadable inbound SMS body, acknowledging without action");
            Vec::new()
        }
    };

    if !state.config.twilio_auth_token.is_empty() {
        let signature = headers
            .get("x-twilio-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty()
            || !validate_twilio_signature(
                &state.config.twilio_auth_token,
                signature,
                &public_url(&headers),
                &params,
            )
        {
            tracing::warn!("rejected inbound SMS with missing or invalid signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let from = param(&params, "From").trim().to_string();
    let body = param(&params, "Body").trim().to_string();
    tracing::info!(message_sid = param(&params, "MessageSid"), "incoming SMS");

    let now = state.config.local_now();
    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let outcome = inbound::handle_inbound_reply(&task_state, &from, &body, now).await;
        tracing::debug!(?outcome, "inbound SMS handled");
    });

    twiml_response()
}

fn twiml_response() -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        "<Response></Response>",
    )
        .into_response()
}
