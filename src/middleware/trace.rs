//! `TraceLayer` span maker that keeps credentials and customer PII out of logs.
//!
//! Storefront search and callback endpoints carry phone numbers, emails and
//! tokens in query strings; their values are redacted from the logged URI.

use axum::http::Request;
use tower_http::trace::MakeSpan;
use tracing::Span;

use super::REQUEST_ID_HEADER;
use crate::audit::MASK_SENTINEL;

/// Query parameter names (lowercase) whose values are redacted.
const SENSITIVE_PARAMS: &[&str] = &[
    "access_token",
    "token",
    "signature",
    "api_key",
    "phone",
    "email",
    "taxid",
    "card_number",
];

#[derive(Clone, Debug)]
pub struct SanitizedMakeSpan;

impl<B> MakeSpan<B> for SanitizedMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "http",
            method = %request.method(),
            uri = %sanitize_uri(request.uri()),
            request_id = %request_id,
        )
    }
}

fn sanitize_uri(uri: &axum::http::Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_string();
    };

    let pairs: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if SENSITIVE_PARAMS.contains(&key.to_ascii_lowercase().as_str()) => {
                format!("{key}={MASK_SENTINEL}")
            }
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", uri.path(), pairs.join("&"))
}
