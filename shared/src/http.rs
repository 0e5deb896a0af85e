//! HTTP helpers: the response envelope and its JSON/JSONP renderings.

use lambda_http::{Body, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const JSONP_CONTENT_TYPE: &str = "application/javascript";

/// Standard API response wrapper.
///
/// Successes carry `message` and `details`; failures carry only `error`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, details: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            details: Some(details),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(message.into()),
            details: None,
        }
    }
}

/// Whether `name` is safe to echo back as a JSONP function name: a dotted
/// path of JavaScript identifiers such as `cb` or `jQuery123.done`.
pub fn is_valid_callback(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
                }
                _ => false,
            }
        })
}

/// Wrap a JSON document in a call to `callback`.
pub fn jsonp_wrap(callback: &str, json: &str) -> String {
    format!("{}({})", callback, json)
}

/// Render the envelope as JSON, or as a JSONP script when a callback is given.
/// Returns the body text and its content type.
pub fn render<T: Serialize>(
    body: &ApiResponse<T>,
    callback: Option<&str>,
) -> Result<(String, &'static str), serde_json::Error> {
    let json = serde_json::to_string(body)?;
    Ok(match callback {
        Some(cb) => (jsonp_wrap(cb, &json), JSONP_CONTENT_TYPE),
        None => (json, JSON_CONTENT_TYPE),
    })
}

/// Create a JSON (or JSONP) response with the given status code.
pub fn envelope_response<T: Serialize>(
    status: u16,
    body: &ApiResponse<T>,
    callback: Option<&str>,
) -> Result<Response<Body>, lambda_http::Error> {
    let (text, content_type) = render(body, callback)?;
    Ok(Response::builder()
        .status(status)
        .header("content-type", content_type)
        .header("access-control-allow-origin", "*")
        .body(Body::from(text))?)
}

/// Create an error response with the given status code and message.
pub fn error_response(
    status: u16,
    message: impl Into<String>,
) -> Result<Response<Body>, lambda_http::Error> {
    envelope_response(status, &ApiResponse::<()>::error(message), None)
}

/// Answer a CORS preflight for the submission endpoint.
pub fn preflight_response() -> Result<Response<Body>, lambda_http::Error> {
    Ok(Response::builder()
        .status(204)
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "GET, POST, OPTIONS")
        .header("access-control-allow-headers", "content-type, x-api-key")
        .header("access-control-max-age", "86400")
        .body(Body::Empty)?)
}

/// Parse a request body as JSON.
pub fn parse_json_body<T: DeserializeOwned>(body: &Body) -> crate::Result<T> {
    let bytes: &[u8] = body.as_ref();
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(crate::Error::Validation("Missing request body".to_string()));
    }
    Ok(serde_json::from_slice(bytes)?)
}
