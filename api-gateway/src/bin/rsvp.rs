//! RSVP Lambda - Handles /rsvp submissions from the wedding site.
//!
//! Endpoints:
//! - GET /rsvp - JSONP-friendly submission via query string (always HTTP 200)
//! - POST /rsvp - JSON body submission, guarded by the shared `x-api-key`
//! - OPTIONS /rsvp - CORS preflight

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::config::CredentialStrategy;
use shared::http::{
    envelope_response, error_response, is_valid_callback, parse_json_body, preflight_response,
};
use shared::rsvp::SUCCESS_MESSAGE;
use shared::{
    ApiResponse, Authenticator, Config, GoogleSheetsClient, RsvpRecord, RsvpService,
    RsvpSubmission, SubmissionShape,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const API_KEY_HEADER: &str = "x-api-key";
const INVALID_CALLBACK: &str = "Invalid callback name";
const DEFAULT_LOG_FILTER: &str = "info";

/// Application state shared across requests.
struct AppState {
    service: RsvpService,
}

impl AppState {
    async fn new(config: Config) -> Result<Self, Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        // Secrets Manager is only consulted by the ambient strategy.
        let secrets_client = if config.credentials_secret_arn.is_some()
            && config.credential_strategies.contains(&CredentialStrategy::Ambient)
        {
            let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Some(aws_sdk_secretsmanager::Client::new(&aws))
        } else {
            None
        };

        let authenticator = Authenticator::new(config.clone(), http_client.clone(), secrets_client);
        let backend = GoogleSheetsClient::new(http_client);

        Ok(Self {
            service: RsvpService::new(config, Box::new(authenticator), Box::new(backend)),
        })
    }
}

/// Accept `/rsvp` under any stage or prefix, e.g. `/wedding/rsvp`.
fn is_rsvp_path(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    path == "/rsvp" || path.ends_with("/rsvp")
}

/// The caller's JSONP callback, if any. Empty counts as none.
fn requested_callback(submission: &RsvpSubmission) -> Option<&str> {
    submission.callback.as_deref().filter(|cb| !cb.is_empty())
}

/// Anything other than a plain identifier path is never echoed back.
fn is_unsafe_callback(callback: Option<&str>) -> bool {
    match callback {
        Some(cb) if !is_valid_callback(cb) => {
            warn!(callback = %cb, "Rejected JSONP callback name");
            true
        }
        _ => false,
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let path = event.uri().path();

    info!("RSVP request: {} {}", method, path);

    if !is_rsvp_path(path) {
        return error_response(404, "Not found");
    }

    let config = state.service.config();
    match method {
        "OPTIONS" => preflight_response(),
        "GET" if config.accept_get => submit_query(&state, &event).await,
        "POST" if config.accept_post => submit_json(&state, &event).await,
        _ => error_response(405, "Method not allowed"),
    }
}

async fn submit_query(state: &AppState, event: &Request) -> Result<Response<Body>, Error> {
    let params = event.query_string_parameters();
    let submission = RsvpSubmission::from_query(|key| params.first(key).map(str::to_string));

    let callback = requested_callback(&submission);
    if is_unsafe_callback(callback) {
        return error_response(200, INVALID_CALLBACK);
    }

    let result = state
        .service
        .submit(SubmissionShape::Query, &submission)
        .await;

    // Script-tag callers can't see status codes, so failures stay 200.
    respond(result, callback, |_| 200)
}

async fn submit_json(state: &AppState, event: &Request) -> Result<Response<Body>, Error> {
    if let Some(expected) = &state.service.config().api_key {
        let provided = event
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        if provided != Some(expected.as_str()) {
            warn!("Rejected RSVP submission with missing or invalid API key");
            let e = shared::Error::Unauthorized("Invalid or missing API key".to_string());
            return error_response(e.status_code(), e.to_string());
        }
    }

    let submission: RsvpSubmission = match parse_json_body(event.body()) {
        Ok(submission) => submission,
        Err(e) => {
            return error_response(e.status_code(), format!("Invalid request body: {}", e));
        }
    };

    let callback = requested_callback(&submission);
    if is_unsafe_callback(callback) {
        let e = shared::Error::Validation(INVALID_CALLBACK.to_string());
        return error_response(e.status_code(), e.to_string());
    }

    let result = state
        .service
        .submit(SubmissionShape::Json, &submission)
        .await;

    if callback.is_some() {
        respond(result, callback, |_| 200)
    } else {
        respond(result, callback, shared::Error::status_code)
    }
}

fn respond(
    result: shared::Result<RsvpRecord>,
    callback: Option<&str>,
    failure_status: impl Fn(&shared::Error) -> u16,
) -> Result<Response<Body>, Error> {
    match result {
        Ok(record) => envelope_response(200, &ApiResponse::success(SUCCESS_MESSAGE, record), callback),
        Err(e) => {
            error!(error = %e, "RSVP submission failed");
            envelope_response(
                failure_status(&e),
                &ApiResponse::<()>::error(e.to_string()),
                callback,
            )
        }
    }
}

/// `RUST_LOG` when set and valid, otherwise `info` so startup warnings show.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .json()
        .init();

    let config = Config::from_env()?;
    if config.api_key.is_none() {
        warn!("RSVP_API_KEY is not set; JSON submissions are accepted without an API key");
    }
    info!(
        spreadsheet_name = %config.spreadsheet_name,
        worksheet = %config.worksheet_name,
        name_fallback = config.spreadsheet_name_fallback,
        accept_get = config.accept_get,
        accept_post = config.accept_post,
        "RSVP function starting"
    );

    let state = Arc::new(AppState::new(config).await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_http::http;
    use serde_json::Value;
    use shared::testing::{FakeBackend, FakeTokens};
    use std::collections::HashMap;

    fn state(config: Config, backend: &FakeBackend) -> Arc<AppState> {
        Arc::new(AppState {
            service: RsvpService::new(
                config,
                Box::new(FakeTokens::default()),
                Box::new(backend.clone()),
            ),
        })
    }

    fn wedding_sheet() -> FakeBackend {
        FakeBackend::with_sheet("sheet-1", "RSVP Responses", &["Responses"])
    }

    fn get_request(params: &[(&str, &str)]) -> Request {
        let query: HashMap<String, Vec<String>> = params
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect();
        http::Request::builder()
            .method("GET")
            .uri("/wedding/rsvp")
            .body(Body::Empty)
            .unwrap()
            .with_query_string_parameters(query)
    }

    fn post_request(body: &str, api_key: Option<&str>) -> Request {
        let mut builder = http::Request::builder()
            .method("POST")
            .uri("/rsvp")
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn body_text(response: &Response<Body>) -> String {
        match response.body() {
            Body::Text(text) => text.clone(),
            Body::Binary(bytes) => String::from_utf8(bytes.clone()).unwrap(),
            Body::Empty => String::new(),
        }
    }

    fn body_json(response: &Response<Body>) -> Value {
        serde_json::from_str(&body_text(response)).unwrap()
    }

    #[tokio::test]
    async fn test_get_submission_appends_and_echoes_details() {
        let backend = wedding_sheet();
        let response = handler(
            state(Config::default(), &backend),
            get_request(&[
                ("spreadsheetId", "sheet-1"),
                ("fullName", "Jane Doe"),
                ("ceremony", "1"),
                ("brunch", "0"),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["content-type"], "application/json");

        let json = body_json(&response);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "RSVP submitted successfully!");
        assert_eq!(json["details"]["full_name"], "Jane Doe");
        assert_eq!(json["details"]["ceremony"], true);
        assert_eq!(json["details"]["brunch"], false);
        assert!(json["details"]["rehearsal_dinner"].is_null());
        assert!(json["details"]["plus_one_name"].is_null());
        assert!(json["details"]["timestamp"].is_string());

        let rows = backend.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, vec!["Jane Doe", "", "", "Yes", "No", "", "", "", "", ""]);
    }

    #[tokio::test]
    async fn test_get_blank_name_is_a_structured_failure() {
        let backend = wedding_sheet();
        let response = handler(
            state(Config::default(), &backend),
            get_request(&[("spreadsheetId", "sheet-1"), ("fullName", "")]),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            body_json(&response),
            serde_json::json!({"success": false, "error": "Full name is required"})
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_with_callback_returns_jsonp() {
        let backend = wedding_sheet();
        let response = handler(
            state(Config::default(), &backend),
            get_request(&[
                ("spreadsheetId", "sheet-1"),
                ("fullName", "Jane"),
                ("callback", "handleRsvp"),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(response.headers()["content-type"], "application/javascript");
        let text = body_text(&response);
        let inner = text
            .strip_prefix("handleRsvp(")
            .and_then(|t| t.strip_suffix(')'))
            .unwrap();
        let json: Value = serde_json::from_str(inner).unwrap();
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn test_get_unknown_spreadsheet_is_reported_without_append() {
        let backend = wedding_sheet();
        let config = Config {
            spreadsheet_name_fallback: false,
            ..Config::default()
        };
        let response = handler(
            state(config, &backend),
            get_request(&[
                ("spreadsheetId", "missing"),
                ("fullName", "Jane"),
                ("callback", "cb"),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        let text = body_text(&response);
        let json: Value = serde_json::from_str(&text[3..text.len() - 1]).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("'missing' not found"));
        assert!(json.get("details").is_none());
        assert!(backend.rows().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_callback_is_refused() {
        let backend = wedding_sheet();
        let response = handler(
            state(Config::default(), &backend),
            get_request(&[
                ("spreadsheetId", "sheet-1"),
                ("fullName", "Jane"),
                ("callback", "alert(document.cookie)"),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(body_json(&response)["error"], "Invalid callback name");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_post_requires_configured_api_key() {
        let backend = wedding_sheet();
        let config = Config {
            api_key: Some("s3cret".to_string()),
            ..Config::default()
        };
        let body = r#"{"spreadsheet_id":"sheet-1","full_name":"Jane"}"#;

        let missing = handler(state(config.clone(), &backend), post_request(body, None))
            .await
            .unwrap();
        assert_eq!(missing.status(), 401);

        let wrong = handler(state(config.clone(), &backend), post_request(body, Some("S3CRET")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), 401);
        assert!(backend.calls().is_empty());

        let ok = handler(state(config, &backend), post_request(body, Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);
        assert_eq!(backend.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_post_without_configured_key_is_open() {
        let backend = wedding_sheet();
        let response = handler(
            state(Config::default(), &backend),
            post_request(
                r#"{"spreadsheet_id":"sheet-1","full_name":"Jane","plus_one_name":"Sam","plus_one_brunch":true}"#,
                None,
            ),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        let json = body_json(&response);
        assert_eq!(json["details"]["plus_one_name"], "Sam");
        assert_eq!(json["details"]["plus_one_brunch"], true);
        assert_eq!(backend.rows()[0].1[5], "Sam");
        assert_eq!(backend.rows()[0].1[9], "Yes");
    }

    #[tokio::test]
    async fn test_post_failures_carry_status_codes() {
        let backend = wedding_sheet();

        let blank = handler(
            state(Config::default(), &backend),
            post_request(r#"{"full_name":"  "}"#, None),
        )
        .await
        .unwrap();
        assert_eq!(blank.status(), 400);
        assert_eq!(body_json(&blank)["error"], "Full name is required");

        let malformed = handler(state(Config::default(), &backend), post_request("{", None))
            .await
            .unwrap();
        assert_eq!(malformed.status(), 400);
        assert_eq!(body_json(&malformed)["success"], false);
    }

    #[tokio::test]
    async fn test_routing() {
        let backend = wedding_sheet();

        let preflight = http::Request::builder()
            .method("OPTIONS")
            .uri("/rsvp")
            .body(Body::Empty)
            .unwrap();
        let response = handler(state(Config::default(), &backend), preflight).await.unwrap();
        assert_eq!(response.status(), 204);

        let other_path = http::Request::builder()
            .method("GET")
            .uri("/guests")
            .body(Body::Empty)
            .unwrap();
        let response = handler(state(Config::default(), &backend), other_path).await.unwrap();
        assert_eq!(response.status(), 404);

        let config = Config {
            accept_get: false,
            ..Config::default()
        };
        let response = handler(
            state(config, &backend),
            get_request(&[("spreadsheetId", "sheet-1"), ("fullName", "Jane")]),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), 405);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_log_filter_defaults_to_info() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("warn")).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_rsvp_paths() {
        assert!(is_rsvp_path("/rsvp"));
        assert!(is_rsvp_path("/rsvp/"));
        assert!(is_rsvp_path("/prod/wedding/rsvp"));
        assert!(!is_rsvp_path("/rsvps"));
        assert!(!is_rsvp_path("/rsvp/admin"));
    }
}
