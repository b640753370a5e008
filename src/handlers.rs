// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers (controller layer).
//
// ROUTES:
// - GET  /         render the contact form (plus any pending notification)
// - POST /         validate, store, redirect back with a notification
// - GET  /health   liveness
// - GET  /ready    readiness (database reachable)
// - GET  /metrics  Prometheus exposition
//
// AXUM EXTRACTORS USED:
// - State<T>: Access shared application state
// - HeaderMap: Read the signed cookies
// - Form<T>: Parse the urlencoded request body
// =============================================================================

use axum::{
    extract::{rejection::FormRejection, Form, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderName, StatusCode,
    },
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{AppError, AppResult};
use crate::metrics::{self, SubmissionOutcome};
use crate::models::*;
use crate::session::{
    clear_cookie, new_csrf_token, read_cookie, set_cookie, CSRF_COOKIE, FLASH_COOKIE,
};
use crate::validation::{
    validate, Field, FieldErrors, CSRF_INVALID, CSRF_MISSING, UNREADABLE_FORM,
};
use crate::views::ContactPage;
use crate::AppState;

/// `Set-Cookie` headers collected while handling one request.
type CookieHeaders = Vec<(HeaderName, String)>;

// =============================================================================
// CONTACT FORM
// =============================================================================

// -----------------------------------------------------------------------------
// SHOW FORM
// -----------------------------------------------------------------------------
/// Render the empty contact form.
///
/// GET /
///
/// A pending flash notification is shown and its cookie cleared, so it
/// appears exactly once. A flash cookie that fails verification is cleared
/// too. Storage is never touched.
pub async fn show_form(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let mut cookies = CookieHeaders::new();

    // Cleared even when it fails to verify, so a bad cookie is not resent
    let notification = state.cookies.read_flash(&headers);
    if read_cookie(&headers, FLASH_COOKIE).is_some() {
        cookies.push((SET_COOKIE, clear_cookie(FLASH_COOKIE)));
    }

    let page = ContactPage {
        notification,
        csrf_token: csrf_token_for_page(&state, &headers, &mut cookies),
        ..ContactPage::default()
    };

    metrics::record_http_request("GET", "/", 200, start.elapsed().as_secs_f64());

    (AppendHeaders(cookies), page.render()).into_response()
}

// -----------------------------------------------------------------------------
// SUBMIT FORM
// -----------------------------------------------------------------------------
/// Accept a contact form submission.
///
/// POST /
///
/// # Request Body (urlencoded)
/// `name=Ann&email=ann%40example.com&message=hi&csrf_token=...`
///
/// # Response
/// - 200 OK: form re-rendered with errors, nothing stored. This covers
///   field errors, a bad CSRF token (reported alongside any field errors)
///   and a body that is not a readable form
/// - 302 Found → `/`: stored (success notification) or storage failed
///   (failure notification)
pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<ContactForm>, FormRejection>,
) -> Response {
    let start = Instant::now();

    // A body that is not a readable urlencoded form gets the page back
    // instead of axum's plain-text 415/422
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Contact form body could not be read");
            metrics::record_submission(SubmissionOutcome::Invalid);

            let mut errors = FieldErrors::new();
            errors.add(Field::Form, UNREADABLE_FORM);
            let response = rerender(&state, &headers, ContactForm::default(), errors);
            metrics::record_http_request("POST", "/", 200, start.elapsed().as_secs_f64());
            return response;
        }
    };

    let csrf = if state.config.csrf_enabled {
        check_csrf(&state, &headers, &form)
    } else {
        Ok(())
    };

    let new_message = match (csrf, validate(&form)) {
        (Ok(()), Ok(new_message)) => new_message,
        (csrf, validated) => {
            // Field errors and a bad token are reported together
            let mut errors = validated.err().unwrap_or_default();

            if let Err(message) = csrf {
                tracing::warn!(reason = message, "Rejected contact form with bad CSRF token");
                metrics::record_submission(SubmissionOutcome::CsrfRejected);
                errors.add(Field::CsrfToken, message);
            } else {
                // Expected outcome, not a failure
                tracing::debug!(errors = errors.len(), "Contact form failed validation");
                metrics::record_submission(SubmissionOutcome::Invalid);
            }

            let response = rerender(&state, &headers, form, errors);
            metrics::record_http_request("POST", "/", 200, start.elapsed().as_secs_f64());
            return response;
        }
    };

    let insert_start = Instant::now();
    let result = state.db.insert_message(&new_message).await;
    metrics::record_db_query("insert", insert_start.elapsed().as_secs_f64());

    let notification = match result {
        Ok(stored) => {
            tracing::info!(message_id = stored.id, "Stored contact message");
            metrics::record_submission(SubmissionOutcome::Stored);
            Notification::received(&stored.name)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to store contact message");
            metrics::record_submission(SubmissionOutcome::Failed);
            Notification::not_saved()
        }
    };

    let response = redirect_home(&state, &notification);
    metrics::record_http_request("POST", "/", 302, start.elapsed().as_secs_f64());
    response
}

// -----------------------------------------------------------------------------
// HELPERS
// -----------------------------------------------------------------------------

/// 200 with the submitted values and their errors.
fn rerender(state: &AppState, headers: &HeaderMap, values: ContactForm, errors: FieldErrors) -> Response {
    let mut cookies = CookieHeaders::new();

    let page = ContactPage {
        values,
        errors,
        notification: None,
        csrf_token: csrf_token_for_page(state, headers, &mut cookies),
    };

    (StatusCode::OK, AppendHeaders(cookies), page.render()).into_response()
}

/// 302 to `/` carrying `notification` in the flash cookie.
///
/// A redirect (not a render) keeps a browser refresh from resubmitting.
fn redirect_home(state: &AppState, notification: &Notification) -> Response {
    let mut headers = vec![(LOCATION, "/".to_string())];

    match state.cookies.encode_flash(notification) {
        Some(value) => headers.push((SET_COOKIE, set_cookie(FLASH_COOKIE, &value))),
        None => tracing::warn!("Could not sign flash cookie; notification dropped"),
    }

    (StatusCode::FOUND, AppendHeaders(headers)).into_response()
}

/// Token for the hidden form field.
///
/// Reuses the visitor's token when their cookie is intact, otherwise issues
/// a new one and queues its `Set-Cookie`. `None` when CSRF is disabled.
fn csrf_token_for_page(
    state: &AppState,
    headers: &HeaderMap,
    cookies: &mut CookieHeaders,
) -> Option<String> {
    if !state.config.csrf_enabled {
        return None;
    }

    if let Some(token) = state.cookies.csrf_token(headers) {
        return Some(token);
    }

    let token = new_csrf_token();
    match state.cookies.sign(CSRF_COOKIE, &token) {
        Some(signed) => cookies.push((SET_COOKIE, set_cookie(CSRF_COOKIE, &signed))),
        None => tracing::warn!("Could not sign CSRF cookie"),
    }
    Some(token)
}

fn check_csrf(state: &AppState, headers: &HeaderMap, form: &ContactForm) -> Result<(), &'static str> {
    if form.csrf_token.trim().is_empty() {
        return Err(CSRF_MISSING);
    }

    match state.cookies.csrf_token(headers) {
        Some(expected) if expected == form.csrf_token => Ok(()),
        _ => Err(CSRF_INVALID),
    }
}

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// Liveness probe - Is the service running?
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe - Can the service store messages right now?
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ReadinessResponse>> {
    if !state.db.health_check().await {
        return Err(AppError::Unavailable("database is not reachable".to_string()));
    }

    Ok(Json(ReadinessResponse {
        status: "ready".to_string(),
        checks: ReadinessChecks { database: true },
    }))
}

// =============================================================================
// METRICS ENDPOINT
// =============================================================================
/// Prometheus metrics endpoint
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_support::sqlite_in;
    use crate::session::CookieSigner;
    use crate::validation::{INVALID_EMAIL, REQUIRED};
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, header::COOKIE, HeaderValue, Request};
    use axum::Router;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        _dir: TempDir,
    }

    async fn test_app(csrf_enabled: bool, with_schema: bool) -> TestApp {
        let csrf = if csrf_enabled { "true" } else { "false" };
        let config = Config::from_lookup(|key| match key {
            "SECRET_KEY" => Some("test-secret".to_string()),
            "CSRF_ENABLED" => Some(csrf.to_string()),
            _ => None,
        });

        let dir = tempfile::tempdir().unwrap();
        let db = sqlite_in(&dir);
        if with_schema {
            db.init_schema().await.unwrap();
        }

        let state = Arc::new(AppState {
            cookies: CookieSigner::new(&config.secret_key),
            config,
            db,
            metrics_handle: crate::metrics::detached_handle(),
        });

        TestApp {
            router: crate::build_router(state.clone()),
            state,
            _dir: dir,
        }
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
            let mut builder = Request::builder().uri(uri);
            if let Some(cookie) = cookie {
                builder = builder.header(COOKIE, cookie);
            }
            self.send(builder.body(Body::empty()).unwrap()).await
        }

        async fn post(&self, body: &str, cookie: Option<&str>) -> Response {
            let mut builder = Request::builder()
                .method("POST")
                .uri("/")
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
            if let Some(cookie) = cookie {
                builder = builder.header(COOKIE, cookie);
            }
            self.send(builder.body(Body::from(body.to_string())).unwrap()).await
        }

        async fn stored(&self) -> Vec<Message> {
            self.state.db.list_messages().await.unwrap()
        }

        /// Decodes the flash cookie a response just set.
        fn flash_of(&self, response: &Response) -> Option<Notification> {
            let value = set_cookie_value(response, FLASH_COOKIE)?;
            let mut headers = HeaderMap::new();
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&format!("{}={}", FLASH_COOKIE, value)).unwrap(),
            );
            self.state.cookies.read_flash(&headers)
        }
    }

    fn set_cookie_value(response: &Response, name: &str) -> Option<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const ANN: &str = "name=Ann&email=ann%40example.com&message=hi";

    // -------------------------------------------------------------------------
    // GET /
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn get_renders_empty_form() {
        let app = test_app(false, true).await;

        let response = app.get("/", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Contact us"));
        assert!(!html.contains("class=\"errors\""));
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn get_never_mutates_storage() {
        let app = test_app(false, true).await;
        app.post(ANN, None).await;

        let response = app.get("/", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.stored().await.len(), 1);
    }

    #[tokio::test]
    async fn unverifiable_flash_cookie_is_cleared() {
        let app = test_app(false, true).await;
        let cookie = format!("{}=deadbeef.00", FLASH_COOKIE);

        let response = app.get("/", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(set_cookie_value(&response, FLASH_COOKIE).as_deref(), Some(""));
        assert!(!body_text(response).await.contains("class=\"flash"));
    }

    #[tokio::test]
    async fn no_flash_cookie_means_nothing_to_clear() {
        let app = test_app(false, true).await;

        let response = app.get("/", None).await;

        assert_eq!(set_cookie_value(&response, FLASH_COOKIE), None);
    }

    // -------------------------------------------------------------------------
    // POST / - valid
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn valid_submission_stores_one_row_and_redirects() {
        let app = test_app(false, true).await;

        let response = app.post(ANN, None).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/");
        assert_eq!(app.flash_of(&response), Some(Notification::received("Ann")));

        let stored = app.stored().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Ann");
        assert_eq!(stored[0].email, "ann@example.com");
        assert_eq!(stored[0].message, "hi");
        assert!(stored[0].id > 0);
    }

    #[tokio::test]
    async fn notification_is_shown_once_after_redirect() {
        let app = test_app(false, true).await;
        let posted = app.post(ANN, None).await;
        let flash = set_cookie_value(&posted, FLASH_COOKIE).unwrap();
        let cookie = format!("{}={}", FLASH_COOKIE, flash);

        let response = app.get("/", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(set_cookie_value(&response, FLASH_COOKIE).as_deref(), Some(""));
        let html = body_text(response).await;
        assert!(html.contains("Thanks Ann! We received your message."));
        assert!(html.contains("flash success"));
    }

    // -------------------------------------------------------------------------
    // POST / - invalid
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn empty_name_rerenders_with_required_error() {
        let app = test_app(false, true).await;

        let response = app
            .post("name=&email=ann%40example.com&message=hi", None)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("data-field=\"name\""));
        assert!(html.contains(REQUIRED));
        assert!(html.contains("value=\"ann@example.com\""));
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_email_rerenders_with_format_error() {
        let app = test_app(false, true).await;

        let response = app
            .post("name=Ann&email=not-an-email&message=hi", None)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(INVALID_EMAIL));
        assert!(html.contains("value=\"not-an-email\""));
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn over_length_message_is_not_stored() {
        let app = test_app(false, true).await;
        let body = format!(
            "name=Ann&email=ann%40example.com&message={}",
            "m".repeat(2001)
        );

        let response = app.post(&body, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response)
            .await
            .contains("Field cannot be longer than 2000 characters."));
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn missing_fields_are_reported_as_required() {
        let app = test_app(false, true).await;

        let response = app.post("", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert_eq!(html.matches(REQUIRED).count(), 3);
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_field_rerenders_instead_of_422() {
        let app = test_app(false, true).await;

        let response = app
            .post("name=Ann&name=Bob&email=ann%40example.com&message=hi", None)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("data-field=\"form\""));
        assert!(html.contains(UNREADABLE_FORM));
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn non_form_body_rerenders_instead_of_415() {
        let app = test_app(false, true).await;
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from(ANN))
            .unwrap();

        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(UNREADABLE_FORM));
        assert!(app.stored().await.is_empty());
    }

    // -------------------------------------------------------------------------
    // POST / - storage failures
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn missing_table_redirects_with_failure_notification() {
        let app = test_app(false, false).await;

        let response = app.post(ANN, None).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/");
        assert_eq!(app.flash_of(&response), Some(Notification::not_saved()));

        app.state.db.init_schema().await.unwrap();
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn closed_pool_redirects_with_failure_notification() {
        let app = test_app(false, true).await;
        app.state.db.close().await;

        let response = app.post(ANN, None).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let flash = app.flash_of(&response).unwrap();
        assert_eq!(flash.kind, NotificationKind::Failure);
    }

    // -------------------------------------------------------------------------
    // CSRF
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn csrf_token_is_required_when_enabled() {
        let app = test_app(true, true).await;

        let response = app.post(ANN, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(CSRF_MISSING));
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn csrf_error_is_shown_with_field_errors() {
        let app = test_app(true, true).await;

        let response = app
            .post("name=&email=ann%40example.com&message=hi", None)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(CSRF_MISSING));
        assert!(html.contains("data-field=\"name\""));
        assert!(html.contains(REQUIRED));
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn mismatched_csrf_token_is_rejected() {
        let app = test_app(true, true).await;
        let page = app.get("/", None).await;
        let cookie = format!("{}={}", CSRF_COOKIE, set_cookie_value(&page, CSRF_COOKIE).unwrap());

        let response = app
            .post(&format!("{}&csrf_token=forged", ANN), Some(&cookie))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(CSRF_INVALID));
        assert!(app.stored().await.is_empty());
    }

    #[tokio::test]
    async fn matching_csrf_token_is_accepted() {
        let app = test_app(true, true).await;
        let page = app.get("/", None).await;
        let signed = set_cookie_value(&page, CSRF_COOKIE).unwrap();
        let (token, _) = signed.rsplit_once('.').unwrap();
        assert!(body_text(page).await.contains(token));

        let response = app
            .post(
                &format!("{}&csrf_token={}", ANN, token),
                Some(&format!("{}={}", CSRF_COOKIE, signed)),
            )
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(app.stored().await.len(), 1);
    }

    // -------------------------------------------------------------------------
    // HEALTH
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn health_and_readiness() {
        let app = test_app(false, true).await;

        assert_eq!(app.get("/health", None).await.status(), StatusCode::OK);
        assert_eq!(app.get("/ready", None).await.status(), StatusCode::OK);
        assert_eq!(app.get("/metrics", None).await.status(), StatusCode::OK);

        app.state.db.close().await;
        assert_eq!(
            app.get("/ready", None).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
