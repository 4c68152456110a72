use crate::{
    api::{
        handlers::{books, contact, health, login, profile, register, users},
        rate_limit::{admission_gate, AdmissionGate},
        support::{SupportDesk, MAX_ATTACHMENT_BYTES},
    },
    auth::{require_auth, require_role, AccountService, Role, RoleGate, RoleSource},
    store::CatalogStore,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod email;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod rate_limit;
pub mod support;

pub use openapi::openapi;

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub catalog: Arc<dyn CatalogStore>,
    pub gate: Arc<AdmissionGate>,
    pub support: Arc<SupportDesk>,
    pub role_source: RoleSource,
}

/// Attachment plus room for the other form fields and multipart framing.
const SUPPORT_BODY_LIMIT: usize = MAX_ATTACHMENT_BYTES + 64 * 1024;

/// Build the application router.
///
/// Every route, including unknown ones, passes the admission gate first.
/// Protected groups then run `require_auth` and, for admin routes, the role gate.
#[must_use]
pub fn router(state: &AppState) -> Router {
    let tokens = state.accounts.tokens();
    let admin_gate = RoleGate::new(Role::Admin, state.role_source);

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/register", post(register::register))
        .route("/verify", get(register::verify))
        .route("/login", post(login::login))
        .route("/auth/oauth/callback", get(login::oauth_callback))
        .route("/books", get(books::list_books))
        .route("/books/search", get(books::get_book))
        .route("/fantasy", get(books::fantasy))
        .route(
            "/support/message",
            post(contact::send_message).layer(DefaultBodyLimit::max(SUPPORT_BODY_LIMIT)),
        );

    let authenticated = Router::new()
        .route("/me", get(login::me))
        .route("/profile/update", put(profile::update_profile))
        .route_layer(from_fn_with_state(tokens.clone(), require_auth));

    // Layers run bottom-up: authentication first, then the role check.
    let admin = Router::new()
        .route("/books/add", post(books::add_book))
        .route("/books/update", put(books::update_book))
        .route("/books/delete", delete(books::delete_book))
        .route("/admin/users", get(users::list_users))
        .route("/admin/users/update-role", post(users::update_role))
        .route("/admin/users/delete", delete(users::delete_user))
        .route_layer(from_fn_with_state(admin_gate, require_role))
        .route_layer(from_fn_with_state(tokens, require_auth));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin)
        .layer(Extension(state.accounts.clone()))
        .layer(Extension(state.catalog.clone()))
        .layer(Extension(state.support.clone()))
        .layer(from_fn_with_state(state.gate.clone(), admission_gate))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: AppState) -> Result<()> {
    let frontend_origin = frontend_origin(state.accounts.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin));

    let app = router(&state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
