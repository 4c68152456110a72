//! End-to-end tests for the bouquiniste router.
//!
//! Each test wires the real router over the in-memory store, captures outgoing
//! verification and support emails through channels and drives requests with
//! `oneshot`.

use anyhow::{bail, Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use bouquiniste::{
    api::{
        email::{EmailMessage, EmailSender},
        rate_limit::AdmissionGate,
        router,
        support::SupportDesk,
        AppState,
    },
    auth::{AccountService, AuthConfig, RoleSource, TokenIssuer},
    store::{AccountStore, CatalogStore, MemoryStore},
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::timeout};
use tower::ServiceExt;

struct ChannelSender(mpsc::UnboundedSender<EmailMessage>);

impl EmailSender for ChannelSender {
    fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        self.0.send(message.clone())?;
        Ok(())
    }
}

struct Part<'a> {
    name: &'a str,
    filename: Option<&'a str>,
    content: &'a [u8],
}

impl<'a> Part<'a> {
    fn text(name: &'a str, content: &'a str) -> Self {
        Self {
            name,
            filename: None,
            content: content.as_bytes(),
        }
    }

    fn file(name: &'a str, filename: &'a str, content: &'a [u8]) -> Self {
        Self {
            name,
            filename: Some(filename),
            content,
        }
    }
}

struct TestApp {
    router: Router,
    outbox: mpsc::UnboundedReceiver<EmailMessage>,
    support_inbox: mpsc::UnboundedReceiver<EmailMessage>,
}

struct Options {
    capacity: u32,
    role_source: RoleSource,
    allow_admin_registration: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            role_source: RoleSource::Claims,
            allow_admin_registration: false,
        }
    }
}

impl TestApp {
    fn new(options: Options) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let accounts: Arc<dyn AccountStore> = store.clone();
        let catalog: Arc<dyn CatalogStore> = store;

        let (tx, outbox) = mpsc::unbounded_channel();
        let tokens = Arc::new(TokenIssuer::new(
            SecretString::from("integration-secret".to_string()),
            Duration::from_secs(3600),
        )?);
        let config = AuthConfig::new("http://localhost:3000".to_string())
            .with_admin_registration(options.allow_admin_registration);
        let service = AccountService::new(accounts, Arc::new(ChannelSender(tx)), tokens, config);
        let (support_tx, support_inbox) = mpsc::unbounded_channel();
        let support = SupportDesk::new(Arc::new(ChannelSender(support_tx)), "help@shop.dev");

        let state = AppState {
            accounts: Arc::new(service),
            catalog,
            gate: Arc::new(AdmissionGate::new(options.capacity, 0.001)?),
            support: Arc::new(support),
            role_source: options.role_source,
        };

        Ok(Self {
            router: router(&state),
            outbox,
            support_inbox,
        })
    }

    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, body))
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string()))?).await
    }

    async fn multipart(&self, uri: &str, parts: &[Part<'_>]) -> Result<(StatusCode, Value)> {
        const BOUNDARY: &str = "bouquiniste-boundary";
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part.filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\n\
                         Content-Type: text/plain\r\n\r\n",
                        part.name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        part.name
                    )
                    .as_bytes(),
                ),
            }
            body.extend_from_slice(part.content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))?;
        self.send(request).await
    }

    async fn next_support_email(&mut self) -> Result<EmailMessage> {
        timeout(Duration::from_secs(5), self.support_inbox.recv())
            .await
            .context("timed out waiting for support email")?
            .context("support channel closed")
    }

    async fn next_code(&mut self) -> Result<String> {
        let message = timeout(Duration::from_secs(5), self.outbox.recv())
            .await
            .context("timed out waiting for verification email")?
            .context("email channel closed")?;
        let Some((_, rest)) = message.body.split_once("Your verification code is ") else {
            bail!("no code in email body: {}", message.body);
        };
        Ok(rest.chars().take_while(char::is_ascii_digit).collect())
    }

    /// Register, verify and log in, returning the session token.
    async fn signed_in(&mut self, email: &str, password: &str, role: &str) -> Result<String> {
        let (status, _) = self
            .json(
                Method::POST,
                "/register",
                None,
                &json!({"name": "Reader", "email": email, "password": password, "role": role}),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);

        let code = self.next_code().await?;
        let (status, _) = self.get(&format!("/verify?code={code}"), None).await?;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .json(
                Method::POST,
                "/login",
                None,
                &json!({"email": email, "password": password}),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        body["token"]
            .as_str()
            .map(str::to_string)
            .context("login response without token")
    }
}

#[tokio::test]
async fn register_verify_login_and_role_gate() -> Result<()> {
    let mut app = TestApp::new(Options::default())?;

    let (status, body) = app
        .json(
            Method::POST,
            "/register",
            None,
            &json!({"name": "A", "email": "a@x.com", "password": "pw1"}),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let code = app.next_code().await?;
    assert_eq!(code.len(), 4);

    // Login before verification is refused.
    let (status, _) = app
        .json(
            Method::POST,
            "/login",
            None,
            &json!({"email": "a@x.com", "password": "pw1"}),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let wrong = if code == "0000" { "0001" } else { "0000" };
    let (status, _) = app.get(&format!("/verify?code={wrong}"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get(&format!("/verify?code={code}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "email verified");

    // Codes are single use.
    let (status, _) = app.get(&format!("/verify?code={code}"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .json(
            Method::POST,
            "/login",
            None,
            &json!({"email": "a@x.com", "password": "pw1"}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "user");
    let token = body["token"].as_str().context("token")?.to_string();

    let (status, body) = app.get("/me", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "a@x.com");
    assert_eq!(body["role"], "user");

    let (status, _) = app.get("/admin/users", Some(&token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/admin/users", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/me", Some("not.a.token")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_user() -> Result<()> {
    let mut app = TestApp::new(Options::default())?;
    app.signed_in("b@x.com", "right", "user").await?;

    let (status, _) = app
        .json(
            Method::POST,
            "/login",
            None,
            &json!({"email": "b@x.com", "password": "wrong"}),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(
            Method::POST,
            "/login",
            None,
            &json!({"email": "nobody@x.com", "password": "right"}),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Registering a confirmed address again changes nothing.
    let (status, body) = app
        .json(
            Method::POST,
            "/register",
            None,
            &json!({"name": "B", "email": "B@x.com", "password": "other"}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());

    Ok(())
}

#[tokio::test]
async fn admin_manages_catalog_and_users() -> Result<()> {
    let mut app = TestApp::new(Options {
        allow_admin_registration: true,
        ..Options::default()
    })?;
    let admin = app.signed_in("admin@x.com", "pw", "admin").await?;
    let reader = app.signed_in("reader@x.com", "pw", "user").await?;

    let (status, _) = app.get("/books", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let book = json!({
        "title": "Le Rouge et le Noir",
        "author": "Stendhal",
        "published": "1830",
        "price": 9.5
    });
    let (status, _) = app
        .json(Method::POST, "/books/add", Some(&reader), &book)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app
        .json(Method::POST, "/books/add", Some(&admin), &book)
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().context("book id")?;

    let (status, _) = app
        .json(Method::POST, "/books/add", Some(&admin), &book)
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json(
            Method::POST,
            "/books/add",
            Some(&admin),
            &json!({"title": "", "author": "x", "published": "2000"}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/books?author=stendhal", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, _) = app.get("/books?sortBy=password", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut updated = created.clone();
    updated["price"] = json!(12.0);
    let (status, _) = app
        .json(Method::PUT, "/books/update", Some(&admin), &updated)
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get(&format!("/books/search?id={id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 12.0);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/books/delete?id={id}"))
        .header(header::AUTHORIZATION, format!("Bearer {admin}"))
        .body(Body::empty())?;
    let (status, _) = app.send(delete).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/books/search?id={id}"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, users) = app.get("/admin/users", Some(&admin)).await?;
    assert_eq!(status, StatusCode::OK);
    let reader_id = users
        .as_array()
        .and_then(|users| users.iter().find(|user| user["email"] == "reader@x.com"))
        .and_then(|user| user["id"].as_str())
        .context("reader in user list")?
        .to_string();

    let (status, _) = app
        .json(
            Method::POST,
            "/admin/users/update-role",
            Some(&admin),
            &json!({"user_id": reader_id, "role": "superuser"}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(
            Method::POST,
            "/admin/users/update-role",
            Some(&admin),
            &json!({"user_id": reader_id, "role": "admin"}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/admin/users/delete?id={reader_id}"))
        .header(header::AUTHORIZATION, format!("Bearer {admin}"))
        .body(Body::empty())?;
    let (status, _) = app.send(delete).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn admission_gate_applies_to_every_route() -> Result<()> {
    let app = TestApp::new(Options {
        capacity: 2,
        ..Options::default()
    })?;

    let (status, _) = app.get("/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/no-such-route", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get("/health", None).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());

    let (status, _) = app.get("/no-such-route", None).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    Ok(())
}

#[tokio::test]
async fn header_role_source_trusts_client_header() -> Result<()> {
    let mut app = TestApp::new(Options {
        role_source: RoleSource::Header,
        ..Options::default()
    })?;
    let token = app.signed_in("c@x.com", "pw", "user").await?;

    let request = Request::builder()
        .uri("/admin/users")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("Role", "admin")
        .body(Body::empty())?;
    let (status, _) = app.send(request).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/admin/users", Some(&token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let app = TestApp::new(Options::default())?;
    let (status, body) = app.get("/openapi.json", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/books"].is_object());
    assert!(body["paths"]["/support/message"].is_object());
    Ok(())
}

#[tokio::test]
async fn fantasy_collection_lists_cards() -> Result<()> {
    let mut app = TestApp::new(Options {
        allow_admin_registration: true,
        ..Options::default()
    })?;

    let (status, body) = app.get("/fantasy", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let admin = app.signed_in("admin@x.com", "pw", "admin").await?;
    for (title, genre) in [
        ("A Wizard of Earthsea", "Fantasy"),
        ("The Hobbit", "fantasy"),
        ("Germinal", "Naturalism"),
    ] {
        let (status, _) = app
            .json(
                Method::POST,
                "/books/add",
                Some(&admin),
                &json!({
                    "title": title,
                    "author": "Someone",
                    "published": "1900",
                    "description": "A story",
                    "price": 7.0,
                    "genre": genre
                }),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app.get("/fantasy", None).await?;
    assert_eq!(status, StatusCode::OK);
    let cards = body.as_array().context("card list")?;
    let titles: Vec<&str> = cards.iter().filter_map(|card| card["title"].as_str()).collect();
    assert_eq!(titles, ["A Wizard of Earthsea", "The Hobbit"]);
    assert_eq!(cards[0]["description"], "A story");
    assert!(cards[0].get("author").is_none());
    Ok(())
}

#[tokio::test]
async fn profile_update_renames_caller() -> Result<()> {
    let mut app = TestApp::new(Options::default())?;

    let (status, _) = app
        .json(Method::PUT, "/profile/update", None, &json!({"name": "Ghost"}))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.signed_in("p@x.com", "pw", "user").await?;
    let (status, body) = app
        .json(
            Method::PUT,
            "/profile/update",
            Some(&token),
            &json!({"name": "Pauline"}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["name"], "Pauline");
    assert_eq!(body["email"], "p@x.com");

    let (status, _) = app
        .json(Method::PUT, "/profile/update", Some(&token), &json!({"name": " "}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn support_message_reaches_inbox() -> Result<()> {
    let mut app = TestApp::new(Options::default())?;

    let (status, body) = app
        .multipart(
            "/support/message",
            &[
                Part::text("email", "reader@x.com"),
                Part::text("message", "My order never arrived"),
                Part::file("attachment", "order.txt", b"order #1042"),
            ],
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Support message sent");

    let sent = app.next_support_email().await?;
    assert_eq!(sent.to_email, "help@shop.dev");
    assert!(sent.body.starts_with("From: reader@x.com"));
    assert!(sent.body.contains("My order never arrived"));
    let attachment = sent.attachment.context("attachment dropped")?;
    assert_eq!(attachment.filename, "order.txt");
    assert_eq!(attachment.content, b"order #1042");

    // An empty file part means no attachment.
    let (status, _) = app
        .multipart(
            "/support/message",
            &[
                Part::text("email", "reader@x.com"),
                Part::text("message", "Never mind"),
                Part::file("attachment", "", b""),
            ],
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(app.next_support_email().await?.attachment.is_none());

    let (status, _) = app
        .multipart("/support/message", &[Part::text("email", "reader@x.com")])
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(
            Method::POST,
            "/support/message",
            None,
            &json!({"email": "reader@x.com", "message": "hi"}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
