use super::handlers::{books, contact, health, login, profile, register, users, MessageResponse};
use crate::{
    auth::{AccountView, Role},
    catalog::{Book, BookCard, NewBook},
};
use axum::Json;
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact, License, Tag,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        register::register,
        register::verify,
        login::login,
        login::oauth_callback,
        login::me,
        profile::update_profile,
        books::list_books,
        books::get_book,
        books::fantasy,
        books::add_book,
        books::update_book,
        books::delete_book,
        users::list_users,
        users::update_role,
        users::delete_user,
        contact::send_message,
    ),
    components(schemas(
        health::Health,
        register::RegisterRequest,
        login::LoginRequest,
        login::LoginResponse,
        login::MeResponse,
        profile::ProfileUpdateRequest,
        contact::SupportForm,
        users::UpdateRoleRequest,
        MessageResponse,
        AccountView,
        Role,
        Book,
        BookCard,
        NewBook,
    )),
    modifiers(&BearerAuth)
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the `OpenAPI` document, with info taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();

    let tag = |name: &str, description: &str| {
        let mut tag = Tag::new(name);
        tag.description = Some(description.to_string());
        tag
    };
    doc.tags = Some(vec![
        tag("auth", "Registration, verification and login"),
        tag("books", "Book catalog"),
        tag("users", "Account administration"),
        tag("support", "Customer support"),
        tag("health", "Liveness"),
    ]);
    doc
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(value: &str) -> Option<&str> {
        (!value.is_empty()).then_some(value)
    }

    match author.split_once('<') {
        Some((name, email)) => (
            non_empty(name.trim()),
            non_empty(email.trim_end_matches('>').trim()),
        ),
        None => (non_empty(author.trim()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let contact = doc.info.contact.unwrap_or_default();
        assert_eq!(contact.name.as_deref(), Some("Team Bouquiniste"));
        assert_eq!(contact.email.as_deref(), Some("team@bouquiniste.dev"));

        let license = doc.info.license.map(|license| license.name);
        assert_eq!(license.as_deref(), Some("BSD-3-Clause"));
    }

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/register",
            "/verify",
            "/login",
            "/auth/oauth/callback",
            "/me",
            "/profile/update",
            "/books",
            "/books/search",
            "/fantasy",
            "/books/add",
            "/books/update",
            "/books/delete",
            "/admin/users",
            "/admin/users/update-role",
            "/admin/users/delete",
            "/support/message",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path}");
        }
        let schemes = doc
            .components
            .map(|components| components.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key("bearer"));
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Jane <jane@x.dev>"),
            (Some("Jane"), Some("jane@x.dev"))
        );
        assert_eq!(parse_author("Jane"), (Some("Jane"), None));
        assert_eq!(parse_author("<jane@x.dev>"), (None, Some("jane@x.dev")));
        assert_eq!(parse_author(" <> "), (None, None));
        assert_eq!(parse_author(""), (None, None));
    }
}
