use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact, InfoBuilder, License,
    },
    Modify, OpenApi,
};

use super::{
    error::ErrorBody,
    handlers::{google, health, login, me, password, signup, verification},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        signup::signup,
        password::forgot_password,
        password::change_password,
        verification::verify_email,
        verification::resend_verification,
        google::id_token,
        google::authorization_code,
        me::me,
    ),
    components(schemas(ErrorBody)),
    modifiers(&BearerScheme),
    tags(
        (name = "auth", description = "Authentication proxy to the identity API"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// The `OpenAPI` document with info taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    info.contact = cargo_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|spdx| {
        let mut license = License::new(spdx);
        license.identifier = Some(spdx.to_string());
        license
    });

    doc.info = info;
    doc
}

// Cargo authors are `:` separated, each "Name <email>".
fn cargo_contact(authors: &str) -> Option<Contact> {
    let primary = authors.split(':').next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, rest)) => (name.trim(), rest.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = non_empty(name).map(str::to_string);
    contact.email = non_empty(email).map(str::to_string);
    Some(contact)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
