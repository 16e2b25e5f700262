//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::auth::AUTH_TAG;
use crate::me::ME_TAG;
use crate::oidc::OIDC_TAG;
use crate::provider::FEDERATION_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some(
                    "EdDSA-signed access token obtained from the token endpoint.",
                ))
                .build();
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Signet",
        version = "0.1.0",
        description = "OpenID Connect / OAuth2 identity provider."
    ),
    tags(
        (name = OIDC_TAG, description = "OpenID Connect provider endpoints"),
        (name = AUTH_TAG, description = "First-party authentication"),
        (name = ME_TAG, description = "Self-service account endpoints"),
        (name = FEDERATION_TAG, description = "Third-party identity federation"),
        (name = MISC_TAG, description = "Miscellaneous endpoints")
    )
)]
pub struct ApiDoc;
