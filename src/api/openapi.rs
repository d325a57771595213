use super::handlers::{auth, health, ErrorResponse};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Components,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::signup,
        auth::refresh,
        auth::logout,
        auth::logout_all,
        auth::change_password,
    ),
    components(schemas(
        health::Health,
        auth::LoginRequest,
        auth::SignupRequest,
        auth::ChangePasswordRequest,
        auth::TokenResponse,
        auth::RevokedResponse,
        ErrorResponse,
    )),
    modifiers(&BearerSchemes),
    tags(
        (name = "auth", description = "Login, signup, refresh rotation and revocation"),
        (name = "health", description = "Liveness and build information"),
    )
)]
struct ApiDoc;

struct BearerSchemes;

impl Modify for BearerSchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Components::new);
        // Access and refresh tokens travel the same way but are not interchangeable.
        for name in ["bearer_access", "bearer_refresh"] {
            components.add_security_scheme(
                name,
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

/// `OpenAPI` document served at `/openapi.json`.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    // Cargo license strings are SPDX expressions.
    if let Some(license) = doc.info.license.as_mut() {
        license.identifier = Some(license.name.clone());
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let license = doc.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn openapi_tags_paths_and_schemes() {
        let doc = openapi();
        let tags = doc.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/signup",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/logout/all",
            "/v1/auth/password",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let schemes = doc
            .components
            .map(|components| components.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key("bearer_access"));
        assert!(schemes.contains_key("bearer_refresh"));
    }
}
