//! OpenAPI documentation, served by Scalar at `/docs` with the raw document at
//! `/api-docs/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Session authentication: the session cookie set by the web app, or the same token as a bearer.
struct SessionSecurityAddon;

impl Modify for SessionSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "SessionCookie".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "aialexa_session",
                    "Session token issued by the web app at sign-in.",
                ))),
            );
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("The session token, for clients that cannot send cookies."))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::hello::hello,
        api::handlers::upload::upload_file,
        api::handlers::files::list_files,
        api::handlers::embed::chat_page,
    ),
    components(schemas(
        api::models::files::UploadResponse,
        api::models::files::FileResponse,
        api::models::files::FileListResponse,
    )),
    modifiers(&SessionSecurityAddon),
    security(
        ("SessionCookie" = []),
        ("BearerAuth" = [])
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "files", description = "Upload files for chatbots and list them"),
        (name = "embed", description = "Embeddable chat pages"),
    ),
    info(
        title = "aialexa API",
        version = "1.0.0",
        description = "Asset ingestion and chat embedding for aialexa chatbots."
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/api", "/api/upload", "/api/files", "/chatbot/{chatbot_id}/chat"] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing from OpenAPI document");
        }
        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("SessionCookie"));
    }
}
