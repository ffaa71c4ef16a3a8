use axum::http::header;
use axum::response::IntoResponse;

pub const GREETING: &str = "Hello, aialexa!";

#[utoipa::path(
    get,
    path = "/api",
    tag = "health",
    summary = "Greeting",
    description = "Liveness greeting, readable cross-origin from any site.",
    responses(
        (status = 200, description = "Greeting", body = String, content_type = "text/plain")
    )
)]
pub async fn hello() -> impl IntoResponse {
    ([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], GREETING)
}
