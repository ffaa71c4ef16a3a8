use crate::{
    AppState,
    api::models::files::{FileListResponse, FileResponse, ListFilesQuery},
    auth::session::Session,
    errors::Result,
};
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    summary = "List files",
    description = "Returns the caller's ingested files, newest first.",
    responses(
        (status = 200, description = "List of files", body = FileListResponse),
        (status = 403, description = "No valid session"),
        (status = 500, description = "Internal server error")
    ),
    params(ListFilesQuery)
)]
pub async fn list_files(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<FileListResponse>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let files = state.store.list_files(session.user_id, limit).await?;

    Ok(Json(FileListResponse {
        data: files.into_iter().map(FileResponse::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::models::files::FileListResponse;
    use crate::test_utils::TestApp;
    use axum::http::StatusCode;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_list_files_requires_session() {
        let app = TestApp::new();
        app.server.get("/api/files").await.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_list_files_only_returns_own_files() {
        let app = TestApp::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        app.store.seed_files(user, 3);
        app.store.seed_files(other, 2);

        let (name, value) = app.cookie(user);
        let response = app.server.get("/api/files").add_header(name, value).await;
        response.assert_status_ok();
        let list = response.json::<FileListResponse>();
        assert_eq!(list.data.len(), 3);
        assert!(list.data.iter().all(|f| f.url.starts_with("http://seed.invalid/")));

        let (name, value) = app.cookie(user);
        let response = app.server.get("/api/files").add_query_param("limit", 2).add_header(name, value).await;
        assert_eq!(response.json::<FileListResponse>().data.len(), 2);
    }
}
