use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::files::{StoredFileCreateDBRequest, StoredFileDBResponse},
};
use crate::types::{FileId, UserId};
use sqlx::PgConnection;

/// Filter for listing files
#[derive(Debug, Clone)]
pub struct FileFilter {
    pub user_id: Option<UserId>,
    pub limit: i64,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self { user_id: None, limit: 100 }
    }
}

impl FileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

pub struct Files<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Files<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Number of files a user currently holds, the quantity the plan quota limits
    pub async fn count_for_user(&mut self, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Files<'c> {
    type CreateRequest = StoredFileCreateDBRequest;
    type Response = StoredFileDBResponse;
    type Id = FileId;
    type Filter = FileFilter;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let file = sqlx::query_as::<_, StoredFileDBResponse>(
            r#"
            INSERT INTO files (user_id, name, blob_url, provider_file_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.name)
        .bind(&request.blob_url)
        .bind(&request.provider_file_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(file)
    }

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let file = sqlx::query_as::<_, StoredFileDBResponse>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(file)
    }

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = sqlx::QueryBuilder::new("SELECT * FROM files WHERE 1=1");

        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ");
            query.push_bind(user_id);
        }

        query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        query.push_bind(filter.limit);

        let files = query.build_query_as::<StoredFileDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;
    use uuid::Uuid;

    fn request(user_id: UserId, name: &str) -> StoredFileCreateDBRequest {
        StoredFileCreateDBRequest {
            user_id,
            name: name.to_string(),
            blob_url: format!("https://blobs.example.com/{name}"),
            provider_file_id: format!("file-{name}"),
        }
    }

    #[sqlx::test]
    async fn test_create_and_count(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Files::new(&mut conn);

        assert_eq!(repo.count_for_user(user.id).await.unwrap(), 0);

        let file = repo.create(&request(user.id, "notes.pdf")).await.unwrap();
        assert_eq!(file.name, "notes.pdf");
        assert_eq!(file.provider_file_id, "file-notes.pdf");
        assert_eq!(repo.get_by_id(file.id).await.unwrap(), Some(file));

        // Same name twice is two rows
        repo.create(&request(user.id, "notes.pdf")).await.unwrap();
        assert_eq!(repo.count_for_user(user.id).await.unwrap(), 2);
    }

    #[sqlx::test]
    async fn test_list_is_scoped_and_newest_first(pool: PgPool) {
        let user = create_test_user(&pool).await;
        let other = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Files::new(&mut conn);

        let first = repo.create(&request(user.id, "a.txt")).await.unwrap();
        let second = repo.create(&request(user.id, "b.txt")).await.unwrap();
        repo.create(&request(other.id, "c.txt")).await.unwrap();

        let files = repo.list(&FileFilter::new().user_id(user.id)).await.unwrap();
        let ids: Vec<_> = files.iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
        assert!(files[0].created_at >= files[1].created_at);

        let limited = repo.list(&FileFilter::new().user_id(user.id).limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[sqlx::test]
    async fn test_unknown_user_is_foreign_key_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Files::new(&mut conn);

        let err = repo.create(&request(Uuid::new_v4(), "x.txt")).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
