//! Test utilities for integration testing (available with `test-utils` feature).

use crate::{
    AppState,
    auth::session::{Session, create_session_token},
    blob::{BlobError, BlobObject, BlobPutRequest, BlobStore},
    config::{BlobStorageConfig, Config, SweeperConfig, UploadsConfig},
    db::{
        InMemoryStore,
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    provider::{LlmProvider, ProviderError, ProviderFile, ProviderFileRequest},
    types::UserId,
};
use async_trait::async_trait;
use axum::http::{HeaderValue, header};
use axum_test::TestServer;
use bytes::Bytes;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_API_KEY: &str = "sk-test-key";

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        blob_storage: BlobStorageConfig::Local {
            path: std::env::temp_dir().join(format!("aialexa-test-blobs-{}", std::process::id())),
            public_base_url: url::Url::parse("http://localhost:3001").unwrap(),
        },
        uploads: UploadsConfig {
            sweeper: SweeperConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        },
        // A second Prometheus recorder in the same process panics
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

pub async fn create_test_user(pool: &PgPool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users = Users::new(&mut conn);
    let email = format!("user-{}@example.com", Uuid::new_v4().simple());

    users
        .create(&UserCreateDBRequest {
            email,
            ..Default::default()
        })
        .await
        .expect("Failed to create test user")
}

/// `Cookie` header value carrying a valid session for the user
pub fn session_cookie(config: &Config, user_id: UserId, email: &str) -> String {
    let token = create_session_token(
        &Session {
            user_id,
            email: email.to_string(),
        },
        config,
    )
    .expect("Failed to create session token");
    format!("{}={}", config.auth.session.cookie_name, token)
}

/// Blob store that keeps objects in memory and records deletes
#[derive(Default)]
pub struct RecordingBlobStore {
    objects: Mutex<HashMap<String, Bytes>>,
    deleted: Mutex<Vec<String>>,
    fail_put: AtomicBool,
    fail_delete: AtomicBool,
}

impl RecordingBlobStore {
    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn objects(&self) -> HashMap<String, Bytes> {
        self.objects.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Store an object directly, as if a previous upload had written it
    pub fn insert(&self, key: &str, content: &'static [u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), Bytes::from_static(content));
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(&self, request: BlobPutRequest) -> Result<BlobObject, BlobError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("injected put failure".to_string()));
        }
        let key = crate::blob::object_key(&request.name);
        self.objects.lock().unwrap().insert(key.clone(), request.content);
        Ok(BlobObject {
            url: format!("https://blobs.test/{key}"),
            key,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("injected delete failure".to_string()));
        }
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// A file registration seen by [`RecordingProvider`]
#[derive(Debug, Clone)]
pub struct RecordedFile {
    pub api_key: String,
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

/// Provider that keeps registered files in memory and records deletes
#[derive(Default)]
pub struct RecordingProvider {
    files: Mutex<HashMap<String, RecordedFile>>,
    deleted: Mutex<Vec<(String, String)>>,
    next_id: AtomicUsize,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
}

impl RecordingProvider {
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn files(&self) -> HashMap<String, RecordedFile> {
        self.files.lock().unwrap().clone()
    }

    /// `(api_key, file_id)` of every delete call that succeeded
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for RecordingProvider {
    async fn create_file(&self, api_key: &str, request: ProviderFileRequest) -> Result<ProviderFile, ProviderError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                body: "injected create failure".to_string(),
            });
        }
        let id = format!("file-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let bytes = request.content.len() as u64;
        self.files.lock().unwrap().insert(
            id.clone(),
            RecordedFile {
                api_key: api_key.to_string(),
                filename: request.filename.clone(),
                content_type: request.content_type,
                content: request.content,
            },
        );
        Ok(ProviderFile {
            id,
            filename: Some(request.filename),
            bytes: Some(bytes),
        })
    }

    async fn delete_file(&self, api_key: &str, file_id: &str) -> Result<(), ProviderError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                body: "injected delete failure".to_string(),
            });
        }
        self.files.lock().unwrap().remove(file_id);
        self.deleted.lock().unwrap().push((api_key.to_string(), file_id.to_string()));
        Ok(())
    }
}

/// The router wired to in-memory doubles, with handles on each of them
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub blobs: Arc<RecordingBlobStore>,
    pub provider: Arc<RecordingProvider>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(create_test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let blobs = Arc::new(RecordingBlobStore::default());
        let provider = Arc::new(RecordingProvider::default());

        let state = AppState::builder()
            .config(config)
            .store(store.clone())
            .blobs(blobs.clone())
            .provider(provider.clone())
            .templates(Arc::new(crate::templates::environment().expect("Failed to load templates")))
            .build();

        let router = crate::build_router(state.clone()).expect("Failed to build router");
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            state,
            store,
            blobs,
            provider,
        }
    }

    /// A fresh user with a provider API key configured
    pub fn user_with_api_key(&self) -> UserId {
        let user_id = Uuid::new_v4();
        self.store.set_api_key(user_id, TEST_API_KEY);
        user_id
    }

    /// `Cookie` header for a session of `user_id`
    pub fn cookie(&self, user_id: UserId) -> (header::HeaderName, HeaderValue) {
        let value = session_cookie(&self.state.config, user_id, "user@example.com");
        (header::COOKIE, HeaderValue::from_str(&value).expect("valid cookie header"))
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
