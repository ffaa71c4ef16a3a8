//! [`Store`] held in process memory, for tests.

use crate::db::{
    errors::{DbError, Result},
    models::{
        chatbots::ChatbotDBResponse,
        files::{StoredFileCreateDBRequest, StoredFileDBResponse},
        upload_intents::{
            SWEEP_CLAIM_ERROR, UploadIntentCreateDBRequest, UploadIntentDBResponse, UploadIntentStatus,
            UploadIntentUpdateDBRequest,
        },
        users::SubscriptionRecord,
    },
    store::Store,
};
use crate::types::{ChatbotId, UploadIntentId, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    subscriptions: HashMap<UserId, SubscriptionRecord>,
    api_keys: HashMap<UserId, String>,
    files: Vec<StoredFileDBResponse>,
    intents: HashMap<UploadIntentId, UploadIntentDBResponse>,
    chatbots: HashMap<ChatbotId, ChatbotDBResponse>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    fail_complete: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_subscription(&self, user_id: UserId, record: SubscriptionRecord) {
        self.inner().subscriptions.insert(user_id, record);
    }

    pub fn set_api_key(&self, user_id: UserId, api_key: &str) {
        self.inner().api_keys.insert(user_id, api_key.to_string());
    }

    pub fn add_chatbot(&self, user_id: UserId, name: &str) -> ChatbotDBResponse {
        let chatbot = ChatbotDBResponse {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.inner().chatbots.insert(chatbot.id, chatbot.clone());
        chatbot
    }

    /// Insert `count` files for a user directly, bypassing the upload path
    pub fn seed_files(&self, user_id: UserId, count: usize) {
        let mut inner = self.inner();
        for i in 0..count {
            inner.files.push(StoredFileDBResponse {
                id: Uuid::new_v4(),
                user_id,
                name: format!("seed-{i}.txt"),
                blob_url: format!("http://seed.invalid/{i}"),
                provider_file_id: format!("file-seed-{i}"),
                created_at: Utc::now(),
            });
        }
    }

    /// Make every following [`Store::complete_upload`] call fail
    pub fn fail_complete_upload(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    /// Shift an intent's timestamps into the past
    pub fn backdate_intent(&self, id: UploadIntentId, by: chrono::Duration) {
        if let Some(intent) = self.inner().intents.get_mut(&id) {
            intent.created_at -= by;
            intent.updated_at -= by;
        }
    }

    pub fn files(&self) -> Vec<StoredFileDBResponse> {
        self.inner().files.clone()
    }

    pub fn intents(&self) -> Vec<UploadIntentDBResponse> {
        let mut intents: Vec<_> = self.inner().intents.values().cloned().collect();
        intents.sort_by_key(|i| i.created_at);
        intents
    }
}

fn count_for(inner: &Inner, user_id: UserId) -> i64 {
    inner.files.iter().filter(|f| f.user_id == user_id).count() as i64
}

fn apply_update(intent: &mut UploadIntentDBResponse, request: &UploadIntentUpdateDBRequest) {
    if let Some(status) = request.status {
        intent.status = status;
    }
    if let Some(key) = &request.blob_key {
        intent.blob_key = Some(key.clone());
    }
    if let Some(url) = &request.blob_url {
        intent.blob_url = Some(url.clone());
    }
    if let Some(id) = &request.provider_file_id {
        intent.provider_file_id = Some(id.clone());
    }
    if let Some(error) = &request.error {
        intent.error = Some(error.clone());
    }
    intent.updated_at = Utc::now();
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn subscription(&self, user_id: UserId) -> Result<Option<SubscriptionRecord>> {
        Ok(self.inner().subscriptions.get(&user_id).cloned())
    }

    async fn count_files(&self, user_id: UserId) -> Result<i64> {
        Ok(count_for(&self.inner(), user_id))
    }

    async fn provider_api_key(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self
            .inner()
            .api_keys
            .get(&user_id)
            .filter(|key| !key.trim().is_empty())
            .cloned())
    }

    async fn list_files(&self, user_id: UserId, limit: i64) -> Result<Vec<StoredFileDBResponse>> {
        let inner = self.inner();
        let mut files: Vec<_> = inner.files.iter().filter(|f| f.user_id == user_id).cloned().collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        files.truncate(limit.max(0) as usize);
        Ok(files)
    }

    async fn begin_upload(&self, request: &UploadIntentCreateDBRequest) -> Result<UploadIntentDBResponse> {
        let now = Utc::now();
        let intent = UploadIntentDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            filename: request.filename.clone(),
            status: UploadIntentStatus::Pending,
            blob_key: None,
            blob_url: None,
            provider_file_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.inner().intents.insert(intent.id, intent.clone());
        Ok(intent)
    }

    async fn update_upload(&self, id: UploadIntentId, request: &UploadIntentUpdateDBRequest) -> Result<UploadIntentDBResponse> {
        let mut inner = self.inner();
        let intent = inner.intents.get_mut(&id).ok_or(DbError::NotFound)?;
        apply_update(intent, request);
        Ok(intent.clone())
    }

    async fn complete_upload(
        &self,
        intent_id: UploadIntentId,
        request: &StoredFileCreateDBRequest,
        max_files: i64,
    ) -> Result<Option<StoredFileDBResponse>> {
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow::anyhow!("injected insert failure")));
        }

        let mut inner = self.inner();
        match inner.intents.get(&intent_id) {
            None => return Err(DbError::NotFound),
            Some(intent) if intent.status != UploadIntentStatus::Pending => {
                return Err(DbError::StateConflict {
                    entity: "Upload intent",
                    expected: "pending",
                });
            }
            Some(_) => {}
        }
        if count_for(&inner, request.user_id) >= max_files {
            return Ok(None);
        }

        let file = StoredFileDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            name: request.name.clone(),
            blob_url: request.blob_url.clone(),
            provider_file_id: request.provider_file_id.clone(),
            created_at: Utc::now(),
        };
        inner.files.push(file.clone());
        if let Some(intent) = inner.intents.get_mut(&intent_id) {
            apply_update(intent, &UploadIntentUpdateDBRequest::status(UploadIntentStatus::Completed));
        }
        Ok(Some(file))
    }

    async fn stale_uploads(&self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<UploadIntentDBResponse>> {
        let mut stale: Vec<_> = self
            .inner()
            .intents
            .values()
            .filter(|i| i.status.is_open() && i.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|i| i.updated_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn claim_stale_upload(&self, id: UploadIntentId, older_than: DateTime<Utc>) -> Result<Option<UploadIntentDBResponse>> {
        let mut inner = self.inner();
        let Some(intent) = inner.intents.get_mut(&id) else {
            return Ok(None);
        };
        if !intent.status.is_open() || intent.updated_at >= older_than {
            return Ok(None);
        }
        apply_update(
            intent,
            &UploadIntentUpdateDBRequest::status(UploadIntentStatus::Failed).with_error(SWEEP_CLAIM_ERROR),
        );
        Ok(Some(intent.clone()))
    }

    async fn get_chatbot(&self, id: ChatbotId) -> Result<Option<ChatbotDBResponse>> {
        Ok(self.inner().chatbots.get(&id).cloned())
    }
}
