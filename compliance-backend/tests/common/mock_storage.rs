// tests/common/mock_storage.rs

use async_trait::async_trait;
use compliance_backend::error::{AppError, AppResult};
use compliance_backend::service::storage_service::StorageService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// テスト用のモックストレージサービス
#[derive(Clone, Default)]
pub struct MockStorageService {
    storage: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_uploads: Arc<AtomicBool>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    /// true の間はアップロードを外部サービスエラーにする
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let storage = self.storage.lock().unwrap();
        let mut keys: Vec<String> = storage
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.storage.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: &str) -> AppResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::ExternalServiceError(
                "mock storage unavailable".to_string(),
            ));
        }
        let mut storage = self.storage.lock().unwrap();
        storage.insert(key.to_string(), data);
        Ok(())
    }

    async fn download(&self, key: &str) -> AppResult<Vec<u8>> {
        let storage = self.storage.lock().unwrap();
        storage
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut storage = self.storage.lock().unwrap();
        storage.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let storage = self.storage.lock().unwrap();
        Ok(storage.contains_key(key))
    }
}
