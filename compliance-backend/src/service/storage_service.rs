// compliance-backend/src/service/storage_service.rs

//! エクスポートアーカイブ・削除証明書・電子署名アーカイブの保存先

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::utils::error_helper::external_service_error;

/// ストレージプロバイダーの種類
#[derive(Debug, Clone, PartialEq)]
pub enum StorageProvider {
    Local,
    S3,
}

impl StorageProvider {
    /// 環境変数からプロバイダーを判定
    pub fn from_env() -> Self {
        match std::env::var("STORAGE_PROVIDER")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "s3" | "minio" | "r2" => Self::S3,
            _ => Self::Local,
        }
    }
}

/// ストレージサービスのトレイト定義
#[async_trait]
pub trait StorageService: Send + Sync {
    /// 指定キーにファイルを保存 (既存のキーは上書き)
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<()>;

    /// ファイルをダウンロード
    async fn download(&self, key: &str) -> AppResult<Vec<u8>>;

    /// ファイルを削除 (存在しない場合も成功)
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// ファイルの存在確認
    async fn exists(&self, key: &str) -> AppResult<bool>;
}

/// S3互換ストレージサービスの実装
pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub async fn new(config: &StorageConfig) -> AppResult<Self> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| AppError::InternalServerError("STORAGE_BUCKET not set".to_string()))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "compliance_storage",
            ));
        }

        let shared_config = loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared_config);

        // MinIO等のS3互換サービスはpath styleを強制
        if let Some(endpoint) = &config.endpoint {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(s3_config.build()),
            bucket,
        })
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| external_service_error(e, "s3_storage_service::upload"))?;

        Ok(())
    }

    async fn download(&self, key: &str) -> AppResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::NotFound(format!("Arquivo não encontrado: {}", e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| external_service_error(e, "s3_storage_service::download"))?;

        Ok(data.to_vec())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| external_service_error(e, "s3_storage_service::delete"))?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                // オブジェクトが存在しない場合は false を返す
                if e.to_string().contains("NotFound") || e.to_string().contains("404") {
                    Ok(false)
                } else {
                    Err(external_service_error(e, "s3_storage_service::exists"))
                }
            }
        }
    }
}

/// ローカルディスクへの保存 (開発環境・単一ノード用)
pub struct LocalStorageService {
    root: PathBuf,
}

impl LocalStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// キーをルート配下のパスに変換する。ルート外を指すキーは拒否
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let relative = Path::new(key);
        let is_safe = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !is_safe {
            return Err(AppError::BadRequest(format!("Chave de arquivo inválida: {}", key)));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| external_service_error(e, "local_storage_service::upload"))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| external_service_error(e, "local_storage_service::upload"))
    }

    async fn download(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("Arquivo não encontrado".to_string()))
            }
            Err(e) => Err(external_service_error(e, "local_storage_service::download")),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(external_service_error(e, "local_storage_service::delete")),
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| external_service_error(e, "local_storage_service::exists"))
    }
}

/// ストレージ設定
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub local_dir: PathBuf,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl StorageConfig {
    /// 環境変数から設定を読み込み
    pub fn from_env() -> Self {
        let provider = StorageProvider::from_env();
        tracing::info!("Storage provider: {:?}", provider);

        Self {
            provider,
            local_dir: std::env::var("STORAGE_LOCAL_DIR")
                .unwrap_or_else(|_| "./storage".to_string())
                .into(),
            endpoint: std::env::var("STORAGE_ENDPOINT").ok(),
            bucket: std::env::var("STORAGE_BUCKET").ok(),
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "sa-east-1".to_string()),
            access_key: std::env::var("STORAGE_ACCESS_KEY").ok(),
            secret_key: std::env::var("STORAGE_SECRET_KEY").ok(),
        }
    }
}

/// ストレージサービスのファクトリ関数
pub async fn create_storage_service(config: &StorageConfig) -> AppResult<Arc<dyn StorageService>> {
    match config.provider {
        StorageProvider::S3 => Ok(Arc::new(S3StorageService::new(config).await?)),
        StorageProvider::Local => Ok(Arc::new(LocalStorageService::new(config.local_dir.clone()))),
    }
}
