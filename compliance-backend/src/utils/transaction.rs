// compliance-backend/src/utils/transaction.rs

//! トランザクション管理とリトライ設定
//!
//! 削除処理のように複数テーブルを書き換える操作を単一トランザクションで実行します。

use crate::error::AppError;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::future::Future;
use tracing::{debug, error, info, instrument, warn};

// =============================================================================
// トランザクション管理トレイト
// =============================================================================

/// トランザクション実行を抽象化するトレイト
pub trait TransactionManager {
    /// トランザクション内で操作を実行
    #[allow(clippy::manual_async_fn)]
    fn execute_in_transaction<F, R>(
        &self,
        operation: F,
    ) -> impl std::future::Future<Output = Result<R, AppError>> + Send
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<R, AppError>>
            + Send
            + 'static,
        R: Send + 'static;
}

// Future型エイリアス（Boxed Future）
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// DatabaseConnection への実装
impl TransactionManager for DatabaseConnection {
    #[instrument(skip(self, operation), name = "database_transaction")]
    #[allow(clippy::manual_async_fn)]
    fn execute_in_transaction<F, R>(
        &self,
        operation: F,
    ) -> impl std::future::Future<Output = Result<R, AppError>> + Send
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<R, AppError>>
            + Send
            + 'static,
        R: Send + 'static,
    {
        async move {
            let transaction_start = std::time::Instant::now();

            debug!("Starting database transaction");

            let txn = self.begin().await.map_err(|e| {
                error!(error = %e, "Failed to begin transaction");
                AppError::DbErr(e)
            })?;

            match operation(&txn).await {
                Ok(value) => {
                    txn.commit().await.map_err(|e| {
                        error!(error = %e, "Failed to commit transaction");
                        AppError::DbErr(e)
                    })?;

                    info!(
                        duration_ms = transaction_start.elapsed().as_millis(),
                        "Transaction completed successfully"
                    );

                    Ok(value)
                }
                Err(app_error) => {
                    warn!(error = %app_error, "Transaction operation failed, rolling back");

                    if let Err(rollback_error) = txn.rollback().await {
                        error!(
                            original_error = %app_error,
                            rollback_error = %rollback_error,
                            "Failed to rollback transaction"
                        );
                        return Err(AppError::InternalServerError(
                            "Transaction failed and rollback also failed".to_string(),
                        ));
                    }

                    Err(app_error)
                }
            }
        }
    }
}

// =============================================================================
// リトライ設定
// =============================================================================

/// リトライ設定
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        }
    }
}

/// エラーがリトライ可能かどうかを判定
///
/// 接続・実行エラーと外部サービス (ストレージ等) の失敗のみ一時的とみなす
pub fn should_retry(error: &AppError) -> bool {
    match error {
        AppError::DbErr(db_err) => matches!(
            db_err,
            sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_) | sea_orm::DbErr::Exec(_)
        ),
        AppError::ExternalServiceError(_) => true,
        _ => false,
    }
}

/// 指数バックオフでディレイを計算
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> u64 {
    let exponent = attempt.saturating_sub(1).min(20);
    let delay = config.base_delay_ms.saturating_mul(2u64.pow(exponent));
    delay.min(config.max_delay_ms)
}

// =============================================================================
// テスト
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 1000);
    }

    #[test]
    fn test_calculate_delay() {
        let config = RetryConfig::default();

        assert_eq!(calculate_delay(1, &config), 100);
        assert_eq!(calculate_delay(2, &config), 200);
        assert_eq!(calculate_delay(3, &config), 400);
        assert_eq!(calculate_delay(10, &config), 1000); // max_delay_ms で制限
        assert_eq!(calculate_delay(u32::MAX, &config), 1000);
    }

    #[test]
    fn test_should_retry() {
        // リトライ不可能なエラー
        assert!(!should_retry(&AppError::NotFound("test".to_string())));
        assert!(!should_retry(&AppError::Conflict("test".to_string())));

        // 一時的なエラー
        assert!(should_retry(&AppError::ExternalServiceError(
            "storage".to_string()
        )));
        assert!(should_retry(&AppError::DbErr(sea_orm::DbErr::Exec(
            sea_orm::RuntimeErr::Internal("deadlock".to_string())
        ))));
    }
}
