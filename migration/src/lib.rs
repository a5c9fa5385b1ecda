// migration/src/lib.rs
pub use sea_orm_migration::prelude::*;

// ユーザー・CRMエンティティ
mod m20250801_000001_create_users_table;
mod m20250801_000002_create_crm_tables;

// 同意管理
mod m20250801_000003_create_consent_tables;

// コンプライアンス監査ログ
mod m20250801_000004_create_compliance_audit_logs_table;

// 削除・エクスポートのワークフロー
mod m20250801_000005_create_deletion_requests_table;
mod m20250801_000006_create_export_requests_table;

// 電子署名・DPO
mod m20250801_000007_create_esign_tables;
mod m20250801_000008_create_data_breaches_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            // 1. 基本テーブル作成（依存関係なし）
            Box::new(m20250801_000001_create_users_table::Migration),
            Box::new(m20250801_000002_create_crm_tables::Migration),
            // 2. コンプライアンス関連
            Box::new(m20250801_000003_create_consent_tables::Migration),
            Box::new(m20250801_000004_create_compliance_audit_logs_table::Migration),
            Box::new(m20250801_000005_create_deletion_requests_table::Migration),
            Box::new(m20250801_000006_create_export_requests_table::Migration),
            // 3. 電子署名・DPOツール
            Box::new(m20250801_000007_create_esign_tables::Migration),
            Box::new(m20250801_000008_create_data_breaches_table::Migration),
        ]
    }
}
