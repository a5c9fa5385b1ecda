//! インメモリSQLiteにマイグレーションを適用したテスト用DB

use compliance_backend::db::create_in_memory_pool;
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;

pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let connection = create_in_memory_pool().await.expect("open sqlite memory db");

        Migrator::up(&connection, None)
            .await
            .expect("run migrations");

        Self { connection }
    }
}
