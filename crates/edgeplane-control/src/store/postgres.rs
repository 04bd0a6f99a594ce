//! PostgreSQL entity store implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::entity::Collection;
use crate::error::{ControlError, ControlResult};

use super::{check_filters, record_id, Filter, PersistenceService, Record};

/// PostgreSQL-backed entity store.
///
/// Every collection shares one `entities` table; the entity body is kept as
/// JSONB so filters can address any top-level field.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(config: &DatabaseConfig) -> ControlResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> ControlResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the required tables exist.
    async fn ensure_schema(&self) -> ControlResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_entities_created_at
            ON entities (collection, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn bodies(rows: &[sqlx::postgres::PgRow]) -> Vec<Record> {
        rows.iter().map(|row| row.get("body")).collect()
    }
}

#[async_trait]
impl PersistenceService for PostgresStore {
    async fn create(&self, collection: Collection, record: Record) -> ControlResult<()> {
        let id = record_id(&record)?;

        sqlx::query(
            r#"
            INSERT INTO entities (collection, id, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(collection.name)
        .bind(id)
        .bind(&record)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read(&self, collection: Collection, id: &str) -> ControlResult<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT body FROM entities
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("body")))
    }

    async fn read_all(&self, collection: Collection) -> ControlResult<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM entities
            WHERE collection = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(collection.name)
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::bodies(&rows))
    }

    async fn filter(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> ControlResult<Vec<Record>> {
        check_filters(collection, filters)?;

        // Field names are bound as parameters too; `->>` takes the key as text.
        let mut query = String::from("SELECT body FROM entities WHERE collection = $1");
        for i in 0..filters.len() {
            let key = 2 + i * 2;
            query.push_str(&format!(" AND body ->> ${key} = ${}", key + 1));
        }
        query.push_str(" ORDER BY created_at, id");

        let mut sqlx_query = sqlx::query(&query).bind(collection.name);
        for f in filters {
            sqlx_query = sqlx_query.bind(&f.field).bind(&f.value);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        Ok(Self::bodies(&rows))
    }

    async fn bulk_update(&self, collection: Collection, records: Vec<Record>) -> ControlResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for record in &records {
            let id = record_id(record)?;
            let result = sqlx::query(
                r#"
                UPDATE entities
                SET body = $1, updated_at = $4
                WHERE collection = $2 AND id = $3
                "#,
            )
            .bind(record)
            .bind(collection.name)
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back earlier rows.
                return Err(ControlError::NotFound {
                    collection: collection.name,
                    id: id.to_owned(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> ControlResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM entities WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.name)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> ControlResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entity::{generate_id, App, Entity, PortSpec};
    use crate::store::StoreExt;

    fn get_database_url() -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    async fn connect() -> PostgresStore {
        let url = get_database_url().expect("DATABASE_URL not set");
        let config = DatabaseConfig {
            url,
            ..DatabaseConfig::default()
        };
        PostgresStore::new(&config).await.expect("failed to connect")
    }

    fn test_app(vendor: &str) -> App {
        App {
            id: generate_id(),
            app_type: "vm".to_owned(),
            name: "gateway".to_owned(),
            vendor: vendor.to_owned(),
            description: String::new(),
            version: "2.0.1".to_owned(),
            cores: 1,
            memory: 512,
            ports: vec![PortSpec {
                port: 443,
                protocol: "tcp".to_owned(),
            }],
            source: "https://images.example.com/gateway.qcow2".to_owned(),
        }
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn create_and_read() {
        let store = connect().await;
        let app = test_app("acme");

        store.create_entity(&app).await.expect("create failed");

        let retrieved: App = store
            .read_entity(&app.id)
            .await
            .expect("read failed")
            .expect("app not found");
        assert_eq!(retrieved, app);

        assert!(store.delete_entity::<App>(&app.id).await.expect("delete failed"));
        assert!(!store.delete_entity::<App>(&app.id).await.expect("delete failed"));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn filter_by_renamed_field() {
        let store = connect().await;
        let vendor = generate_id();
        let app = test_app(&vendor);
        store.create_entity(&app).await.expect("create failed");

        let found: Vec<App> = store
            .filter_entities(&[Filter::new("vendor", &vendor), Filter::new("type", "vm")])
            .await
            .expect("filter failed");
        assert_eq!(found.len(), 1);

        let err = store
            .filter(App::collection(), &[Filter::new("source", "x")])
            .await
            .expect_err("source is not filterable");
        assert!(matches!(err, ControlError::DisallowedFilter { .. }));

        store.delete_entity::<App>(&app.id).await.expect("delete failed");
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn bulk_update_rolls_back() {
        let store = connect().await;
        let mut app = test_app("acme");
        store.create_entity(&app).await.expect("create failed");

        app.version = "2.0.2".to_owned();
        let ghost = test_app("acme");
        let result = store.bulk_update_entities(vec![app.clone(), ghost]).await;
        assert!(matches!(result, Err(ControlError::NotFound { .. })));

        let unchanged: App = store
            .read_entity(&app.id)
            .await
            .expect("read failed")
            .expect("app not found");
        assert_eq!(unchanged.version, "2.0.1");

        store.delete_entity::<App>(&app.id).await.expect("delete failed");
    }
}
