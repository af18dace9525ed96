//! SQLite implementation of [`PersistenceGateway`].

pub mod schema;

use async_trait::async_trait;
use printwatch_shared::{CapturedFrame, PartDescriptor, PersistenceError, PersistenceGateway, SlicerSettings};
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::DatabaseConfig;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn db_err(e: sqlx::Error) -> PersistenceError {
    PersistenceError::Database(e.to_string())
}

pub struct SqliteGateway {
    pool: SqlitePool,
    // serialises find-or-create so two callers cannot both miss and insert
    write_lock: Mutex<()>,
}

impl SqliteGateway {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true);
        // every connection to an in-memory database is a separate database
        let max_connections = if config.url.contains(":memory:") { 1 } else { config.max_connections.max(1) };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to open database '{}': {}", config.url, e);
                db_err(e)
            })?;
        let gateway = Self::from_pool(pool);
        gateway.init_schema().await?;
        tracing::info!(url = %config.url, "Connected to database");
        Ok(gateway)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool, write_lock: Mutex::new(()) }
    }

    pub async fn init_schema(&self) -> Result<(), PersistenceError> {
        for statement in schema::ALL {
            sqlx::query(statement).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_settings<'q>(query: SqliteQuery<'q>, s: &'q SlicerSettings) -> SqliteQuery<'q> {
    query
        .bind(s.slicer_profile.as_str())
        .bind(s.sparse_infill_density)
        .bind(s.sparse_infill_pattern.as_deref())
        .bind(s.sparse_infill_speed)
        .bind(s.first_layer_bed_temperature)
        .bind(s.bed_temperature_other_layers)
        .bind(s.first_layer_nozzle_temperature)
        .bind(s.nozzle_temperature_other_layers)
        .bind(s.travel_speed)
        .bind(s.first_layer_height)
        .bind(s.layer_height_other_layers)
        .bind(s.line_width)
        .bind(s.retraction_length)
        .bind(s.filament_flow_ratio)
        .bind(s.printer_name.as_str())
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn insert_image(&self, frame: &CapturedFrame) -> Result<i64, PersistenceError> {
        let result = sqlx::query(
            "INSERT INTO image_data (image, timestamp, slicer_settings_id, parts_id, label, layer) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(frame.image.as_slice())
        .bind(frame.timestamp)
        .bind(frame.slicer_settings_id)
        .bind(frame.part_id)
        .bind(frame.label)
        .bind(i64::from(frame.layer))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    async fn find_or_create_slicer_settings(&self, settings: &SlicerSettings) -> Result<i64, PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let select_sql = schema::select_slicer_settings_sql();
        let existing = bind_settings(sqlx::query(&select_sql), settings)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if let Some(row) = existing {
            let id: i64 = row.try_get("id").map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            tracing::debug!(id, "Reusing slicer settings row");
            return Ok(id);
        }

        let insert_sql = schema::insert_slicer_settings_sql();
        let id = bind_settings(sqlx::query(&insert_sql), settings)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .last_insert_rowid();
        tx.commit().await.map_err(db_err)?;
        tracing::info!(id, known = settings.known_parameter_count(), "Inserted slicer settings row");
        Ok(id)
    }

    async fn find_or_create_part(&self, part: &PartDescriptor) -> Result<i64, PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM parts WHERE name = ? AND url = ? AND general_image = ? ORDER BY id LIMIT 1",
        )
        .bind(part.name.as_str())
        .bind(part.url_or_default())
        .bind(part.image_or_default())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if let Some(id) = existing {
            tx.commit().await.map_err(db_err)?;
            tracing::debug!(id, name = %part.name, "Reusing part row");
            return Ok(id);
        }

        let id = sqlx::query("INSERT INTO parts (name, url, general_image) VALUES (?, ?, ?)")
            .bind(part.name.as_str())
            .bind(part.url_or_default())
            .bind(part.image_or_default())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .last_insert_rowid();
        tx.commit().await.map_err(db_err)?;
        tracing::info!(id, name = %part.name, "Inserted part row");
        Ok(id)
    }
}
