use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventQuery, EventStoreError, Result, Snapshot,
    StoreConfig, Version,
    store::{AppendOptions, EventStore, EventStream, assign_versions, validate_events_for_append},
};

const EVENT_COLUMNS: &str =
    "id, event_type, category, aggregate_id, version, occurred_at, payload, metadata";

/// PostgreSQL-backed event store implementation.
///
/// Each stream has a row in `streams` holding its length. An append advances
/// that row with a conditional upsert inside the same transaction that
/// inserts the events, so racing writers are serialized by the row lock and
/// the loser sees a version mismatch. The `(category, aggregate_id, version)`
/// unique constraint on `events` backs this up.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.database_url)
            .await?;
        tracing::info!(max_connections = config.max_connections, "event store pool connected");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            category: row.try_get("category")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            version: Version::new(row.try_get("version")?),
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn fetch_stream(
        &self,
        category: &str,
        aggregate_id: AggregateId,
        after: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE category = $1 AND aggregate_id = $2 AND version > $3 \
             ORDER BY version ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(category)
            .bind(aggregate_id.as_uuid())
            .bind(after.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events, options), fields(count = events.len()))]
    async fn append(
        &self,
        mut events: Vec<EventEnvelope>,
        options: AppendOptions,
    ) -> Result<Version> {
        validate_events_for_append(&events)?;

        let category = events[0].category.clone();
        let aggregate_id = events[0].aggregate_id;
        let count = events.len() as i64;

        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.pool.begin().await?;

        let advanced: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO streams (category, aggregate_id, version)
            VALUES ($1, $2, $3)
            ON CONFLICT (category, aggregate_id) DO UPDATE
                SET version = streams.version + EXCLUDED.version
                WHERE $4::BIGINT IS NULL OR streams.version = $4
            RETURNING version
            "#,
        )
        .bind(&category)
        .bind(aggregate_id.as_uuid())
        .bind(count)
        .bind(options.expected_version.map(|v| v.as_i64()))
        .fetch_optional(&mut *tx)
        .await?;

        let conflict = match (advanced, options.expected_version) {
            (None, _) => true,
            // A fresh row was inserted although a non-empty stream was expected.
            (Some(new), Some(expected)) => new != expected.as_i64() + count,
            (Some(_), None) => false,
        };

        if conflict {
            let expected = options.expected_version.unwrap_or_default();
            let actual: Option<i64> = sqlx::query_scalar(
                "SELECT version FROM streams WHERE category = $1 AND aggregate_id = $2",
            )
            .bind(&category)
            .bind(aggregate_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

            metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
            tracing::warn!(%category, %aggregate_id, %expected, "append rejected: concurrency conflict");
            return Err(EventStoreError::ConcurrencyConflict {
                category,
                aggregate_id,
                expected,
                actual: Version::new(actual.unwrap_or(0)),
            });
        }

        let new_version = Version::new(advanced.unwrap_or(count));
        assign_versions(&mut events, Version::new(new_version.as_i64() - count));

        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO events (id, event_type, category, aggregate_id, version, occurred_at, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(&event.category)
            .bind(event.aggregate_id.as_uuid())
            .bind(event.version.as_i64())
            .bind(event.occurred_at)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        category: category.clone(),
                        aggregate_id,
                        expected: options.expected_version.unwrap_or_default(),
                        actual: event.version,
                    };
                }
                EventStoreError::from(e)
            })?;
        }

        tx.commit().await?;

        metrics::counter!("event_store_events_appended_total").increment(count as u64);
        tracing::debug!(version = %new_version, "events appended");
        Ok(new_version)
    }

    async fn load_events(
        &self,
        category: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.fetch_stream(category, aggregate_id, Version::initial())
            .await
    }

    async fn load_events_after(
        &self,
        category: &str,
        aggregate_id: AggregateId,
        after: Version,
    ) -> Result<Vec<EventEnvelope>> {
        self.fetch_stream(category, aggregate_id, after).await
    }

    async fn count_events(&self, category: &str, aggregate_id: AggregateId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE category = $1 AND aggregate_id = $2",
        )
        .bind(category)
        .bind(aggregate_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn get_version(&self, category: &str, aggregate_id: AggregateId) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM streams WHERE category = $1 AND aggregate_id = $2",
        )
        .bind(category)
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(Version::new(version.unwrap_or(0)))
    }

    async fn search_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.category.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND category = ${param_count}"));
        }
        if query.aggregate_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ${param_count}"));
        }
        if query.event_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ANY(${param_count})"));
        }
        if query.from_version.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND version >= ${param_count}"));
        }
        if query.to_version.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND version <= ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND occurred_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY position ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        // Build and execute query with parameters
        let mut sqlx_query = sqlx::query(&sql);

        if let Some(category) = query.category {
            sqlx_query = sqlx_query.bind(category);
        }
        if let Some(id) = query.aggregate_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(event_types) = query.event_types {
            sqlx_query = sqlx_query.bind(event_types);
        }
        if let Some(from_version) = query.from_version {
            sqlx_query = sqlx_query.bind(from_version.as_i64());
        }
        if let Some(to_version) = query.to_version {
            sqlx_query = sqlx_query.bind(to_version.as_i64());
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(
            r#"
            SELECT id, event_type, category, aggregate_id, version, occurred_at, payload, metadata
            FROM events
            ORDER BY position ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_event(row),
            Err(e) => Err(EventStoreError::from(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (category, aggregate_id, version, taken_at, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (category, aggregate_id) DO UPDATE SET
                version = EXCLUDED.version,
                taken_at = EXCLUDED.taken_at,
                state = EXCLUDED.state
            WHERE snapshots.version <= EXCLUDED.version
            "#,
        )
        .bind(&snapshot.category)
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(snapshot.version.as_i64())
        .bind(snapshot.taken_at)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        metrics::counter!("event_store_snapshots_saved_total").increment(1);
        Ok(())
    }

    async fn load_snapshot(
        &self,
        category: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT category, aggregate_id, version, taken_at, state
            FROM snapshots
            WHERE category = $1 AND aggregate_id = $2
            "#,
        )
        .bind(category)
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                category: row.try_get("category")?,
                version: Version::new(row.try_get("version")?),
                taken_at: row.try_get::<DateTime<Utc>, _>("taken_at")?,
                state: row.try_get("state")?,
            })),
            None => Ok(None),
        }
    }
}
