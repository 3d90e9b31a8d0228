use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::config::DatabaseSettings;
use crate::core::features::FEATURE_COUNT;
use crate::ml::dataset::Dataset;
use crate::models::{BloodGroup, DonorCandidate, Location, MatchRecord, OrganType, PatientRequest};
use crate::services::registry::{Registry, RegistryError};

/// PostgreSQL-backed registry of donors, cases and match results
#[derive(Debug, Clone)]
pub struct PostgresRegistry {
    pool: PgPool,
}

impl PostgresRegistry {
    /// Connect, apply migrations and return the registry
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
        statement_timeout_ms: u64,
    ) -> Result<Self, RegistryError> {
        let options = database_url
            .parse::<PgConnectOptions>()?
            .options([("statement_timeout", statement_timeout_ms.to_string())]);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, RegistryError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            &settings.url,
            settings.max_connections.unwrap_or(10),
            settings.min_connections.unwrap_or(1),
            Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(settings.idle_timeout_secs.unwrap_or(600)),
            settings.statement_timeout_ms.unwrap_or(5000),
        )
        .await
    }

    /// Record whether a proposed match led to a successful donation.
    /// These outcomes become training history.
    pub async fn record_outcome(&self, match_id: i64, success: bool) -> Result<(), RegistryError> {
        let query = r#"
            INSERT INTO match_outcomes (match_id, success, recorded_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (match_id)
            DO UPDATE SET
                success = EXCLUDED.success,
                recorded_at = EXCLUDED.recorded_at
        "#;

        sqlx::query(query)
            .bind(match_id)
            .bind(success)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Recorded outcome for match {}: success={}", match_id, success);
        Ok(())
    }

    /// Persisted match features joined with their recorded outcomes
    pub async fn training_history(&self) -> Result<Dataset, RegistryError> {
        let query = r#"
            SELECT m.features, o.success
            FROM matches m
            JOIN match_outcomes o ON o.match_id = m.id
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        let mut history = Dataset::with_capacity(rows.len());
        let mut skipped = 0usize;

        for row in &rows {
            let features: Vec<f64> = row.try_get("features")?;
            let success: bool = row.try_get("success")?;

            match <[f64; FEATURE_COUNT]>::try_from(features.as_slice()) {
                Ok(values) if values.iter().all(|v| v.is_finite()) => history.push_row(values, success),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} outcomes with an unexpected feature layout", skipped);
        }
        tracing::info!("Loaded {} historical outcomes", history.len());

        Ok(history)
    }
}

fn text_column<T>(row: &PgRow, column: &str) -> Result<T, RegistryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: T::Err| RegistryError::CorruptRow(format!("{}: {}", column, e)))
}

fn non_negative(row: &PgRow, column: &str) -> Result<u32, RegistryError> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| RegistryError::CorruptRow(format!("{}: {}", column, value)))
}

fn location_from_row(row: &PgRow) -> Result<Location, RegistryError> {
    Ok(Location {
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
    })
}

fn donor_from_row(row: &PgRow) -> Result<DonorCandidate, RegistryError> {
    Ok(DonorCandidate {
        donor_id: row.try_get("id")?,
        organ_type: text_column(row, "organ_type")?,
        blood_group: text_column(row, "blood_group")?,
        age: non_negative(row, "age")?,
        location: location_from_row(row)?,
        is_available: row.try_get("is_available")?,
        approval_status: text_column(row, "approval_status")?,
        reliability_score: row.try_get("reliability_score")?,
        registered_at: row.try_get("registered_at")?,
    })
}

fn case_from_row(row: &PgRow) -> Result<PatientRequest, RegistryError> {
    let urgency: i16 = row.try_get("urgency_level")?;
    let urgency_level = u8::try_from(urgency)
        .map_err(|_| RegistryError::CorruptRow(format!("urgency_level: {}", urgency)))?;

    Ok(PatientRequest {
        organ_type: text_column(row, "organ_type")?,
        blood_group: text_column(row, "blood_group")?,
        age: non_negative(row, "age")?,
        urgency_level,
        location: location_from_row(row)?,
    })
}

impl Registry for PostgresRegistry {
    async fn find_candidates(
        &self,
        organ_type: OrganType,
        blood_groups: &[BloodGroup],
    ) -> Result<Vec<DonorCandidate>, RegistryError> {
        let query = r#"
            SELECT id, organ_type, blood_group, age, city, state, latitude, longitude,
                   is_available, approval_status, reliability_score, registered_at
            FROM donors
            WHERE organ_type = $1
              AND blood_group = ANY($2)
              AND is_available = TRUE
              AND approval_status = 'approved'
        "#;

        let groups: Vec<&str> = blood_groups.iter().map(BloodGroup::as_str).collect();

        let rows = sqlx::query(query)
            .bind(organ_type.as_str())
            .bind(&groups)
            .fetch_all(&self.pool)
            .await?;

        let candidates = collect_candidates(rows.iter().map(donor_from_row))?;

        tracing::debug!(
            "Found {} {} candidates for blood groups {:?}",
            candidates.len(),
            organ_type,
            groups
        );

        Ok(candidates)
    }

    async fn find_case(&self, case_id: i64) -> Result<Option<PatientRequest>, RegistryError> {
        let query = r#"
            SELECT organ_type, blood_group, age, urgency_level, city, state, latitude, longitude
            FROM cases
            WHERE id = $1
        "#;

        let row = sqlx::query(query)
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(case_from_row).transpose()
    }

    async fn record_matches(&self, records: &[MatchRecord]) -> Result<(), RegistryError> {
        let query = r#"
            INSERT INTO matches (
                case_id, donor_id, compatibility_score, distance_km, match_probability,
                urgency_weight, final_score, blood_compatible, organ_match, age_compatible,
                status, features, model_version, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#;

        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(query)
                .bind(record.case_id)
                .bind(record.donor_id)
                .bind(record.compatibility_score)
                .bind(record.distance_km)
                .bind(record.match_probability)
                .bind(record.urgency_weight)
                .bind(record.final_score)
                .bind(record.blood_compatible)
                .bind(record.organ_match)
                .bind(record.age_compatible)
                .bind(&record.status)
                .bind(&record.features)
                .bind(&record.model_version)
                .bind(record.created_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!("Persisted {} match records", records.len());
        Ok(())
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, RegistryError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

/// Keep decodable donor rows. A corrupt row is left out of the ranking and
/// reported; any other error aborts the query.
fn collect_candidates<I>(rows: I) -> Result<Vec<DonorCandidate>, RegistryError>
where
    I: IntoIterator<Item = Result<DonorCandidate, RegistryError>>,
{
    let mut candidates = Vec::new();
    let mut skipped = 0usize;

    for row in rows {
        match row {
            Ok(donor) => candidates.push(donor),
            Err(RegistryError::CorruptRow(reason)) => {
                skipped += 1;
                tracing::warn!("Skipping corrupt donor row: {}", reason);
            }
            Err(e) => return Err(e),
        }
    }

    if skipped > 0 {
        tracing::warn!(
            "{} corrupt donor rows excluded from ranking ({} usable)",
            skipped,
            candidates.len()
        );
    }

    Ok(candidates)
}
