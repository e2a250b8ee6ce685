//! Persistence for `analysis_results` rows. Results are written once by the
//! worker and never updated.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::result::{AnalysisResult, NewResult};

const RESULT_COLUMNS: &str = "id, job_id, image_id, algorithm_version, algorithm_parameters, \
     payload, confidence_score, processing_time_ms, quality_metrics, created_at";

fn result_from_row(row: &PgRow) -> Result<AnalysisResult, sqlx::Error> {
    Ok(AnalysisResult {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        image_id: row.try_get("image_id")?,
        algorithm_version: row.try_get("algorithm_version")?,
        algorithm_parameters: row.try_get("algorithm_parameters")?,
        payload: row.try_get("payload")?,
        confidence_score: row.try_get("confidence_score")?,
        processing_time_ms: row.try_get("processing_time_ms")?,
        quality_metrics: row.try_get("quality_metrics")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Persist a freshly computed result.
pub async fn insert_result(pool: &PgPool, new: &NewResult) -> Result<AnalysisResult, QueueError> {
    let sql = format!(
        r#"
        INSERT INTO analysis_results
            (job_id, image_id, algorithm_version, algorithm_parameters,
             payload, confidence_score, processing_time_ms, quality_metrics)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {RESULT_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(new.job_id)
        .bind(&new.image_id)
        .bind(&new.algorithm_version)
        .bind(&new.algorithm_parameters)
        .bind(&new.payload)
        .bind(new.confidence_score)
        .bind(new.processing_time_ms)
        .bind(&new.quality_metrics)
        .fetch_one(pool)
        .await?;

    Ok(result_from_row(&row)?)
}

/// Get a result by ID
pub async fn get_result(
    pool: &PgPool,
    result_id: Uuid,
) -> Result<Option<AnalysisResult>, QueueError> {
    let sql = format!("SELECT {RESULT_COLUMNS} FROM analysis_results WHERE id = $1");

    let row = sqlx::query(&sql)
        .bind(result_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => Ok(Some(result_from_row(&r)?)),
        None => Ok(None),
    }
}
