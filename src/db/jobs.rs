//! Durable home for `analysis_jobs` rows and the sole enforcer of valid
//! state transitions.
//!
//! Every status write is a compare-and-swap `UPDATE ... WHERE id = $1 AND
//! status = $expected`; zero affected rows means another actor moved the job
//! first and the caller gets a `Conflict` to branch on. Rows are never
//! deleted; terminal jobs stay behind for audit.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use strum::EnumString;
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::job::{AlgorithmType, AnalysisJob, JobPriority, JobStatus};

const JOB_COLUMNS: &str = "id, image_id, requester_id, algorithm_type, parameters, status, \
     priority, retry_count, max_retries, error_message, last_error_at, created_at, \
     started_at, completed_at, estimated_completion_at, worker_id, result_id";

/// Fields supplied by the enqueue operation.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub image_id: String,
    pub requester_id: String,
    pub algorithm_type: AlgorithmType,
    pub parameters: serde_json::Value,
    pub priority: JobPriority,
    pub max_retries: i32,
}

/// Side data attached to a transition. Only the fields relevant to the
/// target status are applied; the rest are ignored by the SQL.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    /// Required when moving to `processing`.
    pub worker_id: Option<String>,
    /// Recorded on `retrying` and `failed`.
    pub error_message: Option<String>,
    /// Recorded on `completed`.
    pub result_id: Option<Uuid>,
}

fn job_from_row(row: &PgRow) -> Result<AnalysisJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".into(),
            source: Box::new(e),
        })?;

    let priority: String = row.try_get("priority")?;
    let priority = priority
        .parse::<JobPriority>()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "priority".into(),
            source: Box::new(e),
        })?;

    let algorithm_type: String = row.try_get("algorithm_type")?;
    let algorithm_type =
        algorithm_type
            .parse::<AlgorithmType>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "algorithm_type".into(),
                source: Box::new(e),
            })?;

    Ok(AnalysisJob {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        requester_id: row.try_get("requester_id")?,
        algorithm_type,
        parameters: row.try_get("parameters")?,
        status,
        priority,
        retry_count: row.try_get("retry_count")?,
        max_retries: row.try_get("max_retries")?,
        error_message: row.try_get("error_message")?,
        last_error_at: row.try_get("last_error_at")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        estimated_completion_at: row.try_get("estimated_completion_at")?,
        worker_id: row.try_get("worker_id")?,
        result_id: row.try_get("result_id")?,
    })
}

/// Insert a new job in `queued`.
pub async fn enqueue(pool: &PgPool, new: &NewJob) -> Result<AnalysisJob, QueueError> {
    let sql = format!(
        r#"
        INSERT INTO analysis_jobs
            (image_id, requester_id, algorithm_type, parameters, status, priority, max_retries)
        VALUES ($1, $2, $3, $4, 'queued', $5, $6)
        RETURNING {JOB_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(&new.image_id)
        .bind(&new.requester_id)
        .bind(new.algorithm_type.to_string())
        .bind(&new.parameters)
        .bind(new.priority.to_string())
        .bind(new.max_retries)
        .fetch_one(pool)
        .await?;

    Ok(job_from_row(&row)?)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<AnalysisJob>, QueueError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = $1");

    let row = sqlx::query(&sql).bind(job_id).fetch_optional(pool).await?;

    match row {
        Some(r) => Ok(Some(job_from_row(&r)?)),
        None => Ok(None),
    }
}

/// Compare-and-swap transition: succeeds only if the row's current status
/// equals `from`. This is the sole write path for `status`.
///
/// Pairs outside the state graph fail with `InvalidTransition` before any
/// SQL runs. A precondition mismatch fails with `Conflict` carrying the
/// status the row actually holds, so the caller can re-read and decide.
pub async fn transition(
    pool: &PgPool,
    job_id: Uuid,
    from: JobStatus,
    to: JobStatus,
    ctx: TransitionContext,
) -> Result<AnalysisJob, QueueError> {
    if !from.can_transition_to(to) {
        return Err(QueueError::InvalidTransition { from, to });
    }

    let sql = format!(
        r#"
        UPDATE analysis_jobs
        SET status = $3,
            worker_id = CASE WHEN $3 = 'processing' THEN $4::text ELSE NULL END,
            started_at = CASE WHEN $3 = 'processing' THEN now() ELSE started_at END,
            completed_at = CASE WHEN $3 IN ('completed', 'failed', 'cancelled') THEN now() ELSE completed_at END,
            retry_count = retry_count + CASE WHEN $3 = 'retrying' THEN 1 ELSE 0 END,
            error_message = CASE WHEN $3 IN ('retrying', 'failed') THEN COALESCE($5::text, error_message) ELSE error_message END,
            last_error_at = CASE WHEN $3 IN ('retrying', 'failed') THEN now() ELSE last_error_at END,
            result_id = CASE WHEN $3 = 'completed' THEN $6::uuid ELSE result_id END
        WHERE id = $1 AND status = $2
        RETURNING {JOB_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(job_id)
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(ctx.worker_id.as_deref())
        .bind(ctx.error_message.as_deref())
        .bind(ctx.result_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => Ok(job_from_row(&r)?),
        None => match get_job(pool, job_id).await? {
            Some(job) => Err(QueueError::Conflict {
                job_id,
                actual: job.status,
            }),
            None => Err(QueueError::NotFound(job_id)),
        },
    }
}

/// Atomically claim the next eligible `queued` job for a worker.
///
/// `FOR UPDATE SKIP LOCKED` serializes concurrent claimers without blocking
/// them on each other: two callers never receive the same row, and an empty
/// queue yields `None`, which means "poll again later". Ordering is priority
/// descending, then age, then id as the deterministic tie-break.
pub async fn claim_next(
    pool: &PgPool,
    worker_id: &str,
    timeout_basic_secs: f64,
    timeout_advanced_secs: f64,
    timeout_ai_powered_secs: f64,
) -> Result<Option<AnalysisJob>, QueueError> {
    // RETURNING must be qualified: the CTE also exposes an `id` column.
    let returning = JOB_COLUMNS
        .split(", ")
        .map(|col| format!("j.{col}"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        r#"
        WITH next AS (
            SELECT id
            FROM analysis_jobs
            WHERE status = 'queued'
            ORDER BY CASE priority WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END DESC,
                     created_at ASC,
                     id ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE analysis_jobs j
        SET status = 'processing',
            worker_id = $1,
            started_at = now(),
            estimated_completion_at = now() + make_interval(secs => CASE j.algorithm_type
                WHEN 'basic' THEN $2
                WHEN 'advanced' THEN $3
                ELSE $4
            END)
        FROM next
        WHERE j.id = next.id AND j.status = 'queued'
        RETURNING {returning}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(worker_id)
        .bind(timeout_basic_secs)
        .bind(timeout_advanced_secs)
        .bind(timeout_ai_powered_secs)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => Ok(Some(job_from_row(&r)?)),
        None => Ok(None),
    }
}

/// Re-admit `retrying` jobs whose backoff window has elapsed.
///
/// The backoff expression mirrors `services::scheduler::backoff`:
/// `base * 2^(retry_count - 1)`, capped. One CAS UPDATE covers every due
/// row; returns how many were promoted.
pub async fn promote_due_retries(
    pool: &PgPool,
    backoff_base_secs: f64,
    backoff_cap_secs: f64,
) -> Result<u64, QueueError> {
    let result = sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = 'queued'
        WHERE status = 'retrying'
          AND last_error_at
              + make_interval(secs => LEAST($1 * power(2, GREATEST(retry_count - 1, 0)), $2))
              <= now()
        "#,
    )
    .bind(backoff_base_secs)
    .bind(backoff_cap_secs)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Change a job's priority. Permitted only while the job is still
/// schedulable (`queued` or `retrying`).
pub async fn update_priority(
    pool: &PgPool,
    job_id: Uuid,
    priority: JobPriority,
) -> Result<AnalysisJob, QueueError> {
    let sql = format!(
        r#"
        UPDATE analysis_jobs
        SET priority = $2
        WHERE id = $1 AND status IN ('queued', 'retrying')
        RETURNING {JOB_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(job_id)
        .bind(priority.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => Ok(job_from_row(&r)?),
        None => match get_job(pool, job_id).await? {
            Some(job) => Err(QueueError::Conflict {
                job_id,
                actual: job.status,
            }),
            None => Err(QueueError::NotFound(job_id)),
        },
    }
}

/// Cancel a job that has not been claimed yet. In-flight (`processing`) and
/// terminal jobs yield a `Conflict`; cooperative cancellation of running
/// work is not supported here.
pub async fn cancel(pool: &PgPool, job_id: Uuid) -> Result<AnalysisJob, QueueError> {
    let job = get_job(pool, job_id)
        .await?
        .ok_or(QueueError::NotFound(job_id))?;

    match job.status {
        JobStatus::Queued | JobStatus::Retrying => {
            transition(
                pool,
                job_id,
                job.status,
                JobStatus::Cancelled,
                TransitionContext::default(),
            )
            .await
        }
        actual => Err(QueueError::Conflict { job_id, actual }),
    }
}

/// Filter for the admin queue listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFilter {
    pub status: Option<JobStatus>,
    pub priority: Option<JobPriority>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Default)]
#[strum(serialize_all = "snake_case")]
pub enum QueueSortField {
    #[default]
    CreatedAt,
    Priority,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Default)]
#[strum(serialize_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Read-only projection of the queue for operator tooling. Never mutates.
///
/// Sort fields map to static SQL fragments; nothing user-supplied is spliced
/// into the query text.
pub async fn list_queue(
    pool: &PgPool,
    filter: QueueFilter,
    sort: QueueSortField,
    direction: SortDirection,
    limit: i64,
    offset: i64,
) -> Result<Vec<AnalysisJob>, QueueError> {
    let order_by = match (sort, direction) {
        (QueueSortField::CreatedAt, SortDirection::Asc) => "created_at ASC, id ASC",
        (QueueSortField::CreatedAt, SortDirection::Desc) => "created_at DESC, id DESC",
        (QueueSortField::Priority, SortDirection::Asc) => {
            "CASE priority WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END ASC, created_at ASC"
        }
        (QueueSortField::Priority, SortDirection::Desc) => {
            "CASE priority WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END DESC, created_at ASC"
        }
        (QueueSortField::Status, SortDirection::Asc) => "status ASC, created_at ASC",
        (QueueSortField::Status, SortDirection::Desc) => "status DESC, created_at ASC",
    };

    let sql = format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM analysis_jobs
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR priority = $2)
        ORDER BY {order_by}
        LIMIT $3 OFFSET $4
        "#
    );

    let rows = sqlx::query(&sql)
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.priority.map(|p| p.to_string()))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|r| job_from_row(r).map_err(QueueError::from))
        .collect()
}

/// Raw aggregates backing the admin statistics query.
#[derive(Debug, Default)]
pub struct QueueAggregates {
    pub depth_by_status: Vec<(String, i64)>,
    pub depth_by_priority: Vec<(String, i64)>,
    pub avg_queued_age_seconds: f64,
    pub retry_rate: f64,
}

pub async fn queue_stats(pool: &PgPool) -> Result<QueueAggregates, QueueError> {
    let mut stats = QueueAggregates::default();

    let rows = sqlx::query("SELECT status, COUNT(*) AS depth FROM analysis_jobs GROUP BY status")
        .fetch_all(pool)
        .await?;
    for row in &rows {
        stats
            .depth_by_status
            .push((row.try_get("status")?, row.try_get("depth")?));
    }

    let rows = sqlx::query(
        r#"
        SELECT priority, COUNT(*) AS depth
        FROM analysis_jobs
        WHERE status IN ('queued', 'retrying')
        GROUP BY priority
        "#,
    )
    .fetch_all(pool)
    .await?;
    for row in &rows {
        stats
            .depth_by_priority
            .push((row.try_get("priority")?, row.try_get("depth")?));
    }

    let row = sqlx::query(
        r#"
        SELECT COALESCE(EXTRACT(EPOCH FROM AVG(now() - created_at)), 0)::float8 AS avg_age
        FROM analysis_jobs
        WHERE status = 'queued'
        "#,
    )
    .fetch_one(pool)
    .await?;
    stats.avg_queued_age_seconds = row.try_get("avg_age")?;

    let row = sqlx::query(
        "SELECT COALESCE(AVG((retry_count > 0)::int)::float8, 0) AS rate FROM analysis_jobs",
    )
    .fetch_one(pool)
    .await?;
    stats.retry_rate = row.try_get("rate")?;

    Ok(stats)
}
