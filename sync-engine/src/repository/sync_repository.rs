//! # Sync Job Repository
//!
//! PostgreSQL-based repository for the outbox queue, its append-only event
//! log, lease acquisition, and reclamation (spec.md §3, §4.8).
//!
//! `enqueue` takes `&mut PgConnection` rather than `&PgPool` — following
//! the same "composable into the caller's own transaction" idea as
//! `handle-engine::HandleRepository::insert_active`, but as a connection
//! rather than a generic `PgExecutor` because enqueueing needs two
//! sequential statements (the implicit per-entity dependency lookup, then
//! the insert) that a single consumed-by-value executor can't provide.
//! `Transaction<'_, Postgres>` derefs to `PgConnection`, so the identity
//! façade (C9) calls `sync_repo.enqueue(&mut *tx, &new_job)` inside its own
//! registration/profile-update transaction (spec.md §4.8's outbox pattern).

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{error, instrument};
use uuid::Uuid;

use shared::errors::ApiError;

use crate::domain::{payload_checksum, JobStatus, NewSyncJob, SyncJob, SyncJobEvent};

const JOB_COLUMNS: &str = r#"
    job_id, entity_type, entity_id, source_platform, target_platforms, payload, delta,
    status, priority, attempts, max_attempts, scheduled_at, lease_owner, lease_expires_at,
    depends_on, blocks, parent_job_id, conflict_resolution, has_conflicts, rollback_data,
    rollback_job_id, payload_checksum, is_batch_job, batch_id, batch_index, total_batches,
    parallel_processing, max_parallel_jobs, started_at, next_retry_at, version,
    created_at, updated_at
"#;

#[derive(Clone)]
pub struct SyncJobRepository {
    pool: PgPool,
}

impl SyncJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Finds the most recent non-terminal job for this entity, if any, to
    /// back the implicit per-entity FIFO dependency edge (spec.md §4.8's
    /// design note).
    async fn latest_open_job_for_entity(
        &self,
        conn: &mut PgConnection,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Option<Uuid>, ApiError> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT job_id FROM sync_jobs
            WHERE entity_type = $1 AND entity_id = $2
              AND status NOT IN ('completed', 'cancelled', 'failed')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up open job for entity");
            ApiError::InternalError {
                message: "failed to look up open job for entity".to_string(),
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_row(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        new: &NewSyncJob,
        status: JobStatus,
        depends_on: &[Uuid],
        batch: Option<(Uuid, i32, i32, bool, Option<i32>)>,
    ) -> Result<SyncJob, ApiError> {
        let checksum = payload_checksum(&new.payload);
        let scheduled_at = new.scheduled_at.unwrap_or_else(Utc::now);
        let (batch_id, batch_index, total_batches, parallel_processing, max_parallel_jobs) =
            match batch {
                Some((id, idx, total, parallel, max_parallel)) => {
                    (Some(id), Some(idx), Some(total), parallel, max_parallel)
                }
                None => (None, None, None, false, None),
            };

        let query = format!(
            r#"
            INSERT INTO sync_jobs (
                job_id, entity_type, entity_id, source_platform, target_platforms, payload, delta,
                status, priority, attempts, max_attempts, scheduled_at, depends_on, blocks,
                parent_job_id, conflict_resolution, has_conflicts, rollback_data, rollback_job_id,
                payload_checksum, is_batch_job, batch_id, batch_index, total_batches,
                parallel_processing, max_parallel_jobs, version, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, $11, $12, '{{}}',
                $13, $14, false, $15, NULL,
                $16, $17, $18, $19, $20, $21, $22, 1, now(), now()
            )
            RETURNING {JOB_COLUMNS}
            "#
        );

        sqlx::query_as::<_, SyncJob>(&query)
            .bind(job_id)
            .bind(&new.entity_type)
            .bind(new.entity_id)
            .bind(&new.source_platform)
            .bind(&new.target_platforms)
            .bind(&new.payload)
            .bind(&new.delta)
            .bind(status)
            .bind(new.priority)
            .bind(new.max_attempts_or_default())
            .bind(scheduled_at)
            .bind(depends_on)
            .bind(new.parent_job_id)
            .bind(new.conflict_resolution)
            .bind(&new.rollback_data)
            .bind(&checksum)
            .bind(batch_id.is_some())
            .bind(batch_id)
            .bind(batch_index)
            .bind(total_batches)
            .bind(parallel_processing)
            .bind(max_parallel_jobs)
            .fetch_one(conn)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to enqueue sync job");
                ApiError::InternalError {
                    message: "failed to enqueue sync job".to_string(),
                }
            })
    }

    /// Enqueues a single job in the outbox pattern (spec.md §4.8). Resolves
    /// the implicit per-entity dependency edge and the job's initial
    /// status synchronously.
    #[instrument(skip(self, conn, new))]
    pub async fn enqueue(&self, conn: &mut PgConnection, new: &NewSyncJob) -> Result<SyncJob, ApiError> {
        let mut depends_on = new.depends_on.clone();
        if let Some(dep) = self
            .latest_open_job_for_entity(conn, &new.entity_type, new.entity_id)
            .await?
        {
            if !depends_on.contains(&dep) {
                depends_on.push(dep);
            }
        }
        let status = if depends_on.is_empty() { JobStatus::Ready } else { JobStatus::WaitingDeps };

        let job = self.insert_row(conn, Uuid::new_v4(), new, status, &depends_on, None).await?;
        self.append_event(
            conn,
            &SyncJobEvent::Enqueued {
                job_id: job.job_id,
                entity_type: job.entity_type.clone(),
                entity_id: job.entity_id,
                occurred_at: Utc::now(),
            },
        )
        .await?;
        Ok(job)
    }

    /// Same as [`Self::enqueue`] but acquires its own connection — for
    /// callers with no transaction of their own already open.
    pub async fn enqueue_standalone(&self, new: &NewSyncJob) -> Result<SyncJob, ApiError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire connection");
            ApiError::InternalError {
                message: "failed to acquire connection".to_string(),
            }
        })?;
        self.enqueue(&mut conn, new).await
    }

    /// Enqueues a batch: every job shares a fresh `batch_id` and carries
    /// `batch_index`/`total_batches` (spec.md §4.8 "Batching").
    #[instrument(skip(self, jobs))]
    pub async fn enqueue_batch(
        &self,
        jobs: Vec<NewSyncJob>,
        parallel_processing: bool,
        max_parallel_jobs: Option<i32>,
    ) -> Result<Vec<SyncJob>, ApiError> {
        let batch_id = Uuid::new_v4();
        let total = jobs.len() as i32;
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire connection");
            ApiError::InternalError {
                message: "failed to acquire connection".to_string(),
            }
        })?;

        let mut created = Vec::with_capacity(jobs.len());
        for (index, new) in jobs.iter().enumerate() {
            let mut depends_on = new.depends_on.clone();
            if let Some(dep) = self
                .latest_open_job_for_entity(&mut conn, &new.entity_type, new.entity_id)
                .await?
            {
                if !depends_on.contains(&dep) {
                    depends_on.push(dep);
                }
            }
            let status = if depends_on.is_empty() { JobStatus::Ready } else { JobStatus::WaitingDeps };

            let job = self
                .insert_row(
                    &mut conn,
                    Uuid::new_v4(),
                    new,
                    status,
                    &depends_on,
                    Some((batch_id, index as i32, total, parallel_processing, max_parallel_jobs)),
                )
                .await?;
            self.append_event(
                &mut conn,
                &SyncJobEvent::Enqueued {
                    job_id: job.job_id,
                    entity_type: job.entity_type.clone(),
                    entity_id: job.entity_id,
                    occurred_at: Utc::now(),
                },
            )
            .await?;
            created.push(job);
        }
        Ok(created)
    }

    /// `waiting_deps → ready` for every job whose dependencies have all
    /// reached a terminal state. Returns the number promoted.
    #[instrument(skip(self))]
    pub async fn promote_ready_jobs(&self) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = 'ready', updated_at = now()
            WHERE status = 'waiting_deps'
              AND NOT EXISTS (
                  SELECT 1 FROM unnest(depends_on) AS dep(id)
                  JOIN sync_jobs d ON d.job_id = dep.id
                  WHERE d.status NOT IN ('completed', 'cancelled', 'failed')
              )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to promote waiting_deps jobs");
            ApiError::InternalError {
                message: "failed to promote waiting_deps jobs".to_string(),
            }
        })?;
        Ok(result.rows_affected())
    }

    /// Leases up to `batch_size` eligible jobs for `worker_id` in one
    /// serializable transaction (spec.md §4.8 step 1). Ordering:
    /// `priority ASC, scheduled_at ASC, job_id ASC`.
    #[instrument(skip(self))]
    pub async fn acquire_lease(
        &self,
        worker_id: &str,
        batch_size: i64,
        lease_duration: chrono::Duration,
    ) -> Result<Vec<SyncJob>, ApiError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin lease transaction");
            ApiError::InternalError {
                message: "failed to begin transaction".to_string(),
            }
        })?;

        let candidate_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT job_id FROM sync_jobs
            WHERE status IN ('ready', 'retrying') AND scheduled_at <= now()
            ORDER BY priority ASC, scheduled_at ASC, job_id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to select lease candidates");
            ApiError::InternalError {
                message: "failed to select lease candidates".to_string(),
            }
        })?;

        if candidate_ids.is_empty() {
            tx.commit().await.ok();
            return Ok(Vec::new());
        }

        let lease_expires_at = Utc::now() + lease_duration;
        let query = format!(
            r#"
            UPDATE sync_jobs
            SET status = 'leased', lease_owner = $1, lease_expires_at = $2,
                version = version + 1, updated_at = now()
            WHERE job_id = ANY($3)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let leased = sqlx::query_as::<_, SyncJob>(&query)
            .bind(worker_id)
            .bind(lease_expires_at)
            .bind(&candidate_ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to lease sync jobs");
                ApiError::InternalError {
                    message: "failed to lease sync jobs".to_string(),
                }
            })?;

        for job in &leased {
            self.append_event(
                &mut tx,
                &SyncJobEvent::LeaseAcquired {
                    job_id: job.job_id,
                    worker_id: worker_id.to_string(),
                    lease_expires_at,
                    occurred_at: Utc::now(),
                },
            )
            .await?;
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit lease transaction");
            ApiError::InternalError {
                message: "failed to commit transaction".to_string(),
            }
        })?;

        Ok(leased)
    }

    /// `leased → processing`.
    #[instrument(skip(self))]
    pub async fn mark_processing(&self, job_id: Uuid) -> Result<Option<SyncJob>, ApiError> {
        let query = format!(
            r#"
            UPDATE sync_jobs
            SET status = 'processing', started_at = now(), version = version + 1, updated_at = now()
            WHERE job_id = $1 AND status = 'leased'
            RETURNING {JOB_COLUMNS}
            "#
        );
        sqlx::query_as::<_, SyncJob>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to mark job processing");
                ApiError::InternalError {
                    message: "failed to mark job processing".to_string(),
                }
            })
    }

    /// `processing → completed`, releasing the lease.
    #[instrument(skip(self))]
    pub async fn complete(&self, job_id: Uuid) -> Result<(), ApiError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire connection");
            ApiError::InternalError {
                message: "failed to acquire connection".to_string(),
            }
        })?;
        sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = 'completed', lease_owner = NULL, lease_expires_at = NULL,
                version = version + 1, updated_at = now()
            WHERE job_id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to complete sync job");
            ApiError::InternalError {
                message: "failed to complete sync job".to_string(),
            }
        })?;
        self.append_event(&mut conn, &SyncJobEvent::Completed { job_id, occurred_at: Utc::now() }).await
    }

    /// `processing → retrying`, bumping `attempts` and scheduling
    /// `next_retry_at` (spec.md §4.8 step 3's exponential backoff+jitter).
    #[instrument(skip(self))]
    pub async fn mark_retrying(&self, job_id: Uuid, next_retry_at: DateTime<Utc>) -> Result<Option<SyncJob>, ApiError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire connection");
            ApiError::InternalError {
                message: "failed to acquire connection".to_string(),
            }
        })?;
        let query = format!(
            r#"
            UPDATE sync_jobs
            SET status = 'retrying', attempts = attempts + 1, lease_owner = NULL, lease_expires_at = NULL,
                next_retry_at = $1, scheduled_at = $1, version = version + 1, updated_at = now()
            WHERE job_id = $2 AND status IN ('processing', 'leased')
            RETURNING {JOB_COLUMNS}
            "#
        );
        let job = sqlx::query_as::<_, SyncJob>(&query)
            .bind(next_retry_at)
            .bind(job_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to mark job retrying");
                ApiError::InternalError {
                    message: "failed to mark job retrying".to_string(),
                }
            })?;

        if let Some(ref job) = job {
            self.append_event(
                &mut conn,
                &SyncJobEvent::Retrying {
                    job_id,
                    attempt: job.attempts,
                    next_retry_at,
                    occurred_at: Utc::now(),
                },
            )
            .await?;
        }
        Ok(job)
    }

    /// `processing → failed`, terminal. `has_conflicts` is set when this
    /// job stopped because its `conflict_resolution` strategy is `manual`
    /// (spec.md §4.8 "Conflict resolution").
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, job_id: Uuid, reason: &str, has_conflicts: bool) -> Result<Option<SyncJob>, ApiError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire connection");
            ApiError::InternalError {
                message: "failed to acquire connection".to_string(),
            }
        })?;
        let query = format!(
            r#"
            UPDATE sync_jobs
            SET status = 'failed', has_conflicts = $1, lease_owner = NULL, lease_expires_at = NULL,
                version = version + 1, updated_at = now()
            WHERE job_id = $2 AND status IN ('processing', 'leased')
            RETURNING {JOB_COLUMNS}
            "#
        );
        let job = sqlx::query_as::<_, SyncJob>(&query)
            .bind(has_conflicts)
            .bind(job_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to mark job failed");
                ApiError::InternalError {
                    message: "failed to mark job failed".to_string(),
                }
            })?;

        if job.is_some() {
            self.append_event(
                &mut conn,
                &SyncJobEvent::Failed { job_id, reason: reason.to_string(), occurred_at: Utc::now() },
            )
            .await?;
        }
        Ok(job)
    }

    /// Links a failed job to the compensating rollback job enqueued for it
    /// (spec.md §4.8 "Rollback").
    #[instrument(skip(self))]
    pub async fn link_rollback(&self, job_id: Uuid, rollback_job_id: Uuid) -> Result<(), ApiError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire connection");
            ApiError::InternalError {
                message: "failed to acquire connection".to_string(),
            }
        })?;
        sqlx::query("UPDATE sync_jobs SET rollback_job_id = $1, updated_at = now() WHERE job_id = $2")
            .bind(rollback_job_id)
            .bind(job_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to link rollback job");
                ApiError::InternalError {
                    message: "failed to link rollback job".to_string(),
                }
            })?;
        self.append_event(
            &mut conn,
            &SyncJobEvent::RollbackEnqueued { job_id, rollback_job_id, occurred_at: Utc::now() },
        )
        .await
    }

    /// Any non-terminal status → `cancelled`; idempotent (spec.md §4.8).
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: Uuid, expected_version: i64) -> Result<Option<SyncJob>, ApiError> {
        let query = format!(
            r#"
            UPDATE sync_jobs
            SET status = 'cancelled', lease_owner = NULL, lease_expires_at = NULL,
                version = version + 1, updated_at = now()
            WHERE job_id = $1 AND version = $2 AND status NOT IN ('completed', 'cancelled')
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, SyncJob>(&query)
            .bind(job_id)
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to cancel sync job");
                ApiError::InternalError {
                    message: "failed to cancel sync job".to_string(),
                }
            })?;

        match row {
            Some(job) => Ok(Some(job)),
            None => self.find_job(job_id).await.map(|j| j.filter(|j| j.status == JobStatus::Cancelled)),
        }
    }

    /// Resets `leased`/`processing` rows whose lease has expired back to
    /// `retrying`, bumping `attempts` (spec.md §4.8 "Lease reclamation").
    #[instrument(skip(self))]
    pub async fn reclaim_expired_leases(&self, batch_size: i64) -> Result<Vec<SyncJob>, ApiError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin reclamation transaction");
            ApiError::InternalError {
                message: "failed to begin transaction".to_string(),
            }
        })?;

        let expired = sqlx::query_as::<_, SyncJob>(
            r#"
            SELECT job_id, entity_type, entity_id, source_platform, target_platforms, payload, delta,
                   status, priority, attempts, max_attempts, scheduled_at, lease_owner, lease_expires_at,
                   depends_on, blocks, parent_job_id, conflict_resolution, has_conflicts, rollback_data,
                   rollback_job_id, payload_checksum, is_batch_job, batch_id, batch_index, total_batches,
                   parallel_processing, max_parallel_jobs, started_at, next_retry_at, version,
                   created_at, updated_at
            FROM sync_jobs
            WHERE status IN ('leased', 'processing') AND lease_expires_at < now()
            ORDER BY lease_expires_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to select expired leases");
            ApiError::InternalError {
                message: "failed to select expired leases".to_string(),
            }
        })?;

        let mut reclaimed = Vec::with_capacity(expired.len());
        for job in expired {
            let next_attempt = job.attempts + 1;
            let next_retry_at = crate::domain::next_retry_at(next_attempt);

            let query = format!(
                r#"
                UPDATE sync_jobs
                SET status = 'retrying', attempts = $1, lease_owner = NULL, lease_expires_at = NULL,
                    next_retry_at = $2, scheduled_at = $2, version = version + 1, updated_at = now()
                WHERE job_id = $3
                RETURNING {JOB_COLUMNS}
                "#
            );
            let updated = sqlx::query_as::<_, SyncJob>(&query)
                .bind(next_attempt)
                .bind(next_retry_at)
                .bind(job.job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    error!(error = %e, "failed to reclaim expired lease");
                    ApiError::InternalError {
                        message: "failed to reclaim expired lease".to_string(),
                    }
                })?;

            self.append_event(
                &mut tx,
                &SyncJobEvent::LeaseReclaimed {
                    job_id: updated.job_id,
                    previous_owner: job.lease_owner.clone(),
                    occurred_at: Utc::now(),
                },
            )
            .await?;
            reclaimed.push(updated);
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit reclamation transaction");
            ApiError::InternalError {
                message: "failed to commit transaction".to_string(),
            }
        })?;

        Ok(reclaimed)
    }

    #[instrument(skip(self))]
    pub async fn find_job(&self, job_id: Uuid) -> Result<Option<SyncJob>, ApiError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE job_id = $1");
        sqlx::query_as::<_, SyncJob>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to find sync job");
                ApiError::InternalError {
                    message: "failed to find sync job".to_string(),
                }
            })
    }

    /// Open (non-terminal) jobs queued against one entity, oldest first —
    /// used to cancel-and-resubmit a handle's outstanding jobs under a new
    /// owner on transfer confirmation (spec.md §4.4).
    #[instrument(skip(self))]
    pub async fn list_open_for_entity(&self, entity_type: &str, entity_id: Uuid) -> Result<Vec<SyncJob>, ApiError> {
        let query = format!(
            r#"
            SELECT {JOB_COLUMNS} FROM sync_jobs
            WHERE entity_type = $1 AND entity_id = $2
              AND status NOT IN ('completed', 'cancelled', 'failed')
            ORDER BY created_at ASC
            "#
        );
        sqlx::query_as::<_, SyncJob>(&query)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to list open sync jobs for entity");
                ApiError::InternalError {
                    message: "failed to list open sync jobs for entity".to_string(),
                }
            })
    }

    #[instrument(skip(self))]
    pub async fn list_batch_children(&self, batch_id: Uuid) -> Result<Vec<SyncJob>, ApiError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE batch_id = $1 ORDER BY batch_index ASC");
        sqlx::query_as::<_, SyncJob>(&query)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to list batch children");
                ApiError::InternalError {
                    message: "failed to list batch children".to_string(),
                }
            })
    }

    #[instrument(skip(self, event))]
    pub async fn append_event(&self, conn: &mut PgConnection, event: &SyncJobEvent) -> Result<(), ApiError> {
        let payload = serde_json::to_value(event).map_err(|e| {
            error!(error = %e, "failed to serialize sync job event");
            ApiError::InternalError {
                message: "failed to serialize sync job event".to_string(),
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO sync_job_events (event_id, job_id, event_type, payload, occurred_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.job_id())
        .bind(event.event_type())
        .bind(payload)
        .execute(conn)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to append sync job event");
            ApiError::InternalError {
                message: "failed to append sync job event".to_string(),
            }
        })?;
        Ok(())
    }
}
