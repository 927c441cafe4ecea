//! # Sync Service
//!
//! Orchestrates the outbox worker loop (spec.md §4.8): lease acquisition,
//! per-target dispatch through registered [`PlatformAdapter`]s, terminal
//! status resolution (completed / retrying / failed), conflict resolution,
//! rollback, and lease reclamation. The HTTP-facing enqueue/status
//! operations are thin wrappers over [`SyncJobRepository`]; the worker
//! cycle is the one non-trivial piece of business logic this crate owns.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared::config::SyncConfig;
use shared::errors::ApiError;

use crate::domain::{next_retry_at, ConflictResolution, NewSyncJob, SyncJob, TargetOutcome};
use crate::repository::SyncJobRepository;
use crate::service::platform_adapter::PlatformAdapter;

/// Per-target dispatch result recorded for the worker's terminal-status
/// decision (spec.md §4.8 step 3).
struct TargetRun {
    platform: String,
    outcome: TargetOutcome,
}

/// Splits one dispatch attempt's per-target results into the buckets
/// `resolve_terminal_status` branches on. Pulled out as a pure function so
/// the classification itself is testable without a database or adapters.
fn classify_runs(
    runs: Vec<TargetRun>,
) -> (usize, Vec<(String, Value)>, Vec<(String, String)>, Vec<(String, String)>) {
    let mut succeeded = 0;
    let mut conflicted = Vec::new();
    let mut retryable = Vec::new();
    let mut permanent = Vec::new();

    for run in runs {
        match run.outcome {
            TargetOutcome::Success => succeeded += 1,
            TargetOutcome::Conflict { remote_payload } => conflicted.push((run.platform, remote_payload)),
            TargetOutcome::RetryableFailure { reason } => retryable.push((run.platform, reason)),
            TargetOutcome::PermanentFailure { reason } => permanent.push((run.platform, reason)),
        }
    }

    (succeeded, conflicted, retryable, permanent)
}

pub struct SyncService {
    repository: SyncJobRepository,
    adapters: HashMap<String, Arc<dyn PlatformAdapter>>,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(
        repository: SyncJobRepository,
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        config: SyncConfig,
    ) -> Self {
        let adapters = adapters.into_iter().map(|a| (a.name().to_string(), a)).collect();
        Self { repository, adapters, config }
    }

    /// Enqueues a single sync job inside the caller's own transaction
    /// (spec.md §4.8 "Enqueue": "in the same transaction as the mutation").
    pub async fn enqueue(
        &self,
        conn: &mut sqlx::PgConnection,
        new_job: NewSyncJob,
    ) -> Result<SyncJob, ApiError> {
        self.repository.enqueue(conn, &new_job).await
    }

    /// Enqueues a batch of jobs sharing one `batch_id` (spec.md §4.8
    /// "Batching"). Used outside an existing transaction, since a batch
    /// spans many entities and is not itself atomic with any one mutation.
    pub async fn enqueue_batch(
        &self,
        jobs: Vec<NewSyncJob>,
        parallel_processing: bool,
        max_parallel_jobs: Option<i32>,
    ) -> Result<Vec<SyncJob>, ApiError> {
        self.repository.enqueue_batch(jobs, parallel_processing, max_parallel_jobs).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<SyncJob>, ApiError> {
        self.repository.find_job(job_id).await
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> Result<Vec<SyncJob>, ApiError> {
        self.repository.list_batch_children(batch_id).await
    }

    pub async fn cancel(&self, job_id: Uuid, expected_version: i64) -> Result<Option<SyncJob>, ApiError> {
        self.repository.cancel(job_id, expected_version).await
    }

    /// Cancels every outstanding job queued against `(entity_type,
    /// old_entity_id)` and re-enqueues an equivalent job under
    /// `new_entity_id` for each one — the "cancelled-and-resubmitted with
    /// the new owner id" cutover spec.md §4.4 requires on handle transfer
    /// confirmation. Each resubmitted job starts fresh (no `depends_on`,
    /// no parent) since the cancelled original no longer exists to order
    /// against.
    #[instrument(skip(self))]
    pub async fn cancel_and_resubmit_for_entity(
        &self,
        entity_type: &str,
        old_entity_id: Uuid,
        new_entity_id: Uuid,
    ) -> Result<Vec<SyncJob>, ApiError> {
        let open = self.repository.list_open_for_entity(entity_type, old_entity_id).await?;

        let mut resubmitted = Vec::with_capacity(open.len());
        for job in open {
            self.repository.cancel(job.job_id, job.version).await?;

            let new_job = NewSyncJob {
                entity_type: job.entity_type.clone(),
                entity_id: new_entity_id,
                source_platform: job.source_platform.clone(),
                target_platforms: job.target_platforms.clone(),
                payload: job.payload.clone(),
                delta: job.delta.clone(),
                scheduled_at: None,
                depends_on: Vec::new(),
                priority: job.priority,
                conflict_resolution: job.conflict_resolution,
                rollback_data: job.rollback_data.clone(),
                max_attempts: Some(job.max_attempts),
                parent_job_id: None,
            };
            resubmitted.push(self.repository.enqueue_standalone(&new_job).await?);
        }

        if !resubmitted.is_empty() {
            info!(
                entity_type,
                old_entity_id = %old_entity_id,
                new_entity_id = %new_entity_id,
                count = resubmitted.len(),
                "cancelled and resubmitted outstanding sync jobs under new owner"
            );
        }
        Ok(resubmitted)
    }

    /// Runs one worker cycle: promotes eligible `waiting_deps` jobs,
    /// leases a batch, and drives each leased job to a terminal or
    /// retrying status (spec.md §4.8 steps 1-4). Returns the number of
    /// jobs processed.
    #[instrument(skip(self))]
    pub async fn run_worker_cycle(&self, worker_id: &str) -> Result<usize, ApiError> {
        self.repository.promote_ready_jobs().await?;

        let lease_duration = chrono::Duration::seconds(self.config.processing_timeout_seconds);
        let leased = self
            .repository
            .acquire_lease(worker_id, self.config.batch_size as i64, lease_duration)
            .await?;

        for job in &leased {
            if let Err(e) = self.process_job(job).await {
                warn!(job_id = %job.job_id, error = %e, "sync job processing failed unexpectedly");
            }
        }

        Ok(leased.len())
    }

    /// Reclaims leases that expired before the worker finished (spec.md
    /// §4.8 "Lease reclamation"). Intended to run on its own sweep
    /// interval, independent of `run_worker_cycle`.
    #[instrument(skip(self))]
    pub async fn reclaim_expired_leases(&self) -> Result<usize, ApiError> {
        let reclaimed = self
            .repository
            .reclaim_expired_leases(self.config.batch_size as i64)
            .await?;
        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "reclaimed expired sync job leases");
        }
        Ok(reclaimed.len())
    }

    /// Drives one leased job through dispatch and terminal-status
    /// resolution (spec.md §4.8 steps 2-4).
    async fn process_job(&self, job: &SyncJob) -> Result<(), ApiError> {
        self.repository.mark_processing(job.job_id).await?;

        let mut runs = Vec::with_capacity(job.target_platforms.len());
        for platform in &job.target_platforms {
            let outcome = match self.adapters.get(platform) {
                Some(adapter) => adapter
                    .apply(&job.entity_type, job.entity_id, &job.payload, job.delta.as_ref())
                    .await
                    .unwrap_or_else(|e| TargetOutcome::RetryableFailure { reason: e.to_string() }),
                None => TargetOutcome::PermanentFailure {
                    reason: format!("no adapter registered for platform '{platform}'"),
                },
            };
            runs.push(TargetRun { platform: platform.clone(), outcome });
        }

        self.resolve_terminal_status(job, runs).await
    }

    /// Applies spec.md §4.8 step 3's terminal-status rule given the
    /// per-target results of one dispatch attempt.
    async fn resolve_terminal_status(&self, job: &SyncJob, runs: Vec<TargetRun>) -> Result<(), ApiError> {
        let (succeeded, conflicted, retryable, permanent) = classify_runs(runs);

        if !conflicted.is_empty() {
            return self.resolve_conflicts(job, conflicted, succeeded, &retryable, &permanent).await;
        }

        let total_targets = job.target_platforms.len();
        if succeeded == total_targets {
            self.repository.complete(job.job_id).await?;
            return Ok(());
        }

        if !permanent.is_empty() && succeeded > 0 {
            // Partial success with a permanent failure on at least one
            // target: spec.md §4.8 step 3 "mixed or partial" branch. The
            // succeeded + retryable subset can still make progress, the
            // permanently-failed subset cannot, so the retryable targets
            // are re-enqueued as a child job.
            if !retryable.is_empty() {
                self.enqueue_retry_child(job, retryable.iter().map(|(p, _)| p.clone()).collect())
                    .await?;
            }
            return self.maybe_rollback_or_fail(job, &permanent).await;
        }

        if !permanent.is_empty() {
            return self.maybe_rollback_or_fail(job, &permanent).await;
        }

        // All remaining failures are retryable.
        if job.attempts + 1 >= job.max_attempts {
            let reasons = retryable.iter().map(|(p, r)| format!("{p}: {r}")).collect::<Vec<_>>().join("; ");
            self.repository.mark_failed(job.job_id, &reasons, false).await?;
            return Ok(());
        }

        let retry_at = next_retry_at(job.attempts + 1);
        self.repository.mark_retrying(job.job_id, retry_at).await?;
        Ok(())
    }

    /// spec.md §4.8 "Conflict resolution": applies the job's strategy to
    /// every conflicting target.
    async fn resolve_conflicts(
        &self,
        job: &SyncJob,
        conflicts: Vec<(String, Value)>,
        succeeded: usize,
        retryable: &[(String, String)],
        permanent: &[(String, String)],
    ) -> Result<(), ApiError> {
        match job.conflict_resolution {
            ConflictResolution::Manual => {
                self.repository.mark_failed(job.job_id, "manual conflict resolution required", true).await?;
                Ok(())
            }
            ConflictResolution::LatestWins | ConflictResolution::SourceWins => {
                // Re-issuing with the resolved payload is the adapter's
                // responsibility on the next attempt; here we only decide
                // whether this attempt still has outstanding work.
                let total_targets = job.target_platforms.len();
                if succeeded + conflicts.len() == total_targets && permanent.is_empty() && retryable.is_empty() {
                    let retry_at = next_retry_at(job.attempts + 1);
                    self.repository.mark_retrying(job.job_id, retry_at).await?;
                } else {
                    self.maybe_rollback_or_fail(job, permanent).await?;
                }
                Ok(())
            }
        }
    }

    /// spec.md §4.8 "Rollback": when a multi-target job has more failures
    /// than a per-entity policy tolerates and carries a `rollback_data`
    /// snapshot, enqueue the compensating job instead of just failing.
    async fn maybe_rollback_or_fail(&self, job: &SyncJob, permanent: &[(String, String)]) -> Result<(), ApiError> {
        let reasons = permanent.iter().map(|(p, r)| format!("{p}: {r}")).collect::<Vec<_>>().join("; ");
        self.repository.mark_failed(job.job_id, &reasons, false).await?;

        if let Some(rollback_data) = &job.rollback_data {
            let rollback_job = NewSyncJob {
                entity_type: job.entity_type.clone(),
                entity_id: job.entity_id,
                source_platform: job.source_platform.clone(),
                target_platforms: job.target_platforms.clone(),
                payload: rollback_data.clone(),
                delta: None,
                scheduled_at: None,
                depends_on: Vec::new(),
                priority: job.priority,
                conflict_resolution: ConflictResolution::SourceWins,
                rollback_data: None,
                max_attempts: Some(job.max_attempts),
                parent_job_id: Some(job.job_id),
            };
            let created = self.repository.enqueue_standalone(&rollback_job).await?;
            self.repository.link_rollback(job.job_id, created.job_id).await?;
        }
        Ok(())
    }

    /// Re-enqueues the retryable subset of a partially-failed job as a
    /// child job carrying only those targets (spec.md §4.8 step 3).
    async fn enqueue_retry_child(&self, job: &SyncJob, targets: Vec<String>) -> Result<SyncJob, ApiError> {
        let child = NewSyncJob {
            entity_type: job.entity_type.clone(),
            entity_id: job.entity_id,
            source_platform: job.source_platform.clone(),
            target_platforms: targets,
            payload: job.payload.clone(),
            delta: job.delta.clone(),
            scheduled_at: Some(next_retry_at(job.attempts + 1)),
            depends_on: Vec::new(),
            priority: job.priority,
            conflict_resolution: job.conflict_resolution,
            rollback_data: job.rollback_data.clone(),
            max_attempts: Some(job.max_attempts),
            parent_job_id: Some(job.job_id),
        };
        self.repository.enqueue_standalone(&child).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoAdapter {
        name: String,
    }

    #[async_trait]
    impl PlatformAdapter for EchoAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn apply(
            &self,
            _entity_type: &str,
            _entity_id: Uuid,
            _payload: &Value,
            _delta: Option<&Value>,
        ) -> Result<TargetOutcome, ApiError> {
            Ok(TargetOutcome::Success)
        }

        async fn rollback(&self, _entity_type: &str, _entity_id: Uuid, _rollback_data: &Value) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn run(platform: &str, outcome: TargetOutcome) -> TargetRun {
        TargetRun { platform: platform.to_string(), outcome }
    }

    #[test]
    fn test_classify_runs_all_success() {
        let runs = vec![run("lms", TargetOutcome::Success), run("billing", TargetOutcome::Success)];
        let (succeeded, conflicted, retryable, permanent) = classify_runs(runs);
        assert_eq!(succeeded, 2);
        assert!(conflicted.is_empty() && retryable.is_empty() && permanent.is_empty());
    }

    #[test]
    fn test_classify_runs_mixed_outcomes() {
        let runs = vec![
            run("lms", TargetOutcome::Success),
            run("billing", TargetOutcome::RetryableFailure { reason: "timeout".to_string() }),
            run("directory", TargetOutcome::PermanentFailure { reason: "unknown entity".to_string() }),
            run("crm", TargetOutcome::Conflict { remote_payload: json!({"version": 3}) }),
        ];
        let (succeeded, conflicted, retryable, permanent) = classify_runs(runs);
        assert_eq!(succeeded, 1);
        assert_eq!(conflicted.len(), 1);
        assert_eq!(retryable.len(), 1);
        assert_eq!(permanent.len(), 1);
    }

    #[tokio::test]
    async fn test_echo_adapter_applies_successfully() {
        let adapter = EchoAdapter { name: "lms".to_string() };
        assert_eq!(adapter.name(), "lms");
        let outcome = adapter.apply("identity", Uuid::new_v4(), &json!({"handle": "ada"}), None).await.unwrap();
        assert!(matches!(outcome, TargetOutcome::Success));
    }
}
