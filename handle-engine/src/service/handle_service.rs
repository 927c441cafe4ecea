//! # Handle Service
//!
//! Orchestrates the six-step validation pipeline, suggestion generation,
//! the claim workflow, and the two-phase transfer protocol (spec.md §4.4).

use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared::errors::ApiError;
use shared::redis_client::RedisClient;
use sync_engine::SyncService;

use crate::domain::{
    fold, is_valid_format, similarity, Handle, HandleCheckResult, HandleRejection,
    HandleTransfer, NewHandle, ProtectionTier, DISALLOWED_SUBSTRINGS,
};
use crate::repository::HandleRepository;

/// Default similarity threshold used when a protected entry doesn't carry
/// its own (spec.md §3: `similarity_threshold ∈ [0.5, 1.0]`, default `0.85`).
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// The sync engine's outbox rows carry identity mutations under this
/// `entity_type` (matches `identity-service::IdentityService::register`'s
/// own enqueue call) — a transferred handle's outstanding jobs are keyed
/// the same way, by the owning identity rather than the handle itself.
const SYNC_ENTITY_TYPE: &str = "identity";

/// Suffixes/prefixes tried by the deterministic suggestion generator, in
/// order, per spec.md §4.4.
fn suggestion_candidates(handle: &str) -> Vec<String> {
    let year = chrono::Utc::now().format("%Y").to_string();
    let mut candidates = Vec::new();
    for n in 1..=9 {
        candidates.push(format!("{handle}{n}"));
    }
    candidates.push(format!("{handle}{year}"));
    candidates.push(format!("_{handle}"));
    candidates.push(format!("{handle}_"));
    candidates.push(format!("{handle}official"));
    candidates.push(format!("{handle}real"));
    candidates
}

/// Result of a transfer-initiation call: the plaintext token (shown to the
/// requester once) and the row now in `transferring` state.
pub struct TransferInitiation {
    pub handle: Handle,
    pub transfer_token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Outcome of a successful claim: the handle and the priority the opened
/// verification request should carry.
pub struct ClaimOutcome {
    pub handle: Handle,
    pub verification_priority: i16,
}

pub struct HandleService {
    repository: HandleRepository,
    redis: RedisClient,
    sync: SyncService,
    transfer_window: ChronoDuration,
}

impl HandleService {
    pub fn new(repository: HandleRepository, redis: RedisClient, sync: SyncService) -> Self {
        Self {
            repository,
            redis,
            sync,
            transfer_window: ChronoDuration::hours(24),
        }
    }

    pub fn with_transfer_window(mut self, window: ChronoDuration) -> Self {
        self.transfer_window = window;
        self
    }

    /// Runs the full six-step validation pipeline against a candidate
    /// handle, consulting (and populating) the 60-minute validation cache.
    #[instrument(skip(self))]
    pub async fn check(&self, candidate: &str) -> Result<HandleCheckResult, ApiError> {
        let folded = fold(candidate);

        if let Some(cached) = self
            .redis
            .get_cached_handle_validation::<HandleCheckResult>(&folded)
            .await?
        {
            return Ok(cached);
        }

        let result = self.run_pipeline(candidate, &folded).await?;
        self.redis.cache_handle_validation(&folded, &result).await?;
        Ok(result)
    }

    async fn run_pipeline(&self, candidate: &str, folded: &str) -> Result<HandleCheckResult, ApiError> {
        // Step 1: format.
        if !is_valid_format(candidate) {
            return Ok(HandleCheckResult::rejected(candidate, HandleRejection::InvalidFormat));
        }

        // Step 2: exact availability.
        if self.repository.is_taken(folded).await? {
            return Ok(HandleCheckResult::rejected(candidate, HandleRejection::Taken));
        }

        // Step 3: reserved.
        if let Some(reserved) = self.repository.find_reserved(folded).await? {
            return Ok(HandleCheckResult::rejected(
                candidate,
                HandleRejection::Reserved {
                    reservation_class: reserved.reservation_class,
                },
            ));
        }

        // Step 4: protected-figure/company similarity.
        let protected_entries = self.repository.list_protected_entries().await?;
        let mut best: Option<(f64, &str, ProtectionTier)> = None;
        for entry in &protected_entries {
            let threshold = if (0.5..=1.0).contains(&entry.similarity_threshold) {
                entry.similarity_threshold
            } else {
                DEFAULT_SIMILARITY_THRESHOLD
            };
            for candidate_str in entry.match_candidates() {
                let score = similarity(folded, candidate_str);
                if score >= threshold {
                    let is_better = best.map(|(best_score, ..)| score > best_score).unwrap_or(true);
                    if is_better {
                        best = Some((score, entry.name.as_str(), entry.tier));
                    }
                }
            }
        }
        if let Some((score, name, tier)) = best {
            return Ok(HandleCheckResult::rejected(
                candidate,
                HandleRejection::SimilarToProtected {
                    entity_name: name.to_string(),
                    score,
                    tier,
                },
            ));
        }

        // Step 5: content moderation.
        if DISALLOWED_SUBSTRINGS.iter().any(|word| folded.contains(word)) {
            return Ok(HandleCheckResult::rejected(candidate, HandleRejection::Inappropriate));
        }

        // Step 6: available. Attach up to five available suggestions.
        let suggestions = self.suggest(candidate).await?;
        Ok(HandleCheckResult::available(candidate, suggestions))
    }

    /// Generates the deterministic suggestion list, filtering each
    /// candidate back through the pipeline and returning the first five
    /// that come back `available` (spec.md §4.4).
    #[instrument(skip(self))]
    async fn suggest(&self, handle: &str) -> Result<Vec<String>, ApiError> {
        let mut available = Vec::new();
        for candidate in suggestion_candidates(handle) {
            if available.len() >= 5 {
                break;
            }
            let candidate_folded = fold(&candidate);
            // Suggestions are checked directly against availability/reserved/
            // protected without recursing into the cache or generating their
            // own sub-suggestions, to keep suggestion generation O(candidates).
            if !is_valid_format(&candidate) {
                continue;
            }
            if self.repository.is_taken(&candidate_folded).await? {
                continue;
            }
            if self.repository.find_reserved(&candidate_folded).await?.is_some() {
                continue;
            }
            available.push(candidate);
        }
        Ok(available)
    }

    /// Registers a handle immediately, bypassing the cache (the caller just
    /// ran `check`, or this is part of a larger registration transaction
    /// composed by the identity façade). Invalidates the validation cache
    /// prefix on success.
    #[instrument(skip(self))]
    pub async fn register(&self, handle: &str, owner_identity_id: Uuid) -> Result<Handle, ApiError> {
        let folded = fold(handle);
        let result = self.run_pipeline(handle, &folded).await?;
        if !result.available {
            return Err(rejection_to_api_error(result.rejection.expect("unavailable result carries a rejection")));
        }

        let new_handle = NewHandle {
            handle: handle.to_string(),
            handle_lower: folded,
            owner_identity_id,
        };
        let created = self.repository.insert_active_standalone(&new_handle).await?;
        self.redis.invalidate_handle_validations().await?;
        info!(handle_id = %created.handle_id, "handle registered");
        Ok(created)
    }

    /// Opens a claim on a protected handle: verifies it's in fact a
    /// protected-similarity match, then commits ownership atomically with
    /// the protected entry's `claimed_by`/`claimed_at`.
    ///
    /// Priority for the C7 verification request this opens is derived from
    /// the protected entry's tier (spec.md §4.4).
    #[instrument(skip(self))]
    pub async fn claim(
        &self,
        handle_id: Uuid,
        protected_entry_id: Uuid,
        claimant_identity_id: Uuid,
        expected_version: i64,
    ) -> Result<ClaimOutcome, ApiError> {
        let entry = self
            .repository
            .find_protected_entry(protected_entry_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("protected_entry:{protected_entry_id}"),
            })?;

        if entry.claimed_by.is_some() {
            return Err(ApiError::Conflict {
                resource: "protected entry already claimed".to_string(),
            });
        }

        let handle = self
            .repository
            .commit_claim(handle_id, protected_entry_id, claimant_identity_id, expected_version)
            .await?;

        self.redis.invalidate_handle_validations().await?;

        Ok(ClaimOutcome {
            handle,
            verification_priority: entry.tier.claim_priority(),
        })
    }

    /// Starts a two-phase transfer: requester writes `status = transferring`
    /// with a fresh, time-bounded token, hashed at rest (spec.md §4.4).
    #[instrument(skip(self))]
    pub async fn request_transfer(
        &self,
        handle_id: Uuid,
        from_identity_id: Uuid,
        to_identity_id: Uuid,
        expected_version: i64,
    ) -> Result<TransferInitiation, ApiError> {
        let token = generate_transfer_token();
        let token_hash = hash_token(&token);
        let expires_at = Utc::now() + self.transfer_window;

        let handle = self
            .repository
            .begin_transfer(handle_id, &token_hash, expires_at, expected_version)
            .await?;

        let transfer = HandleTransfer {
            transfer_id: Uuid::new_v4(),
            handle_id,
            from_identity_id,
            to_identity_id,
            token_hash,
            expires_at,
            confirmed_at: None,
            created_at: Utc::now(),
        };
        self.repository.insert_transfer_record(&transfer).await?;

        Ok(TransferInitiation {
            handle,
            transfer_token: token,
            expires_at,
        })
    }

    /// Confirms a transfer within its window. Expired tokens auto-revert
    /// the handle to `active` under the original owner and return
    /// `TransferExpired` rather than completing the switch.
    #[instrument(skip(self, presented_token))]
    pub async fn confirm_transfer(&self, handle_id: Uuid, presented_token: &str) -> Result<Handle, ApiError> {
        let transfer = self
            .repository
            .find_transfer_by_handle(handle_id)
            .await?
            .ok_or(ApiError::TransferConflict)?;

        if transfer.expires_at <= Utc::now() {
            let handle = self.repository.find_by_id(handle_id).await?.ok_or_else(|| ApiError::NotFound {
                resource: format!("handle:{handle_id}"),
            })?;
            self.repository.revert_expired_transfer(handle_id, handle.version).await?;
            self.redis.invalidate_handle_validations().await?;
            return Err(ApiError::TransferExpired);
        }

        if hash_token(presented_token) != transfer.token_hash {
            warn!(handle_id = %handle_id, "transfer confirmation presented a non-matching token");
            return Err(ApiError::TransferConflict);
        }

        let current = self.repository.find_by_id(handle_id).await?.ok_or_else(|| ApiError::NotFound {
            resource: format!("handle:{handle_id}"),
        })?;
        let committed = self
            .repository
            .commit_transfer(handle_id, transfer.to_identity_id, current.version)
            .await?;
        self.repository.mark_transfer_confirmed(transfer.transfer_id).await?;
        self.redis.invalidate_handle_validations().await?;

        // spec.md §4.4: on confirmation, every outstanding sync job for the
        // handle is cancelled and resubmitted under the new owner's id.
        self.sync
            .cancel_and_resubmit_for_entity(SYNC_ENTITY_TYPE, transfer.from_identity_id, transfer.to_identity_id)
            .await?;

        Ok(committed)
    }
}

fn rejection_to_api_error(rejection: HandleRejection) -> ApiError {
    match rejection {
        HandleRejection::InvalidFormat => ApiError::InvalidFormat,
        HandleRejection::Taken => ApiError::Taken,
        HandleRejection::Reserved { reservation_class } => ApiError::Reserved { reservation_class },
        HandleRejection::SimilarToProtected { entity_name, score, .. } => {
            ApiError::SimilarToProtected { entry: entity_name, score }
        }
        HandleRejection::Inappropriate => ApiError::Inappropriate,
    }
}

fn generate_transfer_token() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(eid_crypto::random_bytes(32))
}

fn hash_token(token: &str) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    let digest = Sha256::digest(token.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_candidates_are_deterministic_and_ordered() {
        let candidates = suggestion_candidates("mariposa");
        let year = chrono::Utc::now().format("%Y").to_string();
        assert_eq!(candidates[0], "mariposa1");
        assert_eq!(candidates[8], format!("mariposa{year}"));
        assert!(candidates.contains(&"_mariposa".to_string()));
        assert!(candidates.contains(&"mariposaofficial".to_string()));
        assert!(candidates.contains(&"mariposareal".to_string()));
    }

    #[test]
    fn test_hash_token_is_deterministic_and_not_reversible_looking() {
        let h1 = hash_token("same-token");
        let h2 = hash_token("same-token");
        assert_eq!(h1, h2);
        assert_ne!(h1, "same-token");
        assert_eq!(h1.len(), 43); // base64url(no-pad) of a 32-byte SHA-256 digest
    }

    #[test]
    fn test_rejection_to_api_error_maps_every_variant() {
        assert!(matches!(rejection_to_api_error(HandleRejection::InvalidFormat), ApiError::InvalidFormat));
        assert!(matches!(rejection_to_api_error(HandleRejection::Taken), ApiError::Taken));
        assert!(matches!(rejection_to_api_error(HandleRejection::Inappropriate), ApiError::Inappropriate));
    }
}
