//! # Unified Identity Authority
//!
//! **identity-service** is the façade (spec.md §4.9 / C9) that composes the
//! engine crates — `handle-engine`, `mfa-engine`, `oauth-engine`,
//! `sync-engine`, `verification-engine` — into the registration, login,
//! session, password, and MFA-enrolment surface described in spec.md §6.
//! Each engine owns its own domain/repository/service layers and is a
//! workspace member in its own right; this crate's job is orchestration,
//! not reimplementation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        HTTP Layer (api/)                        │
//! │  routes → handlers → dto                                        │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 IdentityService (service/)                      │
//! │  register / login / sessions / password / MFA hand-off          │
//! └───┬──────────┬──────────┬──────────┬──────────┬─────────────────┘
//!     ▼          ▼          ▼          ▼          ▼
//!  Handle      OAuth       MFA       Sync     Verification
//!  Service    Service    Service    Service     Service
//! ```
//!
//! ## Configuration
//!
//! Environment variables are loaded via [`shared::config::AppConfig`],
//! same as every other service in this workspace. Two additional raw
//! secrets this crate owns directly (not modeled in `AppConfig` since
//! they're key material, not settings):
//!
//! - `EID_MASTER_KEY_BASE64` — 32 bytes, base64, wraps every envelope DEK
//!   (spec.md §4.1). In development, a random key is generated if unset —
//!   fine for a single dev process, useless across restarts.
//! - `EID_SIGNING_KEY_SEED_BASE64` — 32-byte Ed25519 seed, base64, signs
//!   verification decisions (spec.md §4.7). Same dev fallback.
//!
//! In production both are required; startup fails fast if they're missing.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tracing::{info, warn};

use eid_crypto::signing::{SignatureKeyRing, SigningKeyPair};
use eid_crypto::{EnvelopeCipher, KeyRing, PasswordHasher};
use handle_engine::{HandleRepository, HandleService};
use mfa_engine::{MfaRepository, MfaService};
use oauth_engine::{OAuthRepository, OAuthService};
use shared::{
    auth::jwt::JwtService, config::AppConfig, database, redis_client::RedisClient, tracing_config,
};
use sync_engine::{SyncJobRepository, SyncService};
use verification_engine::{VerificationRepository, VerificationService};

use identity_service::api::routes;
use identity_service::repository::{IdentityRepository, SessionRepository};
use identity_service::service::IdentityService;
use identity_service::AppState;

const MASTER_KEY_ENV: &str = "EID_MASTER_KEY_BASE64";
const SIGNING_SEED_ENV: &str = "EID_SIGNING_KEY_SEED_BASE64";

/// Resolves the 32-byte envelope master key from `EID_MASTER_KEY_BASE64`.
///
/// Outside production, a missing key falls back to a random one generated
/// for this process only — encrypted data becomes unreadable across
/// restarts, which is acceptable for local development but never for a
/// deployed environment.
fn load_master_key(config: &AppConfig) -> [u8; 32] {
    match std::env::var(MASTER_KEY_ENV) {
        Ok(encoded) => {
            let bytes = BASE64
                .decode(encoded.trim())
                .expect("EID_MASTER_KEY_BASE64 must be valid base64");
            bytes
                .try_into()
                .expect("EID_MASTER_KEY_BASE64 must decode to exactly 32 bytes")
        }
        Err(_) if config.is_production() => {
            panic!("EID_MASTER_KEY_BASE64 is required in production")
        }
        Err(_) => {
            warn!("EID_MASTER_KEY_BASE64 not set, generating an ephemeral development key");
            let mut key = [0u8; 32];
            rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut key);
            key
        }
    }
}

/// Resolves the 32-byte Ed25519 signing seed from `EID_SIGNING_KEY_SEED_BASE64`.
/// Same dev-mode fallback as [`load_master_key`].
fn load_signing_seed(config: &AppConfig) -> [u8; 32] {
    match std::env::var(SIGNING_SEED_ENV) {
        Ok(encoded) => {
            let bytes = BASE64
                .decode(encoded.trim())
                .expect("EID_SIGNING_KEY_SEED_BASE64 must be valid base64");
            bytes
                .try_into()
                .expect("EID_SIGNING_KEY_SEED_BASE64 must decode to exactly 32 bytes")
        }
        Err(_) if config.is_production() => {
            panic!("EID_SIGNING_KEY_SEED_BASE64 is required in production")
        }
        Err(_) => {
            warn!("EID_SIGNING_KEY_SEED_BASE64 not set, generating an ephemeral development key");
            let mut seed = [0u8; 32];
            rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut seed);
            seed
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ─────────────────────────────────────────────────────────────────────
    // Step 1: Load configuration from environment
    // ─────────────────────────────────────────────────────────────────────
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // ─────────────────────────────────────────────────────────────────────
    // Step 2: Initialize structured logging
    // ─────────────────────────────────────────────────────────────────────
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "Starting identity-service"
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 3: Create PostgreSQL connection pool
    // ─────────────────────────────────────────────────────────────────────
    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    // ─────────────────────────────────────────────────────────────────────
    // Step 4: Create Redis client
    // ─────────────────────────────────────────────────────────────────────
    let redis_client = RedisClient::new(&config.redis)
        .await
        .expect("Failed to connect to Redis");

    // ─────────────────────────────────────────────────────────────────────
    // Step 5: Bootstrap crypto key material
    // ─────────────────────────────────────────────────────────────────────
    let master_key = load_master_key(&config);
    let envelope_cipher = EnvelopeCipher::new(KeyRing::new(
        config.crypto.master_key_id.clone(),
        1,
        master_key,
    ));

    let signing_seed = load_signing_seed(&config);
    let signing_key_pair = SigningKeyPair::from_seed("verification-key-1", signing_seed);
    let signing_keys = SignatureKeyRing::new().with_active_key(signing_key_pair);

    // ─────────────────────────────────────────────────────────────────────
    // Step 6: Instantiate engine repositories and services
    // ─────────────────────────────────────────────────────────────────────
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let password_hasher = PasswordHasher::new();

    // `HandleService`/`MfaService`/`OAuthService` don't derive `Clone` (they
    // hold no shared state worth sharing), so each one the façade needs
    // internally is built as a second instance over a cloned repository
    // rather than cloned as a value — the repositories and config structs
    // are the cheap-to-clone parts.
    let sync_job_repository = SyncJobRepository::new(db_pool.clone());

    let handle_repository = HandleRepository::new(db_pool.clone());
    let handle_service = HandleService::new(
        handle_repository.clone(),
        redis_client.clone(),
        SyncService::new(sync_job_repository.clone(), Vec::new(), config.sync.clone()),
    );
    let handle_service_for_identity = HandleService::new(
        handle_repository.clone(),
        redis_client.clone(),
        SyncService::new(sync_job_repository.clone(), Vec::new(), config.sync.clone()),
    );

    let mfa_repository = MfaRepository::new(db_pool.clone());
    let build_mfa_service = |repository, crypto| {
        MfaService::new(repository, crypto)
            .with_challenge_ttl(chrono::Duration::seconds(config.mfa.challenge_ttl_seconds))
            .with_max_attempts(config.mfa.max_attempts)
            .with_lockout(config.mfa.max_failed, chrono::Duration::minutes(config.mfa.cooldown_minutes))
    };
    let mfa_service = build_mfa_service(mfa_repository.clone(), envelope_cipher.clone());
    let mfa_service_for_identity = build_mfa_service(mfa_repository, envelope_cipher);

    let oauth_repository = OAuthRepository::new(db_pool.clone());
    let oauth_service = OAuthService::new(
        oauth_repository.clone(),
        (*jwt_service).clone(),
        password_hasher.clone(),
        redis_client.clone(),
        config.jwt.clone(),
        config.oauth.clone(),
    );
    let oauth_service_for_identity = OAuthService::new(
        oauth_repository,
        (*jwt_service).clone(),
        password_hasher.clone(),
        redis_client.clone(),
        config.jwt.clone(),
        config.oauth.clone(),
    );

    let sync_service = SyncService::new(sync_job_repository, Vec::new(), config.sync.clone());

    let verification_repository = VerificationRepository::new(db_pool.clone());
    let verification_service = VerificationService::new(verification_repository, signing_keys);

    let identity_repository = IdentityRepository::new(db_pool.clone());
    let session_repository = SessionRepository::new(db_pool.clone());

    let identity_service = IdentityService::new(
        identity_repository,
        session_repository,
        handle_service_for_identity,
        handle_repository,
        mfa_service_for_identity,
        oauth_service_for_identity,
        sync_service,
        password_hasher,
        redis_client,
        config.lockout.clone(),
    );

    let app_state = web::Data::new(AppState {
        identity_service,
        oauth_service,
        jwt_service,
        handle_service,
        mfa_service,
        verification_service,
    });

    let db_pool = web::Data::new(db_pool);

    // ─────────────────────────────────────────────────────────────────────
    // Step 7: Configure and start HTTP server
    // ─────────────────────────────────────────────────────────────────────
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    info!("Server listening on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin() // TODO: Configure specific origins for production
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(app_state.clone())
            .app_data(db_pool.clone())
            .configure(routes::configure)
    })
    .bind((server_host, server_port))?
    .run()
    .await
}
