//! Shared harness for identity-service's integration tests (spec.md §8).
//!
//! Builds the exact same `AppState` `main.rs` builds — real Postgres pool,
//! real Redis client, real engine services — from `DATABASE_URL`/
//! `REDIS_URL` in the environment. These tests exercise the full stack
//! through the actual route table; they need a running Postgres and Redis
//! with the schema already migrated, the same as running the service
//! itself does.

use std::sync::Arc;

use actix_web::web;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use rand::RngCore;

use eid_crypto::signing::{SignatureKeyRing, SigningKeyPair};
use eid_crypto::{EnvelopeCipher, KeyRing, PasswordHasher};
use handle_engine::{HandleRepository, HandleService};
use identity_service::repository::{IdentityRepository, SessionRepository};
use identity_service::service::IdentityService;
use identity_service::AppState;
use mfa_engine::{MfaRepository, MfaService};
use oauth_engine::{OAuthRepository, OAuthService};
use shared::{auth::jwt::JwtService, config::AppConfig, database, redis_client::RedisClient};
use sync_engine::{SyncJobRepository, SyncService};
use verification_engine::{VerificationRepository, VerificationService};

/// Builds a fully-wired `AppState` the same way `main.rs` does, reading
/// connection info from the environment rather than a config file. Also
/// returns the raw `PgPool` so tests can seed fixture rows (reserved
/// handles, protected entries) that have no repository insert method of
/// their own — those tables are populated by an external seed step in
/// production, not by this crate.
pub async fn build_app_state() -> (web::Data<AppState>, sqlx::PgPool) {
    let mut config = AppConfig::from_env().expect("AppConfig::from_env (DATABASE_URL / REDIS_URL must be set)");
    config.database.url = std::env::var("DATABASE_URL").unwrap_or(config.database.url);
    config.redis.url = std::env::var("REDIS_URL").unwrap_or(config.redis.url);

    let db_pool = database::create_pool(&config.database).await.expect("connect to test Postgres");
    let redis_client = RedisClient::new(&config.redis).await.expect("connect to test Redis");

    let mut master_key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut master_key);
    let envelope_cipher = EnvelopeCipher::new(KeyRing::new(config.crypto.master_key_id.clone(), 1, master_key));

    let mut signing_seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut signing_seed);
    let signing_keys =
        SignatureKeyRing::new().with_active_key(SigningKeyPair::from_seed("test-verification-key", signing_seed));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let password_hasher = PasswordHasher::new();

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

    let state = web::Data::new(AppState {
        identity_service,
        oauth_service,
        jwt_service,
        handle_service,
        mfa_service,
        verification_service,
    });

    (state, db_pool)
}

/// A realistic-looking, unique email for registration fixtures.
pub fn fake_email() -> String {
    SafeEmail().fake()
}

/// A unique lowercase handle derived from a fake email's local part, to
/// avoid collisions between test runs against the same database.
pub fn fake_handle() -> String {
    let mut suffix = [0u8; 4];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    format!("tester{}", hex_suffix(&suffix))
}

fn hex_suffix(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Seeds a trusted first-party OAuth client (password + authorization-code
/// + refresh-token grants, full known-scope set) so login and the PKCE
/// flow have a client to authenticate against. Idempotent: a second seed
/// of the same `client_id` across test runs is a no-op rather than a
/// unique-violation, since `oauth_clients` has no insert method of its own
/// and nothing else in this workspace seeds it.
pub async fn seed_oauth_client(db_pool: &sqlx::PgPool, client_id: &str, redirect_uri: &str) {
    sqlx::query(
        "INSERT INTO oauth_clients \
         (client_id, client_secret_hash, client_name, redirect_uris, allowed_scopes, \
          allowed_grant_types, is_trusted, is_active, created_at) \
         VALUES ($1, NULL, $2, $3, $4, $5, true, true, now()) \
         ON CONFLICT (client_id) DO NOTHING",
    )
    .bind(client_id)
    .bind(format!("{client_id} (test fixture)"))
    .bind(vec![redirect_uri.to_string()])
    .bind(vec![
        "profile".to_string(),
        "email".to_string(),
        "handle".to_string(),
        "mfa".to_string(),
        "sync".to_string(),
    ])
    .bind(vec![
        oauth_engine::GrantType::Password,
        oauth_engine::GrantType::AuthorizationCode,
        oauth_engine::GrantType::RefreshToken,
    ])
    .execute(db_pool)
    .await
    .expect("seed oauth client fixture");
}

/// A PKCE code verifier long enough to satisfy `code_challenge`'s 43-char
/// minimum once hashed, built from random bytes rather than a fixed
/// string so concurrent tests never collide on the same authorization code.
pub fn random_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    BASE64.encode(bytes).replace(['+', '/', '='], "a")
}

/// Stands in for whatever client SDK supplies the `X-Device-Fingerprint`
/// header in production — this crate only consumes that header, it
/// doesn't generate it, so tests mock the generator rather than
/// reimplementing one.
#[mockall::automock]
pub trait DeviceFingerprintProvider {
    fn fingerprint(&self) -> String;
}

pub fn mock_device_fingerprint(value: &'static str) -> MockDeviceFingerprintProvider {
    let mut mock = MockDeviceFingerprintProvider::new();
    mock.expect_fingerprint().returning(move || value.to_string());
    mock
}
