//! # Unified Identity Authority - Shared Library
//!
//! Ambient stack shared by every component crate (`eid-crypto`,
//! `handle-engine`, `mfa-engine`, `oauth-engine`, `verification-engine`,
//! `sync-engine`) and the `identity-service` façade.
//!
//! This crate provides the configuration, error taxonomy, database pool,
//! Redis client, tracing setup, and request validation helpers that every
//! component needs, so each component crate depends on `PgPool`/`RedisClient`
//! handles rather than reinventing connection management.
//!
//! ## Modules
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`config`] | Environment-based configuration | [`AppConfig`] |
//! | [`errors`] | Standardized error handling | [`ApiError`], [`ApiResult`] |
//! | [`auth`] | JWT tokens, password hashing, request auth extractor | [`JwtService`], [`PasswordHasher`] |
//! | [`database`] | PostgreSQL connection pool | [`create_pool`](database::create_pool) |
//! | [`redis_client`] | Redis for cache, sessions, rate limiting | [`RedisClient`] |
//! | [`tracing_config`] | Structured logging setup | [`init_tracing`](tracing_config::init_tracing) |
//! | [`validation`] | Request validation helpers | Custom validators |
//!
//! ## Design Decisions
//!
//! 1. **Single source of truth**: all cross-cutting types live here to prevent drift
//! 2. **Security first**: auth and crypto follow OWASP guidelines
//! 3. **Observable by default**: structured logging and tracing built-in
//! 4. **No module-level mutable state**: every component wires its dependencies
//!    explicitly at startup from a single composition root (`identity-service::main`)

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod redis_client;
pub mod tracing_config;
pub mod validation;

// Re-exports for convenience - import commonly used types directly from `shared`
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};

