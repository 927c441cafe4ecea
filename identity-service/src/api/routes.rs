//! # Route Configuration
//!
//! ```text
//! /
//! ├── health                                   GET    → health_check
//! │
//! └── api/v1/eid/
//!     ├── identity                             POST   → register
//!     ├── identity/{id}                         GET    → get_identity
//!     ├── handles/
//!     │   ├── check                            GET    → check_handle
//!     │   ├── claim                            POST   → claim_handle
//!     │   ├── transfer                         POST   → request_handle_transfer
//!     │   └── transfer/confirm                 POST   → confirm_handle_transfer
//!     ├── auth/
//!     │   ├── login                            POST   → login
//!     │   ├── login/mfa                        POST   → complete_login_mfa
//!     │   ├── refresh                          POST   → refresh_token
//!     │   ├── revoke                           POST   → revoke_token
//!     │   ├── logout                           POST   → logout
//!     │   ├── sessions                         GET    → list_sessions
//!     │   └── sessions/{id}                    DELETE → revoke_session
//!     ├── oauth/
//!     │   ├── authorize                        GET    → oauth_authorize
//!     │   └── token                            POST   → oauth_token
//!     ├── password/change                      POST   → change_password
//!     ├── password-reset/
//!     │   ├── request                          POST   → request_password_reset
//!     │   └── confirm                          POST   → confirm_password_reset
//!     ├── mfa/
//!     │   ├── totp/enroll                      POST   → enroll_totp
//!     │   ├── totp/confirm/{method_id}         POST   → confirm_totp
//!     │   └── challenge/{method_id}             POST   → issue_mfa_challenge
//!     └── verification/
//!         ├── submit                           POST   → submit_verification_request
//!         ├── queue                            GET    → list_verification_queue
//!         ├── {id}                             GET    → get_verification_request
//!         ├── {id}/approve                     POST   → approve_verification_request
//!         └── {id}/reject                      POST   → reject_verification_request
//! ```
//!
//! All routes under `/api/v1/eid` are versioned together; protected routes
//! (sessions, password change, MFA enrollment) extract the caller's
//! identity from the `Authorization: Bearer` header inside the handler
//! rather than through a separate middleware layer, mirroring the
//! teacher's per-handler `extract_bearer_token` pattern.

use actix_web::web;

use super::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check)).service(
        web::scope("/api/v1/eid")
            .route("/identity", web::post().to(handlers::register))
            .route("/identity/{id}", web::get().to(handlers::get_identity))
            .service(
                web::scope("/handles")
                    .route("/check", web::get().to(handlers::check_handle))
                    .route("/claim", web::post().to(handlers::claim_handle))
                    .route("/transfer", web::post().to(handlers::request_handle_transfer))
                    .route("/transfer/confirm", web::post().to(handlers::confirm_handle_transfer)),
            )
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(handlers::login))
                    .route("/login/mfa", web::post().to(handlers::complete_login_mfa))
                    .route("/refresh", web::post().to(handlers::refresh_token))
                    .route("/revoke", web::post().to(handlers::revoke_token))
                    .route("/logout", web::post().to(handlers::logout))
                    .route("/sessions", web::get().to(handlers::list_sessions))
                    .route("/sessions/{id}", web::delete().to(handlers::revoke_session)),
            )
            .service(
                web::scope("/oauth")
                    .route("/authorize", web::get().to(handlers::oauth_authorize))
                    .route("/token", web::post().to(handlers::oauth_token)),
            )
            .route("/password/change", web::post().to(handlers::change_password))
            .service(
                web::scope("/password-reset")
                    .route("/request", web::post().to(handlers::request_password_reset))
                    .route("/confirm", web::post().to(handlers::confirm_password_reset)),
            )
            .service(
                web::scope("/mfa")
                    .route("/totp/enroll", web::post().to(handlers::enroll_totp))
                    .route("/totp/confirm/{method_id}", web::post().to(handlers::confirm_totp))
                    .route("/challenge/{method_id}", web::post().to(handlers::issue_mfa_challenge)),
            )
            .service(
                // Static segments (`submit`, `queue`) are registered before
                // the `{id}` catch-all so they match first.
                web::scope("/verification")
                    .route("/submit", web::post().to(handlers::submit_verification_request))
                    .route("/queue", web::get().to(handlers::list_verification_queue))
                    .route("/{id}", web::get().to(handlers::get_verification_request))
                    .route("/{id}/approve", web::post().to(handlers::approve_verification_request))
                    .route("/{id}/reject", web::post().to(handlers::reject_verification_request)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use actix_web::{
        test::{call_service, init_service, TestRequest},
        App,
    };

    use super::*;

    /// Exercises the real route table: unregistered methods/paths 404,
    /// and a registered route at least reaches its handler (rejecting the
    /// malformed body there, rather than failing to match at all).
    #[actix_web::test]
    async fn route_configuration_compiles() {
        let app = init_service(App::new().configure(configure)).await;

        let health = call_service(&app, TestRequest::get().uri("/health").to_request()).await;
        assert!(health.status().is_success());

        let unknown = call_service(&app, TestRequest::get().uri("/api/v1/eid/does-not-exist").to_request()).await;
        assert_eq!(unknown.status().as_u16(), 404);

        let wrong_method = call_service(&app, TestRequest::get().uri("/api/v1/eid/identity").to_request()).await;
        assert_eq!(wrong_method.status().as_u16(), 405);

        // Registered but unauthenticated — proves /handles/claim is wired
        // to a handler (which rejects for a missing bearer token) rather
        // than 404ing as an unmatched route.
        let claim = call_service(
            &app,
            TestRequest::post().uri("/api/v1/eid/handles/claim").set_json(serde_json::json!({})).to_request(),
        )
        .await;
        assert_ne!(claim.status().as_u16(), 404);

        let verify_submit = call_service(
            &app,
            TestRequest::post().uri("/api/v1/eid/verification/submit").set_json(serde_json::json!({})).to_request(),
        )
        .await;
        assert_ne!(verify_submit.status().as_u16(), 404);

        let oauth_token = call_service(
            &app,
            TestRequest::post().uri("/api/v1/eid/oauth/token").set_json(serde_json::json!({})).to_request(),
        )
        .await;
        assert_ne!(oauth_token.status().as_u16(), 404);
    }
}
