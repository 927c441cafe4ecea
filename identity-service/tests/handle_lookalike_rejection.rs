//! spec.md §8: a handle that matches a protected figure/brand closely
//! enough to trip the similarity threshold is rejected, the same as an
//! exact collision — this is the anti-impersonation gate ahead of the
//! claim workflow (spec.md §4.4).

mod common;

use actix_web::test::{call_service, init_service, TestRequest};
use actix_web::App;

#[actix_web::test]
async fn lookalike_handle_blocks_registration() {
    let (state, db_pool) = common::build_app_state().await;
    let app = init_service(App::new().app_data(state.clone()).configure(identity_service::api::routes::configure)).await;

    let protected_handle = format!("brand{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    sqlx::query(
        "INSERT INTO protected_entries \
         (protected_entry_id, name, handle_lower, aliases, tier, similarity_threshold, claimed_by, claimed_at) \
         VALUES ($1, $2, $3, '{}', 'high'::protection_tier, 0.85, NULL, NULL)",
    )
    .bind(uuid::Uuid::new_v4())
    .bind("Test Protected Brand")
    .bind(&protected_handle)
    .execute(&db_pool)
    .await
    .expect("seed protected entry fixture");

    // Registering the protected name itself is the clearest possible
    // similarity match (score 1.0) — guaranteed to clear any threshold.
    let body = serde_json::json!({
        "email": common::fake_email(),
        "password": "CorrectHorseBattery9!",
        "handle": protected_handle,
    });

    let response = call_service(&app, TestRequest::post().uri("/api/v1/eid/identity").set_json(&body).to_request()).await;

    assert_eq!(response.status().as_u16(), 409, "handle matching a protected entry must be rejected with 409 Conflict");
}
