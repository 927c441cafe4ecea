//! spec.md §8: registering against a reserved handle is rejected before
//! any identity or handle row is ever created.

mod common;

use actix_web::test::{call_service, init_service, TestRequest};
use actix_web::App;

#[actix_web::test]
async fn reserved_handle_blocks_registration() {
    let (state, db_pool) = common::build_app_state().await;
    let app = init_service(App::new().app_data(state.clone()).configure(identity_service::api::routes::configure)).await;

    let reserved = format!("reserved{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    sqlx::query(
        "INSERT INTO reserved_handles (reserved_handle_id, handle_lower, reservation_class, created_at) \
         VALUES ($1, $2, 'system', now())",
    )
    .bind(uuid::Uuid::new_v4())
    .bind(&reserved)
    .execute(&db_pool)
    .await
    .expect("seed reserved handle fixture");

    let body = serde_json::json!({
        "email": common::fake_email(),
        "password": "CorrectHorseBattery9!",
        "handle": reserved,
    });

    let response = call_service(&app, TestRequest::post().uri("/api/v1/eid/identity").set_json(&body).to_request()).await;

    assert_eq!(response.status().as_u16(), 409, "reserved handle must block registration with 409 Conflict");
}
