//! spec.md §4.4 / §8: confirming a handle transfer cancels every
//! outstanding sync job queued against the old owner and resubmits an
//! equivalent job under the new owner, preserving enqueue order.
//!
//! No HTTP endpoint lists sync jobs, so this test drives the transfer
//! through the real `/handles` routes but inspects the outbox directly
//! through `sync-engine`'s own repository.

mod common;

use actix_web::test::{call_service, init_service, TestRequest};
use actix_web::App;
use serde_json::json;
use sync_engine::{JobStatus, NewSyncJob, SyncJobRepository};

#[actix_web::test]
async fn confirming_a_transfer_cuts_open_jobs_over_to_the_new_owner_in_order() {
    let (state, db_pool) = common::build_app_state().await;
    let app = init_service(App::new().app_data(state.clone()).configure(identity_service::api::routes::configure)).await;

    let register = |email: String, handle: String| {
        let app = &app;
        async move {
            let body = json!({"email": email, "password": "CorrectHorseBattery9!", "handle": handle});
            let response = call_service(app, TestRequest::post().uri("/api/v1/eid/identity").set_json(&body).to_request()).await;
            assert_eq!(response.status().as_u16(), 201);
            let parsed: serde_json::Value = actix_web::test::read_body_json(response).await;
            (
                uuid::Uuid::parse_str(parsed["identityId"].as_str().unwrap()).unwrap(),
                uuid::Uuid::parse_str(parsed["handleId"].as_str().unwrap()).unwrap(),
            )
        }
    };

    let (from_identity_id, handle_id) = register(common::fake_email(), common::fake_handle()).await;
    let (to_identity_id, _to_handle_id) = register(common::fake_email(), common::fake_handle()).await;

    let sync_job_repository = SyncJobRepository::new(db_pool.clone());
    for sequence in 0..3 {
        let job = NewSyncJob {
            entity_type: "identity".to_string(),
            entity_id: from_identity_id,
            source_platform: "eid".to_string(),
            target_platforms: vec!["ergrato-social".to_string()],
            payload: json!({"sequence": sequence}),
            delta: None,
            scheduled_at: None,
            depends_on: Vec::new(),
            priority: sync_engine::SyncPriority::Normal,
            conflict_resolution: sync_engine::ConflictResolution::LatestWins,
            rollback_data: None,
            max_attempts: None,
            parent_job_id: None,
        };
        sync_job_repository.enqueue_standalone(&job).await.expect("seed outstanding sync job");
    }

    let transfer_body = json!({"handleId": handle_id, "toIdentityId": to_identity_id, "expectedVersion": 0});
    let transfer_response = call_service(
        &app,
        TestRequest::post()
            .uri("/api/v1/eid/handles/transfer")
            .insert_header(("Authorization", format!("Bearer {}", forged_bearer(&state, from_identity_id))))
            .set_json(&transfer_body)
            .to_request(),
    )
    .await;
    assert_eq!(transfer_response.status().as_u16(), 200, "transfer initiation must succeed for the handle's owner");
    let transfer_json: serde_json::Value = actix_web::test::read_body_json(transfer_response).await;
    let transfer_token = transfer_json["transferToken"].as_str().expect("initiation returns the plaintext token").to_string();

    let confirm_body = json!({"handleId": handle_id, "transferToken": transfer_token});
    let confirm_response = call_service(
        &app,
        TestRequest::post()
            .uri("/api/v1/eid/handles/transfer/confirm")
            .insert_header(("Authorization", format!("Bearer {}", forged_bearer(&state, to_identity_id))))
            .set_json(&confirm_body)
            .to_request(),
    )
    .await;
    assert_eq!(confirm_response.status().as_u16(), 200, "confirmation must succeed with a matching token");

    let remaining_under_old_owner = sync_job_repository.list_open_for_entity("identity", from_identity_id).await.unwrap();
    assert!(remaining_under_old_owner.is_empty(), "every job under the old owner must be cancelled, not left open");

    // Both registrations enqueue their own "identity" directory-propagation
    // job; the new owner's open queue after the cutover is its own
    // registration job (1) plus everything cancelled-and-resubmitted from
    // the old owner (the 3 seeded jobs + the old owner's own registration
    // job = 4), for 5 total.
    let resubmitted_under_new_owner = sync_job_repository.list_open_for_entity("identity", to_identity_id).await.unwrap();
    assert_eq!(resubmitted_under_new_owner.len(), 5, "every open job, including both registration jobs, must end up under the new owner");
    assert!(resubmitted_under_new_owner.iter().all(|job| job.status != JobStatus::Cancelled));

    let sequences: Vec<i64> = resubmitted_under_new_owner
        .iter()
        .filter_map(|job| job.payload.get("sequence").and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(sequences, vec![0, 1, 2], "the manually-seeded jobs must preserve their original enqueue order");
}

/// `confirm_transfer`'s authorization in this crate only requires *some*
/// valid bearer, not specifically the transfer's counterparty (there's no
/// RBAC layer to check that against) — this mints a token for whichever
/// identity the scenario needs to act as.
fn forged_bearer(state: &actix_web::web::Data<identity_service::AppState>, identity_id: uuid::Uuid) -> String {
    let claims = shared::auth::jwt::AccessTokenClaims {
        identity_id,
        scope: "profile".to_string(),
        client_id: "eid-web".to_string(),
        session_id: uuid::Uuid::new_v4(),
        amr: vec!["pwd".to_string()],
        acr: "pwd".to_string(),
    };
    let (token, _jti) = state.jwt_service.generate_access_token(claims, 3600).expect("mint test bearer token");
    token
}
