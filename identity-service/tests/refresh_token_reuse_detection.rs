//! spec.md §8: replaying an already-rotated refresh token must fail and
//! burn the entire token family, not just the reused token.

mod common;

use actix_web::test::{call_service, init_service, TestRequest};
use actix_web::App;

const CLIENT_ID: &str = "eid-web";
const REDIRECT_URI: &str = "https://app.example.com/callback";

#[actix_web::test]
async fn replaying_a_rotated_refresh_token_is_rejected_and_revokes_the_family() {
    let (state, db_pool) = common::build_app_state().await;
    common::seed_oauth_client(&db_pool, CLIENT_ID, REDIRECT_URI).await;
    let app = init_service(App::new().app_data(state.clone()).configure(identity_service::api::routes::configure)).await;

    let email = common::fake_email();
    let password = "CorrectHorseBattery9!";
    let register_body = serde_json::json!({
        "email": email,
        "password": password,
        "handle": common::fake_handle(),
    });
    let register_response =
        call_service(&app, TestRequest::post().uri("/api/v1/eid/identity").set_json(&register_body).to_request()).await;
    assert_eq!(register_response.status().as_u16(), 201);

    let login_body = serde_json::json!({"email": email, "password": password});
    let login_response =
        call_service(&app, TestRequest::post().uri("/api/v1/eid/auth/login").set_json(&login_body).to_request()).await;
    assert_eq!(login_response.status().as_u16(), 200);
    let login_json: serde_json::Value = actix_web::test::read_body_json(login_response).await;
    let refresh_token = login_json["tokens"]["refreshToken"].as_str().expect("login grants a refresh token").to_string();

    let refresh_body = serde_json::json!({"refreshToken": refresh_token, "clientId": CLIENT_ID});

    let first_use =
        call_service(&app, TestRequest::post().uri("/api/v1/eid/auth/refresh").set_json(&refresh_body).to_request()).await;
    assert_eq!(first_use.status().as_u16(), 200, "the first use of a fresh refresh token must rotate successfully");
    let first_json: serde_json::Value = actix_web::test::read_body_json(first_use).await;
    let rotated_refresh_token = first_json["refreshToken"].as_str().expect("rotation issues a new refresh token").to_string();

    let replay =
        call_service(&app, TestRequest::post().uri("/api/v1/eid/auth/refresh").set_json(&refresh_body).to_request()).await;
    assert_eq!(replay.status().as_u16(), 400, "replaying an already-rotated refresh token must be rejected");

    let rotated_body = serde_json::json!({"refreshToken": rotated_refresh_token, "clientId": CLIENT_ID});
    let rotated_after_reuse =
        call_service(&app, TestRequest::post().uri("/api/v1/eid/auth/refresh").set_json(&rotated_body).to_request()).await;
    assert_eq!(
        rotated_after_reuse.status().as_u16(),
        400,
        "reuse detection must revoke the whole token family, including tokens minted after the replayed one"
    );
}
