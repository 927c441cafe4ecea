//! spec.md §8: enough consecutive failed logins locks the account, and a
//! subsequent attempt with the *correct* password is still refused while
//! the lockout window is open.

mod common;

use actix_web::test::{call_service, init_service, TestRequest};
use actix_web::App;

#[actix_web::test]
async fn repeated_failed_logins_lock_the_account() {
    let (state, _db_pool) = common::build_app_state().await;
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

    let wrong_login = serde_json::json!({"email": email, "password": "definitely-wrong-password"});

    // shared/src/config.rs's default lockout threshold is 5 failed attempts;
    // the 5th failure is the one that actually flips `locked_until`.
    for attempt in 1..=5 {
        let response =
            call_service(&app, TestRequest::post().uri("/api/v1/eid/auth/login").set_json(&wrong_login).to_request()).await;
        assert_eq!(response.status().as_u16(), 401, "failed attempt {attempt} must report invalid credentials");
    }

    let correct_login = serde_json::json!({"email": email, "password": password});
    let locked_response =
        call_service(&app, TestRequest::post().uri("/api/v1/eid/auth/login").set_json(&correct_login).to_request()).await;
    assert_eq!(
        locked_response.status().as_u16(),
        401,
        "even the correct password must be refused while the account is locked out"
    );
}
