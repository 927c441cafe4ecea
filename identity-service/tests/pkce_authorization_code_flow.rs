//! spec.md §8: a signed-in identity drives the full authorization-code +
//! PKCE exchange — register, login, `/oauth/authorize`, `/oauth/token` —
//! and comes out the other end holding a usable access/refresh pair.

mod common;

use actix_web::test::{call_service, init_service, TestRequest};
use actix_web::App;

const CLIENT_ID: &str = "eid-web";
const REDIRECT_URI: &str = "https://app.example.com/callback";

#[actix_web::test]
async fn authorization_code_exchange_issues_tokens() {
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
    assert_eq!(register_response.status().as_u16(), 201, "registration must succeed before login");

    let login_body = serde_json::json!({"email": email, "password": password});
    let login_response =
        call_service(&app, TestRequest::post().uri("/api/v1/eid/auth/login").set_json(&login_body).to_request()).await;
    assert_eq!(login_response.status().as_u16(), 200, "login must succeed against the seeded trusted client");
    let login_json: serde_json::Value = actix_web::test::read_body_json(login_response).await;
    let access_token = login_json["tokens"]["accessToken"].as_str().expect("login response carries an access token");

    let code_verifier = common::random_code_verifier();
    let code_challenge = oauth_engine::hash_token(&code_verifier);
    let authorize_uri = format!(
        "/api/v1/eid/oauth/authorize?clientId={CLIENT_ID}&redirectUri={REDIRECT_URI}&scope=profile&state=xyz123\
         &codeChallenge={code_challenge}&codeChallengeMethod=S256"
    );
    let authorize_response = call_service(
        &app,
        TestRequest::get().uri(&authorize_uri).insert_header(("Authorization", format!("Bearer {access_token}"))).to_request(),
    )
    .await;
    assert_eq!(authorize_response.status().as_u16(), 200, "authorize must issue a code for an authenticated bearer");
    let authorize_json: serde_json::Value = actix_web::test::read_body_json(authorize_response).await;
    let code = authorize_json["code"].as_str().expect("authorize response carries a code").to_string();

    let token_body = serde_json::json!({
        "grant_type": "authorization_code",
        "client_id": CLIENT_ID,
        "code": code,
        "redirect_uri": REDIRECT_URI,
        "code_verifier": code_verifier,
    });
    let token_response =
        call_service(&app, TestRequest::post().uri("/api/v1/eid/oauth/token").set_json(&token_body).to_request()).await;
    assert_eq!(token_response.status().as_u16(), 200, "a correct PKCE verifier must redeem the code for tokens");
    let token_json: serde_json::Value = actix_web::test::read_body_json(token_response).await;
    assert!(token_json["accessToken"].as_str().is_some(), "token response must carry an access token");
}
