mod common;

use axum::http::StatusCode;
use common::{As, mailed_code, spawn_app};
use serde_json::json;

#[tokio::test]
async fn test_health_live_is_public() {
    let app = spawn_app().await;

    let response = app.get("/api/system/health/live", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["status"], "alive");

    let response = app.get("/api/system/health/ready", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["database"], true);
}

#[tokio::test]
async fn test_register_returns_created_account() {
    let app = spawn_app().await;

    let response = app.register("alice", "a@x.com", "pw123").await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.data()["login"], "alice");
    assert_eq!(response.data()["permalink"], "alice");
    assert_eq!(response.data()["state"], "passive");
    assert!(response.data().get("password_hash").is_none());
}

#[tokio::test]
async fn test_duplicate_registration_returns_field_errors() {
    let app = spawn_app().await;
    app.register("alice", "a@x.com", "pw123").await;

    let response = app.register("Alice", "a@x.com", "pw123").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["kind"], "validation");
    assert!(response.body["fields"]["login"].is_array());
    assert!(response.body["fields"]["email"].is_array());
}

#[tokio::test]
async fn test_activation_flow() {
    let app = spawn_app().await;
    app.register("alice", "a@x.com", "pw123").await;

    let response = app.get("/api/users/activate", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

    let response = app.get("/api/users/activate/deadbeef", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["kind"], "not_found");

    let code = mailed_code(&app.mailer, "a@x.com", "/api/users/activate/").await;
    let response = app
        .get(&format!("/api/users/activate?code={code}"), As::Anonymous)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["account"]["state"], "active");

    let response = app
        .get(&format!("/api/users/activate/{code}"), As::Anonymous)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    assert!(
        app.mailer
            .wait_for(common::MAIL_WAIT, |e| e.to == "a@x.com"
                && e.subject.contains("has been activated"))
            .await
            .is_some()
    );
}

#[tokio::test]
async fn test_login_errors_do_not_reveal_accounts() {
    let app = spawn_app().await;
    app.member("alice", "a@x.com", "pw123").await;

    let wrong = app
        .call(
            "POST",
            "/api/session",
            Some(json!({ "login": "alice", "password": "nope" })),
            As::Anonymous,
        )
        .await;
    let unknown = app
        .call(
            "POST",
            "/api/session",
            Some(json!({ "login": "nobody", "password": "pw123" })),
            As::Anonymous,
        )
        .await;

    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body, unknown.body);
    assert_eq!(wrong.body["kind"], "authentication");
}

#[tokio::test]
async fn test_hub_requires_login() {
    let app = spawn_app().await;

    let response = app.get("/api/me", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["kind"], "authentication");

    let cookie = app.member("alice", "a@x.com", "pw123").await;
    let response = app.get("/api/me", As::Cookie(&cookie)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["login"], "alice");
    assert_eq!(response.data()["email"], "a@x.com");
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let app = spawn_app().await;
    let cookie = app.member("alice", "a@x.com", "pw123").await;

    let response = app.call("DELETE", "/api/session", None, As::Cookie(&cookie)).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.get("/api/me", As::Cookie(&cookie)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_remember_token_resumes_and_is_revoked_on_logout() {
    let app = spawn_app().await;
    app.member("alice", "a@x.com", "pw123").await;

    let response = app
        .call(
            "POST",
            "/api/session",
            Some(json!({ "login": "alice", "password": "pw123", "remember_me": true })),
            As::Anonymous,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let token = response.data()["remember_token"]
        .as_str()
        .expect("remember token issued")
        .to_string();

    let response = app.get("/api/me", As::Bearer(&token)).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.call("DELETE", "/api/session", None, As::Bearer(&token)).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.get("/api/me", As::Bearer(&token)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profiles_hide_addresses_from_strangers() {
    let app = spawn_app().await;
    app.member("alice", "a@x.com", "pw123").await;
    let bob = app.member("bob", "bob@x.com", "pw123").await;

    let response = app.get("/api/users/alice", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.data().get("email").is_none());
    assert_eq!(response.data()["hits"], 1);

    let response = app.get("/api/users/alice", As::Cookie(&bob)).await;
    assert!(response.data().get("email").is_none());

    let admin = app.admin().await;
    let response = app.get("/api/users/alice", As::Cookie(&admin)).await;
    assert_eq!(response.data()["email"], "a@x.com");

    let response = app.get("/api/users/nobody", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "Sorry, that user does not exist!");
}

#[tokio::test]
async fn test_latest_members_only_lists_activated_accounts() {
    let app = spawn_app().await;
    app.member("alice", "a@x.com", "pw123").await;
    app.register("bob", "bob@x.com", "pw123").await;

    let response = app.get("/api/users?limit=10", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::OK);
    let logins: Vec<&str> = response
        .data()
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["login"].as_str())
        .collect();
    assert!(logins.contains(&"alice"));
    assert!(!logins.contains(&"bob"));

    let response = app.get("/api/users?limit=0", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_change_password_is_owner_only() {
    let app = spawn_app().await;
    let alice = app.member("alice", "a@x.com", "pw123").await;
    let bob = app.member("bob", "bob@x.com", "pw123").await;

    let change = json!({
        "current_password": "pw123",
        "password": "next1",
        "password_confirmation": "next1",
    });

    let response = app
        .call(
            "PUT",
            "/api/users/alice/change_password",
            Some(change.clone()),
            As::Cookie(&bob),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["kind"], "authorization");

    let response = app
        .call(
            "PUT",
            "/api/users/alice/change_password",
            Some(json!({
                "current_password": "wrong",
                "password": "next1",
                "password_confirmation": "next1",
            })),
            As::Cookie(&alice),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Sorry the current password was incorrect");

    let response = app
        .call(
            "PUT",
            "/api/users/alice/change_password",
            Some(change),
            As::Cookie(&alice),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    app.login("alice", "next1").await;
}

#[tokio::test]
async fn test_email_change_round_trip() {
    let app = spawn_app().await;
    let alice = app.member("alice", "a@x.com", "pw123").await;
    app.register("bob", "bob@x.com", "pw123").await;

    let response = app
        .call(
            "PUT",
            "/api/users/alice/change_email",
            Some(json!({ "email": "bob@x.com" })),
            As::Cookie(&alice),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body["fields"]["email"].is_array());

    let response = app
        .call(
            "PUT",
            "/api/users/alice/change_email",
            Some(json!({ "email": "alice@new.com" })),
            As::Cookie(&alice),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let code = mailed_code(&app.mailer, "alice@new.com", "/api/users/activate_new_email/").await;
    let response = app
        .get(&format!("/api/users/activate_new_email/{code}"), As::Anonymous)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["account"]["email"], "alice@new.com");

    app.login("alice@new.com", "pw123").await;
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = spawn_app().await;
    app.member("alice", "a@x.com", "pw123").await;

    let known = app
        .call(
            "POST",
            "/api/users/forgot_password",
            Some(json!({ "email": "a@x.com" })),
            As::Anonymous,
        )
        .await;
    let unknown = app
        .call(
            "POST",
            "/api/users/forgot_password",
            Some(json!({ "email": "ghost@x.com" })),
            As::Anonymous,
        )
        .await;
    assert_eq!(known.status, StatusCode::OK);
    assert_eq!(known.body, unknown.body);

    let code = mailed_code(&app.mailer, "a@x.com", "/api/users/reset_password/").await;
    let uri = format!("/api/users/reset_password/{code}");

    let response = app.get(&uri, As::Anonymous).await;
    assert_eq!(response.status, StatusCode::OK);

    let body = json!({ "password": "new1", "password_confirmation": "new1" });
    let response = app.call("POST", &uri, Some(body.clone()), As::Anonymous).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.call("POST", &uri, Some(body), As::Anonymous).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["kind"], "invalid_reset_code");

    app.login("alice", "new1").await;
}

#[tokio::test]
async fn test_admin_transitions_require_an_admin() {
    let app = spawn_app().await;
    app.member("alice", "a@x.com", "pw123").await;
    let bob = app.member("bob", "bob@x.com", "pw123").await;
    let admin = app.admin().await;

    let routes = [
        ("PUT", "/api/users/alice/suspend"),
        ("PUT", "/api/users/alice/unsuspend"),
        ("DELETE", "/api/users/alice"),
        ("DELETE", "/api/users/alice/purge"),
    ];
    for (method, uri) in routes {
        let response = app.call(method, uri, None, As::Anonymous).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(response.body["kind"], "authentication");

        let response = app.call(method, uri, None, As::Cookie(&bob)).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{method} {uri}");
        assert_eq!(response.body["kind"], "authorization");
    }

    // Nothing above touched the account.
    let response = app.get("/api/users/alice", As::Cookie(&admin)).await;
    assert_eq!(response.data()["state"], "active");

    let response = app
        .call("PUT", "/api/users/alice/suspend", None, As::Cookie(&admin))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["state"], "suspended");

    let response = app
        .call("PUT", "/api/users/alice/unsuspend", None, As::Cookie(&admin))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["state"], "active");

    let response = app
        .call("DELETE", "/api/users/alice", None, As::Cookie(&admin))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["state"], "deleted");

    let response = app.get("/api/users/alice", As::Anonymous).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .call("DELETE", "/api/users/alice/purge", None, As::Cookie(&admin))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .call("DELETE", "/api/users/alice/purge", None, As::Cookie(&admin))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
