mod common;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::test;
use common::{login, register, session_from, test_app, test_state, uri, PREFIX};
use serde_json::json;
use watchparty_server::auth::{ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS};

#[actix_web::test]
async fn test_register_and_login() {
    let state = test_state();
    let app = test_app(&state).await;

    let register_response = test::TestRequest::post()
        .uri(&uri("/auth/register"))
        .set_json(json!({ "username": "alice", "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(register_response.status(), 201);

    let session = session_from(&register_response);
    for cookie in [&session.access, &session.refresh] {
        assert_eq!(cookie.path(), Some(PREFIX));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    }
    assert_eq!(session.access.max_age(), Some(CookieDuration::seconds(ACCESS_TOKEN_TTL_SECS)));
    assert_eq!(session.refresh.max_age(), Some(CookieDuration::seconds(REFRESH_TOKEN_TTL_SECS)));
    assert_eq!(ACCESS_TOKEN_TTL_SECS, 900);
    assert_eq!(REFRESH_TOKEN_TTL_SECS, 604800);

    let body: serde_json::Value = test::read_body_json(register_response).await;
    assert_eq!(body["access_token"], session.access.value());
    assert_eq!(body["refresh_token"], session.refresh.value());

    let login_response = test::TestRequest::post()
        .uri(&uri("/auth/login"))
        .set_json(json!({ "username": "alice", "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(login_response.status(), 200);
    let login_session = session_from(&login_response);
    assert_ne!(login_session.access.value(), session.access.value());

    state.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_invalid_login() {
    let state = test_state();
    let app = test_app(&state).await;
    register(&app, "alice").await;

    for (username, password) in [("alice", "wrongpassword"), ("nonexistent", "password123")] {
        let response = test::TestRequest::post()
            .uri(&uri("/auth/login"))
            .set_json(json!({ "username": username, "password": password }))
            .send_request(&app)
            .await;
        assert_eq!(response.status(), 401);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["error"]["message"], "Unauthorized");
    }
}

#[actix_web::test]
async fn test_invalid_registration() {
    let state = test_state();
    let app = test_app(&state).await;
    register(&app, "alice").await;

    let response = test::TestRequest::post()
        .uri(&uri("/auth/register"))
        .set_json(json!({ "username": "bob", "password": "" }))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 400);

    let response = test::TestRequest::post()
        .uri(&uri("/auth/register"))
        .set_json(json!({ "username": "alice", "password": "password456" }))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 409);
}

#[actix_web::test]
async fn test_protected_routes_require_access_cookie() {
    let state = test_state();
    let app = test_app(&state).await;
    let session = register(&app, "alice").await;

    let response = test::TestRequest::post().uri(&uri("/auth/logout")).send_request(&app).await;
    assert_eq!(response.status(), 401);

    for forged in [
        "not-a-jwt",
        "e30.e30.x",
        // alg "none", no signature
        "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJhbGljZSJ9.",
    ] {
        let response = test::TestRequest::get()
            .uri(&uri("/notifications/stream"))
            .cookie(Cookie::new("access_token", forged))
            .send_request(&app)
            .await;
        assert_eq!(response.status(), 401, "{}", forged);
    }

    // a refresh token is not an access token, even in the right slot
    let response = test::TestRequest::post()
        .uri(&uri("/auth/logout"))
        .cookie(Cookie::new("access_token", session.refresh.value().to_string()))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
async fn test_logout_revokes_only_that_session() {
    let state = test_state();
    let app = test_app(&state).await;
    let first = register(&app, "alice").await;
    let second = login(&app, "alice").await;

    let logout_response = test::TestRequest::post()
        .uri(&uri("/auth/logout"))
        .cookie(first.access.clone())
        .send_request(&app)
        .await;
    assert_eq!(logout_response.status(), 200);
    let cleared = session_from(&logout_response);
    assert_eq!(cleared.access.value(), "");
    assert_eq!(cleared.access.max_age(), Some(CookieDuration::ZERO));

    // same token again: its record is gone
    let response = test::TestRequest::post()
        .uri(&uri("/auth/logout"))
        .cookie(first.access.clone())
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);

    // the other session is untouched
    let response = test::TestRequest::post()
        .uri(&uri("/notifications/send"))
        .cookie(second.access.clone())
        .set_json(json!({ "receiver": "bob", "message": "still logged in" }))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 202);

    state.shutdown().await.unwrap();
}

#[actix_web::test]
async fn test_refresh_rotation() {
    let state = test_state();
    let app = test_app(&state).await;
    let original = register(&app, "alice").await;

    let response = test::TestRequest::post()
        .uri(&uri("/auth/refresh_token"))
        .cookie(original.refresh.clone())
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 200);
    let rotated = session_from(&response);
    assert_ne!(rotated.refresh.value(), original.refresh.value());
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["refresh_token"], rotated.refresh.value());

    // T1 was consumed by the first refresh
    let response = test::TestRequest::post()
        .uri(&uri("/auth/refresh_token"))
        .cookie(original.refresh.clone())
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);

    // T2 works exactly once too
    let response = test::TestRequest::post()
        .uri(&uri("/auth/refresh_token"))
        .cookie(rotated.refresh.clone())
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 200);

    // an access token cannot be used to refresh
    let response = test::TestRequest::post()
        .uri(&uri("/auth/refresh_token"))
        .cookie(Cookie::new("refresh_token", rotated.access.value().to_string()))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);

    state.shutdown().await.unwrap();
}
