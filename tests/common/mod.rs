#![allow(dead_code)]

use actix_web::body::{BoxBody, MessageBody};
use actix_web::cookie::Cookie;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App, Error};
use actix_http::Request;
use serde_json::json;
use std::time::Duration;
use watchparty_server::{api_scope, health_check, AppState, Settings};

pub const PREFIX: &str = "/api";

pub fn test_state() -> AppState {
    let config = Settings::new_for_test().expect("Failed to load test config");
    let backend = std::sync::Arc::new(watchparty_server::store::MemoryStore::new("test:"));
    AppState::with_store(config, backend)
}

pub async fn test_app(
    state: &AppState,
) -> impl Service<Request, Response = ServiceResponse<BoxBody>, Error = Error> {
    test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .route("/health", web::get().to(health_check))
            .service(api_scope(PREFIX)),
    )
    .await
}

/// Session cookies set by a response.
#[derive(Debug, Clone)]
pub struct Session {
    pub access: Cookie<'static>,
    pub refresh: Cookie<'static>,
}

pub fn session_from(resp: &ServiceResponse<BoxBody>) -> Session {
    let find = |name: &str| {
        resp.response()
            .cookies()
            .find(|c| c.name() == name)
            .map(|c| c.into_owned())
            .unwrap_or_else(|| panic!("response did not set {}", name))
    };
    Session {
        access: find("access_token"),
        refresh: find("refresh_token"),
    }
}

pub fn uri(path: &str) -> String {
    format!("{}{}", PREFIX, path)
}

pub async fn register<S>(app: &S, username: &str) -> Session
where
    S: Service<Request, Response = ServiceResponse<BoxBody>, Error = Error>,
{
    let resp = test::TestRequest::post()
        .uri(&uri("/auth/register"))
        .set_json(json!({ "username": username, "password": "password123" }))
        .send_request(app)
        .await;
    assert_eq!(resp.status(), 201, "registration of {} failed", username);
    session_from(&resp)
}

pub async fn login<S>(app: &S, username: &str) -> Session
where
    S: Service<Request, Response = ServiceResponse<BoxBody>, Error = Error>,
{
    let resp = test::TestRequest::post()
        .uri(&uri("/auth/login"))
        .set_json(json!({ "username": username, "password": "password123" }))
        .send_request(app)
        .await;
    assert_eq!(resp.status(), 200, "login of {} failed", username);
    session_from(&resp)
}

/// Next body chunk of a streaming response, or `None` if nothing arrives in `wait`.
pub async fn next_chunk(body: &mut BoxBody, wait: Duration) -> Option<String> {
    let chunk = tokio::time::timeout(
        wait,
        futures::future::poll_fn(|cx| std::pin::Pin::new(&mut *body).poll_next(cx)),
    )
    .await
    .ok()??;
    let bytes = chunk.expect("stream body error");
    Some(String::from_utf8(bytes.to_vec()).expect("non-utf8 frame"))
}
