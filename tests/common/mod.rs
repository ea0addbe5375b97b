#![allow(dead_code)]

use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::Value;

use schoolboard::auth::{create_jwt, Role};
use schoolboard::models::NewProfile;
use schoolboard::rate_limit::RateLimiterFacade;
use schoolboard::repo::inmem::InMemRepo;
use schoolboard::repo::ProfileRepo;
use schoolboard::storage::FsImageStore;
use schoolboard::{AppConfig, AppState};

pub const JWT_SECRET: &str = "test-secret-must-be-32-bytes-long!!";

pub fn setup_env() {
    std::env::set_var("JWT_SECRET", JWT_SECRET);
}

pub struct Ctx {
    pub state: AppState,
    pub repo: Arc<InMemRepo>,
    _images: tempfile::TempDir,
}

pub fn ctx_with(config: AppConfig, rate_limiter: Option<RateLimiterFacade>) -> Ctx {
    setup_env();
    let images = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemRepo::ephemeral());
    let state = AppState {
        repo: repo.clone(),
        image_store: Arc::new(FsImageStore::new(images.path())),
        rate_limiter,
        config,
    };
    Ctx { state, repo, _images: images }
}

pub fn ctx() -> Ctx {
    ctx_with(AppConfig::default(), None)
}

/// Stores a profile and returns a bearer token for it.
pub async fn user(repo: &InMemRepo, id: &str, nickname: &str, role: Role) -> String {
    let email = format!("{id}@sawoo.hs.kr");
    repo.create_profile(NewProfile {
        id: id.into(),
        email: email.clone(),
        nickname: nickname.into(),
        role,
        password_hash: None,
    })
    .await
    .unwrap();
    create_jwt(id, &email, vec![role]).unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

/// Calls the service and decodes the JSON body (`Null` for empty bodies).
pub async fn send<S, B, R>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[macro_export]
macro_rules! app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(schoolboard::SecurityHeaders::from_env())
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure(schoolboard::config),
        )
        .await
    };
}
