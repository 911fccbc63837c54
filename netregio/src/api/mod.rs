use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::{
    config::InfraPool,
    error::{ApiError, ApiResult},
    schema::{EmailReq, PendingRegistration, RegistrationStatusResp},
    service::registration,
};

pub fn router(st: InfraPool) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { (StatusCode::OK, Json(json!({"status": "ok"}))) }),
        )
        .route("/registration/create", post(create_user))
        .route("/registration/confirm", post(confirm_user))
        .route("/registration/rollback", post(rollback_user))
        .layer(CorsLayer::permissive())
        .with_state(st)
}

pub async fn create_user(
    State(pool): State<InfraPool>,
    Json(req): Json<PendingRegistration>,
) -> ApiResult<Json<RegistrationStatusResp>> {
    let status = registration::stage(&pool.cache, req)
        .await
        .map_err(|e| match e {
            crate::error::Error::ApiError(e) => e,
            _ => {
                tracing::error!("{}", e);
                ApiError::InternalServerError
            }
        })?;
    Ok(Json(RegistrationStatusResp { status }))
}

pub async fn confirm_user(
    State(pool): State<InfraPool>,
    Json(req): Json<EmailReq>,
) -> ApiResult<Json<RegistrationStatusResp>> {
    let status = registration::confirm(&pool.cache, &pool.db, &req.email)
        .await
        .map_err(|e| match e {
            crate::error::Error::ApiError(e) => e,
            _ => {
                tracing::error!("{}", e);
                ApiError::InternalServerError
            }
        })?;
    Ok(Json(RegistrationStatusResp { status }))
}

pub async fn rollback_user(
    State(pool): State<InfraPool>,
    Json(req): Json<EmailReq>,
) -> ApiResult<Json<RegistrationStatusResp>> {
    let status = registration::rollback(&pool.cache, &pool.db, &req.email)
        .await
        .map_err(|e| match e {
            crate::error::Error::ApiError(e) => e,
            _ => {
                tracing::error!("{}", e);
                ApiError::InternalServerError
            }
        })?;
    Ok(Json(RegistrationStatusResp { status }))
}
