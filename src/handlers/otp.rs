use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::password_reset::MessageResponse;
use crate::handlers::validation;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OtpRequestBody {
    pub email: String,
}

#[derive(Deserialize)]
pub struct OtpVerifyBody {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct OtpVerifyResponse {
    pub verified: bool,
}

/// POST /api/otp/request
///
/// # Security
/// 常に200を返す（ユーザー存在有無を漏洩しない）
pub async fn request_otp(
    State(state): State<AppState>,
    Json(body): Json<OtpRequestBody>,
) -> Result<Json<MessageResponse>, AppError> {
    validation::email(&body.email)?;

    state.otp_service.request_code(body.email.trim()).await?;

    Ok(Json(MessageResponse {
        message: "認証コードをメールで送信しました",
    }))
}

/// POST /api/otp/verify
///
/// 不一致・期限切れ・使用済みはすべて 401
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(body): Json<OtpVerifyBody>,
) -> Result<Json<OtpVerifyResponse>, AppError> {
    validation::email(&body.email)?;
    validation::otp_code(&body.code)?;

    let user_id = state
        .otp_service
        .verify_code(body.email.trim(), body.code.trim())
        .await?;

    tracing::info!(user_id, "OTP認証完了");

    Ok(Json(OtpVerifyResponse { verified: true }))
}
