use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::validation;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResetRequestBody {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordBody {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /api/password/reset-request
///
/// # Security
/// 常に200を返す（ユーザー存在有無を漏洩しない）
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(body): Json<ResetRequestBody>,
) -> Result<Json<MessageResponse>, AppError> {
    validation::email(&body.email)?;

    state
        .password_reset_service
        .request_reset(body.email.trim())
        .await?;

    Ok(Json(MessageResponse {
        message: "パスワードリセット手順をメールで送信しました",
    }))
}

/// POST /api/password/reset
///
/// # Security
/// token, new_password はログに出力しない（Debug も実装しない）
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordBody>,
) -> Result<Json<MessageResponse>, AppError> {
    validation::email(&body.email)?;
    validation::reset_token(&body.token)?;
    validation::new_password(&body.new_password)?;

    state
        .password_reset_service
        .reset_password(body.email.trim(), body.token.trim(), &body.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "パスワードが更新されました",
    }))
}
