//! The wire error shape: `{detail, code}` plus an HTTP status.

use crate::battle::BattleError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub detail: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                detail: self.detail,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<BattleError> for ApiError {
    fn from(error: BattleError) -> Self {
        let detail = error.to_string();
        match error {
            BattleError::Validation(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "validation_error",
                detail,
            ),
            BattleError::PromptRejected(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "prompt_rejected",
                detail,
            ),
            BattleError::NoEligibleSystems => Self::new(
                StatusCode::CONFLICT,
                "no_eligible_systems",
                detail,
            ),
            // Deliberately vague: which system failed must not be inferable.
            BattleError::GenerateFailed { .. } => Self::new(
                StatusCode::BAD_GATEWAY,
                "generate_failed",
                detail,
            ),
            BattleError::NotFound => Self::new(
                StatusCode::NOT_FOUND,
                "battle_not_found",
                detail,
            ),
            BattleError::InsufficientListenTime { .. } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_listen_time",
                detail,
            ),
            BattleError::Provider(_) | BattleError::Store(_) | BattleError::Internal(_) => {
                Self::internal(detail)
            }
        }
    }
}
