//! # API 响应结构
//!
//! 成功响应 `{success, data, message, timestamp}`，
//! 失败响应 `{success, error: {code, message}, timestamp}`。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, GitterError};
use crate::logging::{LogComponent, LogStage};
use crate::{lerror, lwarn};

/// # 标准成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// # 标准错误信息
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// # 标准错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    SuccessWithoutData(String),
    AppError(GitterError),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Success(data) => (
                StatusCode::OK,
                Json(SuccessResponse {
                    success: true,
                    data: Some(data),
                    message: Some("OK".to_string()),
                    timestamp: Utc::now(),
                }),
            )
                .into_response(),
            Self::SuccessWithoutData(message) => (
                StatusCode::OK,
                Json(SuccessResponse::<()> {
                    success: true,
                    data: None,
                    message: Some(message),
                    timestamp: Utc::now(),
                }),
            )
                .into_response(),
            Self::AppError(error) => {
                let (status, code) = error.to_http_response_parts();
                match error.category() {
                    ErrorCategory::Server => lerror!(
                        "system",
                        LogStage::Response,
                        LogComponent::Handler,
                        "request_failed",
                        &format!("{status} {code}: {error}")
                    ),
                    ErrorCategory::Client => lwarn!(
                        "system",
                        LogStage::Response,
                        LogComponent::Handler,
                        "request_rejected",
                        &format!("{status} {code}: {error}")
                    ),
                }

                let body = ErrorResponse {
                    success: false,
                    error: ErrorInfo {
                        code: code.to_string(),
                        message: error.to_string(),
                    },
                    timestamp: Utc::now(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

/// handler 的错误类型，`?` 可以直接作用于 [`GitterError`]
#[derive(Debug)]
pub struct ApiError(pub GitterError);

impl From<GitterError> for ApiError {
    fn from(error: GitterError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::AppError(self.0).into_response()
    }
}

pub type ApiResult = std::result::Result<Response, ApiError>;

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// # 便捷函数：无数据体的成功响应
pub fn success_without_data(message: &str) -> Response {
    ApiResponse::<()>::SuccessWithoutData(message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let response = ApiError(GitterError::unauthorized("no token")).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ApiError(GitterError::conflict("id mismatch")).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = success_without_data("done");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
