// API 错误类型
//
// 传输错误（网络、无响应、HTTP 4xx/5xx）在此统一分类，
// 并提供面向用户的提示文案

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// 后端返回的 CSRF 校验失败错误码
pub const CSRF_ERROR_CODE: &str = "EBADCSRFTOKEN";

/// API 调用错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// 请求未能发出或连接中断
    #[error("网络错误: {0}")]
    Network(String),
    /// 请求超时，未收到响应
    #[error("请求超时: {0}")]
    Timeout(String),
    /// 401 未认证
    #[error("未认证: {}", .message.as_deref().unwrap_or("会话无效"))]
    Unauthorized { message: Option<String> },
    /// 403 无权限
    #[error("无权限: {}", .message.as_deref().unwrap_or("禁止访问"))]
    Forbidden { message: Option<String> },
    /// CSRF token 校验失败（重试后仍失败）
    #[error("CSRF 校验失败")]
    CsrfMismatch,
    /// 其他 HTTP 错误状态
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("请求失败"))]
    Http {
        status: u16,
        message: Option<String>,
        code: Option<String>,
    },
    /// 响应无法解析
    #[error("响应解析失败: {0}")]
    Decode(String),
    /// 地址拼接失败
    #[error("无效的请求地址: {0}")]
    InvalidUrl(String),
    /// 请求被取消
    #[error("请求已取消")]
    Cancelled,
}

impl ApiError {
    /// 根据状态码和响应体构造错误
    pub fn from_status(status: StatusCode, body: &Value) -> Self {
        let message = extract_message(body);
        let code = extract_code(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized { message },
            403 => ApiError::Forbidden { message },
            s => ApiError::Http {
                status: s,
                message,
                code,
            },
        }
    }

    /// HTTP 状态码（非 HTTP 错误返回 None）
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } | ApiError::CsrfMismatch => Some(403),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// 面向用户的提示文案，服务端给出的 message 优先
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "无法连接服务器，请检查网络连接".to_string(),
            ApiError::Timeout(_) => "请求超时，请稍后重试".to_string(),
            ApiError::Unauthorized { message } => message
                .clone()
                .unwrap_or_else(|| status_message(401).to_string()),
            ApiError::Forbidden { message } => message
                .clone()
                .unwrap_or_else(|| status_message(403).to_string()),
            ApiError::CsrfMismatch => "安全校验失败，请刷新页面后重试".to_string(),
            ApiError::Http {
                status, message, ..
            } => message
                .clone()
                .unwrap_or_else(|| status_message(*status).to_string()),
            ApiError::Decode(_) => "服务器响应格式错误".to_string(),
            ApiError::InvalidUrl(_) => "请求地址无效".to_string(),
            ApiError::Cancelled => "操作已取消".to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::from_status(status, &Value::Null)
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// HTTP 状态码对应的默认提示
pub fn status_message(status: u16) -> &'static str {
    match status {
        400 => "请求参数有误",
        401 => "会话已过期，请重新登录",
        403 => "没有权限执行此操作",
        404 => "请求的资源不存在",
        408 => "请求超时，请稍后重试",
        409 => "资源冲突，请刷新后重试",
        413 => "文件过大，超出服务器限制",
        415 => "不支持的文件类型",
        422 => "提交的数据无效",
        429 => "请求过于频繁，请稍后再试",
        500 => "服务器内部错误，请稍后重试",
        502 | 503 | 504 => "服务暂时不可用，请稍后重试",
        s if s >= 500 => "服务器错误，请稍后重试",
        _ => "请求失败，请稍后重试",
    }
}

/// 判断 401/403 响应是否由 CSRF token 不匹配引起
pub fn is_csrf_mismatch(status: StatusCode, body: &Value) -> bool {
    if status != StatusCode::FORBIDDEN && status != StatusCode::UNAUTHORIZED {
        return false;
    }
    if extract_code(body).as_deref() == Some(CSRF_ERROR_CODE) {
        return true;
    }
    ["message", "error"].iter().any(|key| {
        body.get(key)
            .and_then(Value::as_str)
            .map(|s| s.to_ascii_lowercase().contains("csrf"))
            .unwrap_or(false)
    })
}

/// 从响应体提取错误消息（`message` 优先，其次字符串形式的 `error`）
pub fn extract_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .or_else(|| body.get("error").and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn extract_code(body: &Value) -> Option<String> {
    body.get("code").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_status_classification() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, &Value::Null);
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));

        let err = ApiError::from_status(StatusCode::FORBIDDEN, &json!({"message": "仅管理员"}));
        assert_eq!(
            err,
            ApiError::Forbidden {
                message: Some("仅管理员".to_string())
            }
        );

        let err = ApiError::from_status(StatusCode::NOT_FOUND, &json!({"code": "NOT_FOUND"}));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_user_message_prefers_server_message() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            &json!({"success": false, "message": "邮箱格式不正确"}),
        );
        assert_eq!(err.user_message(), "邮箱格式不正确");

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, &json!({"message": "  "}));
        assert_eq!(err.user_message(), "请求参数有误");
    }

    #[test]
    fn test_user_message_by_status() {
        let cases = [
            (404, "请求的资源不存在"),
            (413, "文件过大，超出服务器限制"),
            (429, "请求过于频繁，请稍后再试"),
            (503, "服务暂时不可用，请稍后重试"),
            (507, "服务器错误，请稍后重试"),
            (418, "请求失败，请稍后重试"),
        ];
        for (status, expected) in cases {
            let err = ApiError::Http {
                status,
                message: None,
                code: None,
            };
            assert_eq!(err.user_message(), expected, "status {}", status);
        }

        assert_eq!(
            ApiError::Network("connection refused".into()).user_message(),
            "无法连接服务器，请检查网络连接"
        );
    }

    #[test]
    fn test_csrf_mismatch_detection() {
        assert!(is_csrf_mismatch(
            StatusCode::FORBIDDEN,
            &json!({"code": "EBADCSRFTOKEN"})
        ));
        assert!(is_csrf_mismatch(
            StatusCode::FORBIDDEN,
            &json!({"message": "Invalid CSRF token"})
        ));
        assert!(is_csrf_mismatch(
            StatusCode::UNAUTHORIZED,
            &json!({"error": "csrf token missing"})
        ));
        assert!(!is_csrf_mismatch(
            StatusCode::FORBIDDEN,
            &json!({"message": "Insufficient permissions"})
        ));
        assert!(!is_csrf_mismatch(
            StatusCode::BAD_REQUEST,
            &json!({"code": "EBADCSRFTOKEN"})
        ));
    }
}
