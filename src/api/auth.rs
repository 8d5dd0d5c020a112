// 认证接口

use crate::api::client::decode;
use crate::api::{ApiClient, ApiError, LoginRequest, RegisterRequest, User};
use reqwest::Method;
use serde_json::json;
use tracing::info;

impl ApiClient {
    /// 邮箱密码登录，会话 cookie 由 Cookie Jar 保存
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let body = serde_json::to_value(&request)?;
        let value = self
            .send_value(Method::POST, "/api/auth/login", &body)
            .await?;
        let user: User = decode(value, &["user"])?;
        info!("登录成功: user_id={}", user.id);
        Ok(user)
    }

    /// 注册新用户
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        let body = serde_json::to_value(request)?;
        let value = self
            .send_value(Method::POST, "/api/auth/register", &body)
            .await?;
        decode(value, &["user"])
    }

    /// 登出，服务端清除会话 cookie
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send_value(Method::POST, "/api/auth/logout", &json!({}))
            .await?;
        self.clear_csrf_token();
        Ok(())
    }

    /// 刷新会话
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.send_value(Method::POST, "/api/auth/refresh", &json!({}))
            .await?;
        Ok(())
    }

    /// 当前登录用户
    pub async fn me(&self) -> Result<User, ApiError> {
        let value = self.get_value("/api/auth/me", &[]).await?;
        decode(value, &["user"])
    }
}
