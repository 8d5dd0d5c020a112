// CloudDocs API 客户端
//
// - Cookie Jar 保存会话 cookie
// - 变更类请求自动附带 CSRF token，CSRF 不匹配时刷新 token 并重试一次
// - 401 广播会话失效事件，由会话管理器负责拆除

use crate::api::error::{is_csrf_mismatch, ApiError};
use crate::api::normalize::{normalize_ids, unwrap_envelope};
use crate::config::ApiConfig;
use crate::events::{EventBus, SessionEvent};
use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// CloudDocs 后端客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP客户端
    client: Client,
    /// Cookie Jar（会话 cookie，实时通道握手时复用）
    cookie_jar: Arc<Jar>,
    /// 后端根地址
    base_url: Url,
    /// 普通请求超时（上传请求不受此限制）
    timeout: Duration,
    /// CSRF token 获取路径
    csrf_endpoint: String,
    /// CSRF 请求头名称
    csrf_header: String,
    /// 缓存的 CSRF token
    csrf_token: Arc<RwLock<Option<String>>>,
    /// 事件总线
    events: EventBus,
}

impl ApiClient {
    /// 创建新的 API 客户端
    pub fn new(config: &ApiConfig, events: EventBus) -> Result<Self, ApiError> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        // 以 / 结尾，拼接时保留路径前缀（如 https://host/backend/）
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        info!("初始化 API 客户端: base_url={}", base_url);

        Ok(Self {
            client,
            cookie_jar: jar,
            base_url,
            timeout: config.timeout(),
            csrf_endpoint: config.csrf_endpoint.clone(),
            csrf_header: config.csrf_header.clone(),
            csrf_token: Arc::new(RwLock::new(None)),
            events,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// 拼接请求地址，`/api/...` 按相对于根地址处理
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// 当前会话 cookie（`name=value; ...` 形式），用于实时通道握手
    pub fn cookie_header(&self) -> Option<String> {
        self.cookie_jar
            .cookies(&self.base_url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    /// 丢弃缓存的 CSRF token（登出后调用）
    pub fn clear_csrf_token(&self) {
        *self.csrf_token.write() = None;
    }

    /// 获取 CSRF token，未缓存时从后端拉取
    pub async fn csrf_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self.csrf_token.read().clone() {
            return Ok(token);
        }
        self.refresh_csrf_token().await
    }

    /// 从后端重新拉取 CSRF token
    pub async fn refresh_csrf_token(&self) -> Result<String, ApiError> {
        let url = self.url(&self.csrf_endpoint)?;
        debug!("获取 CSRF token: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        let body = read_body(response).await?;

        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        let token = body
            .get("csrfToken")
            .or_else(|| body.get("token"))
            .or_else(|| body.get("data").and_then(|d| d.get("csrfToken")))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode("响应中缺少 csrfToken".to_string()))?;

        *self.csrf_token.write() = Some(token.clone());
        Ok(token)
    }

    /// 发送请求并返回原始 JSON
    ///
    /// `build` 每次尝试都会被调用一次，用于附加请求体；
    /// CSRF 重试时需要重新构造请求体（multipart 无法克隆）
    pub async fn execute<F>(&self, method: Method, path: &str, build: F) -> Result<Value, ApiError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path)?;
        let mutating = is_mutating(&method);
        let mut csrf_retried = false;

        loop {
            let mut request = build(self.client.request(method.clone(), url.clone()));
            if mutating {
                let token = self.csrf_token().await?;
                request = request.header(self.csrf_header.as_str(), token);
            }

            let response = request.send().await?;
            let status = response.status();
            let body = read_body(response).await?;

            if status.is_success() {
                return Ok(body);
            }

            if is_csrf_mismatch(status, &body) {
                if mutating && !csrf_retried {
                    warn!("CSRF token 校验失败，刷新后重试: {} {}", method, path);
                    csrf_retried = true;
                    self.clear_csrf_token();
                    self.refresh_csrf_token().await?;
                    continue;
                }
                warn!("CSRF token 重试后仍校验失败: {} {}", method, path);
                return Err(ApiError::CsrfMismatch);
            }

            if status == StatusCode::UNAUTHORIZED && !is_login_path(path) {
                warn!("请求返回 401，广播会话失效: {} {}", method, path);
                self.events.publish_session(SessionEvent::Unauthorized {
                    path: path.to_string(),
                });
            }

            let err = ApiError::from_status(status, &body);
            debug!("请求失败: {} {} -> {}", method, path, err);
            return Err(err);
        }
    }

    /// JSON 请求（带普通超时），返回归一化后的 JSON
    pub(crate) async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let timeout = self.timeout;
        let mut value = self
            .execute(method, path, |mut req| {
                req = req.timeout(timeout);
                if !query.is_empty() {
                    req = req.query(query);
                }
                if let Some(body) = body {
                    req = req.json(body);
                }
                req
            })
            .await?;
        normalize_ids(&mut value);
        Ok(value)
    }

    pub(crate) async fn get_value(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        self.call(Method::GET, path, query, None).await
    }

    pub(crate) async fn send_value(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<Value, ApiError> {
        self.call(method, path, &[], Some(body)).await
    }
}

/// 拆信封并反序列化
pub(crate) fn decode<T: DeserializeOwned>(value: Value, keys: &[&str]) -> Result<T, ApiError> {
    let inner = unwrap_envelope(value, keys);
    serde_json::from_value(inner).map_err(ApiError::from)
}

fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// 登录接口的 401 表示凭证错误，不代表会话失效
fn is_login_path(path: &str) -> bool {
    path.trim_end_matches('/').ends_with("/auth/login")
}

/// 读取响应体为 JSON；空响应体视为 Null
async fn read_body(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(e) if status.is_success() => Err(ApiError::Decode(format!(
            "{}: {}",
            e,
            text.chars().take(200).collect::<String>()
        ))),
        // 错误响应可能是 HTML 或纯文本，按消息处理
        Err(_) => Ok(serde_json::json!({ "message": text.trim() })),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{client_for, spawn_backend};
    use super::*;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn csrf_route(counter: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            "/api/csrf-token",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Json(json!({ "csrfToken": format!("token-{}", n) }))
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_get_does_not_fetch_csrf() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let app = csrf_route(fetches.clone()).route(
            "/api/documents/d1",
            get(|| async { Json(json!({ "success": true, "data": { "_id": "d1" } })) }),
        );
        let base = spawn_backend(app).await;
        let client = client_for(&base, EventBus::new());

        let value = client.get_value("/api/documents/d1", &[]).await.unwrap();

        assert_eq!(value["data"]["id"], "d1");
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mutating_request_sends_csrf_header() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let app = csrf_route(fetches.clone()).route(
            "/api/echo",
            post(|headers: HeaderMap| async move {
                let token = headers
                    .get("x-csrf-token")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                Json(json!({ "token": token }))
            }),
        );
        let base = spawn_backend(app).await;
        let client = client_for(&base, EventBus::new());

        let first = client
            .send_value(Method::POST, "/api/echo", &json!({}))
            .await
            .unwrap();
        let second = client
            .send_value(Method::POST, "/api/echo", &json!({}))
            .await
            .unwrap();

        assert_eq!(first["token"], "token-1");
        assert_eq!(second["token"], "token-1");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_csrf_mismatch_retries_once() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let app = csrf_route(fetches.clone()).route(
            "/api/comments/c1",
            post(|headers: HeaderMap| async move {
                let token = headers
                    .get("x-csrf-token")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if token == "token-2" {
                    (AxumStatus::OK, Json(json!({ "success": true })))
                } else {
                    (
                        AxumStatus::FORBIDDEN,
                        Json(json!({ "code": "EBADCSRFTOKEN", "message": "invalid csrf token" })),
                    )
                }
            }),
        );
        let base = spawn_backend(app).await;
        let client = client_for(&base, EventBus::new());

        let value = client
            .send_value(Method::POST, "/api/comments/c1", &json!({}))
            .await
            .unwrap();

        assert_eq!(value["success"], true);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_csrf_mismatch_gives_up_after_one_retry() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let app = csrf_route(fetches.clone()).route(
            "/api/comments/c1",
            post(|| async {
                (
                    AxumStatus::FORBIDDEN,
                    Json(json!({ "code": "EBADCSRFTOKEN" })),
                )
            }),
        );
        let base = spawn_backend(app).await;
        let client = client_for(&base, EventBus::new());

        let err = client
            .send_value(Method::POST, "/api/comments/c1", &json!({}))
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::CsrfMismatch);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_broadcasts_session_event() {
        let app = Router::new().route(
            "/api/auth/me",
            get(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    Json(json!({ "success": false, "message": "Token expired" })),
                )
            }),
        );
        let base = spawn_backend(app).await;
        let events = EventBus::new();
        let mut rx = events.subscribe_session();
        let client = client_for(&base, events);

        let err = client.get_value("/api/auth/me", &[]).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(err.user_message(), "Token expired");
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Unauthorized {
                path: "/api/auth/me".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_login_401_does_not_broadcast() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let app = csrf_route(fetches).route(
            "/api/auth/login",
            post(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    Json(json!({ "message": "Credenciales inválidas" })),
                )
            }),
        );
        let base = spawn_backend(app).await;
        let events = EventBus::new();
        let mut rx = events.subscribe_session();
        let client = client_for(&base, events);

        let err = client
            .send_value(Method::POST, "/api/auth/login", &json!({}))
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_plain_text_error_body() {
        let app = Router::new().route(
            "/api/broken",
            get(|| async { (AxumStatus::BAD_GATEWAY, "upstream down") }),
        );
        let base = spawn_backend(app).await;
        let client = client_for(&base, EventBus::new());

        let err = client.get_value("/api/broken", &[]).await.unwrap_err();

        assert_eq!(err.status(), Some(502));
        assert_eq!(err.user_message(), "upstream down");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // 绑定后立即释放端口，保证无人监听
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr), EventBus::new());
        let err = client.get_value("/api/anything", &[]).await.unwrap_err();

        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(err.user_message(), "无法连接服务器，请检查网络连接");
    }

    #[test]
    fn test_url_keeps_base_path_prefix() {
        let client = client_for("https://docs.example.com/backend", EventBus::new());
        assert_eq!(client.base_url().as_str(), "https://docs.example.com/backend/");
        assert_eq!(
            client.url("/api/documents").unwrap().as_str(),
            "https://docs.example.com/backend/api/documents"
        );

        let client = client_for("https://docs.example.com", EventBus::new());
        assert_eq!(
            client.url("/api/documents").unwrap().as_str(),
            "https://docs.example.com/api/documents"
        );
    }

    #[tokio::test]
    async fn test_requests_under_base_path() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let app = csrf_route(fetches.clone()).route(
            "/api/echo",
            post(|| async { Json(json!({ "success": true, "data": { "ok": true } })) }),
        );
        let base = spawn_backend(Router::new().nest("/backend", app)).await;
        let client = client_for(&format!("{}/backend", base), EventBus::new());

        let value = client
            .send_value(Method::POST, "/api/echo", &json!({}))
            .await
            .unwrap();

        assert_eq!(value["data"]["ok"], true);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decode_envelope() {
        let value = json!({ "success": true, "user": { "id": "u1", "email": "a@b.c" } });
        let user: crate::api::User = decode(value, &["user"]).unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.active);
    }

    #[test]
    fn test_login_path_detection() {
        assert!(is_login_path("/api/auth/login"));
        assert!(is_login_path("/api/auth/login/"));
        assert!(!is_login_path("/api/auth/logout"));
    }
}
