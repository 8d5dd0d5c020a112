// 会话管理器
//
// - 引导在实例生命周期内只执行一次（实例内布尔标志）
// - 登录 / 登出维护当前用户与本地缓存
// - 监听 401 广播并拆除本地会话

use crate::api::{ApiClient, ApiError, User};
use crate::events::{EventBus, SessionEvent};
use crate::storage::LocalStorage;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 会话管理器
#[derive(Debug)]
pub struct SessionManager {
    client: ApiClient,
    storage: Arc<LocalStorage>,
    events: EventBus,
    /// 当前登录用户
    current: RwLock<Option<User>>,
    /// 是否已完成引导
    bootstrapped: AtomicBool,
    /// 引导互斥，并发调用只有一个真正执行
    bootstrap_lock: tokio::sync::Mutex<()>,
    /// 401 监听任务的停止令牌
    listener: Mutex<Option<CancellationToken>>,
}

impl SessionManager {
    pub fn new(client: ApiClient, storage: Arc<LocalStorage>) -> Self {
        let events = client.events().clone();
        Self {
            client,
            storage,
            events,
            current: RwLock::new(None),
            bootstrapped: AtomicBool::new(false),
            bootstrap_lock: tokio::sync::Mutex::new(()),
            listener: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn current_user(&self) -> Option<User> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    /// 会话引导
    ///
    /// 先恢复缓存用户，再向服务端校验；401 清空本地会话，
    /// 网络错误保留缓存用户。重复调用直接返回当前用户
    pub async fn bootstrap(&self) -> Option<User> {
        let _guard = self.bootstrap_lock.lock().await;
        if self.bootstrapped.load(Ordering::SeqCst) {
            debug!("会话已引导，跳过");
            return self.current_user();
        }

        if let Some(cached) = self.storage.cached_user() {
            debug!("恢复缓存用户: {}", cached.id);
            *self.current.write() = Some(cached);
        }

        match self.client.me().await {
            Ok(user) => {
                info!("会话校验成功: user_id={}", user.id);
                self.remember_user(&user);
                *self.current.write() = Some(user);
            }
            Err(e) if e.is_unauthorized() => {
                info!("会话已失效，清空本地会话");
                self.clear_local();
            }
            Err(e) => {
                warn!("会话校验失败，沿用缓存用户: {}", e);
            }
        }

        self.bootstrapped.store(true, Ordering::SeqCst);
        self.current_user()
    }

    /// 登录
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<User, ApiError> {
        let user = self.client.login(email, password).await?;

        self.remember_user(&user);
        if let Err(e) = self.storage.set_remember_me(remember_me) {
            warn!("保存记住我标志失败: {}", e);
        }
        *self.current.write() = Some(user.clone());
        self.bootstrapped.store(true, Ordering::SeqCst);

        self.events.publish_session(SessionEvent::LoggedIn {
            user_id: user.id.clone(),
        });
        Ok(user)
    }

    /// 登出，服务端失败也清空本地会话
    pub async fn logout(&self) {
        if let Err(e) = self.client.logout().await {
            warn!("服务端登出失败，仍清空本地会话: {}", e);
        }
        self.clear_local();
        self.events.publish_session(SessionEvent::LoggedOut);
        info!("已登出");
    }

    /// 重新拉取当前用户
    pub async fn refresh_user(&self) -> Result<User, ApiError> {
        let user = self.client.me().await?;
        self.remember_user(&user);
        *self.current.write() = Some(user.clone());
        Ok(user)
    }

    /// 启动 401 监听，收到会话失效广播时拆除本地会话
    ///
    /// 重复调用会替换旧的监听任务
    pub fn start_unauthorized_listener(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(old) = self.listener.lock().replace(token.clone()) {
            old.cancel();
        }

        let mut rx = self.events.subscribe_session();
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Ok(SessionEvent::Unauthorized { path }) => {
                        let Some(manager) = weak.upgrade() else { break };
                        warn!("收到会话失效通知 ({})，拆除本地会话", path);
                        manager.clear_local();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => debug!("会话事件滞后 {} 条", n),
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("会话失效监听已停止");
        });
    }

    /// 停止 401 监听
    pub fn stop_listener(&self) {
        if let Some(token) = self.listener.lock().take() {
            token.cancel();
        }
    }

    fn remember_user(&self, user: &User) {
        if let Err(e) = self.storage.set_cached_user(user) {
            warn!("缓存用户失败: {}", e);
        }
    }

    /// 清空当前用户、缓存用户和 CSRF token
    fn clear_local(&self) {
        *self.current.write() = None;
        self.client.clear_csrf_token();
        if let Err(e) = self.storage.clear_cached_user() {
            warn!("清除缓存用户失败: {}", e);
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::test_support::{client_for, spawn_backend};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    fn backend(me_calls: Arc<AtomicUsize>, me_ok: bool) -> Router {
        Router::new()
            .route("/api/csrf-token", get(|| async { Json(json!({ "csrfToken": "t" })) }))
            .route(
                "/api/auth/login",
                post(|| async {
                    Json(json!({ "success": true, "user": { "_id": "u1", "name": "Ana", "email": "ana@example.com" } }))
                }),
            )
            .route("/api/auth/logout", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/api/auth/me",
                get(move || {
                    let me_calls = me_calls.clone();
                    async move {
                        me_calls.fetch_add(1, Ordering::SeqCst);
                        if me_ok {
                            (
                                StatusCode::OK,
                                Json(json!({ "user": { "_id": "u1", "name": "Ana", "email": "ana@example.com" } })),
                            )
                        } else {
                            (StatusCode::UNAUTHORIZED, Json(json!({ "message": "No autenticado" })))
                        }
                    }
                }),
            )
    }

    fn storage(dir: &TempDir) -> Arc<LocalStorage> {
        Arc::new(LocalStorage::open(dir.path().join("storage.json"), 10).unwrap())
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let base = spawn_backend(backend(calls.clone(), true)).await;
        let session = SessionManager::new(client_for(&base, EventBus::new()), storage(&dir));

        let first = session.bootstrap().await;
        let second = session.bootstrap().await;

        assert_eq!(first.map(|u| u.id), Some("u1".to_string()));
        assert_eq!(second.map(|u| u.id), Some("u1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(session.is_bootstrapped());
    }

    #[tokio::test]
    async fn test_bootstrap_unauthorized_clears_cache() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .set_cached_user(&serde_json::from_value(json!({ "id": "old", "email": "x@y.z" })).unwrap())
            .unwrap();
        let base = spawn_backend(backend(Arc::new(AtomicUsize::new(0)), false)).await;
        let session = SessionManager::new(client_for(&base, EventBus::new()), storage.clone());

        assert!(session.bootstrap().await.is_none());
        assert!(storage.cached_user().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_offline_keeps_cached_user() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .set_cached_user(&serde_json::from_value(json!({ "id": "u9", "email": "x@y.z" })).unwrap())
            .unwrap();
        let session = SessionManager::new(client_for("http://127.0.0.1:9", EventBus::new()), storage);

        assert_eq!(session.bootstrap().await.map(|u| u.id), Some("u9".to_string()));
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let base = spawn_backend(backend(Arc::new(AtomicUsize::new(0)), true)).await;
        let events = EventBus::new();
        let mut rx = events.subscribe_session();
        let session = SessionManager::new(client_for(&base, events), storage.clone());

        let user = session.login("ana@example.com", "secret", true).await.unwrap();
        assert_eq!(user.id, "u1");
        assert!(session.is_authenticated());
        assert!(storage.remember_me());
        assert_eq!(storage.cached_user().map(|u| u.id), Some("u1".to_string()));
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::LoggedIn { user_id: "u1".to_string() }
        );

        // 服务端登出返回 500，本地会话照样清空
        session.logout().await;
        assert!(!session.is_authenticated());
        assert!(storage.cached_user().is_none());
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::LoggedOut);
    }

    #[tokio::test]
    async fn test_unauthorized_event_tears_down_session() {
        let dir = TempDir::new().unwrap();
        let base = spawn_backend(backend(Arc::new(AtomicUsize::new(0)), false)).await;
        let session = Arc::new(SessionManager::new(
            client_for(&base, EventBus::new()),
            storage(&dir),
        ));
        session.login("ana@example.com", "secret", false).await.unwrap();
        session.start_unauthorized_listener();

        // me 返回 401，客户端广播会话失效
        assert!(session.refresh_user().await.is_err());

        tokio::time::timeout(Duration::from_secs(2), async {
            while session.is_authenticated() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(session.current_user().is_none());
    }
}
