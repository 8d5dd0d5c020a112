// 应用状态
//
// 把配置、HTTP 客户端、本地存储、会话、实时通道组装到一起

use crate::api::ApiClient;
use crate::auth::SessionManager;
use crate::config::AppConfig;
use crate::events::EventBus;
use crate::permissions::Permissions;
use crate::realtime::RealtimeChannel;
use crate::storage::LocalStorage;
use crate::uploader::{HttpUploadTransport, UploadManager};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 事件总线
    pub events: EventBus,
    /// 后端客户端
    pub client: ApiClient,
    /// 本地存储
    pub storage: Arc<LocalStorage>,
    /// 会话管理器
    pub session: Arc<SessionManager>,
    /// 实时通道
    pub realtime: Arc<RealtimeChannel>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        config.validate().context("配置校验失败")?;

        let events = EventBus::new();
        let client = ApiClient::new(&config.api, events.clone()).context("创建后端客户端失败")?;
        let storage = Arc::new(
            LocalStorage::open(&config.storage.path, config.storage.search_history_limit)
                .context("打开本地存储失败")?,
        );
        let session = Arc::new(SessionManager::new(client.clone(), storage.clone()));
        let realtime = Arc::new(RealtimeChannel::new(
            client.clone(),
            &config.realtime,
            config.api.timeout(),
        ));

        Ok(Self {
            config: Arc::new(config),
            events,
            client,
            storage,
            session,
            realtime,
        })
    }

    /// 从配置文件创建，文件缺失或无效时使用默认配置
    pub async fn from_config_file(path: &str) -> anyhow::Result<Self> {
        let config = AppConfig::load_or_default(path).await;
        Self::new(config)
    }

    /// 启动时初始化：会话引导、401 监听、按需连接实时通道
    pub async fn init(&self) {
        self.session.start_unauthorized_listener();

        match self.session.bootstrap().await {
            Some(user) => info!("已恢复会话: {}", user.id),
            None => info!("未登录"),
        }

        if self.config.realtime.enabled && self.config.realtime.auto_connect {
            if let Err(e) = self.realtime.connect().await {
                warn!("实时通道连接失败: {}", e);
            }
        }
    }

    /// 为指定组织 / 文件夹创建上传队列
    pub fn upload_manager(
        &self,
        organization_id: Option<&str>,
        folder_id: Option<&str>,
    ) -> UploadManager {
        let mut transport = HttpUploadTransport::new(self.client.clone());
        if let Some(org) = organization_id {
            transport = transport.with_organization(org);
        }
        if let Some(folder) = folder_id {
            transport = transport.with_folder(folder);
        }
        UploadManager::new(
            self.config.upload.constraints(),
            Arc::new(transport),
            self.events.clone(),
        )
    }

    /// 当前用户在指定组织中的权限
    ///
    /// 找不到有效成员关系时不授予任何权限
    pub async fn permissions_for(&self, organization_id: &str) -> Permissions {
        match self.client.my_memberships().await {
            Ok(memberships) => {
                let role = memberships
                    .iter()
                    .filter(|m| !m.is_pending())
                    .find(|m| m.organization.id() == organization_id)
                    .and_then(|m| m.org_role());
                Permissions::new(role)
            }
            Err(e) => {
                warn!("获取成员关系失败: {}", e);
                Permissions::default()
            }
        }
    }

    /// 关闭：断开实时通道并停止 401 监听
    pub fn shutdown(&self) {
        self.realtime.disconnect();
        self.session.stop_listener();
        info!("应用状态已关闭");
    }
}
