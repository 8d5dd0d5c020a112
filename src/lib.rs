// CloudDocs Rust Library
// 云文档协作平台客户端核心库

// 后端 API 模块
pub mod api;

// 会话模块
pub mod auth;

// 配置管理模块
pub mod config;

// 事件总线模块
pub mod events;

// 日志模块
pub mod logging;

// 组织权限模块
pub mod permissions;

// 实时通道模块
pub mod realtime;

// 应用状态
pub mod state;

// 本地存储模块
pub mod storage;

// 上传队列模块
pub mod uploader;

// 导出常用类型
pub use api::{ApiClient, ApiError, DocumentDescriptor, Membership, Organization, User};
pub use auth::SessionManager;
pub use config::AppConfig;
pub use events::{EventBus, SessionEvent, UploadEvent};
pub use logging::{init_logging, LogGuard};
pub use permissions::{OrgRole, Permission, Permissions};
pub use realtime::{RealtimeChannel, RealtimeError, RealtimeEvent};
pub use state::AppState;
pub use storage::{LocalStorage, SearchHistory};
pub use uploader::{
    UploadConstraints, UploadFile, UploadManager, UploadStatus, UploadTask, UploadTransport,
};
