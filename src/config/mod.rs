// 配置管理模块

use crate::uploader::UploadConstraints;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 后端 API 配置
    pub api: ApiConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 实时通道配置
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// 本地存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

/// 后端 API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 后端根地址，如 `https://docs.example.com`
    pub base_url: String,
    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// CSRF token 获取路径
    #[serde(default = "default_csrf_endpoint")]
    pub csrf_endpoint: String,
    /// CSRF 请求头名称
    #[serde(default = "default_csrf_header")]
    pub csrf_header: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_csrf_endpoint() -> String {
    "/api/csrf-token".to_string()
}

fn default_csrf_header() -> String {
    "X-CSRF-Token".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            timeout_secs: default_timeout_secs(),
            csrf_endpoint: default_csrf_endpoint(),
            csrf_header: default_csrf_header(),
        }
    }
}

impl ApiConfig {
    /// 请求超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 最大同时上传文件数
    #[serde(default = "default_max_simultaneous")]
    pub max_simultaneous: usize,
    /// 队列最多容纳的文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// 单文件最大大小（字节）
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// 允许的 MIME 类型（支持 `image/*` 通配，空列表表示全部允许）
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
    /// 全部成功后请求关闭上传面板的延迟（毫秒）
    #[serde(default = "default_success_close_delay_ms")]
    pub success_close_delay_ms: u64,
}

fn default_max_simultaneous() -> usize {
    3
}

fn default_max_files() -> usize {
    10
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_allowed_mime_types() -> Vec<String> {
    vec![
        "application/pdf".to_string(),
        "application/msword".to_string(),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
        "application/vnd.ms-excel".to_string(),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
        "application/vnd.ms-powerpoint".to_string(),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation".to_string(),
        "text/plain".to_string(),
        "text/csv".to_string(),
        "image/*".to_string(),
    ]
}

fn default_success_close_delay_ms() -> u64 {
    1500
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_simultaneous: default_max_simultaneous(),
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
            allowed_mime_types: default_allowed_mime_types(),
            success_close_delay_ms: default_success_close_delay_ms(),
        }
    }
}

impl UploadConfig {
    /// 转换为上传约束（运行时只读）
    pub fn constraints(&self) -> UploadConstraints {
        UploadConstraints {
            max_simultaneous: self.max_simultaneous.max(1),
            max_files: self.max_files,
            max_file_size: self.max_file_size,
            allowed_mime_types: self.allowed_mime_types.clone(),
            success_close_delay: Duration::from_millis(self.success_close_delay_ms),
        }
    }
}

/// 实时通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// 是否启用实时通道
    #[serde(default = "default_realtime_enabled")]
    pub enabled: bool,
    /// socket.io 握手路径
    #[serde(default = "default_realtime_path")]
    pub path: String,
    /// 是否在初始化时自动连接（默认不自动连接，需显式调用 connect）
    #[serde(default)]
    pub auto_connect: bool,
}

fn default_realtime_enabled() -> bool {
    true
}

fn default_realtime_path() -> String {
    "/socket.io".to_string()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_realtime_enabled(),
            path: default_realtime_path(),
            auto_connect: false,
        }
    }
}

/// 本地存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储文件路径
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// 搜索历史最多保留条数
    #[serde(default = "default_search_history_limit")]
    pub search_history_limit: usize,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/local_storage.json")
}

fn default_search_history_limit() -> usize {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            search_history_limit: default_search_history_limit(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            upload: UploadConfig::default(),
            realtime: RealtimeConfig::default(),
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.api.base_url)
            .with_context(|| format!("后端地址无效: {}", self.api.base_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("后端地址必须是 http 或 https: {}", self.api.base_url);
        }
        if self.upload.max_simultaneous == 0 {
            anyhow::bail!("max_simultaneous 必须大于 0");
        }
        if self.upload.max_file_size == 0 {
            anyhow::bail!("max_file_size 必须大于 0");
        }
        if !self.realtime.path.starts_with('/') {
            anyhow::bail!("实时通道路径必须以 / 开头: {}", self.realtime.path);
        }
        Ok(())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate().context("配置文件验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                let default_config = Self::default();

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {}", e);
                }

                default_config
            }
        }
    }
}
