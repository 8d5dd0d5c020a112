// 上传校验策略
//
// 纯函数：候选文件 + 约束 -> 接受 / 拒绝（带原因）

use crate::uploader::UploadFile;
use serde::Serialize;
use std::time::Duration;

/// 上传约束（运行时只读）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConstraints {
    /// 最大同时上传数
    pub max_simultaneous: usize,
    /// 队列容量
    pub max_files: usize,
    /// 单文件最大大小（字节）
    pub max_file_size: u64,
    /// 允许的 MIME 类型，空列表表示全部允许
    pub allowed_mime_types: Vec<String>,
    /// 全部成功后请求关闭的延迟
    pub success_close_delay: Duration,
}

impl Default for UploadConstraints {
    fn default() -> Self {
        crate::config::UploadConfig::default().constraints()
    }
}

/// 拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// 空文件
    Empty,
    /// 超过大小上限
    TooLarge,
    /// 类型不允许
    UnsupportedType,
    /// 队列已满
    QueueFull,
}

/// 校验错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// 被拒绝的文件名
    pub file_name: String,
    /// 人类可读消息
    pub message: String,
    pub reason: RejectReason,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file_name, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// 一批候选文件的划分结果
#[derive(Debug, Default)]
pub struct Partition {
    pub accepted: Vec<UploadFile>,
    pub rejected: Vec<ValidationError>,
}

/// 校验单个文件（不考虑队列容量）
pub fn validate_file(file: &UploadFile, constraints: &UploadConstraints) -> Result<(), ValidationError> {
    let reject = |reason: RejectReason, message: String| ValidationError {
        file_name: file.name.clone(),
        message,
        reason,
    };

    if file.size == 0 {
        return Err(reject(RejectReason::Empty, "文件为空".to_string()));
    }

    if file.size > constraints.max_file_size {
        return Err(reject(
            RejectReason::TooLarge,
            format!(
                "文件过大（{}），最大允许 {}",
                format_size(file.size),
                format_size(constraints.max_file_size)
            ),
        ));
    }

    if !mime_allowed(&file.mime_type, &constraints.allowed_mime_types) {
        let shown = if file.mime_type.is_empty() {
            "未知"
        } else {
            file.mime_type.as_str()
        };
        return Err(reject(
            RejectReason::UnsupportedType,
            format!("不支持的文件类型: {}", shown),
        ));
    }

    Ok(())
}

/// 把候选文件划分为接受 / 拒绝
///
/// `capacity` 为队列剩余容量；按候选顺序，容量用完后其余合法文件以 QueueFull 拒绝
pub fn partition(
    files: Vec<UploadFile>,
    constraints: &UploadConstraints,
    capacity: usize,
) -> Partition {
    let mut result = Partition::default();

    for file in files {
        if let Err(e) = validate_file(&file, constraints) {
            result.rejected.push(e);
            continue;
        }
        if result.accepted.len() >= capacity {
            result.rejected.push(ValidationError {
                message: format!("队列已满，最多 {} 个文件", constraints.max_files),
                file_name: file.name,
                reason: RejectReason::QueueFull,
            });
            continue;
        }
        result.accepted.push(file);
    }

    result
}

/// MIME 匹配：精确匹配或 `type/*` 通配，忽略大小写与参数
fn mime_allowed(mime: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let essence = mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() {
        return false;
    }

    allowed.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.strip_suffix("/*") {
            Some(prefix) => essence
                .split_once('/')
                .map(|(kind, _)| kind == prefix)
                .unwrap_or(false),
            None => pattern == "*/*" || pattern == essence,
        }
    })
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}
