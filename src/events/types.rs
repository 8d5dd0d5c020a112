//! 事件类型定义

use serde::{Deserialize, Serialize};

/// 上传队列事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 任务创建（文件通过校验）
    Created {
        task_id: String,
        file_name: String,
        size: u64,
    },
    /// 状态变更
    StatusChanged {
        task_id: String,
        old_status: String,
        new_status: String,
    },
    /// 进度更新（已节流）
    Progress { task_id: String, progress: u8 },
    /// 上传成功
    Completed { task_id: String, document_id: String },
    /// 上传失败
    Failed { task_id: String, error: String },
    /// 任务被移出队列
    Removed { task_id: String },
    /// 一轮 upload_all 全部终结
    AllSettled {
        succeeded: usize,
        failed: usize,
        cancelled: usize,
    },
    /// 全部成功，延迟后请求关闭上传面板
    CloseRequested,
}

impl UploadEvent {
    /// 获取任务 ID（批量事件没有任务 ID）
    pub fn task_id(&self) -> Option<&str> {
        match self {
            UploadEvent::Created { task_id, .. }
            | UploadEvent::StatusChanged { task_id, .. }
            | UploadEvent::Progress { task_id, .. }
            | UploadEvent::Completed { task_id, .. }
            | UploadEvent::Failed { task_id, .. }
            | UploadEvent::Removed { task_id } => Some(task_id),
            UploadEvent::AllSettled { .. } | UploadEvent::CloseRequested => None,
        }
    }

    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            UploadEvent::Created { .. } => "created",
            UploadEvent::StatusChanged { .. } => "status_changed",
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::Completed { .. } => "completed",
            UploadEvent::Failed { .. } => "failed",
            UploadEvent::Removed { .. } => "removed",
            UploadEvent::AllSettled { .. } => "all_settled",
            UploadEvent::CloseRequested => "close_requested",
        }
    }
}

/// 会话事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 登录成功
    LoggedIn { user_id: String },
    /// 主动登出
    LoggedOut,
    /// 服务端返回 401，需要拆除会话
    Unauthorized { path: String },
}
