// 上传任务定义
//
// 状态机：
//   pending --start--> uploading --complete--> success
//   uploading --fail--> error
//   pending | uploading --cancel--> cancelled
//   error | cancelled --retry--> pending
//
// 非法转换返回 false，任务保持不变

use crate::api::DocumentDescriptor;
use crate::uploader::UploadFile;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 上传任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Success,
    /// 失败
    Error,
    /// 已取消
    Cancelled,
}

impl UploadStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Success | UploadStatus::Error | UploadStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
            UploadStatus::Cancelled => "cancelled",
        }
    }
}

/// 上传任务
#[derive(Debug, Clone)]
pub struct UploadTask {
    /// 任务ID
    pub id: String,
    /// 待上传文件
    pub file: UploadFile,
    /// 任务状态
    pub status: UploadStatus,
    /// 进度（0-100）
    pub progress: u8,
    /// 重试次数
    pub retry_count: u32,
    /// 错误信息
    pub error: Option<String>,
    /// 服务端返回的文档描述
    pub result: Option<DocumentDescriptor>,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 开始时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
}

impl UploadTask {
    /// 创建新的上传任务
    pub fn new(file: UploadFile) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file,
            status: UploadStatus::Pending,
            progress: 0,
            retry_count: 0,
            error: None,
            result: None,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file.name
    }

    /// 标记为上传中
    pub fn mark_uploading(&mut self) -> bool {
        if self.status != UploadStatus::Pending {
            return false;
        }
        self.status = UploadStatus::Uploading;
        self.started_at = Some(chrono::Utc::now().timestamp());
        true
    }

    /// 更新进度，只在上传中生效且不回退
    ///
    /// 返回进度是否实际变化
    pub fn update_progress(&mut self, progress: u8) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        let next = progress.min(100).max(self.progress);
        if next == self.progress {
            return false;
        }
        self.progress = next;
        true
    }

    /// 标记为已完成
    pub fn mark_success(&mut self, document: DocumentDescriptor) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        self.status = UploadStatus::Success;
        self.progress = 100;
        self.error = None;
        self.result = Some(document);
        self.completed_at = Some(chrono::Utc::now().timestamp());
        true
    }

    /// 标记为失败
    pub fn mark_failed(&mut self, error: String) -> bool {
        if self.status != UploadStatus::Uploading {
            return false;
        }
        self.status = UploadStatus::Error;
        self.error = Some(error);
        self.completed_at = Some(chrono::Utc::now().timestamp());
        true
    }

    /// 标记为已取消
    pub fn mark_cancelled(&mut self) -> bool {
        if !matches!(self.status, UploadStatus::Pending | UploadStatus::Uploading) {
            return false;
        }
        self.status = UploadStatus::Cancelled;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        true
    }

    /// 重置为等待中（重试）
    pub fn mark_retry(&mut self) -> bool {
        if !matches!(self.status, UploadStatus::Error | UploadStatus::Cancelled) {
            return false;
        }
        self.status = UploadStatus::Pending;
        self.progress = 0;
        self.retry_count += 1;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> UploadTask {
        UploadTask::new(UploadFile::from_bytes(
            "report.pdf",
            "application/pdf",
            vec![0u8; 1024],
        ))
    }

    fn document() -> DocumentDescriptor {
        serde_json::from_value(serde_json::json!({ "id": "d1", "filename": "report.pdf" })).unwrap()
    }

    #[test]
    fn test_task_creation() {
        let task = task();
        assert_eq!(task.status, UploadStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.retry_count, 0);
        assert!(task.result.is_none());
        assert_ne!(task.id, self::task().id);
    }

    #[test]
    fn test_happy_path() {
        let mut task = task();
        assert!(task.mark_uploading());
        assert!(task.started_at.is_some());
        assert!(task.update_progress(40));
        assert!(task.mark_success(document()));
        assert_eq!(task.status, UploadStatus::Success);
        assert_eq!(task.progress, 100);
        assert_eq!(task.result.as_ref().map(|d| d.id.as_str()), Some("d1"));
    }

    #[test]
    fn test_progress_is_monotonic_and_frozen() {
        let mut task = task();
        assert!(!task.update_progress(10));
        assert_eq!(task.progress, 0);

        task.mark_uploading();
        task.update_progress(60);
        assert!(!task.update_progress(30));
        assert_eq!(task.progress, 60);
        task.update_progress(250);
        assert_eq!(task.progress, 100);

        let mut failed = self::task();
        failed.mark_uploading();
        failed.update_progress(20);
        failed.mark_failed("Network error".to_string());
        assert!(!failed.update_progress(90));
        assert_eq!(failed.progress, 20);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut task = task();
        assert!(!task.mark_success(document()));
        assert!(!task.mark_failed("x".to_string()));
        assert!(!task.mark_retry());
        assert_eq!(task.status, UploadStatus::Pending);

        task.mark_uploading();
        task.mark_success(document());
        assert!(!task.mark_cancelled());
        assert!(!task.mark_retry());
        assert_eq!(task.status, UploadStatus::Success);
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn test_cancel_then_retry() {
        let mut task = task();
        task.mark_uploading();
        task.update_progress(45);
        assert!(task.mark_cancelled());
        assert_eq!(task.status, UploadStatus::Cancelled);

        assert!(task.mark_retry());
        assert_eq!(task.status, UploadStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.retry_count, 1);
    }

    #[test]
    fn test_fail_keeps_message() {
        let mut task = task();
        task.mark_uploading();
        assert!(task.mark_failed("Network error".to_string()));
        assert_eq!(task.status, UploadStatus::Error);
        assert_eq!(task.error.as_deref(), Some("Network error"));

        task.mark_retry();
        assert!(task.error.is_none());
    }
}
