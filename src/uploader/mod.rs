// 上传模块
//
// - 校验策略：大小 / 类型 / 队列容量
// - 任务状态机
// - 传输适配器（trait + HTTP multipart 实现）
// - 队列管理器：信号量并发控制、取消令牌、完成回调

pub mod file;
pub mod manager;
pub mod task;
pub mod transport;
pub mod validation;

pub use file::{guess_mime_type, FileSource, UploadFile};
pub use manager::{AddFilesResult, CompletionCallback, UploadManager, UploadStats};
pub use task::{UploadStatus, UploadTask};
pub use transport::{
    HttpUploadTransport, ProgressCallback, TransportError, UploadProgress, UploadTransport,
};
pub use validation::{
    partition, validate_file, Partition, RejectReason, UploadConstraints, ValidationError,
};
