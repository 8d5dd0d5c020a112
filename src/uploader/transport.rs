// 上传传输适配器
//
// 队列管理器只依赖 `UploadTransport` trait；
// 内置实现通过 multipart POST 把文件流式发送到 `/api/documents/upload`

use crate::api::client::decode;
use crate::api::normalize::normalize_ids;
use crate::api::{ApiClient, DocumentDescriptor};
use crate::uploader::file::FALLBACK_MIME_TYPE;
use crate::uploader::{FileSource, UploadFile};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 上传接口路径
pub const UPLOAD_ENDPOINT: &str = "/api/documents/upload";

/// 内存载荷的切块大小
const MEMORY_CHUNK_SIZE: usize = 64 * 1024;

/// 传输进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// 已发送字节
    pub loaded: u64,
    /// 总字节，未知时为 None
    pub total: Option<u64>,
}

impl UploadProgress {
    /// 百分比（0-100），total 未知或为 0 时返回 None
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(total) if total > 0 => {
                let pct = (self.loaded as f64 * 100.0 / total as f64).round();
                Some(pct.clamp(0.0, 100.0) as u8)
            }
            _ => None,
        }
    }
}

/// 进度回调
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// 传输错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("上传已取消")]
    Cancelled,
    /// 消息原样透传给任务
    #[error("{0}")]
    Failed(String),
}

/// 上传传输适配器
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// 上传单个文件
    ///
    /// 进度通过 `on_progress` 报告；`cancel` 触发后应尽快返回 `TransportError::Cancelled`
    async fn upload(
        &self,
        file: &UploadFile,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<DocumentDescriptor, TransportError>;
}

/// 基于 HTTP multipart 的传输实现
#[derive(Debug, Clone)]
pub struct HttpUploadTransport {
    client: ApiClient,
    organization_id: Option<String>,
    folder_id: Option<String>,
}

impl HttpUploadTransport {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            organization_id: None,
            folder_id: None,
        }
    }

    /// 上传到指定组织
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// 上传到指定文件夹
    pub fn with_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// 构造一次请求的 multipart 表单
    ///
    /// 每次尝试（含 CSRF 重试）都重新打开载荷并把计数清零
    fn build_form(
        &self,
        file: &UploadFile,
        size: u64,
        mime: &str,
        loaded: &Arc<AtomicU64>,
        on_progress: &ProgressCallback,
    ) -> Form {
        loaded.store(0, Ordering::SeqCst);

        let make_part = || {
            let body = counting_body(&file.source, size, Arc::clone(loaded), Arc::clone(on_progress));
            Part::stream_with_length(body, size).file_name(file.name.clone())
        };
        let part = make_part().mime_str(mime).unwrap_or_else(|_| make_part());

        let mut form = Form::new();
        if let Some(org) = &self.organization_id {
            form = form.text("organizationId", org.clone());
        }
        if let Some(folder) = &self.folder_id {
            form = form.text("folderId", folder.clone());
        }
        form.part("file", part)
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload(
        &self,
        file: &UploadFile,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<DocumentDescriptor, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let size = current_size(&file.source)
            .await
            .map_err(|e| TransportError::Failed(format!("读取文件失败: {}", e)))?;
        let mime = sanitize_mime(&file.mime_type);
        let loaded = Arc::new(AtomicU64::new(0));
        debug!("开始上传文件: name={}, size={}, mime={}", file.name, size, mime);

        let request = self.client.execute(Method::POST, UPLOAD_ENDPOINT, |req| {
            req.multipart(self.build_form(file, size, &mime, &loaded, &on_progress))
        });

        let mut value = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("上传已取消: {}", file.name);
                return Err(TransportError::Cancelled);
            }
            result = request => result.map_err(|e| {
                warn!("上传失败: name={}, error={}", file.name, e);
                TransportError::Failed(e.user_message())
            })?,
        };

        normalize_ids(&mut value);
        let document: DocumentDescriptor = decode(value, &["document"])
            .map_err(|e| TransportError::Failed(e.user_message()))?;

        on_progress(UploadProgress {
            loaded: size,
            total: Some(size),
        });
        info!("上传完成: name={}, document_id={}", file.name, document.id);
        Ok(document)
    }
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + Sync>>;

/// 载荷字节流
fn payload_stream(source: &FileSource) -> ChunkStream {
    match source {
        FileSource::Memory(bytes) => {
            let chunks: Vec<Result<Vec<u8>, std::io::Error>> = bytes
                .chunks(MEMORY_CHUNK_SIZE)
                .map(|c| Ok(c.to_vec()))
                .collect();
            Box::pin(futures::stream::iter(chunks))
        }
        FileSource::Path(path) => Box::pin(
            futures::stream::once(tokio::fs::File::open(path.clone()))
                .map_ok(ReaderStream::new)
                .try_flatten()
                .map_ok(|chunk| chunk.to_vec()),
        ),
    }
}

/// 发送前的实际大小，磁盘文件以当前元数据为准
async fn current_size(source: &FileSource) -> std::io::Result<u64> {
    match source {
        FileSource::Memory(bytes) => Ok(bytes.len() as u64),
        FileSource::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
    }
}

/// 边发送边统计字节的请求体
fn counting_body(
    source: &FileSource,
    total: u64,
    loaded: Arc<AtomicU64>,
    on_progress: ProgressCallback,
) -> Body {
    let stream = payload_stream(source).inspect_ok(move |chunk| {
        let sent = loaded.fetch_add(chunk.len() as u64, Ordering::SeqCst) + chunk.len() as u64;
        on_progress(UploadProgress {
            loaded: sent.min(total),
            total: Some(total),
        });
    });
    Body::wrap_stream(stream)
}

/// 无法解析的 MIME 类型按二进制流发送
fn sanitize_mime(mime: &str) -> String {
    match mime.trim().parse::<mime_guess::Mime>() {
        Ok(m) => m.essence_str().to_string(),
        Err(_) => FALLBACK_MIME_TYPE.to_string(),
    }
}
