// 待上传文件
//
// 内存载荷（宿主直接传入字节）或磁盘路径（上传时再流式读取）

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// MIME 推断失败时的回退类型
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// 文件载荷来源
#[derive(Debug, Clone)]
pub enum FileSource {
    /// 内存中的字节
    Memory(Arc<Vec<u8>>),
    /// 本地磁盘文件
    Path(PathBuf),
}

/// 待上传文件（名称 + 大小 + MIME 类型 + 载荷）
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub source: FileSource,
}

impl UploadFile {
    /// 从内存字节构造
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            mime_type: mime_type.into(),
            source: FileSource::Memory(Arc::new(bytes)),
        }
    }

    /// 从磁盘路径构造，MIME 类型按扩展名推断
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("读取文件信息失败: {:?}", path))?;
        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("无法获取文件名: {:?}", path))?;

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type: guess_mime_type(path),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// 读取完整载荷（仅小文件或测试使用）
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.as_ref().clone()),
            FileSource::Path(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("读取文件失败: {:?}", path)),
        }
    }
}

/// 按扩展名推断 MIME 类型
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type(Path::new("a/report.pdf")), "application/pdf");
        assert_eq!(guess_mime_type(Path::new("photo.PNG")), "image/png");
        assert_eq!(guess_mime_type(Path::new("no_extension")), FALLBACK_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notas.txt");
        tokio::fs::write(&path, b"hola mundo").await.unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notas.txt");
        assert_eq!(file.size, 10);
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.read_all().await.unwrap(), b"hola mundo");

        assert!(UploadFile::from_path(dir.path()).await.is_err());
        assert!(UploadFile::from_path(dir.path().join("missing.pdf")).await.is_err());
    }

    #[test]
    fn test_from_bytes() {
        let file = UploadFile::from_bytes("a.pdf", "application/pdf", vec![0u8; 1024]);
        assert_eq!(file.size, 1024);
        assert!(matches!(file.source, FileSource::Memory(_)));
    }
}
