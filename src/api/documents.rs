// 文档接口

use crate::api::client::decode;
use crate::api::{ApiClient, ApiError, DocumentDescriptor, DocumentPatch, DocumentQuery};
use reqwest::Method;
use serde_json::json;
use tracing::info;

impl ApiClient {
    /// 文档列表
    pub async fn list_documents(
        &self,
        query: &DocumentQuery,
    ) -> Result<Vec<DocumentDescriptor>, ApiError> {
        let mut params = Vec::new();
        if let Some(org) = &query.organization_id {
            params.push(("organizationId", org.clone()));
        }
        if let Some(folder) = &query.folder_id {
            params.push(("folderId", folder.clone()));
        }
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        let value = self.get_value("/api/documents", &params).await?;
        decode(value, &["documents"])
    }

    /// 最近文档
    pub async fn recent_documents(
        &self,
        organization_id: &str,
        limit: u32,
    ) -> Result<Vec<DocumentDescriptor>, ApiError> {
        let path = format!(
            "/api/documents/recent/{}",
            urlencoding::encode(organization_id)
        );
        let value = self
            .get_value(&path, &[("limit", limit.to_string())])
            .await?;
        decode(value, &["documents"])
    }

    /// 获取单个文档
    pub async fn get_document(&self, id: &str) -> Result<DocumentDescriptor, ApiError> {
        let path = format!("/api/documents/{}", urlencoding::encode(id));
        let value = self.get_value(&path, &[]).await?;
        decode(value, &["document"])
    }

    /// 修改文档（重命名 / 移动）
    pub async fn update_document(
        &self,
        id: &str,
        patch: &DocumentPatch,
    ) -> Result<DocumentDescriptor, ApiError> {
        let path = format!("/api/documents/{}", urlencoding::encode(id));
        let body = serde_json::to_value(patch)?;
        let value = self.send_value(Method::PATCH, &path, &body).await?;
        decode(value, &["document"])
    }

    /// 删除文档
    pub async fn delete_document(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/api/documents/{}", urlencoding::encode(id));
        self.send_value(Method::DELETE, &path, &json!({})).await?;
        info!("已删除文档: {}", id);
        Ok(())
    }
}
