// 评论接口

use crate::api::client::decode;
use crate::api::{ApiClient, ApiError, Comment};
use reqwest::Method;
use serde_json::json;

/// 评论内容上限（字符）
pub const MAX_COMMENT_LENGTH: usize = 2000;

fn validate_content(content: &str) -> Result<String, ApiError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::Http {
            status: 400,
            message: Some("评论内容不能为空".to_string()),
            code: None,
        });
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ApiError::Http {
            status: 400,
            message: Some(format!("评论内容不能超过 {} 个字符", MAX_COMMENT_LENGTH)),
            code: None,
        });
    }
    Ok(content.to_string())
}

impl ApiClient {
    /// 文档下的评论
    pub async fn list_comments(&self, document_id: &str) -> Result<Vec<Comment>, ApiError> {
        let path = format!(
            "/api/comments/documents/{}",
            urlencoding::encode(document_id)
        );
        let value = self.get_value(&path, &[]).await?;
        decode(value, &["comments"])
    }

    /// 发表评论
    pub async fn create_comment(
        &self,
        document_id: &str,
        content: &str,
    ) -> Result<Comment, ApiError> {
        let content = validate_content(content)?;
        let path = format!(
            "/api/comments/documents/{}",
            urlencoding::encode(document_id)
        );
        let value = self
            .send_value(Method::POST, &path, &json!({ "content": content }))
            .await?;
        decode(value, &["comment"])
    }

    /// 编辑评论
    pub async fn update_comment(&self, comment_id: &str, content: &str) -> Result<Comment, ApiError> {
        let content = validate_content(content)?;
        let path = format!("/api/comments/{}", urlencoding::encode(comment_id));
        let value = self
            .send_value(Method::PATCH, &path, &json!({ "content": content }))
            .await?;
        decode(value, &["comment"])
    }

    /// 删除评论
    pub async fn delete_comment(&self, comment_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/comments/{}", urlencoding::encode(comment_id));
        self.send_value(Method::DELETE, &path, &json!({})).await?;
        Ok(())
    }
}
