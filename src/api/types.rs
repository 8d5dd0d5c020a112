// API 数据类型定义
//
// 所有类型都在归一化（`_id` → `id` 等）之后反序列化

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 引用另一个实体：可能只是 ID，也可能是已展开的对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Id(String),
    Populated(EntitySummary),
}

/// 已展开实体的摘要字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl EntityRef {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Id(id) => id,
            EntityRef::Populated(summary) => &summary.id,
        }
    }

    /// 展开后的显示名称
    pub fn name(&self) -> Option<&str> {
        match self {
            EntityRef::Id(_) => None,
            EntityRef::Populated(summary) => summary.name.as_deref(),
        }
    }
}

/// 文档描述（上传成功后服务端返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    pub id: String,
    /// 存储文件名
    #[serde(default)]
    pub filename: String,
    /// 用户上传时的原始文件名
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub organization: Option<EntityRef>,
    #[serde(default)]
    pub folder: Option<EntityRef>,
    #[serde(default)]
    pub uploaded_by: Option<EntityRef>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DocumentDescriptor {
    /// 展示用名称，优先原始文件名
    pub fn display_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.filename)
    }
}

/// 文档可修改字段
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

/// 文档列表查询
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// 用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    /// 系统级角色（与组织角色无关）
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub organization: Option<EntityRef>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// 登录请求
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 注册请求
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// 组织
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub owner: Option<EntityRef>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// 成员关系（pending 状态即为邀请）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: String,
    pub user: EntityRef,
    pub organization: EntityRef,
    /// 原始角色字符串，通过 `org_role()` 解析
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub invited_by: Option<EntityRef>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

impl Membership {
    pub fn org_role(&self) -> Option<crate::permissions::OrgRole> {
        self.role.parse().ok()
    }

    pub fn is_pending(&self) -> bool {
        self.status.as_deref() == Some("pending")
    }
}

/// 评论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub document: Option<EntityRef>,
    #[serde(default, alias = "createdBy")]
    pub author: Option<EntityRef>,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited: bool,
}

/// 搜索参数
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    pub organization_id: Option<String>,
    pub mime_type: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// 转换为查询字符串参数
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("q", self.query.trim().to_string())];
        if let Some(org) = &self.organization_id {
            query.push(("organizationId", org.clone()));
        }
        if let Some(mime) = &self.mime_type {
            query.push(("mimeType", mime.clone()));
        }
        if let Some(from) = &self.from_date {
            query.push(("fromDate", from.to_rfc3339()));
        }
        if let Some(to) = &self.to_date {
            query.push(("toDate", to.to_rfc3339()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            query.push(("offset", offset.to_string()));
        }
        query
    }
}

/// 搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(default, alias = "data", alias = "results")]
    pub documents: Vec<DocumentDescriptor>,
    #[serde(default)]
    pub total: u64,
    /// 搜索耗时（毫秒）
    #[serde(default)]
    pub took: Option<u64>,
}
