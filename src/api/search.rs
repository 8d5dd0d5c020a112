// 搜索接口

use crate::api::client::decode;
use crate::api::{ApiClient, ApiError, SearchParams, SearchResult};
use serde_json::Value;

impl ApiClient {
    /// 全文搜索
    ///
    /// 空查询直接返回空结果，不发请求
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResult, ApiError> {
        if params.query.trim().is_empty() {
            return Ok(SearchResult {
                documents: Vec::new(),
                total: 0,
                took: None,
            });
        }
        let value = self.get_value("/api/search", &params.to_query()).await?;
        let mut result: SearchResult = serde_json::from_value(strip_success(value))?;
        if result.total == 0 {
            result.total = result.documents.len() as u64;
        }
        Ok(result)
    }

    /// 搜索建议
    pub async fn autocomplete(&self, query: &str, limit: u32) -> Result<Vec<String>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let value = self
            .get_value(
                "/api/search/autocomplete",
                &[("q", query.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        decode(value, &["suggestions"])
    }
}

/// 搜索响应的 `data` 就是文档列表，不能按信封拆开
fn strip_success(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.remove("success");
        map.remove("message");
    }
    value
}
