// 搜索历史
//
// 最近优先；忽略大小写与首尾空白去重；超过上限时丢弃最旧的记录

use serde::{Deserialize, Serialize};

/// 默认上限
pub const DEFAULT_SEARCH_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchHistory {
    entries: Vec<String>,
}

impl SearchHistory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_entries(entries: Vec<String>, limit: usize) -> Self {
        // 旧数据可能含重复或超限，按插入顺序倒序重放
        let mut history = Self::new();
        for entry in entries.into_iter().rev() {
            history.push(&entry, limit);
        }
        history
    }

    /// 记录一次搜索，返回是否记录
    pub fn push(&mut self, query: &str, limit: usize) -> bool {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return false;
        }
        let key = normalize(query);
        self.entries.retain(|e| normalize(e) != key);
        self.entries.insert(0, query.to_string());
        self.entries.truncate(limit);
        true
    }

    /// 删除一条记录（同样忽略大小写）
    pub fn remove(&mut self, query: &str) -> bool {
        let key = normalize(query);
        let before = self.entries.len();
        self.entries.retain(|e| normalize(e) != key);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_first_and_dedup() {
        let mut history = SearchHistory::new();
        history.push("contrato", 10);
        history.push("factura", 10);
        history.push("  CONTRATO ", 10);

        assert_eq!(history.entries(), &["CONTRATO", "factura"]);
    }

    #[test]
    fn test_limit_and_blank() {
        let mut history = SearchHistory::new();
        for i in 0..15 {
            history.push(&format!("q{}", i), DEFAULT_SEARCH_HISTORY_LIMIT);
        }
        assert_eq!(history.len(), DEFAULT_SEARCH_HISTORY_LIMIT);
        assert_eq!(history.entries()[0], "q14");
        assert!(!history.push("   ", 10));
    }

    #[test]
    fn test_from_entries_repairs_old_data() {
        let history = SearchHistory::from_entries(
            vec!["a".into(), "b".into(), "A".into(), "c".into()],
            2,
        );
        assert_eq!(history.entries(), &["a", "b"]);
    }

    #[test]
    fn test_remove() {
        let mut history = SearchHistory::new();
        history.push("Informe", 10);
        assert!(history.remove("informe"));
        assert!(history.is_empty());
        assert!(!history.remove("informe"));
    }
}
