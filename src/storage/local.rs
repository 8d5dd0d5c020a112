// JSON 文件键值存储
//
// 写入采用临时文件 + rename；文件损坏时丢弃旧内容重新开始

use crate::api::User;
use crate::storage::SearchHistory;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 缓存的当前用户
pub const KEY_USER: &str = "user";
/// 搜索历史
pub const KEY_SEARCH_HISTORY: &str = "searchHistory";
/// "记住我"标志
pub const KEY_REMEMBER_ME: &str = "rememberMe";

/// 存储错误
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("存储文件读写失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("存储数据序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 本地键值存储
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    data: RwLock<Map<String, Value>>,
    search_history_limit: usize,
}

impl LocalStorage {
    /// 打开存储文件，不存在时为空
    pub fn open(path: impl AsRef<Path>, search_history_limit: usize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!("本地存储文件格式无效，已重置: {:?}", path);
                    Map::new()
                }
            }
        } else {
            Map::new()
        };

        info!("打开本地存储: {:?} ({} 个键)", path, data.len());
        Ok(Self {
            path,
            data: RwLock::new(data),
            search_history_limit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取键值，缺失或类型不符时返回 None
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.data.read().get(key).cloned()?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("本地存储键 {} 解析失败: {}", key, e);
                None
            }
        }
    }

    /// 写入键值并落盘
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        let mut data = self.data.write();
        data.insert(key.to_string(), value);
        self.persist(&data)
    }

    /// 删除键并落盘
    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut data = self.data.write();
        if data.remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&data)?;
        Ok(true)
    }

    /// 清空全部数据
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut data = self.data.write();
        data.clear();
        self.persist(&data)
    }

    pub fn cached_user(&self) -> Option<User> {
        self.get(KEY_USER)
    }

    pub fn set_cached_user(&self, user: &User) -> Result<(), StorageError> {
        self.set(KEY_USER, user)
    }

    pub fn clear_cached_user(&self) -> Result<bool, StorageError> {
        self.remove(KEY_USER)
    }

    pub fn remember_me(&self) -> bool {
        self.get(KEY_REMEMBER_ME).unwrap_or(false)
    }

    pub fn set_remember_me(&self, remember: bool) -> Result<(), StorageError> {
        self.set(KEY_REMEMBER_ME, &remember)
    }

    pub fn search_history(&self) -> SearchHistory {
        let entries: Vec<String> = self.get(KEY_SEARCH_HISTORY).unwrap_or_default();
        SearchHistory::from_entries(entries, self.search_history_limit)
    }

    /// 记录一次搜索，返回更新后的历史
    pub fn add_search(&self, query: &str) -> Result<SearchHistory, StorageError> {
        let mut history = self.search_history();
        if history.push(query, self.search_history_limit) {
            self.set(KEY_SEARCH_HISTORY, &history)?;
        }
        Ok(history)
    }

    pub fn remove_search(&self, query: &str) -> Result<SearchHistory, StorageError> {
        let mut history = self.search_history();
        if history.remove(query) {
            self.set(KEY_SEARCH_HISTORY, &history)?;
        }
        Ok(history)
    }

    pub fn clear_search_history(&self) -> Result<(), StorageError> {
        self.remove(KEY_SEARCH_HISTORY).map(|_| ())
    }

    /// 临时文件 + 原子替换
    fn persist(&self, data: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(data)?;
        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.flush()?;
        }
        std::fs::rename(&temp_path, &self.path)?;

        debug!("本地存储已保存: {:?}", self.path);
        Ok(())
    }
}
