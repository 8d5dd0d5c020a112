// 本地存储模块
//
// 单个 JSON 文件支撑的键值存储，保存缓存用户、搜索历史和"记住我"标志

mod local;
mod search_history;

pub use local::{LocalStorage, StorageError, KEY_REMEMBER_ME, KEY_SEARCH_HISTORY, KEY_USER};
pub use search_history::{SearchHistory, DEFAULT_SEARCH_HISTORY_LIMIT};
