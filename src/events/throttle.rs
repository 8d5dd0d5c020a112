//! 进度事件节流器
//!
//! 传输层可能每个数据块都回调一次进度，事件按任务限制发布频率，
//! 任务自身的 progress 字段不受节流影响

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 按任务节流的进度事件节流器
#[derive(Debug)]
pub struct ProgressThrottler {
    /// task_id -> 上次发布时间
    last_emit: DashMap<String, Instant>,
    interval: Duration,
}

impl ProgressThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit: DashMap::new(),
            interval,
        }
    }

    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 检查该任务是否应该发布进度事件
    ///
    /// 进度到达 100 时总是发布
    pub fn should_emit(&self, task_id: &str, progress: u8) -> bool {
        let now = Instant::now();
        match self.last_emit.entry(task_id.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
            Entry::Occupied(mut occupied) => {
                if progress >= 100 || now.duration_since(*occupied.get()) >= self.interval {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// 任务结束或重试时清除节流状态
    pub fn forget(&self, task_id: &str) {
        self.last_emit.remove(task_id);
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}
