//! 事件模块
//!
//! - `types.rs`: 上传事件与会话事件定义
//! - `bus.rs`: 基于 broadcast 的进程内事件总线
//! - `throttle.rs`: 按任务节流进度事件

mod bus;
mod throttle;
mod types;

pub use bus::*;
pub use throttle::*;
pub use types::*;
