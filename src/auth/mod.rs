// 认证模块
//
// 会话状态（当前用户、引导标志、401 拆除）

pub mod session;

pub use session::SessionManager;
