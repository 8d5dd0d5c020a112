// CloudDocs 后端 API 模块

pub mod auth;
pub mod client;
pub mod comments;
pub mod documents;
pub mod error;
pub mod memberships;
pub mod normalize;
pub mod search;
pub mod types;

pub use client::ApiClient;
pub use error::{status_message, ApiError};
pub use types::*;
