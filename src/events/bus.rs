//! 进程内事件总线
//!
//! 上传事件和会话事件各用一个 broadcast 通道；没有订阅者时发送结果被忽略

use super::{SessionEvent, UploadEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// 通道容量，慢订阅者会收到 Lagged
const CHANNEL_CAPACITY: usize = 256;

/// 事件总线（clone 共享同一组通道）
#[derive(Debug, Clone)]
pub struct EventBus {
    upload_tx: broadcast::Sender<UploadEvent>,
    session_tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (upload_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (session_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            upload_tx,
            session_tx,
        }
    }

    /// 发布上传事件
    pub fn publish_upload(&self, event: UploadEvent) {
        if self.upload_tx.send(event).is_err() {
            debug!("上传事件无订阅者，已丢弃");
        }
    }

    /// 发布会话事件
    pub fn publish_session(&self, event: SessionEvent) {
        if self.session_tx.send(event).is_err() {
            debug!("会话事件无订阅者，已丢弃");
        }
    }

    pub fn subscribe_upload(&self) -> broadcast::Receiver<UploadEvent> {
        self.upload_tx.subscribe()
    }

    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_session();

        bus.publish_session(SessionEvent::LoggedOut);

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::LoggedOut);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish_upload(UploadEvent::CloseRequested);
    }

    #[tokio::test]
    async fn test_clones_share_channels() {
        let bus = EventBus::new();
        let other = bus.clone();
        let mut rx = bus.subscribe_upload();

        other.publish_upload(UploadEvent::CloseRequested);

        assert_eq!(rx.recv().await.unwrap(), UploadEvent::CloseRequested);
    }
}
