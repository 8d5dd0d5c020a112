//! socket.io 实时通道
//!
//! 只在显式调用 `connect()` 时建立连接；握手复用 API 客户端的会话 cookie

use crate::api::ApiClient;
use crate::config::RealtimeConfig;
use crate::realtime::packet::{self, Packet, CONNECT_FRAME, DISCONNECT_FRAME, PONG_FRAME};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// 服务端推送的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeEvent {
    pub name: String,
    pub payload: Value,
}

/// 实时通道错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    #[error("实时通道已禁用")]
    Disabled,
    #[error("实时通道地址无效: {0}")]
    InvalidUrl(String),
    #[error("WebSocket 连接失败: {0}")]
    WebSocket(String),
    #[error("socket.io 握手被拒绝: {0}")]
    Rejected(String),
    #[error("socket.io 握手超时")]
    Timeout,
    #[error("实时通道未连接")]
    NotConnected,
}

/// 一条已建立的连接
struct Connection {
    outgoing: mpsc::UnboundedSender<Message>,
    shutdown: CancellationToken,
    /// 命名空间握手完成后置位，连接结束时清除
    connected: Arc<AtomicBool>,
}

/// socket.io 实时通道
pub struct RealtimeChannel {
    client: ApiClient,
    config: RealtimeConfig,
    handshake_timeout: Duration,
    events_tx: broadcast::Sender<RealtimeEvent>,
    connection: Mutex<Option<Connection>>,
    /// 串行化 connect，并发调用只建立一条连接
    connect_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("path", &self.config.path)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RealtimeChannel {
    pub fn new(client: ApiClient, config: &RealtimeConfig, handshake_timeout: Duration) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            config: config.clone(),
            handshake_timeout,
            events_tx,
            connection: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .map(|c| c.connected.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// 订阅服务端事件
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events_tx.subscribe()
    }

    /// WebSocket 握手地址
    pub fn socket_url(&self) -> Result<Url, RealtimeError> {
        let mut url = self
            .client
            .url(&self.config.path)
            .map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(RealtimeError::InvalidUrl(format!("不支持的协议: {}", other))),
        };
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::InvalidUrl(url.to_string()))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(Some("EIO=4&transport=websocket"));
        Ok(url)
    }

    /// 建立连接并加入默认命名空间
    ///
    /// 已连接时直接返回；WebSocket 连接与 socket.io 握手整体受超时限制
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        if !self.config.enabled {
            return Err(RealtimeError::Disabled);
        }
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        // 旧连接（断开中或握手失败）先清理
        self.shutdown_connection();

        let result = match tokio::time::timeout(self.handshake_timeout, self.open_connection()).await
        {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::Timeout),
        };
        if let Err(e) = &result {
            warn!("实时通道连接失败: {}", e);
            self.shutdown_connection();
        }
        result
    }

    async fn open_connection(&self) -> Result<(), RealtimeError> {
        let url = self.socket_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;
        if let Some(cookie) = self.client.cookie_header() {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                request.headers_mut().insert(COOKIE, value);
            }
        }

        info!("连接实时通道: {}", url);
        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RealtimeError::WebSocket(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let shutdown = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), RealtimeError>>();

        // 发送任务
        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = writer_shutdown.cancelled() => break,
                    message = outgoing_rx.recv() => message,
                };
                let Some(message) = message else { break };
                if let Err(e) = sink.send(message).await {
                    debug!("实时通道发送失败: {}", e);
                    break;
                }
            }
            // 尽力发出排队中的离开帧
            while let Ok(message) = outgoing_rx.try_recv() {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // 接收任务
        let reader_tx = outgoing_tx.clone();
        let reader_shutdown = shutdown.clone();
        let events_tx = self.events_tx.clone();
        let connected = Arc::new(AtomicBool::new(false));
        let reader_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            loop {
                let frame = tokio::select! {
                    _ = reader_shutdown.cancelled() => break,
                    frame = source.next() => frame,
                };
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("实时通道被服务端关闭");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("实时通道读取失败: {}", e);
                        break;
                    }
                };

                match packet::parse(&text) {
                    Ok(Packet::Open(open)) => {
                        debug!("Engine.IO 握手: sid={}, ping_interval={}ms", open.sid, open.ping_interval);
                        let _ = reader_tx.send(Message::Text(CONNECT_FRAME.to_string()));
                    }
                    Ok(Packet::Ping) => {
                        let _ = reader_tx.send(Message::Text(PONG_FRAME.to_string()));
                    }
                    Ok(Packet::Connect { sid }) => {
                        reader_connected.store(true, Ordering::SeqCst);
                        info!("实时通道已连接: sid={:?}", sid);
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    Ok(Packet::ConnectError { message }) => {
                        error!("实时通道握手被拒绝: {}", message);
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(Err(RealtimeError::Rejected(message)));
                        }
                        break;
                    }
                    Ok(Packet::Event { name, payload, .. }) => {
                        debug!("收到实时事件: {}", name);
                        let _ = events_tx.send(RealtimeEvent { name, payload });
                    }
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                        info!("实时通道已断开");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("忽略无法解析的帧: {} ({})", text, e),
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            reader_shutdown.cancel();
        });

        *self.connection.lock() = Some(Connection {
            outgoing: outgoing_tx,
            shutdown,
            connected,
        });

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::WebSocket("连接在握手前关闭".to_string())),
        }
    }

    /// 发送事件
    pub fn emit(&self, event: &str, payload: &Value) -> Result<(), RealtimeError> {
        if !self.is_connected() {
            return Err(RealtimeError::NotConnected);
        }
        let connection = self.connection.lock();
        let connection = connection.as_ref().ok_or(RealtimeError::NotConnected)?;
        connection
            .outgoing
            .send(Message::Text(packet::encode_event(event, payload)))
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// 离开命名空间并关闭连接
    pub fn disconnect(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            let _ = connection
                .outgoing
                .send(Message::Text(DISCONNECT_FRAME.to_string()));
            connection.shutdown.cancel();
            info!("实时通道已主动断开");
        }
    }

    fn shutdown_connection(&self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.shutdown.cancel();
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.shutdown_connection();
    }
}
