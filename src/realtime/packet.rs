//! Engine.IO v4 / socket.io 文本帧编解码
//!
//! 只支持默认命名空间与文本帧；二进制附件不在范围内

use serde::Deserialize;
use serde_json::Value;

/// 客户端加入默认命名空间
pub const CONNECT_FRAME: &str = "40";
/// 客户端离开默认命名空间
pub const DISCONNECT_FRAME: &str = "41";
/// 回应服务端 ping
pub const PONG_FRAME: &str = "3";

/// Engine.IO open 握手参数
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// 解析后的帧
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// `0{...}`
    Open(OpenPayload),
    /// `1`
    Close,
    /// `2`
    Ping,
    /// `3`
    Pong,
    /// `6`
    Noop,
    /// `40{...}` 命名空间连接确认
    Connect { sid: Option<String> },
    /// `41`
    Disconnect,
    /// `42[name, ...args]`
    Event {
        name: String,
        payload: Value,
        ack_id: Option<u64>,
    },
    /// `43<id>[...]`
    Ack { ack_id: u64, payload: Value },
    /// `44{...}`
    ConnectError { message: String },
}

/// 帧解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("空帧")]
    Empty,
    #[error("未知的帧类型: {0}")]
    UnknownType(String),
    #[error("帧内容无效: {0}")]
    Invalid(String),
}

/// 解析一个文本帧
pub fn parse(frame: &str) -> Result<Packet, PacketError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|e| PacketError::Invalid(format!("open: {}", e))),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '6' => Ok(Packet::Noop),
        '4' => parse_socket_packet(rest),
        other => Err(PacketError::UnknownType(other.to_string())),
    }
}

fn parse_socket_packet(body: &str) -> Result<Packet, PacketError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = skip_namespace(chars.as_str());

    match kind {
        '0' => {
            let sid = if rest.trim().is_empty() {
                None
            } else {
                serde_json::from_str::<Value>(rest)
                    .ok()
                    .and_then(|v| v.get("sid").and_then(Value::as_str).map(str::to_string))
            };
            Ok(Packet::Connect { sid })
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let (ack_id, json) = split_ack_id(rest);
            let (name, payload) = parse_event_args(json)?;
            Ok(Packet::Event {
                name,
                payload,
                ack_id,
            })
        }
        '3' => {
            let (ack_id, json) = split_ack_id(rest);
            let ack_id = ack_id.ok_or_else(|| PacketError::Invalid("ack 缺少 id".to_string()))?;
            let args: Vec<Value> = serde_json::from_str(json)
                .map_err(|e| PacketError::Invalid(format!("ack: {}", e)))?;
            Ok(Packet::Ack {
                ack_id,
                payload: collapse_args(args),
            })
        }
        '4' => {
            let message = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Object(map) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .unwrap_or_else(|| rest.to_string());
            Ok(Packet::ConnectError { message })
        }
        other => Err(PacketError::UnknownType(format!("4{}", other))),
    }
}

/// 跳过 `/ns,` 前缀
fn skip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

fn split_ack_id(body: &str) -> (Option<u64>, &str) {
    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return (None, body);
    }
    (body[..digits].parse().ok(), &body[digits..])
}

fn parse_event_args(json: &str) -> Result<(String, Value), PacketError> {
    let mut args: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| PacketError::Invalid(format!("event: {}", e)))?;
    if args.is_empty() {
        return Err(PacketError::Invalid("event 缺少名称".to_string()));
    }
    let name = match args.remove(0) {
        Value::String(name) => name,
        other => return Err(PacketError::Invalid(format!("event 名称不是字符串: {}", other))),
    };
    Ok((name, collapse_args(args)))
}

/// 无参数为 Null，单参数取其本身，多参数保留数组
fn collapse_args(mut args: Vec<Value>) -> Value {
    match args.len() {
        0 => Value::Null,
        1 => args.remove(0),
        _ => Value::Array(args),
    }
}

/// 编码事件帧 `42["name",payload]`
pub fn encode_event(name: &str, payload: &Value) -> String {
    let args = if payload.is_null() {
        Value::Array(vec![Value::String(name.to_string())])
    } else {
        Value::Array(vec![Value::String(name.to_string()), payload.clone()])
    };
    format!("42{}", args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_engine_packets() {
        let open = parse(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#)
            .unwrap();
        match open {
            Packet::Open(payload) => {
                assert_eq!(payload.sid, "abc");
                assert_eq!(payload.ping_interval, 25000);
            }
            other => panic!("unexpected packet: {:?}", other),
        }
        assert_eq!(parse("2").unwrap(), Packet::Ping);
        assert_eq!(parse("1").unwrap(), Packet::Close);
        assert_eq!(parse("").unwrap_err(), PacketError::Empty);
        assert!(matches!(parse("9"), Err(PacketError::UnknownType(_))));
    }

    #[test]
    fn test_parse_socket_packets() {
        assert_eq!(
            parse(r#"40{"sid":"s1"}"#).unwrap(),
            Packet::Connect { sid: Some("s1".to_string()) }
        );
        assert_eq!(parse("40").unwrap(), Packet::Connect { sid: None });
        assert_eq!(parse("41").unwrap(), Packet::Disconnect);

        assert_eq!(
            parse(r#"42["document:updated",{"id":"d1"}]"#).unwrap(),
            Packet::Event {
                name: "document:updated".to_string(),
                payload: json!({ "id": "d1" }),
                ack_id: None,
            }
        );
        assert_eq!(
            parse(r#"42/admin,7["ping"]"#).unwrap(),
            Packet::Event {
                name: "ping".to_string(),
                payload: Value::Null,
                ack_id: Some(7),
            }
        );
        assert_eq!(
            parse(r#"42["multi",1,2]"#).unwrap(),
            Packet::Event {
                name: "multi".to_string(),
                payload: json!([1, 2]),
                ack_id: None,
            }
        );
        assert_eq!(
            parse(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::ConnectError { message: "Not authorized".to_string() }
        );
        assert!(matches!(parse("42[1]"), Err(PacketError::Invalid(_))));
    }

    #[test]
    fn test_encode_event() {
        assert_eq!(
            encode_event("join", &json!({ "room": "org-1" })),
            r#"42["join",{"room":"org-1"}]"#
        );
        assert_eq!(encode_event("ping", &Value::Null), r#"42["ping"]"#);
    }
}
