// 实时通道模块
//
// socket.io（Engine.IO v4）over WebSocket，只在显式调用 connect 时连接

pub mod channel;
pub mod packet;

pub use channel::{RealtimeChannel, RealtimeError, RealtimeEvent};
pub use packet::{Packet, PacketError};
