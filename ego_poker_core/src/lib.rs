//! # Ego Poker 核心逻辑库
//!
//! 这个 `core` crate 包含了信心扑克的会话状态、回合状态机、
//! 牌力评估、带版本号的会话存储以及客户端-服务器通信消息的定义。
//! 它不依赖具体的网络服务器或客户端 UI，可以被任何上层应用复用。

mod card;
mod error;
mod logic;
mod message;
mod state;
mod store;

pub use card::*;

pub use error::*;

pub use logic::*;

pub use message::*;

pub use state::*;

pub use store::*;
