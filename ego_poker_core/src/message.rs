use crate::state::{Action, ActionEntry, GameCode, Player, PlayerId, RoundResult, Session};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    // --- 房间管理消息 ---
    /// 创建一个新房间，创建者成为房主
    CreateGame { name: String },
    /// 通过房间码加入房间
    JoinGame { code: GameCode, name: String },

    // --- 游戏内消息 ---
    /// 房主开始第一局
    StartGame,
    /// 轮到自己时执行的动作
    PerformAction(Action),
    /// 一局结束后示意准备好下一局
    Ready,
    /// 聊天，与牌局状态无关
    SendChat(String),
    /// 房主结束游戏
    EndGame,
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// 成功加入或创建房间后，私密地发给该玩家
    GameJoined {
        your_id: PlayerId,
        session: Session, // 已隐藏他人底牌
    },

    /// 完整会话快照，发送前会调用 `Session::for_client`
    SessionSnapshot(Session),

    PlayerJoined { player: Player },

    RoundStarted {
        round_number: u32,
        first_actor: PlayerId,
    },

    /// 动作已被接受并写入日志
    PlayerActed {
        entry: ActionEntry,
        current_confidence: u8,
    },

    NextToAct {
        player_id: PlayerId,
        /// 合法的最小加注值；已到上限时为 None
        min_raise: Option<u8>,
    },

    RoundEnded(RoundResult),

    GameEnded { winner_id: Option<PlayerId> },

    Chat {
        sender_id: PlayerId,
        sender_name: String,
        message: String,
        timestamp: i64,
    },

    Info { message: String },
    Error { message: String },
}

impl From<Action> for ClientMessage {
    fn from(action: Action) -> Self {
        ClientMessage::PerformAction(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_json_shape() {
        let json = serde_json::to_string(&ClientMessage::from(Action::Raise(4))).unwrap();
        assert_eq!(json, r#"{"PerformAction":{"Raise":4}}"#);
    }

    #[test]
    fn test_game_code_normalized_on_deserialize() {
        let join: ClientMessage = serde_json::from_str(r#"{"JoinGame":{"code":"abcd","name":"Ann"}}"#).unwrap();
        assert_eq!(join, ClientMessage::JoinGame { code: "ABCD".parse().unwrap(), name: "Ann".into() });
        assert!(serde_json::from_str::<ClientMessage>(r#"{"JoinGame":{"code":"ab","name":"Ann"}}"#).is_err());
    }
}
