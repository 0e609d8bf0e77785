use crate::state::{GameCode, PlayerId};
use thiserror::Error;

/// 游戏逻辑错误。全部可恢复：被拒绝的请求不会改变会话状态。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("房间 {0} 不存在")]
    SessionNotFound(GameCode),

    #[error("玩家 {0} 不在该房间")]
    UnknownPlayer(PlayerId),

    #[error("只有房主可以执行该操作")]
    NotHost,

    #[error("游戏已经开始，无法加入")]
    GameAlreadyStarted,

    #[error("房间已满")]
    SessionFull,

    #[error("至少需要两名玩家")]
    NotEnoughPlayers,

    #[error("本局尚未结束")]
    RoundInProgress,

    #[error("还有玩家没有准备好")]
    PlayersNotReady,

    #[error("游戏已结束")]
    GameEnded,

    #[error("本局已经结束，不能再行动")]
    RoundInactive,

    #[error("现在轮到 {expected:?} 行动，不是 {got}")]
    InvalidActor { expected: Option<PlayerId>, got: PlayerId },

    #[error("加注必须大于当前信心值 {current} 且不超过 10，收到 {value}")]
    InvalidRaise { current: u8, value: u8 },

    #[error("会话版本冲突，请重新同步后重试")]
    VersionConflict,
}
