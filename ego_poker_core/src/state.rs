use crate::card::{Card, HandRank};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type PlayerId = Uuid;

/// 共享信心值的下限与上限
pub const MIN_CONFIDENCE: u8 = 1;
pub const MAX_CONFIDENCE: u8 = 10;
/// 总信心值达到该值时游戏结束
pub const WIN_THRESHOLD: i32 = 50;
/// 2 * 10 + 5 张牌，一副牌足够
pub const MAX_PLAYERS: usize = 10;
pub const MIN_PLAYERS: usize = 2;

/// 房间码：4 位大写字母/数字，输入时不区分大小写
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameCode(String);

impl GameCode {
    pub const LEN: usize = 4;
    const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> GameCode {
        let code = (0..Self::LEN)
            .map(|_| Self::ALPHABET[rng.random_range(0..Self::ALPHABET.len())] as char)
            .collect();
        GameCode(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GameCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() == Self::LEN && code.bytes().all(|b| Self::ALPHABET.contains(&b)) {
            Ok(GameCode(code))
        } else {
            Err(format!("无效的房间码: {s}"))
        }
    }
}

impl TryFrom<String> for GameCode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<GameCode> for String {
    fn from(code: GameCode) -> String {
        code.0
    }
}

/// 会话（一局完整游戏），按房间码区分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: GameCode,
    pub status: SessionStatus,
    pub host_id: PlayerId,
    pub players: HashMap<PlayerId, Player>, // 可以根据player id查找player
    // 座位顺序：按 PlayerId 排序，开局后不再变化
    pub seating: Vec<PlayerId>,
    // 下一局的局号，从 1 开始
    pub round_number: u32,
    pub round_active: bool,
    pub current_confidence: u8,
    pub current_actor: Option<PlayerId>,
    // 发牌后恰好 5 张
    pub shared_cards: Vec<Card>,
    // 本局的动作日志，只追加
    pub action_log: Vec<ActionEntry>,
    pub winner_ids: Vec<PlayerId>,
    pub win_reason: Option<String>,
    pub game_winner_id: Option<PlayerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Waiting,
    InProgress,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    // 客户端只能看到自己的底牌，其他人的为空
    pub hole_cards: Vec<Card>,
    pub folded: bool,
    pub round_confidence: u8,  // 弃牌后为 0
    pub total_confidence: i32, // 可以为负
    pub ready: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Player {
            id,
            name,
            hole_cards: Vec::new(),
            folded: false,
            round_confidence: 0,
            total_confidence: 0,
            ready: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Fold,
    Call,
    Raise(u8), // 加注后的共享信心值
}

/// 动作日志中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub action: Action,
    pub timestamp: i64, // Unix 毫秒
}

/// 一局结束时的结算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub winner_ids: Vec<PlayerId>,
    pub reason: String,
    // 仅在摊牌时有值：每个未弃牌玩家的最佳牌型
    pub showdown: Vec<ShowdownHand>,
    pub stake: u8,
    pub game_winner_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowdownHand {
    pub player_id: PlayerId,
    pub hand_rank: HandRank,
    pub hole_cards: Vec<Card>,
}

/// 处理一个动作之后的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionOutcome {
    NextActor(PlayerId),
    RoundEnded(RoundResult),
}

// --- Session 的实现方法 ---

impl Session {
    /// 创建会话，房主自动入座
    pub fn new(id: GameCode, host_id: PlayerId, host_name: String) -> Self {
        Session {
            id,
            status: SessionStatus::Waiting,
            host_id,
            players: HashMap::from([(host_id, Player::new(host_id, host_name))]),
            seating: vec![host_id],
            round_number: 1,
            round_active: false,
            current_confidence: MIN_CONFIDENCE,
            current_actor: None,
            shared_cards: Vec::new(),
            action_log: Vec::new(),
            winner_ids: Vec::new(),
            win_reason: None,
            game_winner_id: None,
        }
    }

    /// 未弃牌的玩家，按座位顺序
    pub fn active_players(&self) -> Vec<PlayerId> {
        self.seating
            .iter()
            .filter(|id| self.players.get(id).is_some_and(|p| !p.folded))
            .copied()
            .collect()
    }

    pub fn all_ready(&self) -> bool {
        self.players.values().all(|p| p.ready)
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    /// 为某个客户端生成快照：
    /// 默认隐藏他人底牌；摊牌结束后公开未弃牌玩家的底牌。
    pub fn for_client(&self, client_id: &PlayerId) -> Self {
        let showdown = !self.round_active
            && !self.winner_ids.is_empty()
            && self.active_players().len() >= MIN_PLAYERS;
        let mut client_state = self.clone();
        for (id, player) in client_state.players.iter_mut() {
            if id != client_id && !(showdown && !player.folded) {
                player.hole_cards.clear();
            }
        }
        client_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_game_code_parse_is_case_insensitive() {
        let code: GameCode = " ab1z ".parse().unwrap();
        assert_eq!(code.as_str(), "AB1Z");
        assert!("ABC".parse::<GameCode>().is_err());
        assert!("AB-Z".parse::<GameCode>().is_err());
    }

    #[test]
    fn test_random_game_code_round_trips() {
        let code = GameCode::random(&mut StdRng::seed_from_u64(3));
        assert_eq!(code.to_string().parse::<GameCode>(), Ok(code));
    }

    #[test]
    fn test_new_session_seats_host() {
        let host = Uuid::new_v4();
        let session = Session::new("ABCD".parse().unwrap(), host, "Host".into());
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.seating, vec![host]);
        assert_eq!(session.round_number, 1);
        assert!(!session.round_active);
        assert_eq!(session.active_players(), vec![host]);
    }

    #[test]
    fn test_session_serializes_code_as_plain_string() {
        let session = Session::new("WXYZ".parse().unwrap(), Uuid::new_v4(), "H".into());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["id"], "WXYZ");
        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }
}
