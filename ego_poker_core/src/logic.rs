use crate::card::*;
use crate::error::GameError;
use crate::state::*;
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

/// 只剩一名玩家时写入 winReason
pub const LAST_PLAYER_STANDING: &str = "Last player standing";

// --- 行动顺序 ---

/// 计算下一个行动者
///
/// 从 `current` 之后的座位开始顺时针查找，跳过已弃牌的玩家，最多绕一圈。
/// 未弃牌的玩家少于两人时返回 None，表示本局因淘汰而结束。
pub fn next_actor(seating: &[PlayerId], folded: &HashSet<PlayerId>, current: PlayerId) -> Option<PlayerId> {
    let remaining = seating.iter().filter(|id| !folded.contains(id)).count();
    if remaining < MIN_PLAYERS {
        return None;
    }

    // current 不在座位表中时从第一个座位开始
    let start = seating.iter().position(|id| *id == current).unwrap_or(seating.len() - 1);
    (1..=seating.len())
        .map(|step| seating[(start + step) % seating.len()])
        .find(|id| !folded.contains(id))
}

/// 选出所有不被其他人严格压制的玩家（平局时有多个赢家）
pub fn pick_winners(hands: &[ShowdownHand]) -> Vec<PlayerId> {
    let Some(best) = hands.iter().map(|h| &h.hand_rank).max() else {
        return Vec::new();
    };
    hands
        .iter()
        .filter(|h| &h.hand_rank == best)
        .map(|h| h.player_id)
        .collect()
}

// --- 核心游戏流程 ---
//
// 以下方法都不修改 `self`，而是返回新的会话。
// 被拒绝的请求没有任何副作用，调用方可以放心地在版本冲突后重试。

impl Session {
    /// 玩家加入房间（只能在游戏开始前）。重复加入视为成功。
    pub fn join(&self, player_id: PlayerId, name: String) -> Result<Session, GameError> {
        match self.status {
            SessionStatus::Ended => return Err(GameError::GameEnded),
            SessionStatus::InProgress => return Err(GameError::GameAlreadyStarted),
            SessionStatus::Waiting => {}
        }
        if self.players.contains_key(&player_id) {
            return Ok(self.clone());
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::SessionFull);
        }

        let mut next = self.clone();
        next.players.insert(player_id, Player::new(player_id, name));
        next.seating.push(player_id);
        next.seating.sort();
        Ok(next)
    }

    /// 开始新的一局
    ///
    /// - 新建一副牌并洗牌，每人两张底牌，再发 5 张公共牌。
    /// - 重置所有玩家的本局状态，共享信心值回到 1。
    /// - 第一局由第一个座位先行动，之后每局先行动的座位依次后移。
    ///
    /// 第一局之后，必须所有玩家都已准备才能开始。
    pub fn start_round<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Session, GameError> {
        if self.is_ended() {
            return Err(GameError::GameEnded);
        }
        if self.round_active {
            return Err(GameError::RoundInProgress);
        }
        if self.seating.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }
        if self.status == SessionStatus::InProgress && !self.all_ready() {
            return Err(GameError::PlayersNotReady);
        }

        let mut next = self.clone();
        let mut deck = Deck::shuffled(rng);

        for player_id in &self.seating {
            let Some(hole_cards) = deck.deal(2) else {
                return Err(GameError::SessionFull);
            };
            if let Some(player) = next.players.get_mut(player_id) {
                player.hole_cards = hole_cards;
                player.folded = false;
                player.round_confidence = MIN_CONFIDENCE;
                player.ready = false;
            }
        }
        let Some(shared_cards) = deck.deal(5) else {
            return Err(GameError::SessionFull);
        };
        next.shared_cards = shared_cards;

        next.current_confidence = MIN_CONFIDENCE;
        next.action_log.clear();
        next.winner_ids.clear();
        next.win_reason = None;
        next.round_active = true;
        next.status = SessionStatus::InProgress;

        // round_number 指向即将开始的这一局
        let opener_idx = (next.round_number as usize - 1) % next.seating.len();
        next.current_actor = Some(next.seating[opener_idx]);
        next.round_number += 1;

        debug!(
            session = %next.id,
            round = next.round_number - 1,
            opener = %next.seating[opener_idx],
            "round started"
        );
        Ok(next)
    }

    /// 两局之间，玩家示意已准备好
    pub fn mark_ready(&self, player_id: PlayerId) -> Result<Session, GameError> {
        if self.is_ended() {
            return Err(GameError::GameEnded);
        }
        if self.round_active {
            return Err(GameError::RoundInProgress);
        }
        let mut next = self.clone();
        let player = next.players.get_mut(&player_id).ok_or(GameError::UnknownPlayer(player_id))?;
        player.ready = true;
        Ok(next)
    }

    /// 房主提前结束游戏；进行中的一局直接作废，不结算
    pub fn end_game(&self, by: PlayerId) -> Result<Session, GameError> {
        if by != self.host_id {
            return Err(GameError::NotHost);
        }
        if self.is_ended() {
            return Err(GameError::GameEnded);
        }
        let mut next = self.clone();
        next.status = SessionStatus::Ended;
        next.round_active = false;
        next.current_actor = None;
        Ok(next)
    }

    /// 处理当前行动者的一个动作
    ///
    /// 先校验（游戏是否结束、本局是否进行中、是否轮到该玩家、加注是否合法），
    /// 再应用动作并写入动作日志。之后：
    /// - 只剩一名未弃牌玩家：该玩家直接获胜，不摊牌；
    /// - 信心值已统一且动作数不少于未弃牌人数：摊牌；
    /// - 否则把行动权交给下一位玩家。
    pub fn apply_action(
        &self,
        actor: PlayerId,
        action: Action,
        timestamp: i64,
    ) -> Result<(Session, ActionOutcome), GameError> {
        if self.is_ended() {
            return Err(GameError::GameEnded);
        }
        if !self.round_active {
            return Err(GameError::RoundInactive);
        }
        if self.current_actor != Some(actor) {
            return Err(GameError::InvalidActor { expected: self.current_actor, got: actor });
        }
        if let Action::Raise(value) = action {
            if value <= self.current_confidence || value > MAX_CONFIDENCE {
                return Err(GameError::InvalidRaise { current: self.current_confidence, value });
            }
        }

        let mut next = self.clone();
        let stake = next.current_confidence;
        let player = next.players.get_mut(&actor).ok_or(GameError::UnknownPlayer(actor))?;
        match action {
            Action::Fold => {
                player.folded = true;
                player.round_confidence = 0;
            }
            Action::Call => {
                player.round_confidence = stake;
            }
            Action::Raise(value) => {
                player.round_confidence = value;
                next.current_confidence = value;
            }
        }
        let name = player.name.clone();
        next.action_log.push(ActionEntry { player_id: actor, name, action, timestamp });
        debug!(session = %next.id, player = %actor, ?action, confidence = next.current_confidence, "action applied");

        let folded: HashSet<PlayerId> = next
            .players
            .values()
            .filter(|p| p.folded)
            .map(|p| p.id)
            .collect();
        let active = next.active_players();

        let outcome = match next_actor(&next.seating, &folded, actor) {
            None => {
                let result = next.finish_round(active, LAST_PLAYER_STANDING.to_string(), Vec::new());
                ActionOutcome::RoundEnded(result)
            }
            Some(_) if next.is_converged(&active) => {
                let hands = next.evaluate_showdown(&active);
                let winners = pick_winners(&hands);
                let reason = hands
                    .iter()
                    .find(|h| winners.first() == Some(&h.player_id))
                    .map(|h| h.hand_rank.to_string())
                    .unwrap_or_default();
                ActionOutcome::RoundEnded(next.finish_round(winners, reason, hands))
            }
            Some(next_id) => {
                next.current_actor = Some(next_id);
                ActionOutcome::NextActor(next_id)
            }
        };
        Ok((next, outcome))
    }

    /// 结算：未弃牌的赢家加上当前信心值，未弃牌的输家减去当前信心值，
    /// 弃牌玩家不变。平局时每个赢家都拿到完整的信心值，不平分。
    pub fn settle(&self, winner_ids: &[PlayerId]) -> Session {
        let mut next = self.clone();
        next.apply_settlement(winner_ids);
        next
    }

    fn apply_settlement(&mut self, winner_ids: &[PlayerId]) {
        let stake = i32::from(self.current_confidence);
        for player_id in &self.seating {
            let Some(player) = self.players.get_mut(player_id) else { continue };
            if player.folded {
                continue;
            }
            if winner_ids.contains(player_id) {
                player.total_confidence += stake;
            } else {
                player.total_confidence -= stake;
            }
        }

        if self.is_ended() {
            return;
        }
        // 多人同时达到阈值时取座位靠前的一位
        let game_winner = self
            .seating
            .iter()
            .find(|id| self.players.get(id).is_some_and(|p| p.total_confidence >= WIN_THRESHOLD))
            .copied();
        if let Some(winner) = game_winner {
            self.status = SessionStatus::Ended;
            self.game_winner_id = Some(winner);
        }
    }

    /// 信心值已统一，且动作日志长度不少于未弃牌人数
    ///
    /// 这只是“每个人都行动过”的近似：反复加注/跟注会让日志增长得比人数快。
    fn is_converged(&self, active: &[PlayerId]) -> bool {
        let matched = active
            .iter()
            .all(|id| self.players.get(id).is_some_and(|p| p.round_confidence == self.current_confidence));
        matched && self.action_log.len() >= active.len()
    }

    /// 为每个未弃牌玩家从 2 张底牌 + 5 张公共牌中找出最佳牌型
    fn evaluate_showdown(&self, active: &[PlayerId]) -> Vec<ShowdownHand> {
        active
            .iter()
            .filter_map(|id| {
                let player = self.players.get(id)?;
                let all_cards: Vec<Card> = player.hole_cards.iter().chain(&self.shared_cards).copied().collect();
                let hand_rank = find_best_hand(&all_cards)?;
                Some(ShowdownHand { player_id: *id, hand_rank, hole_cards: player.hole_cards.clone() })
            })
            .collect()
    }

    fn finish_round(&mut self, winner_ids: Vec<PlayerId>, reason: String, showdown: Vec<ShowdownHand>) -> RoundResult {
        self.round_active = false;
        self.current_actor = None;
        self.apply_settlement(&winner_ids);
        self.winner_ids = winner_ids.clone();
        self.win_reason = Some(reason.clone());

        debug!(session = %self.id, winners = ?winner_ids, %reason, ended = self.is_ended(), "round finished");
        RoundResult {
            winner_ids,
            reason,
            showdown,
            stake: self.current_confidence,
            game_winner_id: self.game_winner_id,
        }
    }
}

// --- 单元测试 ---
