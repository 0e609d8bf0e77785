use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use ego_poker_core::{
    commit, Action, ActionOutcome, ClientMessage, GameCode, GameError, PlayerId, ServerMessage, Session,
    SessionStatus, SessionStore, MAX_CONFIDENCE,
};

// 发给房间任务的指令。同一个房间的所有指令按到达顺序逐个处理，
// 因此“读取 - 校验 - 应用 - 写入”在单个房间内是线性化的。
pub enum RoomCommand {
    Connect {
        player_id: PlayerId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Client {
        player_id: PlayerId,
        msg: ClientMessage,
    },
    /// 回复剩余的连接数
    Disconnect {
        player_id: PlayerId,
        reply: oneshot::Sender<usize>,
    },
}

/// 房间任务的句柄，可以廉价地克隆
#[derive(Clone)]
pub struct RoomHandle {
    code: GameCode,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn connect(
        &self,
        player_id: PlayerId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), GameError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Connect { player_id, name, sender, reply })
            .await
            .map_err(|_| GameError::SessionNotFound(self.code.clone()))?;
        rx.await.map_err(|_| GameError::SessionNotFound(self.code.clone()))?
    }

    pub async fn submit(&self, player_id: PlayerId, msg: ClientMessage) -> Result<(), GameError> {
        self.tx
            .send(RoomCommand::Client { player_id, msg })
            .await
            .map_err(|_| GameError::SessionNotFound(self.code.clone()))
    }

    /// 房间任务已关闭（会话已删除）
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 返回断开后房间内剩余的连接数
    pub async fn disconnect(&self, player_id: PlayerId) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(RoomCommand::Disconnect { player_id, reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// 为已经写入存储的会话启动房间任务
pub fn spawn(code: GameCode, store: Arc<dyn SessionStore>, queue_depth: usize) -> RoomHandle {
    let (tx, rx) = mpsc::channel(queue_depth);
    let room = Room {
        code: code.clone(),
        store,
        connections: HashMap::new(),
    };
    tokio::spawn(room.run(rx));
    RoomHandle { code, tx }
}

// 单个房间的状态。会话本身在存储中，这里只保存网络连接。
struct Room {
    code: GameCode,
    store: Arc<dyn SessionStore>,
    // 将 PlayerId 映射到该玩家 WebSocket 任务的发送通道
    connections: HashMap<PlayerId, mpsc::Sender<ServerMessage>>,
}

impl Room {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        info!(session = %self.code, "房间任务启动");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                RoomCommand::Connect { player_id, name, sender, reply } => {
                    let result = self.connect(player_id, name, sender).await;
                    let _ = reply.send(result);
                }
                RoomCommand::Client { player_id, msg } => {
                    if let Err(e) = self.handle_client(player_id, msg).await {
                        debug!(session = %self.code, player = %player_id, error = %e, "请求被拒绝");
                        self.send_to(player_id, ServerMessage::Error { message: e.to_string() }).await;
                    }
                }
                RoomCommand::Disconnect { player_id, reply } => {
                    self.disconnect(player_id).await;
                    let remaining = self.connections.len();
                    if remaining == 0 {
                        // 最后一个连接离开：删除会话并拒绝新的指令。
                        // 已在队列中的 Connect 会因会话不存在而失败。
                        self.store.remove(&self.code);
                        rx.close();
                        info!(session = %self.code, "房间已空，会话已删除");
                    }
                    let _ = reply.send(remaining);
                }
            }
        }
        info!(session = %self.code, "房间任务结束");
    }

    async fn connect(
        &mut self,
        player_id: PlayerId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), GameError> {
        let (session, newly_joined) = commit(&*self.store, &self.code, |s| {
            let newly_joined = !s.players.contains_key(&player_id);
            Ok((s.join(player_id, name.clone())?, newly_joined))
        })?;

        self.connections.insert(player_id, sender.clone());
        let _ = sender
            .send(ServerMessage::GameJoined { your_id: player_id, session: session.for_client(&player_id) })
            .await;

        if newly_joined {
            if let Some(player) = session.players.get(&player_id) {
                info!(session = %self.code, player = %player_id, "玩家加入房间");
                let msg = ServerMessage::PlayerJoined { player: player.clone() };
                self.broadcast(&msg, Some(player_id)).await;
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self, player_id: PlayerId) {
        self.connections.remove(&player_id);
        info!(session = %self.code, player = %player_id, remaining = self.connections.len(), "玩家断开连接");
        let Some((session, _)) = self.store.read(&self.code) else { return };
        let name = session.players.get(&player_id).map_or("未知玩家", |p| p.name.as_str());
        let mut message = format!("{name} 断开了连接");
        if session.round_active && session.current_actor == Some(player_id) {
            // 没有超时机制，本局会停在该玩家
            warn!(session = %self.code, player = %player_id, "当前行动者已断开");
            message.push_str("，本局等待其重新连接");
        }
        self.broadcast(&ServerMessage::Info { message }, None).await;
    }

    async fn handle_client(&mut self, player_id: PlayerId, msg: ClientMessage) -> Result<(), GameError> {
        match msg {
            ClientMessage::StartGame => self.start_game(player_id).await,
            ClientMessage::PerformAction(action) => self.perform_action(player_id, action).await,
            ClientMessage::Ready => self.ready(player_id).await,
            ClientMessage::SendChat(message) => self.chat(player_id, message).await,
            ClientMessage::EndGame => self.end_game(player_id).await,
            ClientMessage::CreateGame { .. } | ClientMessage::JoinGame { .. } => {
                self.send_to(player_id, ServerMessage::Error { message: "你已经在一个房间里了".to_string() })
                    .await;
                Ok(())
            }
        }
    }

    async fn start_game(&mut self, player_id: PlayerId) -> Result<(), GameError> {
        let (session, ()) = commit(&*self.store, &self.code, |s| {
            if s.host_id != player_id {
                return Err(GameError::NotHost);
            }
            Ok((s.start_round(&mut rand::rng())?, ()))
        })?;
        self.announce_round(&session).await;
        Ok(())
    }

    async fn perform_action(&mut self, player_id: PlayerId, action: Action) -> Result<(), GameError> {
        let now = Utc::now().timestamp_millis();
        let (session, outcome) = commit(&*self.store, &self.code, |s| s.apply_action(player_id, action, now))?;

        if let Some(entry) = session.action_log.last() {
            let msg = ServerMessage::PlayerActed {
                entry: entry.clone(),
                current_confidence: session.current_confidence,
            };
            self.broadcast(&msg, None).await;
        }

        match outcome {
            ActionOutcome::NextActor(next_id) => {
                let msg = ServerMessage::NextToAct { player_id: next_id, min_raise: min_raise(&session) };
                self.broadcast(&msg, None).await;
            }
            ActionOutcome::RoundEnded(result) => {
                info!(session = %self.code, winners = ?result.winner_ids, reason = %result.reason, "本局结束");
                let game_winner = result.game_winner_id;
                self.broadcast(&ServerMessage::RoundEnded(result), None).await;
                if session.is_ended() {
                    info!(session = %self.code, winner = ?game_winner, "游戏结束");
                    self.broadcast(&ServerMessage::GameEnded { winner_id: game_winner }, None).await;
                }
            }
        }
        self.broadcast_snapshot(&session).await;
        Ok(())
    }

    /// 所有人都准备好后自动开始下一局
    async fn ready(&mut self, player_id: PlayerId) -> Result<(), GameError> {
        let (session, ()) = commit(&*self.store, &self.code, |s| Ok((s.mark_ready(player_id)?, ())))?;
        self.broadcast_snapshot(&session).await;

        if session.status == SessionStatus::InProgress && session.all_ready() {
            match commit(&*self.store, &self.code, |s| Ok((s.start_round(&mut rand::rng())?, ()))) {
                Ok((session, ())) => self.announce_round(&session).await,
                Err(e) => {
                    warn!(session = %self.code, error = %e, "无法开始下一局");
                    self.broadcast(&ServerMessage::Error { message: e.to_string() }, None).await;
                }
            }
        }
        Ok(())
    }

    async fn chat(&mut self, player_id: PlayerId, message: String) -> Result<(), GameError> {
        let (session, _) = self.store.read(&self.code).ok_or_else(|| GameError::SessionNotFound(self.code.clone()))?;
        let sender_name = session
            .players
            .get(&player_id)
            .map(|p| p.name.clone())
            .ok_or(GameError::UnknownPlayer(player_id))?;
        let msg = ServerMessage::Chat {
            sender_id: player_id,
            sender_name,
            message,
            timestamp: Utc::now().timestamp_millis(),
        };
        self.broadcast(&msg, None).await;
        Ok(())
    }

    async fn end_game(&mut self, player_id: PlayerId) -> Result<(), GameError> {
        let (session, ()) = commit(&*self.store, &self.code, |s| Ok((s.end_game(player_id)?, ())))?;
        info!(session = %self.code, "房主结束了游戏");
        self.broadcast(&ServerMessage::GameEnded { winner_id: session.game_winner_id }, None).await;
        self.broadcast_snapshot(&session).await;
        Ok(())
    }

    async fn announce_round(&self, session: &Session) {
        let Some(first_actor) = session.current_actor else { return };
        let msg = ServerMessage::RoundStarted { round_number: session.round_number - 1, first_actor };
        self.broadcast(&msg, None).await;
        // 快照需要为每个玩家单独生成
        self.broadcast_snapshot(session).await;
        let msg = ServerMessage::NextToAct { player_id: first_actor, min_raise: min_raise(session) };
        self.broadcast(&msg, None).await;
    }

    async fn send_to(&self, player_id: PlayerId, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(&player_id) {
            let _ = conn.send(msg).await;
        }
    }

    /// 向房间内所有玩家广播消息
    async fn broadcast(&self, message: &ServerMessage, exclude: Option<PlayerId>) {
        for (player_id, conn) in &self.connections {
            if Some(*player_id) == exclude {
                continue;
            }
            if conn.send(message.clone()).await.is_err() {
                // 发送失败，说明该玩家已断开，由其自己的连接任务清理
                warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
            }
        }
    }

    async fn broadcast_snapshot(&self, session: &Session) {
        for (player_id, conn) in &self.connections {
            let _ = conn.send(ServerMessage::SessionSnapshot(session.for_client(player_id))).await;
        }
    }
}

fn min_raise(session: &Session) -> Option<u8> {
    (session.current_confidence < MAX_CONFIDENCE).then(|| session.current_confidence + 1)
}
