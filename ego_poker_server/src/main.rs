mod room;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ego_poker_core::{ClientMessage, GameCode, GameError, MemoryStore, PlayerId, ServerMessage, Session, SessionStore, StoreError};

use crate::room::RoomHandle;

/// 信心扑克服务器
#[derive(Parser, Debug)]
#[command(version, about)]
struct Config {
    /// 监听地址
    #[arg(long, env = "EGO_POKER_ADDR", default_value = "0.0.0.0:25917")]
    addr: SocketAddr,

    /// 每个连接、每个房间的消息队列长度
    #[arg(long, env = "EGO_POKER_QUEUE_DEPTH", default_value_t = 32)]
    queue_depth: usize,
}

// 服务器全局状态
struct AppState {
    rooms: DashMap<GameCode, RoomHandle>,
    store: Arc<MemoryStore>,
    queue_depth: usize,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    let state = SharedState::new(AppState {
        rooms: DashMap::new(),
        store: Arc::new(MemoryStore::new()),
        queue_depth: config.queue_depth,
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    info!("服务器正在监听 {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 房间任务通过这个通道把消息交给本连接
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.queue_depth);

    // 专门负责将通道中的消息写入 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开
                break;
            }
        }
    });

    // 当前连接所在的房间和玩家身份，加入成功后填充
    let mut player_context: Option<(GameCode, PlayerId)> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, &state, &tx, &mut player_context).await;
                }
                Err(e) => {
                    tracing::warn!("解析消息失败: {}", e);
                    let _ = tx.send(ServerMessage::Error { message: format!("无法解析的消息: {e}") }).await;
                }
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some((code, player_id)) = player_context {
        handle_disconnect(&state, code, player_id).await;
    }
    info!("客户端连接关闭");
}

/// 房间管理消息在这里处理，其余消息转交给所在房间的任务
async fn handle_client_message(
    msg: ClientMessage,
    state: &SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<(GameCode, PlayerId)>,
) {
    match msg {
        ClientMessage::CreateGame { .. } | ClientMessage::JoinGame { .. } if context.is_some() => {
            let _ = tx.send(ServerMessage::Error { message: "你已经在一个房间里了".to_string() }).await;
        }
        ClientMessage::CreateGame { name } => {
            let player_id = Uuid::new_v4();
            let code = match create_session(&*state.store, player_id, name.clone()) {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!("创建房间失败: {}", e);
                    let _ = tx.send(ServerMessage::Error { message: format!("创建房间失败: {e}") }).await;
                    return;
                }
            };
            let room = room::spawn(code.clone(), state.store.clone(), state.queue_depth);
            state.rooms.insert(code.clone(), room.clone());
            info!("玩家 {} 创建了新房间 {}", player_id, code);

            match room.connect(player_id, name, tx.clone()).await {
                Ok(()) => *context = Some((code, player_id)),
                Err(e) => {
                    let _ = tx.send(ServerMessage::Error { message: e.to_string() }).await;
                }
            }
        }
        ClientMessage::JoinGame { code, name } => {
            let Some(room) = find_room(state, &code) else {
                let _ = tx.send(ServerMessage::Error { message: GameError::SessionNotFound(code).to_string() }).await;
                return;
            };

            let player_id = Uuid::new_v4();
            match room.connect(player_id, name, tx.clone()).await {
                Ok(()) => *context = Some((code, player_id)),
                Err(e) => {
                    let _ = tx.send(ServerMessage::Error { message: e.to_string() }).await;
                }
            }
        }
        other => {
            let Some((code, player_id)) = context.clone() else {
                let _ = tx.send(ServerMessage::Error { message: "请先加入或创建房间".to_string() }).await;
                return;
            };
            let Some(room) = find_room(state, &code) else {
                let _ = tx.send(ServerMessage::Error { message: GameError::SessionNotFound(code).to_string() }).await;
                return;
            };
            if let Err(e) = room.submit(player_id, other).await {
                let _ = tx.send(ServerMessage::Error { message: e.to_string() }).await;
            }
        }
    }
}

// 返回句柄的克隆，调用方不持有 DashMap 的读锁
fn find_room(state: &SharedState, code: &GameCode) -> Option<RoomHandle> {
    state.rooms.get(code).map(|r| r.clone())
}

/// 生成一个未被占用的房间码并写入存储；房间码冲突时换一个重试
fn create_session(store: &dyn SessionStore, host_id: PlayerId, name: String) -> Result<GameCode, StoreError> {
    loop {
        let code = GameCode::random(&mut rand::rng());
        match store.create(Session::new(code.clone(), host_id, name.clone())) {
            Ok(_) => return Ok(code),
            Err(StoreError::AlreadyExists(_)) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// 玩家断开连接后的处理
///
/// 会话由房间任务自己删除，这里只移除已经关闭的房间句柄。
/// 房间码可能已经分配给了新房间，新房间的句柄不会被移除。
async fn handle_disconnect(state: &SharedState, code: GameCode, player_id: PlayerId) {
    info!("玩家 {} 从房间 {} 断开连接", player_id, code);
    let Some(room) = find_room(state, &code) else { return };

    if room.disconnect(player_id).await == 0 && state.rooms.remove_if(&code, |_, r| r.is_closed()).is_some() {
        info!("房间 {} 已空，已被移除", code);
    }
}
