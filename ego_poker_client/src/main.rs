use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use ego_poker_core::{Action, ClientMessage, GameCode, ServerMessage};

/// 信心扑克命令行客户端
#[derive(Parser, Debug)]
#[command(version, about)]
struct Config {
    /// 服务器的 WebSocket 地址
    #[arg(long, env = "EGO_POKER_URL", default_value = "ws://127.0.0.1:25917/ws")]
    url: Url,
}

/// 一行用户输入解析后的结果
#[derive(Debug, PartialEq)]
enum Command {
    Send(ClientMessage),
    Usage(&'static str),
    Exit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let cmd = match command {
        "create" => {
            let name = if rest.is_empty() { "新玩家" } else { rest };
            Command::Send(ClientMessage::CreateGame { name: name.to_string() })
        }
        "join" => match rest.split_once(char::is_whitespace) {
            Some((code, name)) => match code.parse::<GameCode>() {
                Ok(code) => Command::Send(ClientMessage::JoinGame { code, name: name.trim().to_string() }),
                Err(_) => Command::Usage("房间码应为 4 位字母或数字"),
            },
            None => Command::Usage("用法: join <房间码> <昵称>"),
        },
        "start" => Command::Send(ClientMessage::StartGame),
        "fold" => Command::Send(Action::Fold.into()),
        "call" => Command::Send(Action::Call.into()),
        "raise" => match rest.parse::<u8>() {
            Ok(value) => Command::Send(Action::Raise(value).into()),
            Err(_) => Command::Usage("用法: raise <信心值>"),
        },
        "ready" => Command::Send(ClientMessage::Ready),
        "chat" if !rest.is_empty() => Command::Send(ClientMessage::SendChat(rest.to_string())),
        "chat" => Command::Usage("用法: chat <消息>"),
        "end" => Command::Send(ClientMessage::EndGame),
        "exit" => Command::Exit,
        _ => return None,
    };
    Some(cmd)
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    println!("正在连接到: {}", config.url);
    let (ws_stream, _) = connect_async(config.url.as_str()).await?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 启动一个任务来处理从服务器接收的消息
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::Chat { sender_name, message, .. }) => {
                        println!("\n[{}]: {}", sender_name, message);
                        prompt();
                    }
                    Ok(ServerMessage::Error { message }) => {
                        println!("\n<-- [错误]: {}", message);
                        prompt();
                    }
                    Ok(server_msg) => {
                        println!("\n<-- [服务器消息]:\n{:#?}\n", server_msg);
                        prompt();
                    }
                    Err(e) => eprintln!("解析服务器消息失败: {}", e),
                },
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 信心扑克客户端 ---");
    println!("可用命令:");
    println!("  create <昵称>             - 创建一个新房间");
    println!("  join <房间码> <昵称>      - 加入一个房间");
    println!("  start                     - 开始游戏 (仅房主)");
    println!("  fold                      - 弃牌");
    println!("  call                      - 跟注");
    println!("  raise <信心值>            - 把共享信心值加到指定值");
    println!("  ready                     - 准备下一局");
    println!("  chat <消息>               - 发送聊天消息");
    println!("  end                       - 结束游戏 (仅房主)");
    println!("  exit                      - 退出");

    loop {
        prompt();

        let Some(line) = stdin.next_line().await? else { break };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(Command::Send(msg)) => {
                let payload = serde_json::to_string(&msg)?;
                write.send(Message::Text(payload.into())).await?;
            }
            Some(Command::Usage(hint)) => println!("{}", hint),
            Some(Command::Exit) => {
                println!("正在断开连接...");
                break;
            }
            None => println!("未知命令: {}", line),
        }
    }

    let _ = write.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(parse_command("fold"), Some(Command::Send(ClientMessage::PerformAction(Action::Fold))));
        assert_eq!(parse_command(" call "), Some(Command::Send(ClientMessage::PerformAction(Action::Call))));
        assert_eq!(parse_command("raise 7"), Some(Command::Send(ClientMessage::PerformAction(Action::Raise(7)))));
        assert!(matches!(parse_command("raise lots"), Some(Command::Usage(_))));
    }

    #[test]
    fn test_parse_join_normalizes_code() {
        let Some(Command::Send(ClientMessage::JoinGame { code, name })) = parse_command("join ab12 Alice Lee") else {
            panic!("join 解析失败");
        };
        assert_eq!(code.as_str(), "AB12");
        assert_eq!(name, "Alice Lee");
        assert!(matches!(parse_command("join ab12"), Some(Command::Usage(_))));
        assert!(matches!(parse_command("join toolong Bob"), Some(Command::Usage(_))));
    }

    #[test]
    fn test_parse_chat_keeps_whole_message() {
        assert_eq!(
            parse_command("chat all in, really"),
            Some(Command::Send(ClientMessage::SendChat("all in, really".into())))
        );
        assert!(matches!(parse_command("chat"), Some(Command::Usage(_))));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(parse_command("check"), None);
        assert_eq!(parse_command("exit"), Some(Command::Exit));
    }
}
