use std::sync::Arc;

use parley_client::{
    ChatSession, ClientConfig, HttpApi, NotificationSink, ReconnectPolicy, SessionChannel,
    SessionContext, SessionUpdate, Severity, Toast, WebSocketConnector,
};
use parley_types::{Message, Room, RoomId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Toasts go straight to the terminal.
struct TerminalSink;

impl NotificationSink for TerminalSink {
    fn show(&self, toast: &Toast) {
        let marker = match toast.severity {
            Severity::Info => '*',
            Severity::Error => '!',
        };
        match &toast.description {
            Some(description) => println!("{} {}: {}", marker, toast.title, description),
            None => println!("{} {}", marker, toast.title),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug".into()),
        )
        .init();

    // Config
    let config = ClientConfig::from_env()?;
    let session = SessionContext::load(&config.session_file)?;

    // Channel + REST client
    let connector = WebSocketConnector::new(config.gateway_url.clone(), session.clone());
    let channel =
        SessionChannel::connect_with(&session, connector, ReconnectPolicy::default()).await?;
    let api = Arc::new(HttpApi::new(config.api_url.clone(), session.clone()));

    let mut chat = ChatSession::new(&session, api, &config, Arc::new(TerminalSink));
    chat.attach_channel(channel);

    info!("Signed in as {}; /rooms, /join <id>, /switch <id>, /leave, /whoami, /quit", session.user.username);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&mut chat, line.trim()).await {
                    break;
                }
            }
            update = chat.next_update() => render(&chat, update),
        }
    }

    chat.close();
    info!("Bye");
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(chat: &mut ChatSession, line: &str) -> bool {
    let (command, arg) = match line.split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" => return false,
        "/rooms" => match chat.rooms().await {
            Ok(rooms) => {
                for room in rooms {
                    println!("  {}  {}  {}", room.id, room.name, room.description);
                }
            }
            Err(e) => warn!("Could not list groups: {}", e),
        },
        "/join" if !arg.is_empty() => {
            let room = find_room(chat, arg).await;
            // refusals are shown by the sink
            let _ = chat.join(room).await;
        }
        "/switch" if !arg.is_empty() => {
            let room = find_room(chat, arg).await;
            chat.select(Some(room));
        }
        "/leave" => {
            let _ = chat.leave().await;
        }
        "/whoami" => match chat.profile().await {
            Ok(profile) => println!(
                "{} ({}){}",
                profile.user.username,
                profile.user.id,
                if profile.is_admin { " [admin]" } else { "" }
            ),
            Err(e) => warn!("Could not load profile: {}", e),
        },
        _ if line.starts_with('/') => println!("unknown command: {}", line),
        _ if line.is_empty() => {}
        _ => {
            chat.input(line);
            if let Err(e) = chat.send(line) {
                println!("! {}", e);
            }
        }
    }
    true
}

/// Resolve a group id to its listing, falling back to a bare room.
async fn find_room(chat: &ChatSession, id: &str) -> Room {
    let rooms = chat.rooms().await.unwrap_or_default();
    rooms
        .into_iter()
        .find(|room| room.id.as_str() == id)
        .unwrap_or_else(|| Room {
            id: RoomId::from(id),
            name: id.to_owned(),
            description: String::new(),
        })
}

fn render(chat: &ChatSession, update: SessionUpdate) {
    match update {
        SessionUpdate::HistoryLoaded { room_id, count } => {
            println!("-- {} ({} messages) --", room_id, count);
            for message in chat.messages() {
                print_message(message);
            }
        }
        SessionUpdate::MessageAppended(message) => print_message(&message),
        SessionUpdate::PresenceChanged => {
            let names: Vec<_> = chat
                .present_users()
                .iter()
                .map(|user| user.username.as_str())
                .collect();
            println!("online: {}", names.join(", "));
        }
        SessionUpdate::TypingChanged => {
            let others: Vec<_> = chat
                .typing_users()
                .into_iter()
                .filter(|name| name != &chat.user().username)
                .collect();
            if !others.is_empty() {
                println!("{} typing...", others.join(", "));
            }
        }
        SessionUpdate::ChannelDown => println!("! connection lost, reconnecting..."),
        SessionUpdate::ChannelUp => println!("* reconnected"),
        SessionUpdate::ChannelClosed => println!("! disconnected; restart to reconnect"),
        // shown by the sink
        SessionUpdate::Notification(_) | SessionUpdate::Failed(_) => {}
    }
}

fn print_message(message: &Message) {
    println!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M"),
        message.sender.username,
        message.content
    );
}
