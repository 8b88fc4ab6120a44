//! Dialogue client - terminal front-end for a turn-based dialogue engine
//!
//! Each stdin line is one user submission. Conversation updates are printed
//! to stdout; structured logs go to stderr.

mod config;
mod conversation;
mod engine;
mod enrich;
mod runtime;
mod state_machine;

use config::ClientConfig;
use conversation::Sender;
use engine::{HttpEntityLookup, HttpTurnClient};
use runtime::{spawn_chat, ChatUpdate, ChatView, StaticIdentity};
use state_machine::{FailureKind, SessionContext, SessionId, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dialogue_client=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env()?;

    let turn_client = HttpTurnClient::new(&config.engine_url, config.request_timeout)?;
    let lookup = HttpEntityLookup::new(&config.entity_url, config.request_timeout)?
        .with_token(config.token.clone());

    let Some(identity) = config.identity() else {
        return Err("No user configured. Set DIALOGUE_USER_ID to start a session.".into());
    };

    let session_id = SessionId::generate();
    tracing::info!(
        session_id = %session_id,
        engine = %config.engine_url,
        entities = %config.entity_url,
        "Dialogue client starting"
    );

    let context = SessionContext::new(session_id, config.script);
    let (mut handle, mut updates) = spawn_chat(
        context,
        turn_client,
        lookup,
        StaticIdentity::new(Some(identity)),
    );
    let mut view = handle.view();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut submitted: u64 = 0;

    loop {
        // Input is only read once the engine has a session to talk to
        let accepting = stdin_open && view.borrow().state.is_active();

        tokio::select! {
            line = lines.next_line(), if accepting => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        handle.set_draft(line);
                        handle.submit().await?;
                        submitted += 1;
                    }
                    None => stdin_open = false,
                }
            }
            update = updates.recv() => match update {
                Ok(update) => {
                    if !render(update) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Renderer lagged behind updates");
                }
                Err(RecvError::Closed) => break,
            },
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let (failed, idle) = {
            let current = view.borrow();
            (bootstrap_failed(&current), settled(&current, submitted))
        };
        if failed {
            drain(&mut updates);
            return Err("Failed to start a session with the dialogue engine".into());
        }
        // After EOF, stay until every submitted turn has been answered
        if !stdin_open && idle {
            drain(&mut updates);
            break;
        }
    }

    Ok(())
}

/// Every submitted line has been taken up and nothing is in flight
fn settled(view: &ChatView, submitted: u64) -> bool {
    match &view.state {
        SessionState::Active { latest_turn, .. } => {
            *latest_turn >= submitted && view.pending_calls == 0
        }
        _ => true,
    }
}

fn bootstrap_failed(view: &ChatView) -> bool {
    view.state == SessionState::Uninitialized && view.last_failure == Some(FailureKind::Bootstrap)
}

/// Render updates already queued, stopping at the end of the chat
fn drain(updates: &mut broadcast::Receiver<ChatUpdate>) {
    loop {
        match updates.try_recv() {
            Ok(update) => {
                if !render(update) {
                    return;
                }
            }
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Renderer lagged behind updates");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

/// Print one update. Returns false once the chat has ended.
fn render(update: ChatUpdate) -> bool {
    match update {
        ChatUpdate::Message(message) => match message.sender {
            Sender::User => println!("> {}", message.text),
            Sender::Bot => println!("{}", message.text),
        },
        ChatUpdate::SessionStarted { session_id } => {
            tracing::info!(session_id = %session_id, "Session started");
        }
        ChatUpdate::TopicChanged {
            topic,
            title,
            background,
        } => {
            println!("== {title} ==");
            tracing::info!(topic = %topic, background = %background, "Topic changed");
        }
        ChatUpdate::Entities(entities) => {
            for entity in &entities {
                println!("  * {}", entity.label());
            }
        }
        ChatUpdate::InputClosed { farewell } => {
            println!("{farewell}");
            return false;
        }
    }
    true
}
