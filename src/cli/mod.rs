pub mod commands;
pub mod render;

use chrono::Utc;
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::chat::{
    model::export_as_text, ChatApi, ChatController, ChatError, ClientError, FileStore,
    HttpChatClient, MemoryStore, SettingsPatch, StateStore, StoreError,
};
use crate::cli::commands::{Commands, SessionAction, SettingsAction};
use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Failed to open state directory: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("No session matches '{0}'")]
    UnknownSession(String),
    #[error("'{0}' matches more than one session")]
    AmbiguousSession(String),
}

pub type TerminalChat = ChatController<Arc<dyn StateStore>, HttpChatClient>;

pub fn open_controller(config: &AppConfig, ephemeral: bool) -> Result<TerminalChat, CliError> {
    let store: Arc<dyn StateStore> = if ephemeral {
        debug!("keeping chat state in memory for this run");
        Arc::new(MemoryStore::new())
    } else {
        let store = FileStore::open(&config.client.state_dir)?;
        info!(dir = %store.dir().display(), "using chat state directory");
        Arc::new(store)
    };
    let api = HttpChatClient::new(config.client.proxy_url.clone());
    Ok(ChatController::new(store, api))
}

/// Accepts a full session id or an unambiguous prefix of one.
pub fn resolve_session_id<S: StateStore, A: ChatApi>(
    chat: &ChatController<S, A>,
    needle: &str,
) -> Result<String, CliError> {
    if chat.session(needle).is_some() {
        return Ok(needle.to_string());
    }

    let mut matches = chat.sessions().iter().filter(|s| s.id.starts_with(needle));
    match (matches.next(), matches.next()) {
        (Some(session), None) => Ok(session.id.clone()),
        (Some(_), Some(_)) => Err(CliError::AmbiguousSession(needle.to_string())),
        _ => Err(CliError::UnknownSession(needle.to_string())),
    }
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;

    match command {
        Commands::Serve => {
            unreachable!("serve is handled by main before the CLI dispatch")
        }
        Commands::Probe => {
            let client = HttpChatClient::new(config.client.proxy_url.clone());
            let probe = client.probe().await?;
            println!("{} (model: {}, {})", probe.message, probe.model, probe.endpoint);
        }
        Commands::Session { action } => {
            let mut chat = open_controller(&config, false)?;
            run_session_action(&mut chat, action)?;
        }
        Commands::Settings { action } => {
            let mut chat = open_controller(&config, false)?;
            match action {
                SettingsAction::Show => print!("{}", render::settings(chat.settings())),
                SettingsAction::Set { system_prompt, model, temperature } => {
                    let patch = SettingsPatch { system_prompt, model, temperature };
                    if patch == SettingsPatch::default() {
                        println!("Nothing to change.");
                    } else {
                        chat.update_settings(patch);
                        print!("{}", render::settings(chat.settings()));
                    }
                }
            }
        }
        Commands::Chat { session, ephemeral } => {
            let mut chat = open_controller(&config, ephemeral)?;
            if let Some(needle) = session {
                let id = resolve_session_id(&chat, &needle)?;
                chat.switch_session(&id);
            }
            run_repl(&mut chat).await?;
        }
    }

    Ok(())
}

fn run_session_action<S: StateStore, A: ChatApi>(
    chat: &mut ChatController<S, A>,
    action: SessionAction,
) -> Result<(), CliError> {
    match action {
        SessionAction::New => {
            let session = chat.create_session();
            println!("Created Session: {} ({})", session.title, session.id);
        }
        SessionAction::List => {
            print!("{}", render::session_list(chat.sessions(), chat.current_session_id(), Utc::now()));
        }
        SessionAction::Switch { id } => {
            let id = resolve_session_id(chat, &id)?;
            chat.switch_session(&id);
            println!("Switched to session {}", id);
        }
        SessionAction::Delete { id } => {
            let id = resolve_session_id(chat, &id)?;
            chat.delete_session(&id);
            println!("Deleted session {}", id);
        }
        SessionAction::Rename { id, title } => {
            let id = resolve_session_id(chat, &id)?;
            chat.rename_session(&id, &title)?;
            println!("Renamed session {} to {}", id, title);
        }
        SessionAction::Export { id, path, dated } => {
            let id = resolve_session_id(chat, &id)?;
            let text = match chat.session(&id) {
                Some(session) if dated => export_as_text(session),
                Some(session) => session.transcript(),
                None => return Err(CliError::UnknownSession(id)),
            };
            match path {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    println!("Session exported successfully to: {}", path);
                }
                None => println!("{}", text),
            }
        }
    }
    Ok(())
}

enum Flow {
    Continue,
    Exit,
}

/// Ctrl-C is claimed for cancelling a pending reply once the first message
/// goes out, so quitting goes through `/exit` or end of input.
const REPL_BANNER: &str = "Type /help for commands. Ctrl-C cancels a pending reply; /exit or Ctrl-D quits.";

const REPL_HELP: &str = "\
/new               start a new session
/list              list sessions
/switch <id>       open another session
/delete <id>       delete a session
/export            print the current session as text
/system <prompt>   set the system prompt
/model <name>      set the model
/temperature <n>   set the sampling temperature
/settings          show settings
/clear             dismiss the last error
/exit              quit (Ctrl-D also works)";

fn handle_command<S: StateStore, A: ChatApi>(
    chat: &mut ChatController<S, A>,
    line: &str,
) -> Result<Flow, CliError> {
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    match name {
        "exit" | "quit" => return Ok(Flow::Exit),
        "help" => println!("{}", REPL_HELP),
        "new" => {
            let session = chat.create_session();
            println!("Started {}", session.id);
        }
        "list" => print!("{}", render::session_list(chat.sessions(), chat.current_session_id(), Utc::now())),
        "switch" => match resolve_session_id(chat, arg) {
            Ok(id) => {
                chat.switch_session(&id);
                if let Some(session) = chat.current_session() {
                    print!("{}", render::conversation(session, Utc::now()));
                }
            }
            Err(e) => eprintln!("{}", render::error_banner(&e.to_string())),
        },
        "delete" => match resolve_session_id(chat, arg) {
            Ok(id) => {
                chat.delete_session(&id);
                println!("Deleted {}", id);
            }
            Err(e) => eprintln!("{}", render::error_banner(&e.to_string())),
        },
        "export" => match chat.current_session_id().and_then(|id| chat.export_chat(id)) {
            Some(text) => println!("{}", text),
            None => println!("No current session."),
        },
        "system" if !arg.is_empty() => chat.update_settings(SettingsPatch {
            system_prompt: Some(arg.to_string()),
            ..Default::default()
        }),
        "model" if !arg.is_empty() => chat.update_settings(SettingsPatch {
            model: Some(arg.to_string()),
            ..Default::default()
        }),
        "temperature" => match arg.parse::<f64>() {
            Ok(t) => chat.update_settings(SettingsPatch {
                temperature: Some(t),
                ..Default::default()
            }),
            Err(_) => eprintln!("{}", render::error_banner("temperature must be a number")),
        },
        "settings" => print!("{}", render::settings(chat.settings())),
        "clear" => chat.clear_error(),
        other => println!("Unknown command /{} (try /help)", other),
    }
    Ok(Flow::Continue)
}

async fn run_repl<S: StateStore, A: ChatApi>(chat: &mut ChatController<S, A>) -> Result<(), CliError> {
    println!("--- chatrelay ---");
    println!("{}", REPL_BANNER);
    if let Some(session) = chat.current_session() {
        print!("{}", render::conversation(session, Utc::now()));
    }

    loop {
        print!("\nYou> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let text = input.trim();
        if text.is_empty() {
            continue;
        }

        if let Some(command) = text.strip_prefix('/') {
            match handle_command(chat, command)? {
                Flow::Exit => break,
                Flow::Continue => continue,
            }
        }

        let pending = match chat.begin_send(text) {
            Ok(pending) => pending,
            Err(e) => {
                eprintln!("{}", render::error_banner(&e.to_string()));
                continue;
            }
        };
        println!("{}", render::thinking());

        let outcome = tokio::select! {
            result = chat.api().send(&pending.messages, &pending.settings) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match outcome {
            Some(result) => match chat.complete_send(pending.token, result) {
                Ok(()) => {
                    let reply = chat
                        .session(&pending.session_id)
                        .and_then(|s| s.messages.last());
                    if let Some(reply) = reply {
                        print!("{}", render::message(reply, Utc::now()));
                    }
                }
                Err(e) => {
                    debug!(error = %e, "send did not complete");
                    if let Some(error) = chat.error() {
                        eprintln!("{}", render::error_banner(error));
                    }
                }
            },
            None => {
                chat.cancel_pending();
                info!("send cancelled from the terminal");
                println!("Cancelled.");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::model::{ChatSettings, Message};
    use async_trait::async_trait;

    struct NoApi;

    #[async_trait]
    impl ChatApi for NoApi {
        async fn send(&self, _: &[Message], _: &ChatSettings) -> Result<String, ClientError> {
            Err(ClientError::Transport("offline".into()))
        }
    }

    fn chat() -> ChatController<Arc<MemoryStore>, NoApi> {
        ChatController::new(Arc::new(MemoryStore::new()), NoApi)
    }

    #[test]
    fn test_resolve_session_by_prefix() {
        let mut chat = chat();
        let session = chat.create_session();
        assert_eq!(resolve_session_id(&chat, &session.id).unwrap(), session.id);
        assert_eq!(resolve_session_id(&chat, &session.id[..6]).unwrap(), session.id);
        assert!(matches!(
            resolve_session_id(&chat, "zzzz-not-an-id"),
            Err(CliError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_resolve_ambiguous_prefix() {
        let mut chat = chat();
        chat.create_session();
        chat.create_session();
        // Every id matches the empty prefix.
        assert!(matches!(
            resolve_session_id(&chat, ""),
            Err(CliError::AmbiguousSession(_))
        ));
    }

    #[test]
    fn test_repl_commands_update_settings() {
        let mut chat = chat();
        assert!(matches!(handle_command(&mut chat, "model gpt-x"), Ok(Flow::Continue)));
        assert!(matches!(handle_command(&mut chat, "temperature 0.25"), Ok(Flow::Continue)));
        assert!(matches!(handle_command(&mut chat, "system Be kind."), Ok(Flow::Continue)));
        assert_eq!(chat.settings().model, "gpt-x");
        assert_eq!(chat.settings().temperature, Some(0.25));
        assert_eq!(chat.settings().system_prompt, "Be kind.");
        assert!(matches!(handle_command(&mut chat, "exit"), Ok(Flow::Exit)));
    }

    #[test]
    fn test_repl_names_a_way_to_quit() {
        assert!(REPL_BANNER.contains("/exit"));
        assert!(REPL_BANNER.contains("Ctrl-D"));
        assert!(REPL_HELP.contains("/exit"));
    }

    #[test]
    fn test_open_controller_uses_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.client.state_dir = dir.path().join("state").display().to_string();

        let mut chat = open_controller(&config, false).unwrap();
        chat.create_session();
        assert!(dir.path().join("state").join("chat-sessions.json").exists());

        let ephemeral = open_controller(&config, true).unwrap();
        assert!(ephemeral.sessions().is_empty());
    }

    #[test]
    fn test_session_actions() {
        let mut chat = chat();
        run_session_action(&mut chat, SessionAction::New).unwrap();
        let id = chat.sessions()[0].id.clone();
        run_session_action(
            &mut chat,
            SessionAction::Rename { id: id[..8].to_string(), title: "Named".into() },
        )
        .unwrap();
        assert_eq!(chat.sessions()[0].title, "Named");

        run_session_action(&mut chat, SessionAction::Delete { id: id.clone() }).unwrap();
        assert!(chat.sessions().is_empty());
        assert!(matches!(
            run_session_action(&mut chat, SessionAction::Switch { id }),
            Err(CliError::UnknownSession(_))
        ));
    }
}
