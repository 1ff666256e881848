//! Terminal UI for the CLI client.

use std::{io::Write, sync::Arc};

use rustyline::{DefaultEditor, error::ReadlineError};
use tandem_shared::protocol::{ChatContent, ErrorCode, PeerRef};
use tokio::sync::mpsc;

use crate::{
    auth_api::{AuthApi, is_locked_out},
    config::{ClientConfig, ReconnectPolicy},
    error::ClientError,
    formatter::MessageFormatter,
    handler::CollabEventHandler,
    orchestrator::CollabClient,
    presence::PeerPresence,
};

/// Redisplay the prompt after receiving a message
pub fn redisplay_prompt(name: &str) {
    print!("{}> ", name);
    std::io::stdout().flush().ok();
}

/// Prints remote events between prompts
pub struct ConsoleHandler {
    name: String,
}

impl ConsoleHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn show(&self, text: String) {
        print!("{}", text);
        redisplay_prompt(&self.name);
    }
}

impl CollabEventHandler for ConsoleHandler {
    fn on_disconnect(&self, error: Option<&ClientError>, will_reconnect: bool) {
        if let (Some(error), true) = (error, will_reconnect) {
            self.show(MessageFormatter::format_reconnecting(&error.to_string()));
        }
    }

    fn on_user_joined(&self, user: &PeerPresence) {
        self.show(MessageFormatter::format_user_joined(user.label()));
    }

    fn on_user_left(&self, user: &PeerRef) {
        let name = user
            .display_name
            .as_deref()
            .unwrap_or_else(|| user.presence_key());
        self.show(MessageFormatter::format_user_left(name));
    }

    fn on_chat(&self, from: &PeerRef, message: &ChatContent) {
        let name = from
            .display_name
            .as_deref()
            .unwrap_or_else(|| from.presence_key());
        self.show(MessageFormatter::format_chat_message(
            name,
            &message.content,
            message.timestamp,
        ));
    }

    fn on_error(&self, code: ErrorCode, message: &str, _current_version: Option<u64>) {
        self.show(MessageFormatter::format_error(code, message));
    }
}

/// Read lines on a blocking thread and forward the non-empty ones.
///
/// The channel closes on Ctrl+C, Ctrl+D, or a readline error.
pub fn spawn_line_reader(prompt_name: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", prompt_name);

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            // Channel closed, exit thread
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}

/// Options for [`run_chat_client`]
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Server root for the HTTP API
    pub api_url: String,
    /// Gateway WebSocket URL
    pub url: String,
    pub email: String,
    pub password: String,
    /// Register the account first; an existing account is not an error
    pub register: Option<String>,
    pub room_id: String,
    pub reconnect: ReconnectPolicy,
}

/// Log in, join the room, and send every stdin line as a chat message
pub async fn run_chat_client(options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let api = AuthApi::new(&options.api_url);

    if let Some(display_name) = &options.register {
        match api
            .register(&options.email, &options.password, display_name)
            .await
        {
            Ok(user) => tracing::info!("Registered {} ({})", user.email, user.id),
            Err(ClientError::Api { status: 409, .. }) => {
                tracing::info!("{} is already registered", options.email)
            }
            Err(e) => return Err(Box::new(e)),
        }
    }

    let login = match api
        .login(&options.email, &options.password, Some("tandem-client"))
        .await
    {
        Ok(login) => login,
        Err(e) => {
            if let Some(retry_after_ms) = is_locked_out(&e) {
                tracing::error!(
                    "Account locked; try again in {} minute(s)",
                    retry_after_ms.div_ceil(60_000)
                );
            }
            return Err(Box::new(e));
        }
    };
    let name = login.user.display_name.clone();
    print!(
        "{}",
        MessageFormatter::format_room_joined(&options.room_id, &name)
    );

    let config = ClientConfig {
        reconnect: options.reconnect,
        ..ClientConfig::new(&options.url, &options.room_id).with_token(&login.token)
    };
    let client = CollabClient::new(config, Arc::new(ConsoleHandler::new(&name)));
    client.connect().await;

    let mut lines = spawn_line_reader(name.clone());
    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                let sent = client.send_chat_message(line, None, Vec::new()).await;
                print!("{}", MessageFormatter::format_sent_confirmation(sent.timestamp));
                redisplay_prompt(&name);
            }
            result = client.wait() => {
                // Terminal rejection or reconnect budget spent
                return result.map_err(|e| Box::new(e) as Box<dyn std::error::Error>);
            }
        }
    }

    client.disconnect().await?;
    if let Err(e) = api.logout(&login.token).await {
        tracing::debug!("Logout failed: {}", e);
    }
    Ok(())
}
