//! Rendering of session messages as terminal text

use std::fmt::Write as _;

use costchat_core::{
    Account, ConductorState, Conversation, ConversationSummary, Message, NotifyLevel, Role,
    SessionMessage,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Turns [`SessionMessage`]s into text
#[derive(Debug, Default)]
pub struct Renderer {
    /// Tokens of the running turn were already printed
    streamed: bool,
    /// Last conversation id announced
    saved_id: Option<String>,
}

impl Renderer {
    /// Create a renderer
    pub fn new() -> Self {
        Self::default()
    }

    /// Text for one message, `None` if it has no visible effect
    pub fn render(&mut self, msg: SessionMessage) -> Option<String> {
        match msg {
            SessionMessage::State { state } => {
                if state == ConductorState::Sending {
                    self.streamed = false;
                }
                None
            }
            SessionMessage::MessageAppended { message, .. } => {
                (message.is_error).then(|| format!("\n! {}\n", message.content))
            }
            SessionMessage::MessageCommitted { message, .. } => {
                let mut out = if self.streamed {
                    "\n".to_string()
                } else {
                    format!("{}\n", message.content)
                };
                self.streamed = false;
                out.push_str(&footer(&message));
                Some(out)
            }
            SessionMessage::Status { message, tool_name } => Some(match tool_name {
                Some(tool) => format!("  · {message} ({tool})\n"),
                None => format!("  · {message}\n"),
            }),
            SessionMessage::Token { text } => {
                self.streamed = true;
                Some(text)
            }
            SessionMessage::TurnFailed { .. }
            | SessionMessage::Ready { .. }
            | SessionMessage::Quit => None,
            SessionMessage::Notify { level, message } => Some(format!("[{}] {message}\n", label(level))),
            SessionMessage::AccountsLoaded { accounts, active } => {
                Some(account_list(&accounts, active.as_deref()))
            }
            SessionMessage::AccountActivated { account_id } => {
                Some(format!("Active account: {account_id}\n"))
            }
            SessionMessage::ModelChanged { model } => Some(format!("Model: {model}\n")),
            SessionMessage::ConversationSaved {
                conversation_id,
                share_token,
            } => {
                if self.saved_id.as_deref() == Some(conversation_id.as_str()) {
                    return None;
                }
                let line = match share_token {
                    Some(token) => format!("Saved as {conversation_id} (share token {token})\n"),
                    None => format!("Saved as {conversation_id}\n"),
                };
                self.saved_id = Some(conversation_id);
                Some(line)
            }
            SessionMessage::ConversationLoaded { conversation } => {
                self.saved_id = Some(conversation.id.clone());
                Some(transcript(&conversation, "Loaded"))
            }
            SessionMessage::ConversationCleared => {
                self.saved_id = None;
                self.streamed = false;
                Some("-- new conversation --\n".to_string())
            }
            SessionMessage::ConversationIndex {
                search,
                conversations,
                ..
            } => Some(index(search.as_deref(), &conversations)),
            SessionMessage::SharedConversation { conversation } => {
                Some(transcript(&conversation, "Shared (read-only)"))
            }
        }
    }
}

/// Print session messages and local text until the session channel closes
///
/// `local` carries text produced by the client itself (help, input errors),
/// so it is ordered with streamed output on the one writer.
pub async fn run(mut rx: mpsc::Receiver<SessionMessage>, mut local: mpsc::Receiver<String>) {
    let mut renderer = Renderer::new();
    let mut stdout = tokio::io::stdout();
    let mut local_open = true;

    loop {
        let text = tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => renderer.render(msg),
                None => break,
            },
            line = local.recv(), if local_open => {
                local_open = line.is_some();
                line
            }
        };
        let Some(text) = text else {
            continue;
        };
        if let Err(e) = stdout.write_all(text.as_bytes()).await {
            tracing::warn!(error = %e, "Failed to write to stdout");
            break;
        }
        let _ = stdout.flush().await;
    }
}

fn label(level: NotifyLevel) -> &'static str {
    match level {
        NotifyLevel::Info => "info",
        NotifyLevel::Success => "ok",
        NotifyLevel::Warning => "warn",
        NotifyLevel::Error => "error",
    }
}

/// Tools, usage, and timing under an answer
fn footer(message: &Message) -> String {
    let mut out = String::new();
    if let Some(calls) = &message.tool_calls {
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        let _ = writeln!(out, "  tools: {}", names.join(", "));
    }

    let mut parts = Vec::new();
    if let Some(model) = &message.model {
        parts.push(model.clone());
    }
    if let Some(usage) = &message.usage {
        parts.push(format!(
            "{} in / {} out tokens",
            usage.input_tokens, usage.output_tokens
        ));
        if usage.estimated_cost_usd > 0.0 {
            parts.push(format!("${:.4}", usage.estimated_cost_usd));
        }
    }
    if let Some(total) = message.total_time {
        parts.push(format!("{total:.1}s"));
    }
    if !parts.is_empty() {
        let _ = writeln!(out, "  ({})", parts.join(" · "));
    }
    out
}

fn account_list(accounts: &[Account], active: Option<&str>) -> String {
    if accounts.is_empty() {
        return "No accounts\n".to_string();
    }
    let mut out = String::from("Accounts:\n");
    for account in accounts {
        let marker = if Some(account.account_id.as_str()) == active {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(out, " {marker} {}  {}", account.account_id, account.name);
    }
    out
}

fn index(search: Option<&str>, conversations: &[ConversationSummary]) -> String {
    if conversations.is_empty() {
        return match search {
            Some(term) => format!("No conversations matching \"{term}\"\n"),
            None => "No saved conversations\n".to_string(),
        };
    }
    let mut out = String::new();
    for c in conversations {
        let updated = c
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {}  {:<50}  {:>3} msgs  {updated}",
            c.id, c.name, c.message_count
        );
    }
    out
}

fn transcript(conversation: &Conversation, title: &str) -> String {
    let mut out = format!("-- {title}: {} --\n", conversation.name);
    if let Some(note) = conversation.user_note.as_deref().filter(|n| !n.is_empty()) {
        let _ = writeln!(out, "note: {note}");
    }
    for message in &conversation.messages {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant if message.is_error => "error",
            Role::Assistant => "assistant",
        };
        let _ = writeln!(out, "{who}> {}", message.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use costchat_core::UsageStats;
    use std::time::Duration;

    #[tokio::test]
    async fn test_printer_ends_when_session_closes() {
        let (tx, rx) = mpsc::channel(4);
        let (local_tx, local_rx) = mpsc::channel(4);
        local_tx.send("help\n".to_string()).await.unwrap();
        tx.send(SessionMessage::ConversationCleared).await.unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), run(rx, local_rx))
            .await
            .unwrap();
        drop(local_tx);
    }

    #[test]
    fn test_streamed_answer_is_not_repeated() {
        let mut renderer = Renderer::new();
        renderer.render(SessionMessage::State {
            state: ConductorState::Sending,
        });
        assert_eq!(
            renderer.render(SessionMessage::Token {
                text: "Hello".to_string()
            }),
            Some("Hello".to_string())
        );

        let out = renderer
            .render(SessionMessage::MessageCommitted {
                index: 1,
                message: Message::assistant("Hello"),
            })
            .unwrap();
        assert_eq!(out, "\n");
    }

    #[test]
    fn test_unstreamed_answer_is_printed_with_footer() {
        let mut renderer = Renderer::new();
        let mut message = Message::assistant("EC2 cost $12.");
        message.model = Some("m1".to_string());
        message.usage = Some(UsageStats {
            input_tokens: 10,
            output_tokens: 5,
            ..UsageStats::default()
        });

        let out = renderer
            .render(SessionMessage::MessageCommitted { index: 1, message })
            .unwrap();
        assert!(out.starts_with("EC2 cost $12.\n"));
        assert!(out.contains("m1 · 10 in / 5 out tokens"));
    }

    #[test]
    fn test_save_announced_once_per_conversation() {
        let mut renderer = Renderer::new();
        let saved = || SessionMessage::ConversationSaved {
            conversation_id: "conv-1".to_string(),
            share_token: None,
        };
        assert!(renderer.render(saved()).is_some());
        assert!(renderer.render(saved()).is_none());

        renderer.render(SessionMessage::ConversationCleared);
        assert!(renderer.render(saved()).is_some());
    }

    #[test]
    fn test_account_list_marks_active() {
        let out = account_list(
            &[Account::new("acc-1", "Prod"), Account::new("acc-7", "Dev")],
            Some("acc-7"),
        );
        assert!(out.contains("   acc-1  Prod"));
        assert!(out.contains(" * acc-7  Dev"));
    }
}
