//! Input line parsing
//!
//! A line starting with `/` is a command; anything else is a question.

use anyhow::{bail, Result};
use costchat_core::SessionEvent;

/// Help text for `/help`
pub const HELP: &str = "\
Commands:
  /accounts            reload the account list
  /switch <id>         activate an account (starts a new conversation)
  /new                 start a new conversation
  /load <id>           load a saved conversation
  /share <token>       view a shared conversation (read-only)
  /list [search]       list saved conversations
  /note <text>         set the note of the current conversation
  /model <name>        select the model for later questions
  /cancel              abort the running request
  /help                show this help
  /quit                exit
Anything else is sent as a question.";

/// What a line of input asks for
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    /// Forward to the conductor
    Event(SessionEvent),
    /// Print [`HELP`]
    Help,
    /// Blank line
    Empty,
}

/// Parse one line of user input
pub fn parse_line(line: &str) -> Result<Input> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Input::Event(SessionEvent::submit(line)));
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    let arg = |what: &str| -> Result<String> {
        if rest.is_empty() {
            bail!("/{name} needs {what}");
        }
        Ok(rest.to_string())
    };

    let event = match name {
        "accounts" => SessionEvent::RefreshAccounts,
        "switch" => SessionEvent::SwitchAccount {
            account_id: arg("an account id")?,
        },
        "new" => SessionEvent::NewConversation,
        "load" => SessionEvent::LoadConversation {
            conversation_id: arg("a conversation id")?,
        },
        "share" => SessionEvent::OpenShared {
            share_token: arg("a share token")?,
        },
        "list" => SessionEvent::ListConversations {
            search: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "note" => SessionEvent::UpdateNote {
            note: rest.to_string(),
        },
        "model" => SessionEvent::SetModel {
            model: arg("a model name")?,
        },
        "cancel" => SessionEvent::Cancel,
        "quit" | "exit" => SessionEvent::Quit,
        "help" => return Ok(Input::Help),
        other => bail!("Unknown command /{other} (try /help)"),
    };
    Ok(Input::Event(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_question() {
        assert_eq!(
            parse_line("  Top services last month?  ").unwrap(),
            Input::Event(SessionEvent::submit("Top services last month?"))
        );
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_line("   ").unwrap(), Input::Empty);
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(
            parse_line("/switch acc-7").unwrap(),
            Input::Event(SessionEvent::SwitchAccount {
                account_id: "acc-7".to_string()
            })
        );
        assert_eq!(
            parse_line("/list ec2 costs").unwrap(),
            Input::Event(SessionEvent::ListConversations {
                search: Some("ec2 costs".to_string())
            })
        );
        assert_eq!(
            parse_line("/list").unwrap(),
            Input::Event(SessionEvent::ListConversations { search: None })
        );
    }

    #[test]
    fn test_missing_argument_is_rejected() {
        let err = parse_line("/load").unwrap_err();
        assert!(err.to_string().contains("conversation id"));
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse_line("/frobnicate").is_err());
        assert_eq!(parse_line("/help").unwrap(), Input::Help);
    }
}
