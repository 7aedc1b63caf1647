//! Parsing of terminal input lines into chat commands.

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish the line as a chat message.
    SendMessage(String),
    /// Leave the chat.
    Quit,
    /// Refresh the peer list.
    Sync,
    /// Switch to another room.
    ChangeRoom(String),
    /// Change the display name.
    ChangeUser(String),
    /// A `/` line that is not a known command.
    Invalid(String),
}

/// Parse one input line. Empty lines yield `None`.
///
/// Lines not starting with `/` are messages and are kept verbatim.
pub fn parse(line: &str) -> Option<Command> {
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::SendMessage(line.to_string()));
    }

    let (token, arg) = match line.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim()),
        None => (line, ""),
    };

    let command = match (token, arg) {
        ("/quit", _) => Command::Quit,
        ("/sync", _) => Command::Sync,
        ("/room", name) if !name.is_empty() => Command::ChangeRoom(name.to_string()),
        ("/user", name) if !name.is_empty() => Command::ChangeUser(name.to_string()),
        _ => Command::Invalid(line.to_string()),
    };
    Some(command)
}

/// One-line summary of the available commands.
pub const HELP: &str = "/quit | /room <name> | /user <name> | /sync";
