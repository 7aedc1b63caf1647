//! Terminal front end for a [`ChatRoom`].
//!
//! [`Ui::run`] is the only task touching the view or the current room. It
//! multiplexes input lines, inbound messages, log entries and peer refreshes
//! in a single `select!`.

use std::io::{self, Write};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use futures_util::{Stream, StreamExt};
use iroh::EndpointId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{self, Command, HELP};
use crate::message::{ChatLog, ChatMessage};
use crate::net::PubSub;
use crate::room::ChatRoom;

/// Prefix for entries produced by the UI itself.
pub const SYSTEM_PREFIX: &str = "system";
/// Prefix for failures caused by user input.
pub const ERROR_PREFIX: &str = "error";

/// Something that can display a chat session.
pub trait ChatView: Send {
    /// A message from another peer.
    fn show_message(&mut self, message: &ChatMessage);
    /// A message typed locally.
    fn show_own(&mut self, user: &str, text: &str);
    /// A diagnostic entry.
    fn show_log(&mut self, log: &ChatLog);
    /// The current peer list.
    fn show_peers(&mut self, peers: &[EndpointId]);
    /// The active room changed.
    fn set_room(&mut self, room: &str);
    /// The display name changed.
    fn set_user(&mut self, user: &str);
}

/// Line-oriented [`ChatView`] writing colored text.
pub struct TerminalView<W> {
    out: W,
    failed: bool,
}

impl TerminalView<io::Stdout> {
    /// View writing to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalView<W> {
    /// View writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    /// Print the title and command help.
    pub fn banner(&mut self) {
        let text = format!(
            "{}\n{} {}",
            "gossip-chat".bold(),
            "commands:".dimmed(),
            HELP.bold()
        );
        self.line(text);
    }

    /// Consume the view, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: impl std::fmt::Display) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            // Only report the first failure, the terminal is likely gone.
            if !self.failed {
                warn!(error = %e, "failed to write to terminal");
                self.failed = true;
            }
        }
    }
}

impl<W: Write + Send> ChatView for TerminalView<W> {
    fn show_message(&mut self, message: &ChatMessage) {
        let line = format!("{}: {}", message.sender_name.green().bold(), message.message);
        self.line(line);
    }

    fn show_own(&mut self, user: &str, text: &str) {
        let line = format!("{}: {}", user.blue().bold(), text);
        self.line(line);
    }

    fn show_log(&mut self, log: &ChatLog) {
        let prefix = format!("<{}>", log.prefix);
        let line = if log.prefix == SYSTEM_PREFIX {
            format!("{}: {}", prefix.yellow(), log.message)
        } else {
            format!("{}: {}", prefix.red().bold(), log.message)
        };
        self.line(line);
    }

    fn show_peers(&mut self, peers: &[EndpointId]) {
        let line = if peers.is_empty() {
            format!("{} {}", "peers:".cyan(), "(none)".dimmed())
        } else {
            let ids: Vec<String> = peers.iter().map(|p| p.fmt_short().to_string()).collect();
            format!("{} {}", format!("peers ({}):", peers.len()).cyan(), ids.join(", "))
        };
        self.line(line);
    }

    fn set_room(&mut self, room: &str) {
        let line = format!("{} {}", "room:".dimmed(), format!("ChatRoom-{room}").bold());
        self.line(line);
    }

    fn set_user(&mut self, user: &str) {
        let line = format!("{} {}", "user:".dimmed(), user.bold());
        self.line(line);
    }
}

/// Drives a [`ChatView`] from terminal input and a [`ChatRoom`].
pub struct Ui<P: PubSub, V> {
    pubsub: Arc<P>,
    room: ChatRoom<P>,
    view: V,
    refresh: Option<Duration>,
    shutdown: CancellationToken,
    inbound_open: bool,
    logs_open: bool,
    shown_peers: Option<Vec<EndpointId>>,
}

impl<P: PubSub, V: ChatView> Ui<P, V> {
    /// Create a UI for `room`. `pubsub` is used to join rooms on `/room`.
    pub fn new(pubsub: Arc<P>, room: ChatRoom<P>, view: V) -> Self {
        Self {
            pubsub,
            room,
            view,
            refresh: Some(Duration::from_secs(1)),
            shutdown: CancellationToken::new(),
            inbound_open: true,
            logs_open: true,
            shown_peers: None,
        }
    }

    /// Check the peer list every `every` and redraw the panel when it
    /// changed; `None` disables the timer.
    pub fn refresh_every(mut self, every: Option<Duration>) -> Self {
        self.refresh = every.filter(|d| !d.is_zero());
        self
    }

    /// Stop the loop when `token` fires, as if `/quit` was typed.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Run until `/quit`, end of input or shutdown.
    ///
    /// Returns the room that was active at that point; the caller is
    /// responsible for [`ChatRoom::exit`].
    pub async fn run<I>(mut self, mut input: I) -> ChatRoom<P>
    where
        I: Stream<Item = io::Result<String>> + Unpin + Send,
    {
        self.view.set_room(self.room.room_name());
        self.view.set_user(&self.room.user_name());
        self.sync_peers();

        let refresh_enabled = self.refresh.is_some();
        let mut ticker = tokio::time::interval(self.refresh.unwrap_or(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the peer panel was just drawn
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                line = input.next() => match line {
                    Some(Ok(line)) => {
                        if self.handle_line(&line).await.is_break() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "failed to read input");
                        break;
                    }
                    None => {
                        debug!("input closed");
                        break;
                    }
                },
                message = self.room.inbound.recv(), if self.inbound_open => match message {
                    Some(message) => self.view.show_message(&message),
                    None => self.inbound_open = false,
                },
                log = self.room.logs.recv(), if self.logs_open => match log {
                    Some(log) => self.view.show_log(&log),
                    None => self.logs_open = false,
                },
                _ = ticker.tick(), if refresh_enabled => self.refresh_peers(),
            }
        }

        self.room
    }

    async fn handle_line(&mut self, line: &str) -> ControlFlow<()> {
        let Some(command) = command::parse(line) else {
            return ControlFlow::Continue(());
        };

        match command {
            Command::Quit => return ControlFlow::Break(()),
            Command::Sync => self.sync_peers(),
            Command::SendMessage(text) => self.send(text).await,
            Command::ChangeUser(name) => {
                self.room.update_user(name.as_str());
                self.view.set_user(&name);
            }
            Command::ChangeRoom(name) => self.change_room(&name).await,
            Command::Invalid(raw) => {
                self.view
                    .show_log(&ChatLog::new(ERROR_PREFIX, format!("invalid command: {raw}")));
            }
        }
        ControlFlow::Continue(())
    }

    async fn send(&mut self, text: String) {
        self.view.show_own(&self.room.user_name(), &text);

        let outbound = self.room.outbound().clone();
        let send = outbound.send(text);
        tokio::pin!(send);

        // Keep draining logs while waiting: a blocked publish loop may be
        // trying to report through them.
        let sent = loop {
            tokio::select! {
                sent = &mut send => break sent,
                Some(log) = self.room.logs.recv(), if self.logs_open => self.view.show_log(&log),
            }
        };

        if sent.is_err() {
            self.view.show_log(&ChatLog::new(
                ERROR_PREFIX,
                "chat room is closed, message not sent",
            ));
        }
    }

    async fn change_room(&mut self, name: &str) {
        // A closed room can be rejoined under the same name.
        if name == self.room.room_name() && !self.room.is_closed() {
            self.view
                .show_log(&ChatLog::new(SYSTEM_PREFIX, format!("already in room {name}")));
            return;
        }

        let user = self.room.user_name();
        match ChatRoom::join(&*self.pubsub, &user, name).await {
            Ok(room) => {
                let old = std::mem::replace(&mut self.room, room);
                self.inbound_open = true;
                self.logs_open = true;
                let previous = old.room_name().to_string();
                if let Err(e) = old.exit().await {
                    warn!(room = %previous, error = %e, "failed to leave previous room");
                }
                self.view.set_room(self.room.room_name());
                self.sync_peers();
            }
            Err(e) => {
                warn!(room = %name, error = %e, "failed to switch rooms");
                self.view.show_log(&ChatLog::new(
                    ERROR_PREFIX,
                    format!("could not join room {name}: {e}"),
                ));
            }
        }
    }

    fn sync_peers(&mut self) {
        let peers = self.room.peer_list();
        self.view.show_peers(&peers);
        self.shown_peers = Some(peers);
    }

    fn refresh_peers(&mut self) {
        let peers = self.room.peer_list();
        if self.shown_peers.as_ref() != Some(&peers) {
            self.view.show_peers(&peers);
            self.shown_peers = Some(peers);
        }
    }
}
