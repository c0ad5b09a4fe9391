/// Per-channel handle exposed to the consumer.
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::connection::Command;
use crate::error::Error;
use crate::registry::{Entry, MemberSet, Registry};

/// A joined channel.
///
/// The read side of the channel's delivery queue lives here; the receive
/// loop pushes formatted log lines into the other end. Clones share the
/// queue — joining the same name twice hands back a clone of the original
/// handle. `read_line` is a plain future, so a consumer can wait on it
/// together with unrelated input sources inside `tokio::select!`.
#[derive(Clone)]
pub struct Channel {
    name: Arc<str>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    members: MemberSet,
    closed: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
    registry: Registry,
}

impl Channel {
    /// Build a handle from a registry entry's shared pieces. The command
    /// sender comes from the connection, never from the entry, so the
    /// registry cannot keep the receive loop alive by itself.
    pub(crate) fn new(
        name: &str,
        cmd_tx: mpsc::UnboundedSender<Command>,
        entry: &Entry,
        broken: Arc<AtomicBool>,
        registry: Registry,
    ) -> Self {
        Self {
            name: name.into(),
            cmd_tx,
            rx: Arc::clone(&entry.rx),
            members: Arc::clone(&entry.members),
            closed: Arc::clone(&entry.closed),
            broken,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Await the next delivered log line.
    ///
    /// Once the connection has released this channel's queue (quit, server
    /// close, or `part`), reports [`Error::EndOfStream`] on clean shutdown
    /// and [`Error::StreamBroken`] when the connection died abnormally —
    /// never blocks indefinitely past closure.
    pub async fn read_line(&self) -> Result<String, Error> {
        match self.rx.lock().await.recv().await {
            Some(line) => Ok(line),
            None if self.broken.load(Ordering::Acquire) => Err(Error::StreamBroken),
            None => Err(Error::EndOfStream),
        }
    }

    /// Send a message to this channel.
    pub fn write(&self, text: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.cmd_tx
            .send(Command::Privmsg {
                target: self.name.to_string(),
                text: text.to_owned(),
            })
            .map_err(|_| Error::StreamBroken)
    }

    /// Kick a nick from this channel.
    pub fn kick(&self, nick: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.cmd_tx
            .send(Command::Kick {
                channel: self.name.to_string(),
                nick: nick.to_owned(),
            })
            .map_err(|_| Error::StreamBroken)
    }

    /// Snapshot of the nicks observed joining this channel. Best-effort —
    /// members present before we joined are not listed.
    pub async fn members(&self) -> HashSet<String> {
        self.members.read().await.clone()
    }

    /// Leave the channel: remove its registry entry (later deliveries drop
    /// silently) and send PART. Idempotent; tolerates a dead connection.
    pub async fn part(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.remove(&self.name).await;
        let _ = self.cmd_tx.send(Command::Part {
            channel: self.name.to_string(),
        });
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ChannelClosed(self.name.to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
