//! skiff — async IRC client core.
//!
//! One persistent connection per server; each joined channel is an
//! independently readable stream of already-classified log lines. A single
//! background task owns the socket: it frames and parses incoming lines,
//! answers keepalives, and routes channel-directed events into per-channel
//! bounded queues. Consumer code reads a [`Channel`] with an async
//! `read_line`, which composes with any other input source under
//! `tokio::select!` — no busy-polling, no stalled reads after disconnect.
//!
//! ```no_run
//! use skiff::{Config, Connection};
//!
//! # async fn demo() -> Result<(), skiff::Error> {
//! let conn = Connection::connect(Config::new("wren", "irc.example.com")).await?;
//! let channel = conn.join("#pond").await?;
//! channel.write("hello")?;
//! while let Ok(line) = channel.read_line().await {
//!     println!("{line}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod event;
mod registry;

pub use channel::Channel;
pub use codec::{LineCodec, MAX_LINE_LENGTH};
pub use connection::{Config, Connection};
pub use error::Error;
pub use event::Event;
