/// Error kinds surfaced by the client.
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network-level connect (TCP or TLS) failed during construction.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The connection died underneath us — a read or write failed, or the
    /// server sent ERROR. Fatal to the connection; every open channel's
    /// next read reports this.
    #[error("connection broken")]
    StreamBroken,

    /// The server closed the stream in an orderly fashion. A shutdown
    /// signal, not necessarily an application error.
    #[error("end of stream")]
    EndOfStream,

    /// The read buffer filled up without a line terminator in sight.
    /// Outgoing overlength lines are truncated instead, never rejected.
    #[error("line exceeds maximum length without a terminator")]
    LineTooLong,

    /// Operation on a channel that has already been parted.
    #[error("channel {0} is closed")]
    ChannelClosed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
