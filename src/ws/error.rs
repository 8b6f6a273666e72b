#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Error reported by a non-tungstenite transport
    Transport(String),
    /// WebSocket connection was closed
    ConnectionClosed,
    /// No frame or PONG arrived before the liveness deadline
    ReadTimeout,
    /// A write did not complete within the write deadline
    WriteTimeout,
    /// Outbound queue has no free capacity
    QueueFull,
    /// The retry policy gave up before a connection was established
    RetriesExhausted {
        /// Number of failed connection attempts
        attempts: u32,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Transport(e) => write!(f, "WebSocket transport error: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::ReadTimeout => write!(f, "WebSocket read deadline expired"),
            Self::WriteTimeout => write!(f, "WebSocket write deadline expired"),
            Self::QueueFull => write!(f, "WebSocket outbound queue is full"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "Gave up connecting after {attempts} failed attempts")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Kind};

    #[test]
    fn retries_exhausted_reports_attempts() {
        let error: Error = WsError::RetriesExhausted { attempts: 4 }.into();

        assert_eq!(error.kind(), Kind::WebSocket);
        assert!(error.to_string().contains("4 failed attempts"));
    }
}
