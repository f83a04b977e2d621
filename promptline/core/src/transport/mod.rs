//! Transport Layer for Core-Surface IPC
//!
//! Carries [`BridgeRequest`](crate::events::BridgeRequest)s from a surface
//! into a [`TaskConductor`](crate::conductor::TaskConductor) and relays
//! replies and task notifications back.
//!
//! - `InProcess`: direct channels for an embedded surface
//! - `UnixSocket`: local IPC via Unix domain sockets (daemon mode)
//!
//! Both run the same [`serve_connection`] loop; only the byte plumbing
//! differs.
//!
//! # Security
//!
//! - Unix sockets use `SO_PEERCRED` to validate the peer UID (Linux)
//! - Socket files are created with 0600 permissions
//! - No network exposure

use std::path::PathBuf;

pub mod bridge;
pub mod frame;
pub mod in_process;
#[cfg(unix)]
pub mod unix_socket;

pub use bridge::serve_connection;
pub use frame::{FrameDecoder, MAX_FRAME_SIZE};
pub use in_process::InProcessBridge;
#[cfg(unix)]
pub use unix_socket::{UnixSocketClient, UnixSocketServer};

/// Transport failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket or filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A frame exceeded [`MAX_FRAME_SIZE`]
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Declared or actual payload size
        size: usize,
        /// Limit
        max: usize,
    },

    /// Payload did not match its checksum
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried by the frame
        expected: u32,
        /// Checksum of the received payload
        actual: u32,
    },

    /// Peer credentials were rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The other side went away
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Get the default socket path
///
/// `$XDG_RUNTIME_DIR/promptline/promptline.sock` when the runtime dir is
/// set, otherwise a per-user directory under the system temp dir.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(runtime_dir) if !runtime_dir.is_empty() => PathBuf::from(runtime_dir)
            .join("promptline")
            .join("promptline.sock"),
        _ => std::env::temp_dir()
            .join(fallback_dir_name())
            .join("promptline.sock"),
    }
}

#[cfg(unix)]
fn fallback_dir_name() -> String {
    // SAFETY: getuid has no preconditions and cannot fail
    let uid = unsafe { libc::getuid() };
    format!("promptline-{uid}")
}

#[cfg(not(unix))]
fn fallback_dir_name() -> String {
    "promptline".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path() {
        let path = default_socket_path();
        assert!(path.ends_with("promptline.sock"));
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::FrameTooLarge {
            size: 11,
            max: 10,
        };
        assert_eq!(err.to_string(), "Frame size 11 exceeds maximum 10");

        let err = TransportError::ChecksumMismatch {
            expected: 1,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0x00000001, got 0x00000002"
        );
    }
}
