//! Unix Socket Transport
//!
//! Default transport for daemon mode using Unix domain sockets.
//!
//! # Socket Location
//!
//! Default: `$XDG_RUNTIME_DIR/promptline/promptline.sock`
//! Fallback: `$TMPDIR/promptline-$UID/promptline.sock`
//!
//! # Security
//!
//! - Socket created with mode 0600 (owner-only access)
//! - Peer UID validated via `SO_PEERCRED` (Linux)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                    ┌──────────────────┐
//! │     Surface      │                    │      Daemon      │
//! │                  │                    │                  │
//! │ UnixSocketClient ├───────────────────►│ UnixSocketServer │
//! │                  │    Unix Socket     │                  │
//! │  BridgeRequest ─►│  promptline.sock   │◄─ BridgeRequest  │
//! │ ◄─ BridgeMessage │                    │ BridgeMessage ─► │
//! └──────────────────┘                    └──────────────────┘
//! ```

mod client;
mod server;

pub use client::UnixSocketClient;
pub use server::UnixSocketServer;

/// Read buffer size for socket halves
const READ_BUFFER_SIZE: usize = 4096;
