//! Startup and protocol error taxonomy.
//!
//! Only setup-time failures surface here; per-glyph and per-font failures
//! are logged and absorbed where they happen.

use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not connect to the X server: {0}")]
    Connect(#[from] ConnectError),

    #[error("X connection broke: {0}")]
    Connection(#[from] ConnectionError),

    #[error("X request failed: {0}")]
    Reply(#[from] ReplyError),

    #[error("X request failed: {0}")]
    ReplyOrId(#[from] ReplyOrIdError),

    #[error("no usable visual on the screen")]
    NoVisual,

    #[error("the geometry specified doesn't fit the screen ({width}x{height}+{x}+{y})")]
    GeometryDoesNotFit { width: i32, height: i32, x: i32, y: i32 },

    #[error("no fonts could be loaded")]
    NoFonts,

    #[error("module {0} failed to initialize")]
    ModuleInit(String),
}
