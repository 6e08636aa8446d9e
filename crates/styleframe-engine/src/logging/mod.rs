//! Logging utilities.
//!
//! Centralizes logger initialization and the target tags used for structured
//! failure entries. Everything else goes through the `log` facade.

mod init;

pub use init::{
    init_logging, LoggingConfig, TAG_ADAPTER, TAG_CONTEXT, TAG_FRAME, TAG_RENDER, TAG_SYNC,
};
