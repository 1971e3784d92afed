//! lmchat CLI library module.
//!
//! - `cli/` - CLI argument parsing and command dispatch
//! - `chat_cmd` - interactive chat REPL
//! - `models_cmd` - model listing
//! - `render` - incremental rendering of streamed replies
//! - `styled_output` - themed terminal colors

pub mod chat_cmd;
pub mod cli;
pub mod models_cmd;
pub mod render;
pub mod styled_output;
