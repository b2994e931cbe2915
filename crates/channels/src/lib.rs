//! Chat transports for RagBot.
//!
//! Each channel connects to a chat platform and relays messages to and from
//! the dispatcher.
//!
//! Available channels:
//! - **Telegram**: Bot API long polling
//! - **CLI**: interactive terminal chat (stdin/stdout)

pub mod cli;
pub mod telegram;

pub use cli::CliChannel;
pub use telegram::TelegramChannel;
