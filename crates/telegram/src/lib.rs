//! Telegram side of linkfetch.
//!
//! [`TelegramOutbound`] and [`LargeFileBot`] implement the messaging and
//! large-file collaborator contracts with teloxide; [`bot`] runs the inbound
//! long-polling loop that feeds links into the retrieval pipeline.

pub mod bot;
pub mod error;
pub mod handlers;
pub mod large_file;
pub mod outbound;
pub mod state;

pub use {
    bot::{connect, start_polling},
    error::{Error, Result},
    large_file::LargeFileBot,
    outbound::TelegramOutbound,
    state::BotState,
};
