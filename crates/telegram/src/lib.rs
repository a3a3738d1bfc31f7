//! Telegram transport for relaydesk.
//!
//! Long-polls the Bot API with teloxide, turns updates into
//! [`relaydesk_channels::InboundEvent`]s for the relay engine, and implements
//! [`relaydesk_channels::DeliverySink`] on top of the same bot.

pub mod bot;
pub mod error;
pub mod handlers;
pub mod outbound;

pub use {
    bot::{PollingHandle, build_bot, start_polling},
    error::{Error, Result},
    handlers::UpdateContext,
    outbound::TelegramOutbound,
};
