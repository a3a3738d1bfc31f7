//! Transport boundary for relaydesk.
//!
//! The relay core never talks to a messaging platform directly. It consumes
//! [`InboundEvent`]s produced by a transport adapter and issues outbound
//! instructions through the [`DeliverySink`] trait.

pub mod command;
pub mod error;
pub mod gating;
pub mod inbound;
pub mod outbound;

pub use {
    command::{COMMAND_LIST, Command, CommandError},
    error::{DeliveryError, Result},
    gating::OperatorSet,
    inbound::{ActionKind, InboundEvent, NotificationBody, NotificationRef, Sender},
    outbound::{Affordance, Affordances, DeliverySink, EditKind},
};
