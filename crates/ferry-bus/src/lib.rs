//! In-process message routing.
//!
//! An [`EventBus`] delivers every posted [`Message`](ferry_messages::Message)
//! synchronously to the [`Subscriber`]s whose [`Subscription`] covers the
//! message's concrete type or capability class. A [`BusBridge`] joins the
//! client-side bus to the daemon-side bus, and [`PendingRequests`] holds the
//! requests a component is still waiting on.
//!
//! Buses are ordinary values shared through `Arc`; nothing here is global.

mod bridge;
mod bus;
mod pending;
mod subscriber;

pub use bridge::BusBridge;
pub use bus::EventBus;
pub use pending::PendingRequests;
pub use subscriber::{DispatchError, Subscriber, Subscription};

const BUS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bus");
