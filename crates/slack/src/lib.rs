//! Slack side of rudolph.
//!
//! - **Events** (`events`) - the closed set of inbound stream events
//! - **Messaging** (`messaging`) - the chat-platform collaborator trait
//! - **Commands** (`commands`) - text command classification and routing
//! - **Session** (`session`) - the connection supervisor and dispatch loop
//! - **RTM** (`rtm`) - concrete Slack client (Web API + RTM websocket)
//!
//! # Architecture
//!
//! ```text
//! RTM websocket -> manager task -> mpsc -> Session::run -> CommandRouter -> collaborators
//!                                               |
//!                                   liveness -> gate -> share price digest
//! ```

pub mod commands;
pub mod events;
pub mod messaging;
pub mod rtm;
pub mod session;

#[cfg(test)]
mod testing;

pub use commands::{Collaborators, Command, CommandRouteError, CommandRouter};
pub use events::{InboundEvent, SelfInfo, TextMessageEvent};
pub use messaging::{EventStream, MessagingClient, MessagingError};
pub use rtm::{ReconnectPolicy, RtmClient, RtmSettings};
pub use session::{Session, SessionError, SessionSettings, SessionState, StopReason};
