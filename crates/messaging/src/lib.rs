//! # Messaging
//!
//! In-process message center.
//!
//! Responsibilities:
//! - Bind exactly one handler per topic
//! - Deliver messages addressed to this node by spawning the topic handler
//! - Forward everything else to an optional outbox (the link to peers)
//! - Inject send failures for tests

mod local;

pub use contracts::{MessageCenter, MessageHandler, TargetMessage, Topic};
pub use local::{LocalMessageCenter, MessageCenterStats};
