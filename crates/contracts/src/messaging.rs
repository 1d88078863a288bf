//! Messaging contract - addressed envelopes and the message-center capability
//!
//! The transport itself lives outside this crate. Collectors only see the
//! `MessageCenter` trait and are handed an implementation at construction.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{ContractError, EventFeed, ServerId, TableSpan, Ts};

/// Topic name a handler is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Topic(&'static str);

impl Topic {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Inbound event feeds, consumed by the node's event collector
pub const EVENT_FEED_TOPIC: Topic = Topic::new("EventFeed");

/// Dispatcher control messages, consumed by the event service
pub const EVENT_SERVICE_TOPIC: Topic = Topic::new("EventService");

/// Message-kind tag carried in the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    RegisterDispatcherRequest,
    EventFeed,
    DispatcherSpeedRatio,
}

/// Register (or remove) a dispatcher's feed on the event service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDispatcherRequest {
    pub dispatcher_id: String,
    pub table_span: TableSpan,
    pub remove: bool,
    /// Only meaningful when `remove` is false
    pub start_ts: Ts,
    pub server_id: ServerId,
}

/// Per-dispatcher throttling hint for the event service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherSpeedRatio {
    pub dispatcher_id: String,
    pub table_span: TableSpan,
    /// Fraction of full speed in `(0, 1]`
    pub ratio: f32,
    pub server_id: ServerId,
}

/// Typed payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    RegisterDispatcherRequest(RegisterDispatcherRequest),
    EventFeed(EventFeed),
    DispatcherSpeedRatio(DispatcherSpeedRatio),
}

impl Message {
    /// Tag matching the payload variant
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::RegisterDispatcherRequest(_) => MessageType::RegisterDispatcherRequest,
            Self::EventFeed(_) => MessageType::EventFeed,
            Self::DispatcherSpeedRatio(_) => MessageType::DispatcherSpeedRatio,
        }
    }
}

/// Addressed message envelope
#[derive(Debug, Clone, PartialEq)]
pub struct TargetMessage {
    pub to: ServerId,
    pub topic: Topic,
    pub message_type: MessageType,
    pub message: Message,
}

impl TargetMessage {
    /// Build an envelope whose type tag follows the payload
    pub fn new(to: ServerId, topic: Topic, message: Message) -> Self {
        Self {
            to,
            topic,
            message_type: message.message_type(),
            message,
        }
    }
}

/// Inbound handler bound to a topic
///
/// Invoked once per delivered message, concurrently across messages.
pub type MessageHandler =
    Arc<dyn Fn(TargetMessage) -> BoxFuture<'static, Result<(), ContractError>> + Send + Sync>;

/// Topic-addressed messaging capability
///
/// Implementations must be safe to call from many tasks at once.
pub trait MessageCenter: Send + Sync {
    /// Node this center runs on
    fn server_id(&self) -> &ServerId;

    /// Bind `handler` to `topic`.
    ///
    /// # Errors
    /// `HandlerAlreadyRegistered` if the topic already has a handler.
    fn register_handler(&self, topic: Topic, handler: MessageHandler) -> Result<(), ContractError>;

    /// Unbind the handler of `topic`, if any
    fn deregister_handler(&self, topic: Topic);

    /// Hand `msg` to the transport. Makes a single attempt.
    ///
    /// # Errors
    /// `Send` when the message was not accepted for delivery.
    fn send_event(&self, msg: TargetMessage) -> Result<(), ContractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_type_follows_payload() {
        let msg = TargetMessage::new(
            "n1".into(),
            EVENT_FEED_TOPIC,
            Message::EventFeed(EventFeed {
                dispatcher_id: "x".into(),
                table_info: None,
                txn_events: vec![],
                resolved_ts: 1,
            }),
        );
        assert_eq!(msg.message_type, MessageType::EventFeed);
        assert_eq!(msg.topic.as_str(), "EventFeed");
    }

    #[test]
    fn test_register_request_json_shape() {
        let req = RegisterDispatcherRequest {
            dispatcher_id: "id".into(),
            table_span: TableSpan::new(1, "a", "b"),
            remove: false,
            start_ts: 100,
            server_id: "n1".into(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["remove"], false);
        assert_eq!(value["start_ts"], 100);
        assert_eq!(value["server_id"], "n1");
    }
}
