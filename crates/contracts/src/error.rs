//! Layered error definitions
//!
//! Categorized by source: config / message / transport / registry / sink

use thiserror::Error;

use crate::{DispatcherId, ServerId, Topic};

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Message Errors =====
    /// Inbound message rejected (wrong payload type, malformed id)
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    // ===== Transport Errors =====
    /// Outbound message could not be delivered
    #[error("failed to send message to '{to}' on topic '{topic}': {reason}")]
    Send {
        to: ServerId,
        topic: Topic,
        reason: String,
    },

    /// A handler is already bound to the topic
    #[error("handler already registered for topic '{topic}'")]
    HandlerAlreadyRegistered { topic: Topic },

    // ===== Registry Errors =====
    /// Dispatcher id already present in the registry
    #[error("dispatcher {dispatcher_id} is already registered")]
    DispatcherAlreadyRegistered { dispatcher_id: DispatcherId },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid message error
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Create send error
    pub fn send(to: &ServerId, topic: Topic, reason: impl Into<String>) -> Self {
        Self::Send {
            to: to.clone(),
            topic,
            reason: reason.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether the error rejects a single inbound message only
    pub fn is_invalid_message(&self) -> bool {
        matches!(self, Self::InvalidMessage { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EVENT_SERVICE_TOPIC;

    #[test]
    fn test_send_error_display() {
        let err = ContractError::send(&"n1".into(), EVENT_SERVICE_TOPIC, "peer unreachable");
        let msg = err.to_string();
        assert!(msg.contains("n1"));
        assert!(msg.contains(EVENT_SERVICE_TOPIC.as_str()));
        assert!(msg.contains("peer unreachable"));
    }

    #[test]
    fn test_invalid_message_classification() {
        assert!(ContractError::invalid_message("bad id").is_invalid_message());
        assert!(!ContractError::Other("x".into()).is_invalid_message());
    }
}
