//! Message filter - decides whether a control message is meant for this connector

use crate::control::{ActionKind, ControlMessage};
use crate::descriptor::ConnectorDescriptor;
use std::fmt::Debug;

/// Generic action that asks every connector process to shut down
pub const ACTION_CLOSE: &str = "CLOSE";

/// What the manager should do after the base protocol handled a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseDirective {
    Ignore,
    Shutdown,
}

/// Messages shared by every connector type, independent of the destination
pub trait BaseProtocol: Send + Sync + Debug {
    /// Whether this protocol owns the message
    fn accepts(&self, message: &ControlMessage) -> bool;

    /// Called for messages the protocol accepted
    fn handle(&self, message: &ControlMessage) -> BaseDirective;
}

/// Owns the cluster-wide `CLOSE` broadcast
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBaseProtocol;

impl BaseProtocol for StandardBaseProtocol {
    fn accepts(&self, message: &ControlMessage) -> bool {
        matches!(message, ControlMessage::Generic(msg) if msg.action == ACTION_CLOSE)
    }

    fn handle(&self, message: &ControlMessage) -> BaseDirective {
        if self.accepts(message) {
            BaseDirective::Shutdown
        } else {
            BaseDirective::Ignore
        }
    }
}

/// Can this connector handle the incoming message?
///
/// Base-protocol messages are always accepted. Send, edit and delete are
/// accepted only when addressed to the descriptor's name; everything else is
/// rejected without side effects.
pub fn accepts(
    message: &ControlMessage,
    descriptor: &ConnectorDescriptor,
    base: &dyn BaseProtocol,
) -> bool {
    if base.accepts(message) {
        return true;
    }

    match message.action() {
        ActionKind::Send | ActionKind::Edit | ActionKind::Delete => {
            message.name() == Some(descriptor.name.as_str())
        }
        ActionKind::Generic => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ConnectorId, SocketKind};

    fn descriptor(name: &str) -> ConnectorDescriptor {
        ConnectorDescriptor::new(ConnectorId(1), name, "tcp://127.0.0.1:5555", SocketKind::Push)
    }

    #[test]
    fn test_outgoing_actions_match_on_name() {
        let base = StandardBaseProtocol;
        let own = descriptor("orders");

        let edit = ControlMessage::Edit(descriptor("orders"));
        let other_edit = ControlMessage::Edit(descriptor("billing"));

        for (message, expected) in [
            (ControlMessage::send("orders", "x"), true),
            (ControlMessage::send("billing", "x"), false),
            (ControlMessage::delete("orders"), true),
            (ControlMessage::delete("Orders"), false),
            (edit, true),
            (other_edit, false),
        ] {
            assert_eq!(accepts(&message, &own, &base), expected, "{:?}", message);
        }
    }

    #[test]
    fn test_unknown_generic_rejected_even_when_named() {
        let base = StandardBaseProtocol;
        let mut message = ControlMessage::generic("OUTGOING_AMQP_SEND");
        if let ControlMessage::Generic(msg) = &mut message {
            msg.name = Some("orders".to_string());
        }

        assert!(!accepts(&message, &descriptor("orders"), &base));
    }

    #[test]
    fn test_base_protocol_messages_always_accepted() {
        let base = StandardBaseProtocol;
        let close = ControlMessage::generic(ACTION_CLOSE);

        assert!(accepts(&close, &descriptor("anything"), &base));
        assert_eq!(base.handle(&close), BaseDirective::Shutdown);
        assert_eq!(
            base.handle(&ControlMessage::generic("PING")),
            BaseDirective::Ignore
        );
    }
}
