//! Subscriber lifecycle states.

use serde::{Deserialize, Serialize};

/// `Unsubscribed → Subscribed → Draining → Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriberState {
    /// No registration has been made yet.
    Unsubscribed,
    /// At least one listener is running.
    Subscribed,
    /// Shutdown requested; registrations released, listeners finishing.
    Draining,
    /// Everything released. No further subscriptions are accepted.
    Closed,
}

impl SubscriberState {
    /// Returns `true` if `next` is a legal successor of `self`.
    ///
    /// `Unsubscribed → Closed` is allowed so that a subscriber that never
    /// registered anything can still be shut down.
    pub fn can_transition_to(self, next: SubscriberState) -> bool {
        use SubscriberState::*;
        matches!(
            (self, next),
            (Unsubscribed, Subscribed)
                | (Subscribed, Subscribed)
                | (Subscribed, Draining)
                | (Draining, Closed)
                | (Unsubscribed, Closed)
        )
    }

    pub fn accepts_subscriptions(self) -> bool {
        matches!(self, Self::Unsubscribed | Self::Subscribed)
    }
}

impl std::fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "unsubscribed"),
            Self::Subscribed => write!(f, "subscribed"),
            Self::Draining => write!(f, "draining"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriberState::*;

    #[test]
    fn forward_transitions_only() {
        assert!(Unsubscribed.can_transition_to(Subscribed));
        assert!(Subscribed.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Subscribed));
        assert!(!Draining.can_transition_to(Subscribed));
        assert!(!Closed.can_transition_to(Unsubscribed));
    }

    #[test]
    fn closed_rejects_subscriptions() {
        assert!(Subscribed.accepts_subscriptions());
        assert!(!Draining.accepts_subscriptions());
        assert!(!Closed.accepts_subscriptions());
    }
}
