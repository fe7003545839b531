use sepa_model::{ARBindingsResults, BindingsResults, ErrorResponse};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Receives the events of a subscription.
///
/// Callbacks run on the channel's reader task, in the order the broker sent the frames. They must
/// not block; spawn a task for anything slow. Every method defaults to doing nothing.
pub trait SubscriptionHandler: Send + Sync {
    /// The full delta of a notification, delivered before its two partitions.
    fn on_results(&self, _spuid: &str, _results: &ARBindingsResults) {}

    fn on_added_results(&self, _spuid: &str, _results: &BindingsResults) {}

    fn on_removed_results(&self, _spuid: &str, _results: &BindingsResults) {}

    /// Keep-alive sent by the broker.
    fn on_ping(&self) {}

    /// The channel closed while the subscription was active. Delivered once; the subscription is
    /// gone and must be subscribed again.
    fn on_broken_socket(&self, _spuid: &str) {}

    /// A channel-level error that is not the reply to a request.
    fn on_error(&self, _error: &ErrorResponse) {}
}

/// Lifecycle of a [`Subscription`].
///
/// `Requested → Active → (Cancelled | Broken)`. Both end states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    Requested,
    Active,
    Cancelled,
    Broken,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriptionState::Requested,
            1 => SubscriptionState::Active,
            2 => SubscriptionState::Cancelled,
            _ => SubscriptionState::Broken,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SubscriptionState::Requested => 0,
            SubscriptionState::Active => 1,
            SubscriptionState::Cancelled => 2,
            SubscriptionState::Broken => 3,
        }
    }
}

impl Display for SubscriptionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SubscriptionState::Requested => "requested",
            SubscriptionState::Active => "active",
            SubscriptionState::Cancelled => "cancelled",
            SubscriptionState::Broken => "broken",
        })
    }
}

/// State shared between the transport's subscription table and the [`Subscription`] handles.
#[derive(Clone, Debug)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SubscriptionState::Requested.as_u8())))
    }

    pub(crate) fn get(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SubscriptionState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Moves from `from` to `to`. Returns false if the state was not `from`.
    pub(crate) fn transition(&self, from: SubscriptionState, to: SubscriptionState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A handle on a subscription created by the broker.
///
/// Cloning the handle does not duplicate the subscription; every clone observes the same state.
#[derive(Clone, Debug)]
pub struct Subscription {
    spuid: String,
    alias: Option<String>,
    state: SharedState,
}

impl Subscription {
    pub(crate) fn new(spuid: String, alias: Option<String>, state: SharedState) -> Self {
        Self {
            spuid,
            alias,
            state,
        }
    }

    /// The broker-assigned subscription id.
    pub fn spuid(&self) -> &str {
        &self.spuid
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.get()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_roundtrip() {
        for state in [
            SubscriptionState::Requested,
            SubscriptionState::Active,
            SubscriptionState::Cancelled,
            SubscriptionState::Broken,
        ] {
            assert_eq!(SubscriptionState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn transition_happens_once() {
        let state = SharedState::new();
        state.set(SubscriptionState::Active);
        assert!(state.transition(SubscriptionState::Active, SubscriptionState::Broken));
        assert!(!state.transition(SubscriptionState::Active, SubscriptionState::Broken));
        assert_eq!(state.get(), SubscriptionState::Broken);
    }

    #[test]
    fn handles_share_state() {
        let state = SharedState::new();
        let subscription = Subscription::new("spu-1".to_owned(), None, state.clone());
        let copy = subscription.clone();
        assert_eq!(copy.state(), SubscriptionState::Requested);
        state.set(SubscriptionState::Active);
        assert!(subscription.is_active());
        assert!(copy.is_active());
        assert_eq!(copy.spuid(), "spu-1");
    }
}
