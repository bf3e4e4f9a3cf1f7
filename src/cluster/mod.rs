//! Membership: gossip-facing events and the ring-mutating observer.

mod events;
mod observer;

pub use events::{LoggingListener, MembershipEvent, MembershipListener};
pub use observer::MembershipObserver;
