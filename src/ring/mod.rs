//! Token-ring placement: hashing, ranges, and the shared ring view.

mod token;
mod view;

pub use token::{token_for_key, Token, TokenRange};
pub use view::{RingView, SharedRing};
