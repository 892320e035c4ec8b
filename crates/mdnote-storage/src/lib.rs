//! Storage entry point: hybrid tier routing and the D1 tenant directory.

mod d1;
mod hybrid;

pub use d1::{D1Directory, UserTokenRow};
pub use hybrid::{Backend, HybridProvider, DEFAULT_EPHEMERAL_PREFIX};
