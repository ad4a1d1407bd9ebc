pub mod build_session;
pub mod clock;
pub mod order;
pub mod webhook;

pub use build_session::*;
pub use order::*;
