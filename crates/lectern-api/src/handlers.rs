//! Request handlers.

pub mod health;
pub mod refinement;
pub mod videos;

pub use health::*;
pub use refinement::*;
pub use videos::*;
