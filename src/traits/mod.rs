//! Trait seams: the byte transport below the engine and the delegate above it.

pub mod delegate;
pub mod transport;

pub use delegate::Delegate;
pub use transport::Transport;
