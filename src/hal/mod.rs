//! Transport implementations.

pub mod mock;
#[cfg(feature = "std")]
pub mod tcp;

pub use mock::MockTransport;
#[cfg(feature = "std")]
pub use tcp::TcpTransport;
