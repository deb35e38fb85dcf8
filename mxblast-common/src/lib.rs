pub mod address;
pub mod domain;
pub mod logging;
pub mod message;

pub use address::{Address, AddressError};
pub use domain::Domain;
pub use message::Message;
pub use tracing;

/// Control signal delivered to long-running tasks over a broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
