//! Queue module: serialized, rate-limited execution of async operations.

mod serial;

pub use serial::{Operation, SerialQueue};
