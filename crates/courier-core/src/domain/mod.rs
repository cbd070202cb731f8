//! Domain model (ids, task states, errors, structured remote errors).

pub mod errors;
pub mod ids;
pub mod native;
pub mod state;

pub use self::errors::{PackageError, QueueError, TaskError, TransportError};
pub use self::ids::{EntryId, Id, IdMarker, TaskId};
pub use self::native::{NATIVE_ERROR_MARKER, NativeError};
pub use self::state::TaskState;
