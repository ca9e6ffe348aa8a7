mod abort;
mod errors;

pub mod prelude {
    pub use crate::abort::{AbortHandle, AbortListener};
    pub use crate::errors::{AbortSignalError, BarrierTimeoutError, SlaViolationError};
}
