//! Office backend and scanner interfaces for shiftd
//!
//! This crate defines the boundary between the shift service and the
//! outside world: the office's script endpoint and the badge/tag scanner.
//! It contains no transport code itself.

mod mock;
mod records;
mod traits;

pub use mock::*;
pub use records::*;
pub use traits::*;
