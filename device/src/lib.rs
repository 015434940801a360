//! Device placement and raw buffer views.
//!
//! kernlink never owns tensor memory. A kernel call only needs a data pointer, the device
//! the memory lives on, and the element type; [`DeviceBuffer`] is the seam through which
//! host containers and foreign tensors provide those.

pub mod buffer;
pub mod error;
pub mod spec;


pub use buffer::{DeviceBuffer, RawBuffer};
pub use error::*;
pub use kernlink_dtype::DeviceSpec;
pub use spec::DeviceSpecExt;
