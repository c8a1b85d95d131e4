mod coordinator;
mod dynamic_cache;
mod registry;
mod watch_handle;

pub(crate) use coordinator::*;
pub use dynamic_cache::*;
pub(crate) use registry::*;
pub use watch_handle::*;
