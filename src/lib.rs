//! A per-resource-type watch cache for a remote, list/watch style API.
//!
//! [`DynamicCache`] starts one [`Reflector`] per resource type the first time
//! a caller asks for it, keeps an in-memory [`MirrorStore`] in step with the
//! remote collection, and serves reads through [`Lister`]s. A type whose watch
//! fails for good is quarantined and never started again.

mod cache;
mod config;
mod errors;
mod mirror;
mod resource;
mod transport;
pub mod constants;
pub mod metrics;
pub mod utils;

pub use cache::*;
pub use config::*;
pub use errors::*;
pub use mirror::*;
pub use resource::*;
pub use transport::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
