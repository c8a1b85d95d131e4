//! Resource identities, mirrored objects and label selectors.

mod object;
mod resource_type;
mod selector;

pub use object::*;
pub use resource_type::*;
pub use selector::*;
