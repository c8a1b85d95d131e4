//! Local read-only mirror of one resource collection.
//!
//! A [`MirrorStore`] is written only by its reflector. Callers read it through
//! a [`Lister`], and may subscribe to changes with a [`ResourceEventHandler`].

mod handler;
mod lister;
mod store;

pub use handler::*;
pub use lister::*;
pub use store::*;
