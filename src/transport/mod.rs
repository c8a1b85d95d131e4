//! List-and-watch transport.
//!
//! The remote source is abstracted behind [`ListWatch`]. A [`Reflector`]
//! drives one resource type against it: list, then watch from the listed
//! resource version, feeding a [`crate::MirrorStore`].
//!
//! ```text
//!   ListWatch::list ──> MirrorStore::replace ──> synced = true
//!         │
//!         ▼
//!   ListWatch::watch(rv) ──> MirrorStore::apply (per event)
//!         │  stream ends      -> watch again from last rv
//!         │  Expired          -> relist
//!         │  retryable error  -> backoff, relist
//!         └─ fatal / retries exhausted -> ErrorReporter
//! ```

mod memory_source;
mod reflector;

pub use memory_source::*;
pub use reflector::*;

#[cfg(test)]
mod reflector_test;

use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use crate::DynamicObject;
use crate::ObjectList;
use crate::ResourceType;
use crate::SourceError;

/// A change delivered on a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(DynamicObject),
    Modified(DynamicObject),
    Deleted(DynamicObject),
    /// Progress marker; carries no object.
    Bookmark { resource_version: String },
}

impl WatchEvent {
    pub fn resource_version(&self) -> &str {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                &obj.metadata.resource_version
            }
            WatchEvent::Bookmark { resource_version } => resource_version,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "added",
            WatchEvent::Modified(_) => "modified",
            WatchEvent::Deleted(_) => "deleted",
            WatchEvent::Bookmark { .. } => "bookmark",
        }
    }
}

/// Parameters shared by list and watch calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Empty means all namespaces.
    pub namespace: String,
    /// For watch: only deliver events newer than this version.
    pub resource_version: String,
}

pub type WatchStream = BoxStream<'static, std::result::Result<WatchEvent, SourceError>>;

/// The remote source of one or more resource collections.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ListWatch: Send + Sync + 'static {
    async fn list(
        &self,
        resource: &ResourceType,
        params: &ListParams,
    ) -> std::result::Result<ObjectList, SourceError>;

    async fn watch(
        &self,
        resource: &ResourceType,
        params: &ListParams,
    ) -> std::result::Result<WatchStream, SourceError>;
}
