//! Work item sources
//!
//! A [`WorkItemSource`] yields the finite sequence of items for one run. Two
//! variants exist: a remote JSON listing ([`RemoteListingSource`]) and a local
//! directory scan ([`LocalDirSource`]). Either may yield zero items, which the
//! orchestrator treats as an early abort rather than an error.

use crate::error::Result;
use crate::types::{RunContext, WorkItem};
use async_trait::async_trait;

mod listing;
mod local;

pub use listing::{RemoteListingSource, items_from_listing};
pub use local::LocalDirSource;

/// Produces the work items for one run
///
/// Identifiers in the returned sequence are unique. A failure to list at all
/// is reported as [`Error::Enumeration`](crate::error::Error::Enumeration).
#[async_trait]
pub trait WorkItemSource: Send + Sync {
    /// Enumerate the items for the run described by `ctx`
    async fn enumerate(&self, ctx: &RunContext) -> Result<Vec<WorkItem>>;
}
