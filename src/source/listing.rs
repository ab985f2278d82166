//! Remote JSON listing of the day's papers

use super::WorkItemSource;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::retry::RetryingClient;
use crate::types::{ItemId, Locator, RunContext, WorkItem};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, warn};

/// Lists items from a remote JSON array of records
///
/// Each record's identifier is read from `paper.id`, falling back to a
/// top-level `id`. The item locator is built from a URL template in which
/// `{id}` is replaced by the identifier.
#[derive(Clone, Debug)]
pub struct RemoteListingSource {
    http: HttpClient,
    retry: RetryingClient,
    listing_url: String,
    url_template: String,
}

impl RemoteListingSource {
    /// Create a source reading `listing_url` and building locators from `url_template`
    pub fn new(
        http: HttpClient,
        retry: RetryingClient,
        listing_url: impl Into<String>,
        url_template: impl Into<String>,
    ) -> Self {
        Self {
            http,
            retry,
            listing_url: listing_url.into(),
            url_template: url_template.into(),
        }
    }
}

#[async_trait]
impl WorkItemSource for RemoteListingSource {
    async fn enumerate(&self, ctx: &RunContext) -> Result<Vec<WorkItem>> {
        let attempted = self
            .retry
            .execute("listing", || self.http.get_json::<Value>(&self.listing_url))
            .await;

        let listing = attempted.result.map_err(|e| {
            Error::Enumeration(format!(
                "failed to fetch listing {} after {} attempt(s): {}",
                self.listing_url, attempted.attempts, e
            ))
        })?;

        let records = listing.as_array().ok_or_else(|| {
            Error::Enumeration(format!(
                "listing {} is not a JSON array",
                self.listing_url
            ))
        })?;

        let items = items_from_listing(records, &self.url_template);
        info!(
            run_date = %ctx.run_date,
            records = records.len(),
            items = items.len(),
            "Listing enumerated"
        );
        Ok(items)
    }
}

/// Turn listing records into work items
///
/// Records without an identifier and records repeating an identifier already
/// seen are skipped with a warning.
pub fn items_from_listing(records: &[Value], url_template: &str) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(records.len());

    for (position, record) in records.iter().enumerate() {
        let Some(id) = record_id(record) else {
            warn!(position, "Listing record has no identifier, skipping");
            continue;
        };

        if !seen.insert(id.to_string()) {
            warn!(item_id = id, position, "Duplicate identifier in listing, skipping");
            continue;
        }

        let url = url_template.replace("{id}", id);
        items.push(WorkItem::new(ItemId::new(id), Locator::Url(url)).with_metadata(record.clone()));
    }

    items
}

fn record_id(record: &Value) -> Option<&str> {
    record
        .get("paper")
        .and_then(|paper| paper.get("id"))
        .or_else(|| record.get("id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}
