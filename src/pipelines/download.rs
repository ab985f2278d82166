use super::Pipeline;
use crate::error::Result;
use crate::http::HttpClient;
use crate::output::safe_file_stem;
use crate::types::{Locator, Payload, WorkItem};
use async_trait::async_trait;

/// Output category of downloaded papers
pub const PAPERS_CATEGORY: &str = "papers";

const PDF_MAGIC: &[u8] = b"%PDF";

/// Fetches each listed paper's PDF
///
/// The combined artifact is a tab-separated manifest of `<id>\t<bytes>`
/// lines, one per downloaded paper.
#[derive(Clone, Debug)]
pub struct PdfDownloadPipeline {
    http: HttpClient,
}

impl PdfDownloadPipeline {
    /// Create the pipeline on top of the shared HTTP session
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Pipeline for PdfDownloadPipeline {
    fn name(&self) -> &str {
        "download"
    }

    fn category(&self) -> &str {
        PAPERS_CATEGORY
    }

    fn item_file_name(&self, item: &WorkItem) -> String {
        format!("{}.pdf", safe_file_stem(item.id.as_str()))
    }

    fn combined_file_name(&self, run_date: &str) -> String {
        format!("manifest_{run_date}.txt")
    }

    fn combined_fragment(&self, item: &WorkItem, payload: &Payload) -> String {
        format!("{}\t{}\n", item.id, payload.len())
    }

    async fn process(&self, item: &WorkItem) -> Result<Payload> {
        let bytes = match &item.locator {
            Locator::Url(url) => self.http.get_bytes(url).await?,
            Locator::Path(path) => tokio::fs::read(path).await?,
        };

        if !bytes.starts_with(PDF_MAGIC) {
            tracing::warn!(item_id = %item.id, bytes = bytes.len(), "Downloaded file does not look like a PDF");
        }

        Ok(Payload::Bytes(bytes))
    }
}
