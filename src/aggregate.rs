//! Merging per-item outcomes into one combined artifact and a run summary

use crate::pool::ItemResult;
use crate::types::{ItemId, Payload, RunSummary, WorkItem};
use std::time::Duration;

/// Text placed before and after the per-item fragments
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Framing {
    /// Leading text
    pub header: String,
    /// Trailing text
    pub footer: String,
}

impl Framing {
    /// Framing with explicit header and footer
    pub fn new(header: impl Into<String>, footer: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            footer: footer.into(),
        }
    }

    /// Opening and closing lines of a podcast episode
    ///
    /// ```
    /// use papercast::aggregate::Framing;
    ///
    /// let framing = Framing::podcast("Daily AI Papers");
    /// assert!(framing.header.starts_with("Welcome to today's Daily AI Papers!"));
    /// assert!(framing.footer.ends_with("Thank you for listening!"));
    /// ```
    pub fn podcast(title: &str) -> Self {
        Self::new(
            format!("Welcome to today's {title}! Let's dive into the latest publications.\n\n"),
            format!("That concludes our {title} for today. Thank you for listening!"),
        )
    }
}

/// The merged output of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombinedArtifact {
    /// Header, fragments in enumeration order, footer
    pub content: String,
    /// Items whose fragments were included, in order
    pub included: Vec<ItemId>,
}

impl CombinedArtifact {
    /// Number of item fragments included
    pub fn len(&self) -> usize {
        self.included.len()
    }

    /// Whether no item contributed a fragment
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}

/// Builds the combined artifact and the run summary once the pool is done
#[derive(Clone, Debug, Default)]
pub struct ResultAggregator {
    framing: Framing,
}

impl ResultAggregator {
    /// Create an aggregator with the given framing
    pub fn new(framing: Framing) -> Self {
        Self { framing }
    }

    /// Merge results in enumeration order, whatever order they completed in
    ///
    /// `fragment` renders one successful item; failures are left out of the
    /// artifact and listed in the summary instead. With zero successes the
    /// artifact is just the header followed by the footer.
    pub fn aggregate<F>(
        &self,
        results: &[ItemResult],
        fragment: F,
        elapsed: Duration,
    ) -> (CombinedArtifact, RunSummary)
    where
        F: Fn(&WorkItem, &Payload) -> String,
    {
        let mut ordered: Vec<&ItemResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.index);

        let mut summary = RunSummary {
            elapsed,
            ..RunSummary::default()
        };
        let mut content = self.framing.header.clone();
        let mut included = Vec::new();

        for result in ordered {
            summary.record(&result.item.id, &result.outcome);
            if let Some(payload) = result.outcome.payload() {
                content.push_str(&fragment(&result.item, payload));
                included.push(result.item.id.clone());
            }
        }

        content.push_str(&self.framing.footer);

        (CombinedArtifact { content, included }, summary)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BoundedWorkerPool;
    use crate::types::{Locator, Outcome};
    use rand::Rng;

    fn result(index: usize, outcome: Outcome) -> ItemResult {
        ItemResult {
            index,
            item: WorkItem::new(format!("p{index}"), Locator::Url(String::new())),
            outcome,
            elapsed: Duration::ZERO,
        }
    }

    fn text(s: &str) -> Outcome {
        Outcome::Success {
            payload: Payload::Text(s.to_string()),
            attempts: 1,
        }
    }

    fn failed() -> Outcome {
        Outcome::Failure {
            reason: "HTTP 404".into(),
            code: "permanent_error".into(),
            attempts: 1,
        }
    }

    fn as_text(_: &WorkItem, payload: &Payload) -> String {
        String::from_utf8_lossy(payload.as_bytes()).into_owned()
    }

    #[test]
    fn fragments_follow_enumeration_order() {
        let results = vec![result(2, text("C")), result(0, text("A")), result(1, text("B"))];
        let (artifact, summary) = ResultAggregator::new(Framing::new("[", "]")).aggregate(
            &results,
            as_text,
            Duration::from_secs(1),
        );

        assert_eq!(artifact.content, "[ABC]");
        let expected: Vec<ItemId> = vec!["p0".into(), "p1".into(), "p2".into()];
        assert_eq!(artifact.included, expected);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.elapsed, Duration::from_secs(1));
    }

    #[test]
    fn failures_are_summarized_not_included() {
        let results = vec![result(0, text("A")), result(1, failed()), result(2, text("C"))];
        let (artifact, summary) =
            ResultAggregator::new(Framing::default()).aggregate(&results, as_text, Duration::ZERO);

        assert_eq!(artifact.content, "AC");
        assert_eq!(artifact.len(), 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].id.as_str(), "p1");
        assert!(summary.is_consistent());
    }

    #[test]
    fn zero_successes_still_frames() {
        let results = vec![result(0, failed()), result(1, failed())];
        let framing = Framing::podcast("Show");
        let (artifact, summary) =
            ResultAggregator::new(framing.clone()).aggregate(&results, as_text, Duration::ZERO);

        assert!(artifact.is_empty());
        assert_eq!(artifact.content, format!("{}{}", framing.header, framing.footer));
        assert_eq!(summary.failed, 2);
    }

    #[tokio::test]
    async fn random_completion_order_gives_deterministic_artifact() {
        let items: Vec<WorkItem> = (0..12)
            .map(|i| WorkItem::new(format!("p{i:02}"), Locator::Url(String::new())))
            .collect();
        let aggregator = ResultAggregator::new(Framing::new("<", ">"));

        let mut artifacts = Vec::new();
        for _ in 0..3 {
            let results = BoundedWorkerPool::new(6)
                .run(items.clone(), |item| async move {
                    let ms = rand::thread_rng().gen_range(0..15);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Outcome::Success {
                        payload: Payload::Text(format!("{};", item.id)),
                        attempts: 1,
                    }
                })
                .await;
            let (artifact, _) = aggregator.aggregate(&results, as_text, Duration::ZERO);
            artifacts.push(artifact.content);
        }

        let expected: String = (0..12).map(|i| format!("p{i:02};")).collect();
        assert_eq!(artifacts[0], format!("<{expected}>"));
        assert!(artifacts.iter().all(|a| *a == artifacts[0]));
    }
}
