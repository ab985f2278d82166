// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::aggregate::Framing;
use crate::retry::Sleeper;
use crate::types::{Locator, Payload};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _: Duration) {}
}

/// Source returning a fixed list, or an error
struct FixedSource(std::result::Result<Vec<WorkItem>, String>);

impl FixedSource {
    fn ids(n: usize) -> Self {
        Self(Ok((0..n)
            .map(|i| WorkItem::new(format!("p{i:02}"), Locator::Url(format!("http://x/{i}"))))
            .collect()))
    }
}

#[async_trait]
impl WorkItemSource for FixedSource {
    async fn enumerate(&self, _ctx: &RunContext) -> Result<Vec<WorkItem>> {
        match &self.0 {
            Ok(items) => Ok(items.clone()),
            Err(msg) => Err(Error::Enumeration(msg.clone())),
        }
    }
}

/// Pipeline whose per-item behavior is scripted by id
#[derive(Default)]
struct ScriptedPipeline {
    /// Ids that always fail permanently
    permanent: HashSet<String>,
    /// Ids that always fail transiently
    transient: HashSet<String>,
    /// Ids that fail transiently this many times before succeeding
    flaky: HashMap<String, u32>,
    calls: Mutex<HashMap<String, u32>>,
    random_delay: bool,
    throttled: bool,
}

impl ScriptedPipeline {
    fn calls_for(&self, id: &str) -> u32 {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Pipeline for ScriptedPipeline {
    fn name(&self) -> &str {
        "scripted"
    }

    fn category(&self) -> &str {
        "scripts"
    }

    fn item_file_name(&self, item: &WorkItem) -> String {
        format!("{}_content.txt", crate::output::safe_file_stem(item.id.as_str()))
    }

    fn combined_file_name(&self, run_date: &str) -> String {
        format!("combined_{run_date}.txt")
    }

    fn framing(&self) -> Framing {
        Framing::new("HEAD\n", "FOOT")
    }

    fn combined_fragment(&self, _item: &WorkItem, payload: &Payload) -> String {
        format!("{}\n", String::from_utf8_lossy(payload.as_bytes()))
    }

    async fn process(&self, item: &WorkItem) -> Result<Payload> {
        let id = item.id.as_str();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if self.random_delay {
            let ms = rand::thread_rng().gen_range(0..20);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if self.permanent.contains(id) {
            return Err(Error::Permanent("HTTP 404".into()));
        }
        if self.transient.contains(id) {
            return Err(Error::Transient("HTTP 503".into()));
        }
        if let Some(&failures) = self.flaky.get(id)
            && call <= failures
        {
            return Err(Error::Transient("connection reset".into()));
        }
        Ok(Payload::Text(format!("payload {id}")))
    }

    fn throttled(&self) -> bool {
        self.throttled
    }
}

fn context(root: &std::path::Path, concurrency: usize) -> RunContext {
    RunContext::new(root, concurrency).with_run_date("20241018")
}

fn orchestrator(ctx: RunContext) -> RunOrchestrator {
    let retry = RetryingClient::new(RetryPolicy::from(&ctx.retry)).with_sleeper(Arc::new(NoSleep));
    RunOrchestrator::new(ctx)
        .with_retry_client(retry)
        .with_rate_limiter(RateLimiter::disabled())
}

#[tokio::test]
async fn ten_items_two_permanent_failures() {
    let temp = TempDir::new().unwrap();
    let pipeline = Arc::new(ScriptedPipeline {
        permanent: ["p03".to_string(), "p07".to_string()].into(),
        random_delay: true,
        ..Default::default()
    });

    let mut orch = orchestrator(context(temp.path(), 5));
    let report = orch
        .run(&FixedSource::ids(10), pipeline.clone())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Done);
    assert_eq!(orch.state(), RunState::Done);
    assert_eq!(report.summary.total, 10);
    assert_eq!(report.summary.succeeded, 8);
    assert_eq!(report.summary.failed, 2);
    assert!(report.summary.is_consistent());

    let failed: Vec<_> = report.summary.failures.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(failed, ["p03", "p07"]);
    assert!(report.summary.failures.iter().all(|f| f.attempts == 1));
    assert_eq!(pipeline.calls_for("p03"), 1, "permanent errors are not retried");

    let combined = std::fs::read_to_string(report.combined_path.unwrap()).unwrap();
    let expected_ids = ["p00", "p01", "p02", "p04", "p05", "p06", "p08", "p09"];
    let mut expected = String::from("HEAD\n");
    for id in expected_ids {
        expected.push_str(&format!("payload {id}\n"));
    }
    expected.push_str("FOOT");
    assert_eq!(combined, expected);

    assert_eq!(report.item_paths.len(), 8);
    let dir = temp.path().join("scripts/20241018");
    assert_eq!(report.output_dir.as_deref(), Some(dir.as_path()));
    assert_eq!(
        std::fs::read_to_string(dir.join("p00_content.txt")).unwrap(),
        "payload p00"
    );
    assert!(!dir.join("p03_content.txt").exists());
}

#[tokio::test]
async fn flaky_item_succeeds_on_third_attempt() {
    let temp = TempDir::new().unwrap();
    let mut ctx = context(temp.path(), 2);
    ctx.retry.max_attempts = 5;
    ctx.retry.initial_delay = Duration::from_millis(100);

    let pipeline = Arc::new(ScriptedPipeline {
        flaky: [("p01".to_string(), 2)].into(),
        ..Default::default()
    });

    let mut orch = orchestrator(ctx);
    let report = orch.run(&FixedSource::ids(3), pipeline.clone()).await.unwrap();

    assert_eq!(report.summary.succeeded, 3);
    assert_eq!(pipeline.calls_for("p01"), 3);
    assert_eq!(pipeline.calls_for("p00"), 1);
}

#[tokio::test]
async fn always_transient_stops_at_max_attempts() {
    let temp = TempDir::new().unwrap();
    let mut ctx = context(temp.path(), 2);
    ctx.retry.max_attempts = 4;

    let pipeline = Arc::new(ScriptedPipeline {
        transient: ["p00".to_string()].into(),
        ..Default::default()
    });

    let mut orch = orchestrator(ctx);
    let report = orch.run(&FixedSource::ids(2), pipeline.clone()).await.unwrap();

    assert_eq!(report.summary.failed, 1);
    let failure = &report.summary.failures[0];
    assert_eq!(failure.attempts, 4);
    assert_eq!(failure.code, "transient_error");
    assert_eq!(pipeline.calls_for("p00"), 4);
}

#[tokio::test]
async fn empty_enumeration_aborts_early_without_output() {
    let temp = TempDir::new().unwrap();
    let mut orch = orchestrator(context(temp.path(), 5));

    let report = orch
        .run(&FixedSource(Ok(Vec::new())), Arc::new(ScriptedPipeline::default()))
        .await
        .unwrap();

    assert_eq!(report.state, RunState::AbortedEarly);
    assert_eq!(report.summary.total, 0);
    assert!(report.combined_path.is_none());
    assert!(!temp.path().join("scripts").exists(), "no output directory");
}

#[tokio::test]
async fn enumeration_failure_fails_the_run() {
    let temp = TempDir::new().unwrap();
    let mut orch = orchestrator(context(temp.path(), 5));

    let err = orch
        .run(
            &FixedSource(Err("listing returned HTTP 500".into())),
            Arc::new(ScriptedPipeline::default()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Enumeration(_)));
    assert_eq!(orch.state(), RunState::Failed);
    assert!(!temp.path().join("scripts").exists());
}

#[tokio::test]
async fn orchestrator_runs_only_once() {
    let temp = TempDir::new().unwrap();
    let mut orch = orchestrator(context(temp.path(), 1));
    let pipeline = Arc::new(ScriptedPipeline::default());

    orch.run(&FixedSource::ids(1), pipeline.clone()).await.unwrap();
    assert!(orch.run(&FixedSource::ids(1), pipeline).await.is_err());
}

#[tokio::test]
async fn rerun_produces_identical_artifacts() {
    let temp = TempDir::new().unwrap();
    let mut contents = Vec::new();

    for _ in 0..2 {
        let pipeline = Arc::new(ScriptedPipeline {
            permanent: ["p02".to_string()].into(),
            random_delay: true,
            ..Default::default()
        });
        let report = orchestrator(context(temp.path(), 4))
            .run(&FixedSource::ids(8), pipeline)
            .await
            .unwrap();
        contents.push(std::fs::read_to_string(report.combined_path.unwrap()).unwrap());
    }

    assert_eq!(contents[0], contents[1]);
}

#[tokio::test]
async fn all_failures_still_write_framed_artifact() {
    let temp = TempDir::new().unwrap();
    let pipeline = Arc::new(ScriptedPipeline {
        permanent: ["p00".to_string(), "p01".to_string()].into(),
        ..Default::default()
    });

    let report = orchestrator(context(temp.path(), 2))
        .run(&FixedSource::ids(2), pipeline)
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.summary.succeeded, 0);
    assert_eq!(
        std::fs::read_to_string(report.combined_path.unwrap()).unwrap(),
        "HEAD\nFOOT"
    );
}

#[tokio::test]
async fn cancelled_run_accounts_for_every_item() {
    let temp = TempDir::new().unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let ctx = context(temp.path(), 3).with_cancellation(token);

    let pipeline = Arc::new(ScriptedPipeline::default());
    let report = orchestrator(ctx)
        .run(&FixedSource::ids(6), pipeline.clone())
        .await
        .unwrap();

    assert_eq!(report.summary.total, 6);
    assert_eq!(report.summary.failed, 6);
    assert!(report.summary.failures.iter().all(|f| f.attempts == 0));
    assert_eq!(pipeline.calls_for("p00"), 0);
}

#[tokio::test]
async fn throttled_pipeline_goes_through_rate_limiter() {
    #[derive(Default)]
    struct CountingSleeper(AtomicU32);

    #[async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, _: Duration) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), 1);
    let sleeper = Arc::new(CountingSleeper::default());
    let limiter = RateLimiter::new(&ctx.rate_limit).with_sleeper(sleeper.clone());

    let pipeline = Arc::new(ScriptedPipeline {
        throttled: true,
        ..Default::default()
    });
    orchestrator(ctx)
        .with_rate_limiter(limiter)
        .run(&FixedSource::ids(3), pipeline)
        .await
        .unwrap();

    assert_eq!(sleeper.0.load(Ordering::SeqCst), 3, "one pause per item");
}

#[tokio::test]
async fn ids_sanitizing_to_the_same_name_keep_separate_files() {
    let temp = TempDir::new().unwrap();
    let items = ["a:b", "a_b"]
        .into_iter()
        .map(|id| WorkItem::new(id, Locator::Url(format!("http://x/{id}"))))
        .collect();

    let mut orch = orchestrator(context(temp.path(), 2));
    let report = orch
        .run(&FixedSource(Ok(items)), Arc::new(ScriptedPipeline::default()))
        .await
        .unwrap();

    assert_eq!(report.summary.succeeded, 2);
    let dir = temp.path().join("scripts/20241018");
    assert_eq!(
        report.item_paths,
        [dir.join("a_b_content.txt"), dir.join("a_b_content_2.txt")]
    );
    assert_eq!(
        std::fs::read_to_string(dir.join("a_b_content.txt")).unwrap(),
        "payload a:b"
    );
    assert_eq!(
        std::fs::read_to_string(dir.join("a_b_content_2.txt")).unwrap(),
        "payload a_b"
    );
}

#[tokio::test]
async fn unwritable_item_file_is_reported_as_failed_item() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("scripts/20241018");
    // A directory in the way makes the rename onto this path fail
    std::fs::create_dir_all(dir.join("p01_content.txt")).unwrap();

    let mut orch = orchestrator(context(temp.path(), 3));
    let report = orch
        .run(&FixedSource::ids(3), Arc::new(ScriptedPipeline::default()))
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed, 1);
    assert!(report.summary.is_consistent());

    let failure = &report.summary.failures[0];
    assert_eq!(failure.id.as_str(), "p01");
    assert_eq!(failure.code, "io_error");
    assert_eq!(failure.attempts, 1);

    let combined = std::fs::read_to_string(report.combined_path.unwrap()).unwrap();
    assert_eq!(combined, "HEAD\npayload p00\npayload p02\nFOOT");
    assert_eq!(report.item_paths.len(), 2);
}
