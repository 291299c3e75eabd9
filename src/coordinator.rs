use std::time::Duration;

use futures::future::try_join_all;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::LotsawaError;
use crate::executor::ExecutionError;
use crate::sink::{OutputRecord, RecordSink};
use crate::state_machine::WorkItem;
use crate::ui::RunProgress;

/// Something that can drive work items to a terminal status.
#[allow(async_fn_in_trait)]
pub trait ItemProcessor {
    async fn process(&self, item: WorkItem) -> Result<WorkItem, ExecutionError>;

    /// Drive a whole batch concurrently. All-or-nothing: the first item
    /// failure fails the batch.
    async fn process_batch(&self, items: Vec<WorkItem>) -> Result<Vec<WorkItem>, ExecutionError> {
        try_join_all(items.into_iter().map(|item| self.process(item))).await
    }
}

/// Batch and item retry budgets. The two budgets are independent counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub batch_size: usize,
    pub max_batch_retries: u32,
    pub max_item_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            batch_size: 2,
            max_batch_retries: 3,
            max_item_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Split `items` into consecutive batches of at most `size`, preserving order.
pub fn partition<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub accepted: usize,
    pub force_accepted: usize,
    pub failed: usize,
    pub success_log: String,
    pub failure_log: String,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.accepted + self.force_accepted
    }
}

/// Drives many work items through a processor with cascading degradation:
/// batch attempts first, then each item of an exhausted batch on its own.
/// Results are streamed to the sinks as soon as they are known.
pub struct BatchCoordinator<'a, R, S, F> {
    processor: &'a R,
    policy: RetryPolicy,
    successes: &'a mut S,
    failures: &'a mut F,
    progress: Option<&'a RunProgress>,
}

impl<'a, R, S, F> BatchCoordinator<'a, R, S, F>
where
    R: ItemProcessor,
    S: RecordSink,
    F: RecordSink,
{
    pub fn new(processor: &'a R, policy: RetryPolicy, successes: &'a mut S, failures: &'a mut F) -> Self {
        Self {
            processor,
            policy,
            successes,
            failures,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a RunProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(&mut self, items: Vec<WorkItem>) -> Result<RunSummary, LotsawaError> {
        let mut summary = RunSummary {
            total: items.len(),
            success_log: self.successes.location(),
            failure_log: self.failures.location(),
            ..Default::default()
        };
        let batches = partition(items, self.policy.batch_size);
        let batch_count = batches.len();
        info!(items = summary.total, batches = batch_count, "starting run");

        for (n, batch) in batches.into_iter().enumerate() {
            let number = n + 1;
            if let Some(progress) = self.progress {
                progress.batch(number, batch_count);
            }
            info!(batch = number, size = batch.len(), "processing batch");

            match self.run_batch(number, &batch).await {
                Some(done) => {
                    for item in done {
                        self.record_success(item, &mut summary)?;
                    }
                }
                None => {
                    warn!(batch = number, "batch retries exhausted, processing items individually");
                    for item in batch {
                        self.run_individually(item, &mut summary).await?;
                    }
                }
            }
        }

        info!(
            accepted = summary.accepted,
            force_accepted = summary.force_accepted,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }

    async fn run_batch(&self, number: usize, batch: &[WorkItem]) -> Option<Vec<WorkItem>> {
        let max = self.policy.max_batch_retries;
        for attempt in 1..=max {
            match self.processor.process_batch(batch.to_vec()).await {
                Ok(done) => return Some(done),
                Err(error) => {
                    warn!(batch = number, attempt, max, %error, "batch attempt failed");
                    if attempt < max {
                        self.notify_retry(&format!("batch {number}"), attempt, max, &error);
                        sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }
        None
    }

    async fn run_individually(
        &mut self,
        item: WorkItem,
        summary: &mut RunSummary,
    ) -> Result<(), LotsawaError> {
        let max = self.policy.max_item_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.processor.process(item.clone()).await {
                Ok(done) => return self.record_success(done, summary),
                Err(error) if attempt < max => {
                    warn!(item = item.index(), attempt, max, %error, "item attempt failed");
                    self.notify_retry(&format!("item {}", item.index()), attempt, max, &error);
                    sleep(self.policy.retry_delay).await;
                    attempt += 1;
                }
                Err(error) => return self.record_failure(error, summary),
            }
        }
    }

    fn record_success(&mut self, item: WorkItem, summary: &mut RunSummary) -> Result<(), LotsawaError> {
        if let Some(progress) = self.progress {
            progress.item_finished(&item);
        }
        let forced = item.forced();
        self.successes.append(&OutputRecord::success(item))?;
        if forced {
            summary.force_accepted += 1;
        } else {
            summary.accepted += 1;
        }
        Ok(())
    }

    fn record_failure(&mut self, error: ExecutionError, summary: &mut RunSummary) -> Result<(), LotsawaError> {
        let ExecutionError {
            stage,
            source,
            partial,
        } = error;
        let mut item = *partial;
        item.fail();
        error!(item = item.index(), %stage, error = %source, "item permanently failed");
        if let Some(progress) = self.progress {
            progress.item_failed(item.index(), &source.to_string());
        }
        self.failures
            .append(&OutputRecord::failure(item, stage, &source))?;
        summary.failed += 1;
        Ok(())
    }

    fn notify_retry(&self, scope: &str, attempt: u32, max: u32, error: &ExecutionError) {
        if let Some(progress) = self.progress {
            progress.retry(scope, attempt, max, &error.source.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::generation::GenerationError;
    use crate::state_machine::{ItemStatus, Stage};
    use proptest::prelude::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Fails the listed indices every time they are processed.
    #[derive(Default)]
    struct ScriptedProcessor {
        always_fail: HashSet<usize>,
        fail_times: Mutex<HashMap<usize, u32>>,
        processed: Mutex<Vec<usize>>,
        batches: Mutex<Vec<Vec<usize>>>,
    }

    impl ScriptedProcessor {
        fn failing(indices: &[usize]) -> Self {
            Self {
                always_fail: indices.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn attempts(&self, index: usize) -> usize {
            self.processed.lock().unwrap().iter().filter(|i| **i == index).count()
        }
    }

    impl ItemProcessor for ScriptedProcessor {
        async fn process(&self, mut item: WorkItem) -> Result<WorkItem, ExecutionError> {
            let index = item.index();
            self.processed.lock().unwrap().push(index);
            let transient = self
                .fail_times
                .lock()
                .unwrap()
                .get_mut(&index)
                .map(|remaining| {
                    let fail = *remaining > 0;
                    *remaining = remaining.saturating_sub(1);
                    fail
                })
                .unwrap_or(false);
            if self.always_fail.contains(&index) || transient {
                return Err(ExecutionError {
                    stage: Stage::Evaluate,
                    source: GenerationError::malformed("Evaluation", "missing field `grade`"),
                    partial: Box::new(item),
                });
            }
            item.accept();
            Ok(item)
        }

        async fn process_batch(&self, items: Vec<WorkItem>) -> Result<Vec<WorkItem>, ExecutionError> {
            self.batches
                .lock()
                .unwrap()
                .push(items.iter().map(WorkItem::index).collect());
            try_join_all(items.into_iter().map(|item| self.process(item))).await
        }
    }

    fn items(indices: std::ops::RangeInclusive<usize>) -> Vec<WorkItem> {
        indices.map(|i| WorkItem::new(i, format!("text {i}"), "English")).collect()
    }

    fn policy(batch_size: usize, batch_retries: u32, item_retries: u32) -> RetryPolicy {
        RetryPolicy {
            batch_size,
            max_batch_retries: batch_retries,
            max_item_retries: item_retries,
            retry_delay: Duration::ZERO,
        }
    }

    fn indices(records: &[OutputRecord]) -> Vec<usize> {
        records.iter().map(|r| r.item.index()).collect()
    }

    #[tokio::test]
    async fn five_items_with_one_bad_item() {
        let processor = ScriptedProcessor::failing(&[4]);
        let mut successes: Vec<OutputRecord> = Vec::new();
        let mut failures: Vec<OutputRecord> = Vec::new();

        let summary = BatchCoordinator::new(&processor, policy(2, 1, 2), &mut successes, &mut failures)
            .run(items(1..=5))
            .await
            .unwrap();

        assert_eq!(indices(&successes), vec![1, 2, 3, 5]);
        assert_eq!(indices(&failures), vec![4]);
        assert_eq!(summary.succeeded(), 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 5);

        assert_eq!(
            *processor.batches.lock().unwrap(),
            vec![vec![1, 2], vec![3, 4], vec![5]]
        );
        // One batch attempt plus two individual attempts.
        assert_eq!(processor.attempts(4), 3);
        // One batch attempt plus one individual success.
        assert_eq!(processor.attempts(3), 2);

        let failed = &failures[0];
        assert_eq!(failed.item.status(), ItemStatus::PermanentlyFailed);
        assert_eq!(failed.failure_kind, Some(FailureKind::Business));
        assert_eq!(failed.failed_stage, Some(Stage::Evaluate));
        assert!(successes.iter().all(|r| r.item.status() == ItemStatus::Accepted));
    }

    #[tokio::test]
    async fn transient_batch_failure_recovers_at_batch_level() {
        let processor = ScriptedProcessor::default();
        processor.fail_times.lock().unwrap().insert(2, 1);
        let mut successes: Vec<OutputRecord> = Vec::new();
        let mut failures: Vec<OutputRecord> = Vec::new();

        let summary = BatchCoordinator::new(&processor, policy(2, 2, 1), &mut successes, &mut failures)
            .run(items(1..=2))
            .await
            .unwrap();

        assert_eq!(summary.succeeded(), 2);
        assert!(failures.is_empty());
        assert_eq!(processor.batches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_batch_retries_degrades_immediately() {
        let processor = ScriptedProcessor::default();
        let mut successes: Vec<OutputRecord> = Vec::new();
        let mut failures: Vec<OutputRecord> = Vec::new();

        BatchCoordinator::new(&processor, policy(3, 0, 0), &mut successes, &mut failures)
            .run(items(1..=3))
            .await
            .unwrap();

        assert!(processor.batches.lock().unwrap().is_empty());
        assert_eq!(indices(&successes), vec![1, 2, 3]);
        // Zero item retries still means one attempt each.
        assert_eq!(processor.attempts(2), 1);
    }

    #[tokio::test]
    async fn terminal_exclusivity_and_membership() {
        let processor = ScriptedProcessor::failing(&[2, 3, 7]);
        let mut successes: Vec<OutputRecord> = Vec::new();
        let mut failures: Vec<OutputRecord> = Vec::new();

        let summary = BatchCoordinator::new(&processor, policy(3, 2, 2), &mut successes, &mut failures)
            .run(items(1..=8))
            .await
            .unwrap();

        let ok: HashSet<usize> = indices(&successes).into_iter().collect();
        let failed: HashSet<usize> = indices(&failures).into_iter().collect();
        assert!(ok.is_disjoint(&failed));
        assert_eq!(ok.len() + failed.len(), 8);
        assert_eq!(failed, HashSet::from([2, 3, 7]));
        assert_eq!(summary.succeeded() + summary.failed, summary.total);
    }

    #[tokio::test]
    async fn forced_items_are_counted_separately() {
        struct Forcing;
        impl ItemProcessor for Forcing {
            async fn process(&self, mut item: WorkItem) -> Result<WorkItem, ExecutionError> {
                if item.index() % 2 == 0 {
                    item.mark_forced();
                }
                item.accept();
                Ok(item)
            }
        }
        let mut successes: Vec<OutputRecord> = Vec::new();
        let mut failures: Vec<OutputRecord> = Vec::new();
        let summary = BatchCoordinator::new(&Forcing, policy(2, 1, 1), &mut successes, &mut failures)
            .run(items(1..=4))
            .await
            .unwrap();

        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.force_accepted, 2);
        assert!(successes.iter().filter(|r| r.item.forced()).count() == 2);
    }

    type EventLog = std::sync::Arc<Mutex<Vec<String>>>;

    struct EventSink {
        log: EventLog,
        tag: &'static str,
    }

    impl RecordSink for EventSink {
        fn append(&mut self, record: &OutputRecord) -> Result<(), LotsawaError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} {}", self.tag, record.item.index()));
            Ok(())
        }

        fn location(&self) -> String {
            self.tag.to_string()
        }
    }

    struct EventProcessor {
        log: EventLog,
        failing: usize,
    }

    impl ItemProcessor for EventProcessor {
        async fn process(&self, mut item: WorkItem) -> Result<WorkItem, ExecutionError> {
            self.log.lock().unwrap().push(format!("process {}", item.index()));
            if item.index() == self.failing {
                return Err(ExecutionError {
                    stage: Stage::Synthesize,
                    source: GenerationError::Transient("unavailable".into()),
                    partial: Box::new(item),
                });
            }
            item.accept();
            Ok(item)
        }
    }

    #[tokio::test]
    async fn results_are_appended_before_later_work_starts() {
        let log = EventLog::default();
        let processor = EventProcessor {
            log: log.clone(),
            failing: 3,
        };
        let mut successes = EventSink {
            log: log.clone(),
            tag: "ok",
        };
        let mut failures = EventSink {
            log: log.clone(),
            tag: "fail",
        };

        BatchCoordinator::new(&processor, policy(2, 1, 1), &mut successes, &mut failures)
            .run(items(1..=5))
            .await
            .unwrap();

        let events = log.lock().unwrap().clone();
        let first = |event: &str| events.iter().position(|e| e == event).unwrap();
        let last = |event: &str| events.iter().rposition(|e| e == event).unwrap();

        // Batch 1 is on disk before batch 2 begins.
        assert!(first("ok 1") < first("process 3"));
        assert!(first("ok 2") < first("process 3"));
        // Degraded items are recorded one at a time.
        assert!(first("fail 3") < last("process 4"));
        assert!(first("ok 4") < first("process 5"));
        assert_eq!(events.last().map(String::as_str), Some("ok 5"));
    }

    #[test]
    fn partition_keeps_order_and_remainder() {
        let batches = partition((1..=5).collect(), 2);
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert!(partition(Vec::<u8>::new(), 4).is_empty());
        assert_eq!(partition(vec![1, 2], 0), vec![vec![1], vec![2]]);
    }

    #[test]
    fn partition_reassembles_exactly() {
        let mut runner = proptest::test_runner::TestRunner::default();

        runner
            .run(
                &(proptest::collection::vec(any::<u32>(), 0..64), 1usize..10),
                |(items, size)| {
                    let batches = partition(items.clone(), size);

                    assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));
                    if let Some((_, full)) = batches.split_last() {
                        assert!(full.iter().all(|b| b.len() == size));
                    }
                    let rejoined: Vec<u32> = batches.into_iter().flatten().collect();
                    assert_eq!(rejoined, items);

                    Ok(())
                },
            )
            .unwrap();
    }
}
