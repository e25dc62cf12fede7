//! History source: streams a device's samples into a fold.
//!
//! The source owns the scan; the aggregation owns the state. A scan pushes
//! every row into a [`SampleVisitor`] in timestamp order and signals the end
//! of the stream exactly once, including when no row matched.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{QueryRange, Sample};

/// Receiver of a streamed scan.
pub trait SampleVisitor: Send {
    /// Called once per row, in scan order.
    fn on_sample(&mut self, sample: Sample);

    /// Called exactly once after the last row.
    fn on_complete(&mut self);
}

/// Visitor built from an accumulator and two plain functions.
///
/// ```
/// use xpl_history::db::repository::{FoldVisitor, SampleVisitor};
/// use xpl_history::models::Sample;
/// use chrono::Utc;
///
/// let mut visitor = FoldVisitor::new(0usize, |n: &mut usize, _s: Sample| *n += 1, |_n: &mut usize| {});
/// visitor.on_sample(Sample::new(1.0, Utc::now()));
/// visitor.on_complete();
/// assert_eq!(visitor.into_inner(), 1);
/// ```
pub struct FoldVisitor<A, S, C> {
    acc: A,
    step: S,
    finish: C,
    completed: bool,
}

impl<A, S, C> FoldVisitor<A, S, C>
where
    S: FnMut(&mut A, Sample),
    C: FnMut(&mut A),
{
    pub fn new(acc: A, step: S, finish: C) -> Self {
        Self {
            acc,
            step,
            finish,
            completed: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn into_inner(self) -> A {
        self.acc
    }
}

impl<A, S, C> SampleVisitor for FoldVisitor<A, S, C>
where
    A: Send,
    S: FnMut(&mut A, Sample) + Send,
    C: FnMut(&mut A) + Send,
{
    fn on_sample(&mut self, sample: Sample) {
        (self.step)(&mut self.acc, sample);
    }

    fn on_complete(&mut self) {
        if !self.completed {
            self.completed = true;
            (self.finish)(&mut self.acc);
        }
    }
}

/// Visitor that keeps every sample, used for raw history reads.
#[derive(Debug, Default)]
pub struct SampleCollector {
    samples: Vec<Sample>,
    completed: bool,
}

impl SampleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

impl SampleVisitor for SampleCollector {
    fn on_sample(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    fn on_complete(&mut self) {
        self.completed = true;
    }
}

/// Read access to stored samples.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Check that the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Stream the samples of `device_key` matching `range` into `visitor`.
    ///
    /// Rows are delivered in strict timestamp order (ascending unless the
    /// range asks for descending), `date_min` inclusive and `date_max`
    /// exclusive, truncated to `limit`. `on_complete` is called once after the
    /// last row. On error the visitor state must be discarded by the caller.
    ///
    /// # Errors
    /// * `NotFound` when the device key has never been stored.
    async fn fetch(
        &self,
        device_key: &str,
        range: &QueryRange,
        visitor: &mut dyn SampleVisitor,
    ) -> RepositoryResult<()>;

    /// Most recent sample of `device_key`, `None` when the device has no
    /// samples.
    ///
    /// # Errors
    /// * `NotFound` when the device key has never been stored.
    async fn last_sample(&self, device_key: &str) -> RepositoryResult<Option<Sample>>;

    /// Keys of every known device, sorted.
    async fn list_devices(&self) -> RepositoryResult<Vec<String>>;
}
