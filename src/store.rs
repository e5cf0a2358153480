//! Append-only metric record store
//!
//! Producers (parallel test runners) ingest batches without taking a lock:
//! a batch reserves a contiguous sequence range with one atomic `fetch_add`
//! and is pushed onto a lock-free `SegQueue`. Readers drain the queue into an
//! ordered log and only expose the contiguous prefix below the read sequence
//! number, so a batch whose predecessor has reserved but not yet published
//! its range stays invisible until the gap closes.
//!
//! ```text
//! producer A ── reserve 0..3 ──► SegQueue ─┐
//! producer B ── reserve 3..5 ──► SegQueue ─┼─► reader: drain → pending → log[base..watermark]
//! producer C ── reserve 5..9 ──► (not yet) ┘
//! ```
//!
//! Long-lived stores can drop old records with [`MetricStore::evict_before`];
//! sequence numbers are never reused, so `base` moves up instead.

use crate::error::Result;
use crate::record::{now_nanos, MetricKind, MetricRecord, RawExecutionResult};
use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Which records a window covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSelector {
    /// Every published record
    All,
    /// The most recently ingested `n` records
    LastN(usize),
    /// Records with `timestamp_nanos >= t`
    SinceTimestamp(u64),
    /// Records whose sequence number falls in the range
    Sequences(Range<u64>),
}

impl fmt::Display for WindowSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowSelector::All => write!(f, "all records"),
            WindowSelector::LastN(n) => write!(f, "last {} records", n),
            WindowSelector::SinceTimestamp(t) => write!(f, "records since t={}ns", t),
            WindowSelector::Sequences(r) => write!(f, "sequences {}..{}", r.start, r.end),
        }
    }
}

/// Bounded, ordered view over records
///
/// Ordered by timestamp; equal timestamps keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct MetricWindow {
    label: String,
    records: Vec<Arc<MetricRecord>>,
}

impl MetricWindow {
    fn from_shared(label: String, mut records: Vec<Arc<MetricRecord>>) -> Self {
        records.sort_by_key(|r| (r.timestamp_nanos, r.sequence));
        Self { label, records }
    }

    /// Build a window from records that never went through a store
    pub fn from_records(label: impl Into<String>, records: Vec<MetricRecord>) -> Self {
        Self::from_shared(label.into(), records.into_iter().map(Arc::new).collect())
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricRecord> {
        self.records.iter().map(|r| r.as_ref())
    }

    /// Values of `metric` for every record that measured it, in window order
    pub fn values(&self, metric: MetricKind) -> Vec<f64> {
        self.iter().filter_map(|r| r.value(metric)).collect()
    }

    pub fn descriptor(&self) -> WindowDescriptor {
        WindowDescriptor {
            label: self.label.clone(),
            records: self.records.len(),
            first_sequence: self.records.iter().map(|r| r.sequence).min(),
            last_sequence: self.records.iter().map(|r| r.sequence).max(),
            start_timestamp_nanos: self.records.first().map(|r| r.timestamp_nanos),
            end_timestamp_nanos: self.records.last().map(|r| r.timestamp_nanos),
        }
    }
}

/// Serializable description of a window's extent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDescriptor {
    pub label: String,
    pub records: usize,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub start_timestamp_nanos: Option<u64>,
    pub end_timestamp_nanos: Option<u64>,
}

/// Consistent read view of the store as of one read sequence number
///
/// Holds the records from `first_sequence()` up to the read sequence, or a
/// narrower range when taken with [`MetricStore::snapshot_range`].
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Sequence number of `records[0]`
    base: u64,
    records: Vec<Arc<MetricRecord>>,
    read_sequence: u64,
}

impl StoreSnapshot {
    /// Sequence number below which every record is visible
    pub fn read_sequence(&self) -> u64 {
        self.read_sequence
    }

    /// Lowest sequence number held by this snapshot
    pub fn first_sequence(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn window(&self, selector: &WindowSelector) -> MetricWindow {
        select(self.base, &self.records, selector)
    }
}

#[derive(Debug, Default)]
struct CommittedLog {
    /// Sequence number of `records[0]`; everything below was evicted
    base: u64,
    /// Records `base..watermark`; index plus `base` equals sequence number
    records: Vec<Arc<MetricRecord>>,
    /// Published batches waiting for an earlier range to arrive
    pending: BTreeMap<u64, Vec<Arc<MetricRecord>>>,
}

impl CommittedLog {
    fn watermark(&self) -> u64 {
        self.base + self.records.len() as u64
    }

    fn absorb(&mut self, queue: &SegQueue<(u64, Vec<Arc<MetricRecord>>)>) {
        while let Some((start, batch)) = queue.pop() {
            self.pending.insert(start, batch);
        }
        loop {
            let watermark = self.watermark();
            let Some(entry) = self.pending.first_entry() else {
                break;
            };
            if *entry.key() != watermark {
                break;
            }
            let batch = entry.remove();
            self.records.extend(batch);
        }
    }

    /// Index range of `sequences` within `records`, clipped to what is held
    fn index_range(&self, sequences: &Range<u64>) -> Range<usize> {
        local_range(self.base, self.records.len(), sequences)
    }
}

/// Append-only, concurrently writable store of [`MetricRecord`]s
///
/// # Example
///
/// ```
/// use testlens::record::RawExecutionResult;
/// use testlens::store::{MetricStore, WindowSelector};
///
/// let store = MetricStore::new();
/// store.ingest(&[
///     RawExecutionResult::new("login", 1.2, "passed"),
///     RawExecutionResult::new("checkout", 3.4, "failed"),
/// ])?;
///
/// let window = store.window(&WindowSelector::LastN(1));
/// assert_eq!(window.len(), 1);
/// # Ok::<(), testlens::AnalysisError>(())
/// ```
#[derive(Debug, Default)]
pub struct MetricStore {
    next_sequence: AtomicU64,
    published: SegQueue<(u64, Vec<Arc<MetricRecord>>)>,
    log: Mutex<CommittedLog>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a batch
    ///
    /// The whole batch is validated before a sequence range is reserved, so a
    /// rejected batch leaves the store untouched. Returns the sequence range
    /// assigned to the batch.
    pub fn ingest(&self, results: &[RawExecutionResult]) -> Result<Range<u64>> {
        let pending = results
            .iter()
            .enumerate()
            .map(|(i, raw)| MetricRecord::validate(raw, i))
            .collect::<Result<Vec<_>>>()?;

        let len = pending.len() as u64;
        let start = self.next_sequence.fetch_add(len, Ordering::AcqRel);
        if len == 0 {
            return Ok(start..start);
        }

        let now = now_nanos();
        let batch: Vec<Arc<MetricRecord>> = pending
            .into_iter()
            .enumerate()
            .map(|(i, p)| Arc::new(p.seal(start + i as u64, now)))
            .collect();

        self.published.push((start, batch));
        tracing::trace!(start, len, "ingested batch");

        Ok(start..start + len)
    }

    /// Take a consistent snapshot of every retained record
    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshot_range(0..u64::MAX)
    }

    /// Take a consistent snapshot holding only the records in `sequences`
    ///
    /// Only the selected records are cloned out of the log. The snapshot's
    /// read sequence is still the store's, so callers can tell whether the
    /// range is fully published yet.
    pub fn snapshot_range(&self, sequences: Range<u64>) -> StoreSnapshot {
        let mut log = self.lock_log();
        log.absorb(&self.published);
        let held = log.index_range(&sequences);
        StoreSnapshot {
            base: log.base + held.start as u64,
            records: log.records[held].to_vec(),
            read_sequence: log.watermark(),
        }
    }

    /// Build a window without cloning the whole log
    pub fn window(&self, selector: &WindowSelector) -> MetricWindow {
        let mut log = self.lock_log();
        log.absorb(&self.published);
        select(log.base, &log.records, selector)
    }

    /// Drop every visible record with a sequence number below `sequence`
    ///
    /// Records not yet visible are never dropped. Windows and snapshots taken
    /// earlier keep their records. Returns how many records were evicted.
    pub fn evict_before(&self, sequence: u64) -> usize {
        let mut log = self.lock_log();
        log.absorb(&self.published);
        let cut = log.index_range(&(0..sequence)).end;
        if cut == 0 {
            return 0;
        }
        log.records.drain(..cut);
        log.base += cut as u64;
        tracing::debug!(evicted = cut, first_sequence = log.base, "evicted records");
        cut
    }

    /// Number of visible records still retained
    pub fn len(&self) -> usize {
        let mut log = self.lock_log();
        log.absorb(&self.published);
        log.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence number below which every record is visible
    pub fn read_sequence(&self) -> u64 {
        let mut log = self.lock_log();
        log.absorb(&self.published);
        log.watermark()
    }

    /// Lowest sequence number still retained
    pub fn first_sequence(&self) -> u64 {
        self.lock_log().base
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, CommittedLog> {
        // Every mutation completes under the lock before any user code runs.
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn local_range(base: u64, len: usize, sequences: &Range<u64>) -> Range<usize> {
    let clip = |seq: u64| (seq.saturating_sub(base)).min(len as u64) as usize;
    let end = clip(sequences.end);
    clip(sequences.start).min(end)..end
}

/// `records[0]` has sequence number `base`
fn select(base: u64, records: &[Arc<MetricRecord>], selector: &WindowSelector) -> MetricWindow {
    let chosen: Vec<Arc<MetricRecord>> = match selector {
        WindowSelector::All => records.to_vec(),
        WindowSelector::LastN(n) => {
            let skip = records.len().saturating_sub(*n);
            records[skip..].to_vec()
        }
        WindowSelector::SinceTimestamp(t) => records
            .iter()
            .filter(|r| r.timestamp_nanos >= *t)
            .cloned()
            .collect(),
        WindowSelector::Sequences(range) => records[local_range(base, records.len(), range)].to_vec(),
    };
    MetricWindow::from_shared(selector.to_string(), chosen)
}
