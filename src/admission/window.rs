use std::collections::BTreeMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::identity::IdentityKind;

// Scheduled task owned by a record or a block. Aborted when dropped,
// so removing the owner from its window cancels the task.
pub(crate) struct Timer(JoinHandle<()>);

impl Timer {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }

    /// Aborting an already finished or aborted task is a no-op.
    pub(crate) fn cancel(&self) {
        self.0.abort();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// One tracked request
pub(crate) struct Record {
    pub(crate) inserted_at: Instant,
    // id of the record inserted right after this one
    pub(crate) successor: Option<u64>,
    pub(crate) expiry: Timer,
}

pub(crate) struct Block {
    pub(crate) id: u64,
    pub(crate) start: Instant,
    pub(crate) end: Instant,
    pub(crate) timer: Timer,
}

/// Rate-limit state for one identity.
///
/// Record ids come from a controller-wide counter, so key order in `records`
/// is insertion order and a timer belonging to an older window for the same
/// identity never matches a live record.
pub(crate) struct Window {
    pub(crate) kind: IdentityKind,
    pub(crate) records: BTreeMap<u64, Record>,
    pub(crate) last_request: Instant,
    pub(crate) block: Option<Block>,
}

impl Window {
    pub(crate) fn new(kind: IdentityKind, now: Instant) -> Self {
        Self {
            kind,
            records: BTreeMap::new(),
            last_request: now,
            block: None,
        }
    }

    /// Appends a record and links the previous tail to it.
    pub(crate) fn push_record(&mut self, id: u64, inserted_at: Instant, expiry: Timer) {
        if let Some((_, tail)) = self.records.iter_mut().next_back() {
            tail.successor = Some(id);
        }
        self.records.insert(
            id,
            Record {
                inserted_at,
                successor: None,
                expiry,
            },
        );
        self.last_request = inserted_at;
    }

    /// Installs a block, replacing (and cancelling) any previous one.
    pub(crate) fn open_block(&mut self, block: Block) {
        if let Some(previous) = self.block.replace(block) {
            previous.timer.cancel();
        }
    }

    /// End of the active block, if one is still running at `now`.
    pub(crate) fn blocked_until(&self, now: Instant) -> Option<Instant> {
        self.block.as_ref().map(|b| b.end).filter(|end| *end > now)
    }

    /// Mean absolute gap between consecutive tracked timestamps.
    /// `None` with fewer than two records.
    pub(crate) fn mean_gap(&self) -> Option<Duration> {
        let stamps: Vec<Instant> = self.records.values().map(|r| r.inserted_at).collect();
        if stamps.len() < 2 {
            return None;
        }
        let total: Duration = stamps
            .windows(2)
            .map(|pair| {
                if pair[1] >= pair[0] {
                    pair[1] - pair[0]
                } else {
                    pair[0] - pair[1]
                }
            })
            .sum();
        Some(total / (stamps.len() - 1) as u32)
    }
}
