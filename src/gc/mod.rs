//! Deferred record reclamation.
//!
//! Records live in shared cells; the collector keeps weak handles to every
//! cell handed to it and drops the bookkeeping for cells whose last owner
//! has gone. Finalization itself rides on ownership — `clean()` only prunes
//! the list. A background sweeper thread runs `clean()` on a fixed interval
//! for the life of the process; there is no completion signal.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::record::{Record, RecordRef};

/// Interval between sweeps of the background thread.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Default)]
pub struct Gc {
    entries: Mutex<Vec<Weak<parking_lot::Mutex<Record>>>>,
}

impl Gc {
    pub fn new() -> Gc {
        Gc::default()
    }

    /// Register a record with the collector.
    pub fn push(&self, record: &RecordRef) {
        self.entries.lock().push(Arc::downgrade(record));
    }

    /// Walk the whole list under the lock, dropping entries whose record
    /// has no owners left. Returns how many entries were reclaimed.
    pub fn clean(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|weak| weak.strong_count() > 0);
        before - entries.len()
    }

    /// Entries still tracked (live or not yet swept).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Spawn the sweeper. The thread holds only a weak handle to the collector,
/// so it winds down once the owning context is dropped instead of pinning
/// it forever.
pub fn start_sweeper(gc: &Arc<Gc>) -> std::thread::JoinHandle<()> {
    let weak = Arc::downgrade(gc);
    std::thread::spawn(move || loop {
        std::thread::sleep(SWEEP_INTERVAL);
        match weak.upgrade() {
            Some(gc) => {
                gc.clean();
            }
            None => break,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn clean_reclaims_only_dead_records() {
        let gc = Gc::new();
        let live = Record::make_int(1).into_ref();
        gc.push(&live);
        {
            let dead = Record::make_int(2).into_ref();
            gc.push(&dead);
        }
        assert_eq!(gc.len(), 2);
        assert_eq!(gc.clean(), 1);
        assert_eq!(gc.len(), 1);
        // the live record is untouched
        assert_eq!(live.lock().to_string(), "1");
    }

    #[test]
    fn clean_is_idempotent() {
        let gc = Gc::new();
        {
            let dead = Record::make_string("gone").into_ref();
            gc.push(&dead);
        }
        assert_eq!(gc.clean(), 1);
        assert_eq!(gc.clean(), 0);
        assert!(gc.is_empty());
    }

    #[test]
    fn push_is_safe_across_threads() {
        let gc = Arc::new(Gc::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let gc = Arc::clone(&gc);
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    let r = Record::make_int(i * 100 + j).into_ref();
                    gc.push(&r);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(gc.len(), 800);
        // every record dropped with its spawning thread
        assert_eq!(gc.clean(), 800);
    }

    #[test]
    fn sweeper_prunes_in_background() {
        let gc = Arc::new(Gc::new());
        {
            let dead = Record::make_int(0).into_ref();
            gc.push(&dead);
        }
        let _handle = start_sweeper(&gc);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !gc.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(gc.is_empty(), "sweeper never cleaned the dead entry");
    }
}
