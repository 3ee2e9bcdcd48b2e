use rustc_hash::FxHashSet;

use super::module::ModuleId;

/// FIFO stage queue drained in capped batches
///
/// Items are consumed through a cursor rather than removed, so a partially
/// drained queue keeps its order. Once the cursor reaches the end the queue
/// is cleared and the cursor reset. A module is queued at most once until
/// it has been taken.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    items: Vec<ModuleId>,
    cursor: usize,
    queued: FxHashSet<ModuleId>,
    cap: usize,
}

impl WorkQueue {
    pub fn new(cap: usize) -> Self {
        Self { items: Vec::new(), cursor: 0, queued: FxHashSet::default(), cap: cap.max(1) }
    }

    /// Appends `id` unless it is already waiting
    pub fn push(&mut self, id: ModuleId) -> bool {
        if self.queued.insert(id) {
            self.items.push(id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.queued.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len() - self.cursor
    }

    /// Takes up to `cap` items in insertion order
    pub fn take_batch(&mut self) -> Vec<ModuleId> {
        let end = (self.cursor + self.cap).min(self.items.len());
        let batch: Vec<ModuleId> = self.items[self.cursor..end].to_vec();
        for id in &batch {
            self.queued.remove(id);
        }
        self.cursor = end;
        if self.cursor >= self.items.len() {
            self.items.clear();
            self.cursor = 0;
        }
        batch
    }
}
