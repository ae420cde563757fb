use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use gameap_core::GDTask;

/// Rotating FIFO of panel tasks. `next` hands out the head and puts it back at the tail,
/// so tasks only leave the queue through `remove`.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Arc<GDTask>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks whose id is already queued are ignored.
    pub fn insert(&self, tasks: impl IntoIterator<Item = Arc<GDTask>>) {
        let mut queue = self.tasks.lock();
        for task in tasks {
            if queue.iter().any(|t| t.id() == task.id()) {
                continue;
            }
            queue.push_back(task);
        }
    }

    pub fn next(&self) -> Option<Arc<GDTask>> {
        let mut queue = self.tasks.lock();
        let task = queue.pop_front()?;
        queue.push_back(task.clone());
        Some(task)
    }

    pub fn remove(&self, task: &GDTask) {
        self.tasks.lock().retain(|t| t.id() != task.id());
    }

    pub fn find_by_id(&self, id: u64) -> Option<Arc<GDTask>> {
        self.tasks.lock().iter().find(|t| t.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    #[cfg(test)]
    fn ids(&self) -> Vec<u64> {
        self.tasks.lock().iter().map(|t| t.id()).collect()
    }
}
