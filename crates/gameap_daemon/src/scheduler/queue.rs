use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use gameap_core::ServerTask;

type Key = (DateTime<Utc>, u64);

fn key(task: &ServerTask) -> Key {
    (task.execute_date, task.id)
}

/// Server tasks ordered by execution date, then id.
#[derive(Debug, Default)]
pub struct ScheduleQueue {
    tasks: Mutex<BTreeMap<Key, ServerTask>>,
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, task: ServerTask) {
        self.tasks.lock().insert(key(&task), task);
    }

    /// The earliest task, left in place.
    pub fn pop(&self) -> Option<ServerTask> {
        self.tasks
            .lock()
            .first_key_value()
            .map(|(_, task)| task.clone())
    }

    pub fn remove(&self, task: &ServerTask) {
        self.tasks.lock().remove(&key(task));
    }

    pub fn exists(&self, task: &ServerTask) -> bool {
        self.tasks.lock().contains_key(&key(task))
    }

    /// Drops any entry with the same id and stores `task` under its current key.
    pub fn replace(&self, task: ServerTask) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, t| t.id != task.id);
        tasks.insert(key(&task), task);
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.tasks.lock().values().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::installed_server;
    use chrono::TimeZone;
    use gameap_core::ServerTaskCommand;
    use std::time::Duration;

    fn task(id: u64, hour: u32) -> ServerTask {
        ServerTask {
            id,
            command: ServerTaskCommand::Restart,
            server: installed_server(1),
            repeat: 0,
            repeat_period: Duration::from_secs(3600),
            counter: 0,
            execute_date: Utc.with_ymd_and_hms(2021, 1, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn pop_returns_the_earliest_without_removing() {
        let queue = ScheduleQueue::new();
        queue.put(task(1, 12));
        queue.put(task(2, 9));

        assert_eq!(queue.pop().map(|t| t.id), Some(2));
        assert_eq!(queue.pop().map(|t| t.id), Some(2));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn same_date_is_ordered_by_id() {
        let queue = ScheduleQueue::new();
        queue.put(task(5, 9));
        queue.put(task(3, 9));

        assert_eq!(queue.pop().map(|t| t.id), Some(3));
    }

    #[test]
    fn replace_moves_the_task_to_its_new_date() {
        let queue = ScheduleQueue::new();
        let original = task(1, 9);
        queue.put(original.clone());
        queue.put(task(2, 10));

        queue.replace(task(1, 11));

        assert!(!queue.exists(&original));
        assert!(queue.exists(&task(1, 11)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|t| t.id), Some(2));
    }

    #[test]
    fn remove_by_key() {
        let queue = ScheduleQueue::new();
        let first = task(1, 9);
        queue.put(first.clone());

        queue.remove(&first);

        assert!(queue.is_empty());
        assert!(!queue.contains_id(1));
    }
}
