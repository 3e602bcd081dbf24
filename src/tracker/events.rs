//! Task change notifications
//!
//! Events are fanned out over a broadcast channel. A subscriber that falls
//! behind loses the oldest events; the next poll carries fresh state anyway.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use super::task::Task;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The user submitted a new download
    TopLevelTaskAdded(Arc<Task>),
    /// Any task became tracked
    TaskAdded(Arc<Task>),
    /// The engine generated `task` from `parent`
    FollowedTaskAdded { parent: Arc<Task>, task: Arc<Task> },
    /// A fresh snapshot was attached
    StatusUpdated(Arc<Task>),
    /// The host gave up on the engine
    SessionFaulted { reason: String },
}

impl TaskEvent {
    pub fn task(&self) -> Option<&Arc<Task>> {
        match self {
            TaskEvent::TopLevelTaskAdded(task)
            | TaskEvent::TaskAdded(task)
            | TaskEvent::StatusUpdated(task)
            | TaskEvent::FollowedTaskAdded { task, .. } => Some(task),
            TaskEvent::SessionFaulted { .. } => None,
        }
    }
}

/// Cloneable sender side of the event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Send to current subscribers; no subscribers is not an error
    pub fn publish(&self, event: TaskEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = TaskEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::Gid;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let task = Arc::new(Task::top_level(Gid::new(5)));
        bus.publish_all(vec![
            TaskEvent::TopLevelTaskAdded(task.clone()),
            TaskEvent::SessionFaulted { reason: "gone".to_string() },
        ]);

        match rx.recv().await.unwrap() {
            TaskEvent::TopLevelTaskAdded(t) => assert_eq!(t.gid(), Gid::new(5)),
            other => panic!("unexpected event {:?}", other),
        }
        let faulted = rx.recv().await.unwrap();
        assert!(faulted.task().is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(TaskEvent::SessionFaulted { reason: "x".to_string() });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
