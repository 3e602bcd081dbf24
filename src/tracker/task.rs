//! Tracked download task

use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::rpc::{Gid, StatusSnapshot, TaskStatus};

/// One download known to the tracker.
///
/// The parent link is weak; the parent owns its followers through
/// `followed_by`. The snapshot is replaced wholesale on every refresh.
pub struct Task {
    gid: Gid,
    following: Option<Weak<Task>>,
    following_gid: Option<Gid>,
    followed_by: RwLock<Vec<Arc<Task>>>,
    snapshot: RwLock<Option<Arc<StatusSnapshot>>>,
}

impl Task {
    /// A task the user submitted
    pub(crate) fn top_level(gid: Gid) -> Self {
        Self {
            gid,
            following: None,
            following_gid: None,
            followed_by: RwLock::new(Vec::new()),
            snapshot: RwLock::new(None),
        }
    }

    /// A task the engine generated from `parent`
    pub(crate) fn follower(gid: Gid, parent: &Arc<Task>) -> Self {
        Self {
            gid,
            following: Some(Arc::downgrade(parent)),
            following_gid: Some(parent.gid),
            followed_by: RwLock::new(Vec::new()),
            snapshot: RwLock::new(None),
        }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    /// The task this one was generated from, if still alive
    pub fn following(&self) -> Option<Arc<Task>> {
        self.following.as_ref().and_then(Weak::upgrade)
    }

    pub fn following_gid(&self) -> Option<Gid> {
        self.following_gid
    }

    pub fn is_top_level(&self) -> bool {
        self.following_gid.is_none()
    }

    /// Tasks generated from this one, in discovery order
    pub fn followed_by(&self) -> Vec<Arc<Task>> {
        self.followed_by.read().clone()
    }

    pub fn followed_by_ids(&self) -> Vec<Gid> {
        self.followed_by.read().iter().map(|t| t.gid).collect()
    }

    /// Latest status, if any refresh has reached this task yet
    pub fn snapshot(&self) -> Option<Arc<StatusSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    pub fn status(&self) -> TaskStatus {
        self.snapshot
            .read()
            .as_ref()
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// Finished along with every task generated from it
    pub fn is_tree_finished(&self) -> bool {
        self.loaded() && self.status().is_finished() && self.followed_by().iter().all(|t| t.is_tree_finished())
    }

    pub(crate) fn set_snapshot(&self, snapshot: Arc<StatusSnapshot>) {
        *self.snapshot.write() = Some(snapshot);
    }

    /// Link a follower; false when it was already linked
    pub(crate) fn add_follower(&self, task: Arc<Task>) -> bool {
        let mut followers = self.followed_by.write();
        if followers.iter().any(|t| t.gid == task.gid) {
            return false;
        }
        followers.push(task);
        true
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("gid", &self.gid)
            .field("following", &self.following_gid)
            .field("followed_by", &self.followed_by_ids())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: TaskStatus) -> Arc<StatusSnapshot> {
        Arc::new(StatusSnapshot {
            status,
            ..Default::default()
        })
    }

    #[test]
    fn test_new_task_is_not_loaded() {
        let task = Task::top_level(Gid::new(1));
        assert!(!task.loaded());
        assert!(task.is_top_level());
        assert_eq!(task.status(), TaskStatus::Unknown);
        assert!(!task.is_tree_finished());
    }

    #[test]
    fn test_follower_links() {
        let parent = Arc::new(Task::top_level(Gid::new(1)));
        let child = Arc::new(Task::follower(Gid::new(2), &parent));

        assert!(parent.add_follower(child.clone()));
        assert!(!parent.add_follower(child.clone()));
        assert_eq!(parent.followed_by_ids(), vec![Gid::new(2)]);
        assert_eq!(child.following().unwrap().gid(), Gid::new(1));
        assert!(!child.is_top_level());
    }

    #[test]
    fn test_tree_finished_waits_for_followers() {
        let parent = Arc::new(Task::top_level(Gid::new(1)));
        let child = Arc::new(Task::follower(Gid::new(2), &parent));
        parent.add_follower(child.clone());

        parent.set_snapshot(snapshot(TaskStatus::Complete));
        assert!(!parent.is_tree_finished());

        child.set_snapshot(snapshot(TaskStatus::Active));
        assert!(!parent.is_tree_finished());

        child.set_snapshot(snapshot(TaskStatus::Complete));
        assert!(parent.is_tree_finished());
    }
}
