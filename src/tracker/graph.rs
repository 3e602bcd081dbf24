//! Task graph
//!
//! Registry of every download this session knows about, linked into trees
//! by the engine's `followedBy` relation. Refreshed by merging status lists
//! from the poll loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, trace, warn};

use super::events::{EventBus, TaskEvent};
use super::task::Task;
use crate::client::EngineClient;
use crate::error::Result;
use crate::rpc::{EngineOptions, Gid, StatusSnapshot, TaskStatus};

/// What a top-level download is created from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSource {
    /// URIs of the same resource
    Uri(Vec<String>),
    /// A `magnet:` link
    Magnet(String),
    /// Raw `.torrent` bytes, optionally with web seeds
    Torrent {
        torrent: Vec<u8>,
        web_seed_uris: Option<Vec<String>>,
    },
}

/// Tasks in discovery order
#[derive(Default)]
struct Registry {
    tasks: HashMap<Gid, Arc<Task>>,
    order: Vec<Gid>,
    /// Followers already sent an unpause
    resumed: HashSet<Gid>,
}

impl Registry {
    fn insert(&mut self, task: Arc<Task>) {
        self.order.push(task.gid());
        self.tasks.insert(task.gid(), task);
    }

    fn in_order(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.order.iter().filter_map(|gid| self.tasks.get(gid))
    }
}

/// Session-wide task registry
pub struct TaskGraph {
    client: Arc<EngineClient>,
    registry: RwLock<Registry>,
    events: EventBus,
}

impl TaskGraph {
    pub fn new(client: Arc<EngineClient>, events: EventBus) -> Self {
        Self {
            client,
            registry: RwLock::new(Registry::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Submit a download and start tracking it
    pub async fn add_top_level_task(&self, source: TaskSource, options: Option<EngineOptions>) -> Result<Arc<Task>> {
        let gid = match source {
            TaskSource::Uri(uris) => self.client.add_uri(uris, options, None).await?,
            TaskSource::Magnet(link) => self.client.add_uri(vec![link], options, None).await?,
            TaskSource::Torrent { torrent, web_seed_uris } => {
                self.client.add_torrent(torrent, web_seed_uris, options, None).await?
            }
        };
        Ok(self.track_top_level(gid).await)
    }

    /// Submit a metalink; every download it creates is top-level
    pub async fn add_metalink_tasks(&self, metalink: Vec<u8>, options: Option<EngineOptions>) -> Result<Vec<Arc<Task>>> {
        let gids = self.client.add_metalink(metalink, options, None).await?;
        let mut tasks = Vec::with_capacity(gids.len());
        for gid in gids {
            tasks.push(self.track_top_level(gid).await);
        }
        Ok(tasks)
    }

    async fn track_top_level(&self, gid: Gid) -> Arc<Task> {
        let (task, added) = {
            let mut registry = self.registry.write().await;
            match registry.tasks.get(&gid) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let task = Arc::new(Task::top_level(gid));
                    registry.insert(task.clone());
                    (task, true)
                }
            }
        };

        if added {
            info!("Tracking download {}", gid);
            self.events.publish(TaskEvent::TopLevelTaskAdded(task.clone()));
            self.events.publish(TaskEvent::TaskAdded(task.clone()));
        }
        task
    }

    /// Apply one refresh worth of status snapshots.
    ///
    /// Snapshots of untracked downloads are ignored unless a tracked task
    /// lists them in `followedBy`. Returns the number of snapshots applied.
    pub async fn merge_snapshots(&self, snapshots: Vec<StatusSnapshot>) -> usize {
        let batch: Vec<(Gid, Arc<StatusSnapshot>)> = snapshots
            .into_iter()
            .filter_map(|s| s.gid.map(|gid| (gid, Arc::new(s))))
            .collect();
        let by_gid: HashMap<Gid, Arc<StatusSnapshot>> = batch.iter().cloned().collect();

        let mut events = Vec::new();
        let mut pending: VecDeque<(Arc<Task>, Gid)> = VecDeque::new();
        let mut applied = 0;

        {
            let registry = self.registry.read().await;
            for (gid, snapshot) in &batch {
                let Some(task) = registry.tasks.get(gid) else {
                    trace!("Ignoring untracked download {}", gid);
                    continue;
                };
                task.set_snapshot(snapshot.clone());
                applied += 1;
                events.push(TaskEvent::StatusUpdated(task.clone()));

                for follower in snapshot.followed_by() {
                    if !registry.tasks.contains_key(follower) {
                        pending.push_back((task.clone(), *follower));
                    }
                }
            }
        }

        if !pending.is_empty() {
            let mut registry = self.registry.write().await;
            while let Some((parent, gid)) = pending.pop_front() {
                if registry.tasks.contains_key(&gid) {
                    continue;
                }

                let task = Arc::new(Task::follower(gid, &parent));
                registry.insert(task.clone());
                parent.add_follower(task.clone());
                debug!("Download {} follows {}", gid, parent.gid());
                events.push(TaskEvent::TaskAdded(task.clone()));
                events.push(TaskEvent::FollowedTaskAdded {
                    parent: parent.clone(),
                    task: task.clone(),
                });

                // Its status may be further down the same batch
                if let Some(snapshot) = by_gid.get(&gid) {
                    task.set_snapshot(snapshot.clone());
                    applied += 1;
                    events.push(TaskEvent::StatusUpdated(task.clone()));
                    for follower in snapshot.followed_by() {
                        if !registry.tasks.contains_key(follower) {
                            pending.push_back((task.clone(), *follower));
                        }
                    }
                }
            }
        }

        self.events.publish_all(events);
        applied
    }

    /// Unpause followers the engine generated in a paused state.
    ///
    /// Downloads spawned from fetched metadata start paused, so the files can
    /// be inspected first. Each follower is resumed once; a pause applied
    /// later is left alone. Returns how many unpause requests succeeded.
    pub async fn resume_paused_followers(&self) -> Result<usize> {
        let paused: Vec<Gid> = {
            let mut registry = self.registry.write().await;
            let paused: Vec<Gid> = registry
                .in_order()
                .filter(|t| !t.is_top_level() && t.status() == TaskStatus::Paused)
                .map(|t| t.gid())
                .filter(|gid| !registry.resumed.contains(gid))
                .collect();
            registry.resumed.extend(paused.iter().copied());
            paused
        };

        let mut resumed = 0;
        for gid in paused {
            match self.client.unpause(gid).await {
                Ok(_) => {
                    debug!("Resumed follower {}", gid);
                    resumed += 1;
                }
                Err(e) if e.is_protocol() => warn!("Could not resume follower {}: {}", gid, e),
                Err(e) => return Err(e),
            }
        }
        Ok(resumed)
    }

    /// Every tracked task, in discovery order
    pub async fn all_tasks(&self) -> Vec<Arc<Task>> {
        self.registry.read().await.in_order().cloned().collect()
    }

    pub async fn top_level_tasks(&self) -> Vec<Arc<Task>> {
        self.registry
            .read()
            .await
            .in_order()
            .filter(|t| t.is_top_level())
            .cloned()
            .collect()
    }

    pub async fn tracked_ids(&self) -> Vec<Gid> {
        self.registry.read().await.order.clone()
    }

    pub async fn get(&self, gid: Gid) -> Option<Arc<Task>> {
        self.registry.read().await.tasks.get(&gid).cloned()
    }

    pub async fn len(&self) -> usize {
        self.registry.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::{MockReply, MockTransport};
    use crate::rpc::TaskStatus;
    use serde_json::json;

    fn graph() -> (TaskGraph, Arc<MockTransport>) {
        let mock = MockTransport::new(|method, params| match method {
            "aria2.addUri" => MockReply::Result(json!("0000000000000001")),
            "aria2.unpause" if params[1] == json!("0000000000000003") => {
                MockReply::Fault(1, "GID 0000000000000003 cannot be unpaused now".to_string())
            }
            "aria2.unpause" => MockReply::Result(params[1].clone()),
            "aria2.addTorrent" => MockReply::Result(json!("00000000000000a0")),
            "aria2.addMetalink" => MockReply::Result(json!(["0000000000000010", "0000000000000011"])),
            _ => MockReply::Result(json!("OK")),
        });
        let client = Arc::new(EngineClient::new(mock.clone(), "abc"));
        (TaskGraph::new(client, EventBus::default()), mock)
    }

    fn snapshot(gid: u64, status: TaskStatus, followed_by: &[u64]) -> StatusSnapshot {
        StatusSnapshot {
            gid: Some(Gid::new(gid)),
            status,
            followed_by: if followed_by.is_empty() {
                None
            } else {
                Some(followed_by.iter().copied().map(Gid::new).collect())
            },
            ..Default::default()
        }
    }

    fn drain(rx: &mut broadcast::Receiver<TaskEvent>) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_add_top_level_task_events() {
        let (graph, mock) = graph();
        let mut rx = graph.subscribe();

        let task = graph
            .add_top_level_task(TaskSource::Magnet("magnet:?xt=urn:btih:abc".to_string()), None)
            .await
            .unwrap();
        assert_eq!(task.gid(), Gid::new(1));
        assert!(task.is_top_level());
        assert!(!task.loaded());
        assert_eq!(mock.methods(), vec!["aria2.addUri".to_string()]);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TaskEvent::TopLevelTaskAdded(_)));
        assert!(matches!(events[1], TaskEvent::TaskAdded(_)));
    }

    #[tokio::test]
    async fn test_add_torrent_and_metalink() {
        let (graph, _mock) = graph();

        let task = graph
            .add_top_level_task(
                TaskSource::Torrent {
                    torrent: b"d4:infoe".to_vec(),
                    web_seed_uris: None,
                },
                Some(EngineOptions::new().pause(true)),
            )
            .await
            .unwrap();
        assert_eq!(task.gid(), Gid::new(0xa0));

        let tasks = graph.add_metalink_tasks(b"<metalink/>".to_vec(), None).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(graph.top_level_tasks().await.len(), 3);
        assert_eq!(
            graph.tracked_ids().await,
            vec![Gid::new(0xa0), Gid::new(0x10), Gid::new(0x11)]
        );
    }

    #[tokio::test]
    async fn test_followed_by_discovery() {
        let (graph, _mock) = graph();
        graph
            .add_top_level_task(TaskSource::Magnet("magnet:?xt=urn:btih:abc".to_string()), None)
            .await
            .unwrap();
        let mut rx = graph.subscribe();

        let applied = graph
            .merge_snapshots(vec![snapshot(1, TaskStatus::Complete, &[2])])
            .await;
        assert_eq!(applied, 1);

        let child = graph.get(Gid::new(2)).await.unwrap();
        assert_eq!(child.following().unwrap().gid(), Gid::new(1));
        assert!(!child.loaded());

        let parent = graph.get(Gid::new(1)).await.unwrap();
        assert_eq!(parent.followed_by_ids(), vec![Gid::new(2)]);
        assert_eq!(parent.status(), TaskStatus::Complete);

        let events = drain(&mut rx);
        let followed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TaskEvent::FollowedTaskAdded { .. }))
            .collect();
        assert_eq!(followed.len(), 1);
        if let TaskEvent::FollowedTaskAdded { parent, task } = followed[0] {
            assert_eq!(parent.gid(), Gid::new(1));
            assert_eq!(task.gid(), Gid::new(2));
        }
    }

    #[tokio::test]
    async fn test_follower_status_in_same_batch() {
        let (graph, _mock) = graph();
        graph
            .add_top_level_task(TaskSource::Uri(vec!["http://localhost/a.torrent".to_string()]), None)
            .await
            .unwrap();

        // Child listed before its parent; grandchild after
        graph
            .merge_snapshots(vec![
                snapshot(2, TaskStatus::Active, &[3]),
                snapshot(1, TaskStatus::Complete, &[2]),
                snapshot(3, TaskStatus::Waiting, &[]),
            ])
            .await;

        assert_eq!(graph.get(Gid::new(2)).await.unwrap().status(), TaskStatus::Active);
        let grandchild = graph.get(Gid::new(3)).await.unwrap();
        assert_eq!(grandchild.status(), TaskStatus::Waiting);
        assert_eq!(grandchild.following_gid(), Some(Gid::new(2)));
        assert_eq!(graph.top_level_tasks().await.len(), 1);
        assert_eq!(graph.len().await, 3);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let (graph, _mock) = graph();
        graph
            .add_top_level_task(TaskSource::Magnet("magnet:?xt=urn:btih:abc".to_string()), None)
            .await
            .unwrap();

        let batch = vec![
            snapshot(1, TaskStatus::Complete, &[2]),
            snapshot(2, TaskStatus::Active, &[]),
        ];
        graph.merge_snapshots(batch.clone()).await;
        let ids = graph.tracked_ids().await;

        let mut rx = graph.subscribe();
        graph.merge_snapshots(batch).await;

        assert_eq!(graph.tracked_ids().await, ids);
        assert_eq!(graph.get(Gid::new(1)).await.unwrap().followed_by_ids(), vec![Gid::new(2)]);
        let events = drain(&mut rx);
        assert!(events.iter().all(|e| matches!(e, TaskEvent::StatusUpdated(_))));
    }

    #[tokio::test]
    async fn test_untracked_snapshots_are_ignored() {
        let (graph, _mock) = graph();
        let mut rx = graph.subscribe();

        let applied = graph
            .merge_snapshots(vec![snapshot(99, TaskStatus::Active, &[100])])
            .await;

        assert_eq!(applied, 0);
        assert!(graph.is_empty().await);
        assert!(graph.get(Gid::new(100)).await.is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_paused_followers_resumed_once() {
        let (graph, mock) = graph();
        graph
            .add_top_level_task(TaskSource::Magnet("magnet:?xt=urn:btih:abc".to_string()), None)
            .await
            .unwrap();

        graph
            .merge_snapshots(vec![
                snapshot(1, TaskStatus::Complete, &[2, 3]),
                snapshot(2, TaskStatus::Paused, &[]),
                snapshot(3, TaskStatus::Paused, &[]),
            ])
            .await;

        // the engine refuses 3; that is logged, not fatal
        assert_eq!(graph.resume_paused_followers().await.unwrap(), 1);
        let sent = mock.requests();
        let unpauses: Vec<_> = sent.iter().filter(|r| r["method"] == "aria2.unpause").collect();
        assert_eq!(unpauses.len(), 2);
        assert_eq!(unpauses[0]["params"], json!(["token:abc", "0000000000000002"]));
        assert_eq!(unpauses[1]["params"], json!(["token:abc", "0000000000000003"]));

        // still reported paused on the next poll: not sent again
        graph
            .merge_snapshots(vec![snapshot(2, TaskStatus::Paused, &[])])
            .await;
        assert_eq!(graph.resume_paused_followers().await.unwrap(), 0);
        assert_eq!(mock.methods().iter().filter(|m| *m == "aria2.unpause").count(), 2);
    }

    #[tokio::test]
    async fn test_paused_top_level_left_alone() {
        let (graph, mock) = graph();
        graph
            .add_top_level_task(TaskSource::Uri(vec!["http://localhost/file".to_string()]), None)
            .await
            .unwrap();
        graph.merge_snapshots(vec![snapshot(1, TaskStatus::Paused, &[])]).await;

        assert_eq!(graph.resume_paused_followers().await.unwrap(), 0);
        assert_eq!(mock.methods(), vec!["aria2.addUri".to_string()]);
    }
}
