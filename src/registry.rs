//! In-memory task registry: per-chunk slot state with at-most-once delivery and TTL expiry

use crate::field::{ChunkDescriptor, Shape};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// A chunk slot moves `Pending -> Ready -> Consumed`; no other transition is
/// legal. Payload exists only in the `Ready` state.
enum ChunkSlot {
    Pending,
    Ready(Vec<u8>),
    Consumed,
}

struct TaskData {
    shape: Shape,
    data_length: u64,
    chunk_size: u64,
    slots: Vec<ChunkSlot>,
    /// Slots not yet consumed; the task is destroyed when this reaches zero
    remaining: usize,
    created_at: Instant,
    /// Background-parse failure recorded against the task
    failed: Option<String>,
}

/// Outcome of a destructive chunk read
#[derive(Debug, PartialEq)]
pub enum TakeResult {
    NotFound,
    NotReady,
    AlreadyConsumed,
    Ready(Vec<u8>),
    Failed(String),
}

/// Summary counters for the status endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    pub tasks: usize,
    pub pending_chunks: usize,
    pub ready_chunks: usize,
}

/// One live task as reported by the status endpoint
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub shape: Shape,
    pub data_length: u64,
    pub chunk_size: u64,
    pub pending: usize,
    pub ready: usize,
    pub consumed: usize,
}

/// Holds in-flight tasks and mediates producer/consumer access to chunk
/// payloads. The outer map is read-locked to locate a task; slot transitions
/// serialize on the per-task mutex.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<Mutex<TaskData>>>>,
    ttl: Duration,
}

impl TaskRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Allocate a fresh task with every slot pending
    pub fn create(
        &self,
        shape: Shape,
        data_length: u64,
        chunk_size: u64,
        chunks: &[ChunkDescriptor],
    ) -> String {
        let task_id = uuid::Uuid::new_v4().to_string();
        let data = TaskData {
            shape,
            data_length,
            chunk_size,
            slots: (0..chunks.len()).map(|_| ChunkSlot::Pending).collect(),
            remaining: chunks.len(),
            created_at: Instant::now(),
            failed: None,
        };

        self.tasks
            .write()
            .unwrap()
            .insert(task_id.clone(), Arc::new(Mutex::new(data)));
        task_id
    }

    fn task(&self, task_id: &str) -> Option<Arc<Mutex<TaskData>>> {
        self.tasks.read().unwrap().get(task_id).cloned()
    }

    /// Fill a pending slot with its payload. Distinct indexes of the same
    /// task may be filled concurrently.
    pub fn set_chunk(&self, task_id: &str, index: u32, bytes: Vec<u8>) -> Result<()> {
        let Some(task) = self.task(task_id) else {
            anyhow::bail!("task {} not found", task_id);
        };

        let mut data = task.lock().unwrap();
        let slot = data
            .slots
            .get_mut(index as usize)
            .ok_or_else(|| anyhow::anyhow!("chunk index {} out of range", index))?;
        match slot {
            ChunkSlot::Pending => {
                *slot = ChunkSlot::Ready(bytes);
                Ok(())
            }
            ChunkSlot::Ready(_) => anyhow::bail!("chunk {} already filled", index),
            ChunkSlot::Consumed => anyhow::bail!("chunk {} already consumed", index),
        }
    }

    /// Atomic read-modify-write: on `Ready` the payload moves out and the
    /// slot becomes `Consumed`. The task is destroyed once the last slot is
    /// consumed.
    pub fn take_chunk(&self, task_id: &str, index: u32) -> TakeResult {
        let Some(task) = self.task(task_id) else {
            return TakeResult::NotFound;
        };

        let destroy = {
            let mut data = task.lock().unwrap();
            if let Some(msg) = &data.failed {
                return TakeResult::Failed(msg.clone());
            }
            let Some(slot) = data.slots.get_mut(index as usize) else {
                return TakeResult::NotFound;
            };

            let bytes = match std::mem::replace(slot, ChunkSlot::Consumed) {
                ChunkSlot::Pending => {
                    *slot = ChunkSlot::Pending;
                    return TakeResult::NotReady;
                }
                ChunkSlot::Consumed => return TakeResult::AlreadyConsumed,
                ChunkSlot::Ready(bytes) => bytes,
            };

            data.remaining -= 1;
            let destroy = data.remaining == 0;
            drop(data);
            if destroy {
                Some(bytes)
            } else {
                return TakeResult::Ready(bytes);
            }
        };

        self.tasks.write().unwrap().remove(task_id);
        TakeResult::Ready(destroy.unwrap())
    }

    /// Record a background-parse failure. Consumers observe `Failed` until
    /// the sweep drops the task.
    pub fn fail(&self, task_id: &str, message: impl Into<String>) {
        if let Some(task) = self.task(task_id) {
            task.lock().unwrap().failed = Some(message.into());
        }
    }

    /// Drop every task older than the TTL
    pub fn sweep(&self, now: Instant) {
        let ttl = self.ttl;
        self.tasks.write().unwrap().retain(|_, task| {
            let data = task.lock().unwrap();
            now.duration_since(data.created_at) <= ttl
        });
    }

    pub fn stats(&self) -> RegistryStats {
        let tasks = self.tasks.read().unwrap();
        let mut stats = RegistryStats {
            tasks: tasks.len(),
            ..Default::default()
        };
        for task in tasks.values() {
            let data = task.lock().unwrap();
            for slot in &data.slots {
                match slot {
                    ChunkSlot::Pending => stats.pending_chunks += 1,
                    ChunkSlot::Ready(_) => stats.ready_chunks += 1,
                    ChunkSlot::Consumed => {}
                }
            }
        }
        stats
    }

    /// Per-task view for the status endpoint
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let tasks = self.tasks.read().unwrap();
        tasks
            .iter()
            .map(|(task_id, task)| {
                let data = task.lock().unwrap();
                let mut snap = TaskSnapshot {
                    task_id: task_id.clone(),
                    shape: data.shape,
                    data_length: data.data_length,
                    chunk_size: data.chunk_size,
                    pending: 0,
                    ready: 0,
                    consumed: 0,
                };
                for slot in &data.slots {
                    match slot {
                        ChunkSlot::Pending => snap.pending += 1,
                        ChunkSlot::Ready(_) => snap.ready += 1,
                        ChunkSlot::Consumed => snap.consumed += 1,
                    }
                }
                snap
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::derive_chunks;

    fn registry_with_task(ttl: Duration) -> (TaskRegistry, String) {
        let registry = TaskRegistry::new(ttl);
        let shape = Shape::new(4, 4, 4);
        let chunks = derive_chunks(shape.len(), 20);
        let task_id = registry.create(shape, shape.len(), 20, &chunks);
        (registry, task_id)
    }

    #[test]
    fn test_take_before_set_is_not_ready() {
        let (registry, task_id) = registry_with_task(Duration::from_secs(60));
        assert_eq!(registry.take_chunk(&task_id, 0), TakeResult::NotReady);
    }

    #[test]
    fn test_at_most_once_delivery() {
        let (registry, task_id) = registry_with_task(Duration::from_secs(60));
        registry.set_chunk(&task_id, 0, vec![1, 2, 3]).unwrap();

        assert_eq!(registry.take_chunk(&task_id, 0), TakeResult::Ready(vec![1, 2, 3]));
        assert_eq!(registry.take_chunk(&task_id, 0), TakeResult::AlreadyConsumed);
    }

    #[test]
    fn test_set_twice_rejected() {
        let (registry, task_id) = registry_with_task(Duration::from_secs(60));
        registry.set_chunk(&task_id, 1, vec![0; 8]).unwrap();
        assert!(registry.set_chunk(&task_id, 1, vec![0; 8]).is_err());
    }

    #[test]
    fn test_index_out_of_range() {
        let (registry, task_id) = registry_with_task(Duration::from_secs(60));
        assert!(registry.set_chunk(&task_id, 99, vec![]).is_err());
        assert_eq!(registry.take_chunk(&task_id, 99), TakeResult::NotFound);
    }

    #[test]
    fn test_unknown_task() {
        let registry = TaskRegistry::new(Duration::from_secs(60));
        assert_eq!(registry.take_chunk("nope", 0), TakeResult::NotFound);
    }

    #[test]
    fn test_task_destroyed_after_last_consume() {
        let (registry, task_id) = registry_with_task(Duration::from_secs(60));
        for i in 0..4 {
            registry.set_chunk(&task_id, i, vec![i as u8]).unwrap();
        }
        for i in 0..4 {
            assert!(matches!(registry.take_chunk(&task_id, i), TakeResult::Ready(_)));
        }
        // last consume reclaimed the task
        assert_eq!(registry.take_chunk(&task_id, 0), TakeResult::NotFound);
        assert_eq!(registry.stats().tasks, 0);
    }

    #[test]
    fn test_sweep_expires_old_tasks() {
        let (registry, task_id) = registry_with_task(Duration::from_millis(10));
        registry.set_chunk(&task_id, 0, vec![0; 8]).unwrap();

        registry.sweep(Instant::now());
        assert!(matches!(registry.take_chunk(&task_id, 0), TakeResult::Ready(_)));

        registry.sweep(Instant::now() + Duration::from_millis(50));
        assert_eq!(registry.take_chunk(&task_id, 1), TakeResult::NotFound);
    }

    #[test]
    fn test_snapshot_reports_slot_states() {
        let (registry, task_id) = registry_with_task(Duration::from_secs(60));
        registry.set_chunk(&task_id, 0, vec![0; 8]).unwrap();
        registry.set_chunk(&task_id, 1, vec![0; 8]).unwrap();
        assert!(matches!(registry.take_chunk(&task_id, 0), TakeResult::Ready(_)));

        let snaps = registry.snapshot();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].task_id, task_id);
        assert_eq!(snaps[0].shape, Shape::new(4, 4, 4));
        assert_eq!(snaps[0].data_length, 64);
        assert_eq!(snaps[0].chunk_size, 20);
        assert_eq!((snaps[0].pending, snaps[0].ready, snaps[0].consumed), (2, 1, 1));
    }

    #[test]
    fn test_failed_task_surfaces_error() {
        let (registry, task_id) = registry_with_task(Duration::from_secs(60));
        registry.fail(&task_id, "parse blew up");
        assert_eq!(
            registry.take_chunk(&task_id, 0),
            TakeResult::Failed("parse blew up".to_string())
        );
    }

    #[test]
    fn test_concurrent_consumers_single_winner() {
        let (registry, task_id) = registry_with_task(Duration::from_secs(60));
        registry.set_chunk(&task_id, 0, vec![7; 8]).unwrap();

        let registry = Arc::new(registry);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let task_id = task_id.clone();
                std::thread::spawn(move || registry.take_chunk(&task_id, 0))
            })
            .collect();

        let results: Vec<TakeResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results
            .iter()
            .filter(|r| matches!(r, TakeResult::Ready(_)))
            .count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, TakeResult::AlreadyConsumed))
            .count();
        assert_eq!((winners, losers), (1, 1));
    }
}
