use crate::commands::db::in_transaction;
use crate::commands::growth::{GrowthService, OwnerOrStaff};
use crate::commands::open_data_dir;
use crate::error::{ErrorResponse, GrowthError};
use crate::models::requester::RequesterContext;
use crate::models::velocity::GrowthVelocityResult;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Serializes velocity recomputation per child. Different children proceed in parallel.
/// A child's entry is dropped once nobody holds or waits for its lock.
#[derive(Debug, Default, Clone)]
pub struct ChildLocks {
    inner: Arc<Mutex<LockMap>>,
}

impl ChildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, child_id: &str) -> ChildLockGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(child_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        ChildLockGuard {
            guard: Some(lock.lock_owned().await),
            child_id: child_id.to_string(),
            locks: Arc::clone(&self.inner),
        }
    }

    /// Children with a live entry.
    pub fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

pub struct ChildLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    child_id: String,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for ChildLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map still references the lock: no holder, no waiter.
        let idle = map
            .get(&self.child_id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if idle {
            map.remove(&self.child_id);
        }
    }
}

pub async fn compute_velocity(
    locks: &ChildLocks,
    data_dir: String,
    requester: RequesterContext,
    child_id: String,
) -> Result<Vec<GrowthVelocityResult>, ErrorResponse> {
    let _guard = locks.acquire(&child_id).await;
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).compute_velocity(&child_id, &requester, Utc::now())
    })
    .map_err(ErrorResponse::from)
}
