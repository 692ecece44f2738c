use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::OwnedMutexGuard;

type TriggerKey = (String, String);

#[derive(Debug, Default)]
/// One async lock per `(job_name, instance)`.
///
/// Holding the guard across trigger and build-number discovery keeps the
/// last-build-plus-one heuristic from handing two callers the same number.
/// Idle entries are pruned on the next acquire.
pub struct TriggerLocks {
    locks: Mutex<HashMap<TriggerKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl TriggerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, job_name: &str, instance: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = lock_unpoisoned(&self.locks);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry((job_name.to_string(), instance.to_string()))
                    .or_default(),
            )
        };
        match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(
                    job_name,
                    instance,
                    "waiting for in-flight trigger of the same job"
                );
                lock.lock_owned().await
            }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        lock_unpoisoned(&self.locks).len()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
