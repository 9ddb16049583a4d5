use std::sync::{
    Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use tracing::warn;

/// Takes the shared side of a snapshot lock, recovering it if a previous
/// holder panicked. A poisoned snapshot is still internally consistent
/// because every mutation is applied as a whole event.
pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    store: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, store, op, "rwlock.read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    store: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, store, op, "rwlock.write"))
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    store: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, store, op, "mutex.lock"))
}

fn recover<G>(
    poisoned: PoisonError<G>,
    store: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    warn!(
        store,
        op,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned store lock"
    );
    poisoned.into_inner()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn poisoned_rwlock_is_recovered() {
        let lock = Arc::new(RwLock::new(7_i64));
        let poisoner = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = poisoner.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(lock.is_poisoned());
        assert_eq!(*rw_read(&lock, "test", "read"), 7);
        *rw_write(&lock, "test", "write") = 8;
        assert_eq!(*rw_read(&lock, "test", "read"), 8);
    }

    #[test]
    fn poisoned_mutex_is_recovered() {
        let lock = Arc::new(Mutex::new(vec![1_i64]));
        let poisoner = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        mutex_lock(&lock, "test", "push").push(2);
        assert_eq!(*mutex_lock(&lock, "test", "read"), vec![1, 2]);
    }
}
