use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Compute-once cell for a process-wide dataset.
///
/// The first `get_or_try_init` runs the loader; every later call returns
/// the same `Arc` without loading again. A failed load leaves the cell
/// empty so the next caller retries.
pub struct DatasetStore<T> {
    cell: Mutex<Option<Arc<T>>>,
}

impl<T> Default for DatasetStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DatasetStore<T> {
    pub fn new() -> Self {
        DatasetStore {
            cell: Mutex::new(None),
        }
    }

    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> anyhow::Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut guard = self.cell.lock().await;
        if let Some(value) = guard.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(init().await?);
        *guard = Some(Arc::clone(&value));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn loader_runs_once() {
        let store: DatasetStore<Vec<u32>> = DatasetStore::new();
        let calls = AtomicUsize::new(0);

        let first = store
            .get_or_try_init(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(vec![1, 2, 3])
            })
            .await
            .unwrap();
        let second = store
            .get_or_try_init(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(vec![9])
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let store: DatasetStore<u32> = DatasetStore::new();
        let err = store
            .get_or_try_init(|| async { Err::<u32, _>(anyhow::anyhow!("offline")) })
            .await;
        assert!(err.is_err());

        let value = store.get_or_try_init(|| async { anyhow::Ok(7) }).await.unwrap();
        assert_eq!(*value, 7);
    }
}
