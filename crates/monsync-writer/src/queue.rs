use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// Bounded producer/worker pool: `capacity` caps the number of in-flight
/// tasks tracked by the [`JoinSet`], `concurrency` caps how many of those
/// run their body at once via a [`Semaphore`]. [`WorkQueue::enqueue`] blocks
/// once `capacity` tasks are pending, draining completed ones to make room.
pub struct WorkQueue {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    tasks: Mutex<JoinSet<Result<(), String>>>,
    exceptions: Mutex<Vec<String>>,
}

impl WorkQueue {
    pub fn new(capacity: usize, concurrency: usize) -> Self {
        WorkQueue {
            capacity,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            tasks: Mutex::new(JoinSet::new()),
            exceptions: Mutex::new(Vec::new()),
        }
    }

    async fn make_room(&self) {
        let mut tasks = self.tasks.lock().await;
        while tasks.len() >= self.capacity {
            if let Some(result) = tasks.join_next().await {
                self.record(result);
            } else {
                break;
            }
        }
    }

    fn record(&self, result: Result<Result<(), String>, tokio::task::JoinError>) {
        let outcome = match result {
            Ok(Ok(())) => return,
            Ok(Err(message)) => message,
            Err(join_err) => join_err.to_string(),
        };
        // Bound the exceptions buffer from inside the spawned task's lock
        // scope isn't possible here (record is sync); callers only ever
        // call this while already holding `tasks`, so a `try_lock` suffices.
        if let Ok(mut exceptions) = self.exceptions.try_lock() {
            exceptions.push(outcome);
        }
    }

    /// Spawns `task` onto the pool, blocking first if `capacity` in-flight
    /// tasks are already queued.
    pub async fn enqueue<F>(&self, task: F)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.make_room().await;
        let permit = self.semaphore.clone();
        let mut tasks = self.tasks.lock().await;
        tasks.spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore never closed");
            task.await
        });
    }

    /// Runs `body(item)` for every item in `items`, up to `concurrency`
    /// bodies in flight at once, returning once all have completed.
    pub async fn parallel_for<T, F, Fut>(&self, items: Vec<T>, body: F)
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let body = Arc::new(body);
        for item in items {
            let body = body.clone();
            self.enqueue(async move { body(item).await }).await;
        }
        self.join().await;
    }

    /// Waits for every currently pending task to finish, draining their
    /// results into the exceptions buffer.
    pub async fn join(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            self.record(result);
        }
    }

    pub async fn exceptions(&self) -> Vec<String> {
        self.exceptions.lock().await.clone()
    }

    pub async fn in_flight(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn enqueue_runs_tasks_and_join_waits_for_completion() {
        let queue = WorkQueue::new(8, 4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            queue
                .enqueue(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
        }
        queue.join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn exceptions_collects_task_errors_without_aborting_others() {
        let queue = WorkQueue::new(8, 4);
        for i in 0..5 {
            queue
                .enqueue(async move {
                    if i == 2 {
                        Err("boom".to_string())
                    } else {
                        Ok(())
                    }
                })
                .await;
        }
        queue.join().await;
        let exceptions = queue.exceptions().await;
        assert_eq!(exceptions, vec!["boom".to_string()]);
    }

    #[tokio::test]
    async fn parallel_for_respects_concurrency_limit() {
        let queue = WorkQueue::new(32, 2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..20).collect();
        let in_flight_body = in_flight.clone();
        let max_seen_body = max_seen.clone();
        queue
            .parallel_for(items, move |_| {
                let in_flight = in_flight_body.clone();
                let max_seen = max_seen_body.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
