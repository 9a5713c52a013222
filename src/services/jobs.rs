use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::{
    cached,
    db::{CacheKey, RecommendationCache},
    error::{AppError, AppResult},
    models::{BookSummary, CachedRecommendations, JobId, JobStatus},
    services::{epochs::RecommendationEpochs, recommender::Recommender},
};

/// Settings for the recommendation worker pool
#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    pub workers: usize,
    pub recommendation_count: usize,
    /// Seconds a computed list stays in the recommendation cache
    pub cache_ttl: u64,
    /// How long a finished job stays pollable
    pub result_ttl: Duration,
}

struct QueuedJob {
    id: JobId,
    user_id: i64,
}

struct JobEntry {
    user_id: i64,
    status: JobStatus,
    finished_at: Option<Instant>,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobEntry>>>;

struct WorkerContext {
    recommender: Arc<Recommender>,
    cache: Arc<dyn RecommendationCache>,
    epochs: Arc<RecommendationEpochs>,
    jobs: JobTable,
    recommendation_count: usize,
    cache_ttl: u64,
}

/// In-process queue that computes recommendations off the request path
///
/// `enqueue` returns a handle immediately; `poll` reports the job's state to
/// the user who queued it until the result expires.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    jobs: JobTable,
    result_ttl: Duration,
}

impl JobQueue {
    /// Spawns `settings.workers` tasks draining a shared queue
    pub fn start(
        recommender: Arc<Recommender>,
        cache: Arc<dyn RecommendationCache>,
        epochs: Arc<RecommendationEpochs>,
        settings: JobSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let jobs: JobTable = Arc::new(Mutex::new(HashMap::new()));

        let context = Arc::new(WorkerContext {
            recommender,
            cache,
            epochs,
            jobs: jobs.clone(),
            recommendation_count: settings.recommendation_count,
            cache_ttl: settings.cache_ttl,
        });

        for worker in 0..settings.workers.max(1) {
            let context = context.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                Self::worker_task(worker, context, rx).await;
            });
        }

        tracing::info!(workers = settings.workers.max(1), "Recommendation workers started");

        Self {
            tx,
            jobs,
            result_ttl: settings.result_ttl,
        }
    }

    /// Queues a recommendation job for `user_id`
    pub fn enqueue(&self, user_id: i64) -> AppResult<JobId> {
        let id = JobId::new();
        {
            let mut jobs = lock(&self.jobs);
            self.prune_expired(&mut jobs);
            jobs.insert(
                id,
                JobEntry {
                    user_id,
                    status: JobStatus::Processing,
                    finished_at: None,
                },
            );
        }

        if self.tx.send(QueuedJob { id, user_id }).is_err() {
            lock(&self.jobs).remove(&id);
            return Err(AppError::Job("Recommendation workers are not running".to_string()));
        }

        tracing::info!(job_id = %id, user_id, "Recommendation job queued");
        Ok(id)
    }

    /// Current state of a job
    ///
    /// Unknown and expired handles, and handles queued by another user, are
    /// `NotFound`.
    pub fn poll(&self, id: &JobId, user_id: i64) -> JobStatus {
        let mut jobs = lock(&self.jobs);
        let expired = match jobs.get(id) {
            None => return JobStatus::NotFound,
            Some(entry) if entry.user_id != user_id => return JobStatus::NotFound,
            Some(entry) => self.is_expired(entry),
        };

        if expired {
            jobs.remove(id);
            return JobStatus::NotFound;
        }

        jobs.get(id).map(|e| e.status.clone()).unwrap_or(JobStatus::NotFound)
    }

    fn is_expired(&self, entry: &JobEntry) -> bool {
        entry
            .finished_at
            .is_some_and(|finished| finished.elapsed() >= self.result_ttl)
    }

    fn prune_expired(&self, jobs: &mut HashMap<JobId, JobEntry>) {
        jobs.retain(|_, entry| !self.is_expired(entry));
    }

    async fn worker_task(
        worker: usize,
        context: Arc<WorkerContext>,
        rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    ) {
        loop {
            // The lock is released as soon as a job is taken so other workers can pull.
            let job = rx.lock().await.recv().await;
            let Some(job) = job else {
                tracing::debug!(worker, "Recommendation queue closed, worker exiting");
                break;
            };

            let status = match Self::run(&context, job.user_id).await {
                Ok(result) => {
                    tracing::info!(
                        worker,
                        job_id = %job.id,
                        user_id = job.user_id,
                        count = result.len(),
                        "Recommendation job done"
                    );
                    JobStatus::Done { result }
                }
                Err(e) => {
                    tracing::error!(
                        worker,
                        job_id = %job.id,
                        user_id = job.user_id,
                        error = %e,
                        "Recommendation job failed"
                    );
                    JobStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };

            lock(&context.jobs).insert(
                job.id,
                JobEntry {
                    user_id: job.user_id,
                    status,
                    finished_at: Some(Instant::now()),
                },
            );
        }
    }

    /// Serves a cached list when it was computed against the current catalog
    /// and favorites, and computes a fresh one otherwise
    async fn run(context: &WorkerContext, user_id: i64) -> AppResult<Vec<BookSummary>> {
        let key = CacheKey::UserRecommendations(user_id);
        // Recorded before computing; a change while computing keeps the result out of the cache.
        let epoch = context.epochs.current(user_id);

        let entry: AppResult<CachedRecommendations> = cached!(
            context.cache,
            key,
            context.cache_ttl,
            |entry: &CachedRecommendations| context.epochs.is_current(user_id, &entry.epoch),
            async {
                let books = context
                    .recommender
                    .recommend(user_id, context.recommendation_count)
                    .await?;
                Ok::<_, AppError>(CachedRecommendations { epoch, books })
            }
        );
        entry.map(|entry| entry.books)
    }
}

fn lock(jobs: &JobTable) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::db::{cache::MockRecommendationCache, store::MockCatalogStore, CatalogStore, MemoryCache, MemoryStore};
    use crate::models::{favorite::FavoriteInsert, Book, RecommendationEpoch, UserFavorite};
    use crate::services::FavoritesService;

    fn settings(result_ttl: Duration) -> JobSettings {
        JobSettings {
            workers: 2,
            recommendation_count: 5,
            cache_ttl: 60,
            result_ttl,
        }
    }

    fn start(
        recommender: Arc<Recommender>,
        cache: Arc<dyn RecommendationCache>,
        result_ttl: Duration,
    ) -> JobQueue {
        JobQueue::start(
            recommender,
            cache,
            Arc::new(RecommendationEpochs::new()),
            settings(result_ttl),
        )
    }

    async fn wait_for_terminal(queue: &JobQueue, id: &JobId) -> JobStatus {
        for _ in 0..200 {
            let status = queue.poll(id, 1);
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", id);
    }

    fn result_ids(status: &JobStatus) -> Vec<String> {
        match status {
            JobStatus::Done { result } => result.iter().map(|b| b.book_id.clone()).collect(),
            other => panic!("expected a finished job, got {:?}", other),
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (id, title) in [("A", "space adventure"), ("B", "space opera"), ("C", "cooking recipes")] {
            store.create_book(Book::new(id, title)).await.unwrap();
        }
        store.add_favorite(1, "A", 20).await.unwrap();
        store
    }

    fn summary(id: &str, title: &str) -> BookSummary {
        Book::new(id, title).summary(Vec::new())
    }

    fn favorite(id: &str, title: &str) -> UserFavorite {
        UserFavorite {
            user_id: 1,
            book: summary(id, title),
            added_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_job_completes_and_caches_result() {
        let store = seeded_store().await;
        let cache = Arc::new(MemoryCache::new());
        let recommender = Arc::new(Recommender::new(store));
        let queue = start(recommender, cache.clone(), Duration::from_secs(60));

        let id = queue.enqueue(1).unwrap();
        let status = wait_for_terminal(&queue, &id).await;
        assert_eq!(result_ids(&status), vec!["B", "C"]);
        assert!(cache.contains(&CacheKey::UserRecommendations(1)));
    }

    #[tokio::test]
    async fn test_cached_result_is_served_without_computing() {
        let epochs = Arc::new(RecommendationEpochs::new());
        let cached = vec![summary("X", "cached")];
        let hit = CachedRecommendations {
            epoch: epochs.current(1),
            books: cached.clone(),
        };

        let mut cache = MockRecommendationCache::new();
        cache
            .expect_get_from_cache()
            .returning(move |_| Ok(Some(hit.clone())));
        cache.expect_set_in_background().never();

        let mut store = MockCatalogStore::new();
        store
            .expect_list_book_summaries()
            .returning(|| Ok(Vec::new()));
        store.expect_list_favorites().never();

        let recommender = Arc::new(Recommender::new(Arc::new(store)));
        let queue = JobQueue::start(
            recommender,
            Arc::new(cache),
            epochs,
            settings(Duration::from_secs(60)),
        );

        let id = queue.enqueue(1).unwrap();
        assert_eq!(
            wait_for_terminal(&queue, &id).await,
            JobStatus::Done { result: cached }
        );
    }

    #[tokio::test]
    async fn test_entry_from_older_epoch_is_recomputed() {
        let store = seeded_store().await;
        let cache = Arc::new(MemoryCache::new());
        let key = CacheKey::UserRecommendations(1);
        let stale = CachedRecommendations {
            epoch: RecommendationEpoch {
                catalog: 0,
                favorites: 0,
            },
            books: vec![summary("X", "from an earlier catalog")],
        };
        cache.set_in_background(&key, &stale, 60);

        let queue = start(Arc::new(Recommender::new(store)), cache.clone(), Duration::from_secs(60));
        let id = queue.enqueue(1).unwrap();
        let status = wait_for_terminal(&queue, &id).await;
        assert_eq!(result_ids(&status), vec!["B", "C"]);

        let stored = cache.get_from_cache(&key).await.unwrap().unwrap();
        assert_ne!(stored.epoch, stale.epoch);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_favorite_added_mid_job_is_not_masked_by_cache() {
        let favorites_calls = Arc::new(AtomicUsize::new(0));

        let mut store = MockCatalogStore::new();
        store.expect_list_book_summaries().returning(|| {
            Ok(vec![
                summary("A", "space adventure"),
                summary("B", "space opera"),
                summary("C", "cooking recipes"),
            ])
        });
        let calls = favorites_calls.clone();
        store.expect_list_favorites().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                // Slow read of the favorite set as it was before B was added.
                std::thread::sleep(Duration::from_millis(300));
                Ok(vec![favorite("A", "space adventure")])
            } else {
                Ok(vec![
                    favorite("A", "space adventure"),
                    favorite("B", "space opera"),
                ])
            }
        });
        store
            .expect_add_favorite()
            .returning(|_, _, _| Ok(FavoriteInsert::Added));

        let store: Arc<dyn CatalogStore> = Arc::new(store);
        let cache = Arc::new(MemoryCache::new());
        let epochs = Arc::new(RecommendationEpochs::new());
        let favorites = FavoritesService::new(store.clone(), cache.clone(), epochs.clone(), 20);
        let queue = JobQueue::start(
            Arc::new(Recommender::new(store)),
            cache.clone(),
            epochs,
            settings(Duration::from_secs(60)),
        );

        let first = queue.enqueue(1).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        favorites.add_favorite(1, "B").await.unwrap();

        let status = wait_for_terminal(&queue, &first).await;
        assert_eq!(result_ids(&status), vec!["B", "C"]);

        let second = queue.enqueue(1).unwrap();
        let status = wait_for_terminal(&queue, &second).await;
        let ids = result_ids(&status);
        assert!(!ids.contains(&"B".to_string()), "got {:?}", ids);
        assert_eq!(ids, vec!["C"]);
        assert_eq!(favorites_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_terminal_not_empty() {
        let mut store = MockCatalogStore::new();
        store
            .expect_list_book_summaries()
            .returning(|| Err(AppError::Internal("catalog unavailable".into())));

        let recommender = Arc::new(Recommender::new(Arc::new(store)));
        let queue = start(recommender, Arc::new(MemoryCache::new()), Duration::from_secs(60));

        let id = queue.enqueue(1).unwrap();
        match wait_for_terminal(&queue, &id).await {
            JobStatus::Failed { error } => assert!(error.contains("catalog unavailable")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_handle_is_not_found() {
        let store = seeded_store().await;
        let queue = start(
            Arc::new(Recommender::new(store)),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        );
        assert_eq!(queue.poll(&JobId::new(), 1), JobStatus::NotFound);
    }

    #[tokio::test]
    async fn test_handle_is_not_visible_to_other_users() {
        let store = seeded_store().await;
        let queue = start(
            Arc::new(Recommender::new(store)),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        );

        let id = queue.enqueue(1).unwrap();
        assert_eq!(queue.poll(&id, 2), JobStatus::NotFound);

        assert!(wait_for_terminal(&queue, &id).await.is_terminal());
        assert_eq!(queue.poll(&id, 2), JobStatus::NotFound);
    }

    #[tokio::test]
    async fn test_finished_job_expires() {
        let store = seeded_store().await;
        let queue = start(
            Arc::new(Recommender::new(store)),
            Arc::new(MemoryCache::new()),
            Duration::from_millis(50),
        );

        let id = queue.enqueue(1).unwrap();
        assert!(wait_for_terminal(&queue, &id).await.is_terminal());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(queue.poll(&id, 1), JobStatus::NotFound);
    }

    #[tokio::test]
    async fn test_new_job_is_processing_until_picked_up() {
        let store = seeded_store().await;
        let queue = start(
            Arc::new(Recommender::new(store)),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        );

        // Current-thread runtime: workers cannot run before this task yields.
        let id = queue.enqueue(1).unwrap();
        assert_eq!(queue.poll(&id, 1), JobStatus::Processing);
    }
}
