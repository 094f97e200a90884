use crate::convert::ConverterHandle;
use crate::error::{ErrorKind, Result};
use crate::key::ThumbnailKey;
use crate::pending::{Outcome, PendingTable};
use crate::tickets::WorkTickets;
use exn::ResultExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, instrument};

/// Turns concurrent thumbnail requests into at most one conversion per
/// [`ThumbnailKey`], with a server-wide cap on conversions running at once.
///
/// Cloning is cheap; every clone shares the same table, tickets and
/// converter. Create one per process and hand clones to whoever needs it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    table: PendingTable,
    tickets: WorkTickets,
    converter: ConverterHandle,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    coalesced: AtomicU64,
    conversions: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of scheduler activity since it was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Calls to [`Scheduler::make_thumbnail`] that have registered.
    pub requests: u64,
    /// Registrations that joined an already pending conversion.
    pub coalesced: u64,
    /// Conversions that have finished, successfully or not.
    pub conversions: u64,
    /// Finished conversions that failed.
    pub failures: u64,
}

impl SchedulerStats {
    /// Share of requests that were served by someone else's conversion.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.requests == 0 { 0.0 } else { self.coalesced as f64 / self.requests as f64 }
    }
}

impl Scheduler {
    /// Create a scheduler that runs at most `max_conversions` conversions at
    /// once through `converter`.
    pub fn new(converter: ConverterHandle, max_conversions: usize) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                table: PendingTable::new(),
                tickets: WorkTickets::new(max_conversions)?,
                converter,
                counters: Counters::default(),
            }),
        })
    }

    /// Produce the thumbnail of `source` at `destination`, `dimension` pixels
    /// square, and return `destination` once it holds the image.
    ///
    /// The first caller for a key starts the conversion on a separate task;
    /// everyone asking for the same key while it is pending (including that
    /// first caller) waits for the same outcome. A request arriving after the
    /// outcome was delivered starts a fresh conversion. Nothing is cached
    /// here and nothing is retried.
    ///
    /// # Errors
    /// Every waiter of a failed conversion receives
    /// [`ErrorKind::ConversionFailed`], raised from the cause.
    #[instrument(skip_all, fields(source = %source.as_ref().display(), dimension = dimension))]
    pub async fn make_thumbnail(
        &self,
        source: impl AsRef<std::path::Path>,
        destination: impl Into<PathBuf>,
        dimension: u32,
    ) -> Result<PathBuf> {
        let key = ThumbnailKey::new(source.as_ref(), destination, dimension);
        let registration = self.inner.table.register_or_join(&key);
        let owner = registration.is_owner();
        let handle = registration.into_handle();

        self.inner.counters.requests.fetch_add(1, Ordering::Relaxed);
        if owner {
            self.spawn_conversion(key.clone());
        } else {
            self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        match handle.wait().await {
            Ok(()) => Ok(key.destination().to_path_buf()),
            Err(cause) => Err(exn::Exn::from(cause).raise(ErrorKind::ConversionFailed(key.destination().to_path_buf()))),
        }
    }

    fn spawn_conversion(&self, key: ThumbnailKey) {
        let completion = Completion {
            inner: Arc::clone(&self.inner),
            key: Some(key.clone()),
        };
        let inner = Arc::clone(&self.inner);
        let conversion = async move {
            let outcome = match inner.convert(&key).await {
                Ok(()) => {
                    tracing::info!(key = %key, destination = %key.destination().display(), "Thumbnail created");
                    Ok(())
                },
                Err(err) => {
                    inner.counters.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = ?err, "Unable to create thumbnail");
                    Err((*err).clone())
                },
            };
            completion.finish(outcome);
        };
        tokio::spawn(conversion.instrument(tracing::Span::current()));
    }

    /// Number of keys with a conversion pending.
    pub fn pending(&self) -> usize {
        self.inner.table.len()
    }

    /// Work tickets not currently held by a running conversion.
    pub fn available_tickets(&self) -> usize {
        self.inner.tickets.available()
    }

    pub fn max_conversions(&self) -> usize {
        self.inner.tickets.capacity()
    }

    pub fn converter(&self) -> &str {
        self.inner.converter.name()
    }

    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.inner.counters;
        SchedulerStats {
            requests: counters.requests.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            conversions: counters.conversions.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Logs current statistics.
    pub fn log_stats(&self) {
        let stats = self.stats();
        tracing::info!(
            requests = stats.requests,
            coalesced = stats.coalesced,
            conversions = stats.conversions,
            failures = stats.failures,
            pending = self.pending(),
            oldest_pending = ?self.inner.table.oldest(),
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "Thumbnail scheduler statistics"
        );
    }
}

impl Inner {
    /// Run one conversion while holding a work ticket. The ticket is returned
    /// before this resolves, whatever the outcome.
    async fn convert(&self, key: &ThumbnailKey) -> Result<()> {
        let _ticket = self.tickets.acquire().await;
        if let Some(parent) = key.destination().parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .or_raise(|| ErrorKind::CreateDirectory(parent.to_path_buf()))?;
        }
        self.converter.convert(key.source(), key.destination(), key.dimension()).await
    }

    fn deliver(&self, key: &ThumbnailKey, outcome: &Outcome) {
        self.counters.conversions.fetch_add(1, Ordering::Relaxed);
        self.table.complete_and_remove(key, outcome);
    }
}

/// Guarantees that a spawned conversion reports exactly once: with its
/// outcome through [`finish`](Self::finish), or as abandoned if the task
/// unwinds or is dropped first.
struct Completion {
    inner: Arc<Inner>,
    key: Option<ThumbnailKey>,
}

impl Completion {
    fn finish(mut self, outcome: Outcome) {
        if let Some(key) = self.key.take() {
            self.inner.deliver(&key, &outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            tracing::error!(key = %key, "Thumbnail conversion ended without an outcome");
            self.inner.counters.failures.fetch_add(1, Ordering::Relaxed);
            self.inner.deliver(&key, &Err(ErrorKind::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{Converter, MockConverter};
    use crate::testing::Recorder;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        dir: tempfile::TempDir,
        converter: Arc<MockConverter>,
        scheduler: Scheduler,
    }

    impl Fixture {
        fn new(converter: MockConverter, max_conversions: usize) -> Self {
            let converter = Arc::new(converter);
            let scheduler = Scheduler::new(converter.clone(), max_conversions).unwrap();
            Self {
                dir: tempfile::tempdir().unwrap(),
                converter,
                scheduler,
            }
        }

        fn destination(&self, name: &str) -> PathBuf {
            self.dir.path().join(".thumbs").join(name)
        }

        fn request(&self, name: &str) -> tokio::task::JoinHandle<Result<PathBuf>> {
            let scheduler = self.scheduler.clone();
            let source = PathBuf::from("/").join(name);
            let destination = self.destination(name);
            tokio::spawn(async move { scheduler.make_thumbnail(source, destination, 200).await })
        }

        /// Yield until `condition` holds; spawned requests only make progress
        /// while the test task is suspended.
        async fn until(&self, condition: impl Fn(&Self) -> bool) {
            while !condition(self) {
                tokio::task::yield_now().await;
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_for_one_key_convert_once() {
        let fixture = Fixture::new(MockConverter::held(), 4);
        let requests: Vec<_> = (0..8).map(|_| fixture.request("img.jpg")).collect();
        fixture.until(|f| f.scheduler.stats().requests == 8).await;
        assert_eq!(fixture.scheduler.pending(), 1);

        fixture.converter.release(1);
        for request in requests {
            assert_eq!(request.await.unwrap().unwrap(), fixture.destination("img.jpg"));
        }
        assert_eq!(fixture.converter.invocations(), 1);
        assert_eq!(fixture.scheduler.pending(), 0);
        let stats = fixture.scheduler.stats();
        assert_eq!(stats.coalesced, 7);
        assert_eq!(stats.conversions, 1);
        assert!((stats.coalescing_ratio() - 0.875).abs() < 0.001);
        assert_eq!(fs::read_to_string(fixture.destination("img.jpg")).unwrap(), "200x200");
    }

    #[tokio::test]
    async fn test_two_callers_share_one_invocation() {
        let fixture = Fixture::new(MockConverter::new(), 4);
        let (a, b) = tokio::join!(
            fixture.scheduler.make_thumbnail("/img.jpg", fixture.destination("img.jpg"), 200),
            fixture.scheduler.make_thumbnail("/img.jpg", fixture.destination("img.jpg"), 200),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(fixture.converter.invocations(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_are_bounded_by_tickets() {
        let fixture = Fixture::new(MockConverter::held(), 4);
        let requests: Vec<_> = (0..10).map(|n| fixture.request(&format!("{n}.jpg"))).collect();
        fixture.until(|f| f.converter.running() == 4).await;
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fixture.converter.running(), 4);
        assert_eq!(fixture.scheduler.available_tickets(), 0);
        assert_eq!(fixture.scheduler.pending(), 10);

        fixture.converter.release(10);
        for request in requests {
            request.await.unwrap().unwrap();
        }
        assert_eq!(fixture.converter.invocations(), 10);
        assert_eq!(fixture.converter.peak(), 4);
        assert_eq!(fixture.scheduler.available_tickets(), 4);
        assert_eq!(fixture.scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_single_ticket_runs_conversions_sequentially() {
        let fixture = Fixture::new(MockConverter::held(), 1);
        let a = fixture.request("a.jpg");
        let b = fixture.request("b.jpg");
        fixture.until(|f| f.scheduler.stats().requests == 2 && f.converter.running() == 1).await;
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fixture.converter.invocations(), 1);

        fixture.converter.release(2);
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(fixture.converter.invocations(), 2);
        assert_eq!(fixture.converter.peak(), 1);
    }

    #[tokio::test]
    async fn test_completed_key_converts_again() {
        let fixture = Fixture::new(MockConverter::new(), 4);
        for expected in 1..=3 {
            fixture.scheduler.make_thumbnail("/img.jpg", fixture.destination("img.jpg"), 200).await.unwrap();
            assert_eq!(fixture.converter.invocations(), expected);
            assert_eq!(fixture.scheduler.pending(), 0);
        }
    }

    #[tokio::test]
    async fn test_missing_parent_directories_are_created() {
        let fixture = Fixture::new(MockConverter::new(), 4);
        let destination = fixture.destination("deeply/nested/album/img.jpg");
        assert!(!destination.parent().unwrap().exists());

        let created = fixture.scheduler.make_thumbnail("/img.jpg", &destination, 400).await.unwrap();
        assert_eq!(created, destination);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "400x400");
    }

    #[tokio::test]
    async fn test_parent_directory_failure_skips_the_converter() {
        let fixture = Fixture::new(MockConverter::new(), 4);
        let blocker = fixture.dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let destination = blocker.join("img.jpg");

        let err = fixture.scheduler.make_thumbnail("/img.jpg", &destination, 200).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ConversionFailed(destination));
        assert_eq!(fixture.converter.invocations(), 0);
        assert_eq!(fixture.scheduler.pending(), 0);
        assert_eq!(fixture.scheduler.available_tickets(), 4);
        assert_eq!(fixture.scheduler.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter_then_retries_fresh() {
        let fixture = Fixture::new(MockConverter::held(), 4);
        fixture.converter.set_failing(true);
        let requests: Vec<_> = (0..3).map(|_| fixture.request("img.jpg")).collect();
        fixture.until(|f| f.scheduler.stats().requests == 3).await;
        fixture.converter.release(1);
        for request in requests {
            let err = request.await.unwrap().unwrap_err();
            assert_eq!(*err, ErrorKind::ConversionFailed(fixture.destination("img.jpg")));
        }
        assert_eq!(fixture.converter.invocations(), 1);
        assert_eq!(fixture.scheduler.pending(), 0);

        fixture.converter.set_failing(false);
        fixture.converter.release(1);
        fixture.scheduler.make_thumbnail("/img.jpg", fixture.destination("img.jpg"), 200).await.unwrap();
        assert_eq!(fixture.converter.invocations(), 2);
    }

    #[tokio::test]
    async fn test_dimensions_are_separate_keys() {
        let fixture = Fixture::new(MockConverter::new(), 4);
        let destination = fixture.destination("img.jpg");
        let (a, b) = tokio::join!(
            fixture.scheduler.make_thumbnail("/img.jpg", &destination, 200),
            fixture.scheduler.make_thumbnail("/img.jpg", &destination, 400),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(fixture.converter.invocations(), 2);
    }

    #[test]
    fn test_zero_conversions_is_rejected() {
        let err = Scheduler::new(Arc::new(MockConverter::new()), 0).err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidConcurrency(_)));
    }

    struct Panicking;

    #[async_trait]
    impl Converter for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn convert(&self, _: &Path, _: &Path, _: u32) -> Result<()> {
            panic!("converter blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_conversion_still_answers_waiters() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(Arc::new(Panicking), 1).unwrap();
        let destination = dir.path().join("img.jpg");
        let err = scheduler.make_thumbnail("/img.jpg", &destination, 200).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ConversionFailed(destination));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.available_tickets(), 1);
    }

    #[tokio::test]
    async fn test_conversion_logs_inside_the_requesting_span() {
        let recorder = Recorder::default();
        let _guard = recorder.install();
        let fixture = Fixture::new(MockConverter::new(), 1);
        fixture
            .scheduler
            .make_thumbnail("/img.jpg", fixture.destination("img.jpg"), 200)
            .await
            .unwrap();

        let scope = recorder.event_scope("Thumbnail created").unwrap();
        assert!(scope.contains(&"make_thumbnail"), "scope was {scope:?}");
        assert_eq!(recorder.span_field("make_thumbnail", "dimension").as_deref(), Some("200"));
    }
}
