use crate::{Fetch, TransportError};
use pict::{FormatError, Weights};
use std::{
    collections::HashMap,
    error, fmt, panic,
    sync::{Arc, Mutex},
    time::Instant,
};
use tokio::{sync::OnceCell, task::JoinError};

/// Decoded containers keyed by path, shared by every caller.
///
/// Concurrent loads of one path wait on a single fetch and decode. A failed
/// load leaves nothing behind, so the next call tries again.
pub struct WeightCache<F> {
    fetch: F,
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<Weights>>>>>,
}

/// Failure to load a container.
#[derive(Debug)]
pub enum LoadError {
    Transport(TransportError),
    Format(FormatError),
    /// The decode task was cancelled, as happens when the runtime shuts down.
    Cancelled(JoinError),
}

impl<F: Fetch> WeightCache<F> {
    #[inline]
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            cells: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn fetcher(&self) -> &F {
        &self.fetch
    }

    /// Returns the weights at `path`, fetching and decoding them on first use.
    pub async fn load(&self, path: &str) -> Result<Arc<Weights>, LoadError> {
        let cell = self
            .cells
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .clone();

        if let Some(weights) = cell.get() {
            debug!("cache hit: {path}");
            return Ok(weights.clone());
        }

        cell.get_or_try_init(|| async {
            info!("cache miss: {path}");
            let time = Instant::now();
            let bytes = self.fetch.fetch(path).await?;
            debug!("fetched {path}: {} bytes in {:?}", bytes.len(), time.elapsed());

            let time = Instant::now();
            let weights = joined(tokio::task::spawn_blocking(move || pict::decode(&bytes)).await)??;
            info!(
                "decoded {path}: {} tensors, {} values, dictionary of {} in {:?}",
                weights.len(),
                weights.values_count(),
                weights.dictionary_len(),
                time.elapsed(),
            );
            Ok::<_, LoadError>(Arc::new(weights))
        })
        .await
        .cloned()
    }

    /// Returns the weights at `path` only if already decoded.
    pub fn get(&self, path: &str) -> Option<Arc<Weights>> {
        self.cells
            .lock()
            .unwrap()
            .get(path)
            .and_then(|cell| cell.get().cloned())
    }
}

/// Unwraps a finished blocking task, resuming its panic if it had one.
fn joined<T>(result: Result<T, JoinError>) -> Result<T, LoadError> {
    result.map_err(|e| match e.try_into_panic() {
        Ok(payload) => panic::resume_unwind(payload),
        Err(e) => LoadError::Cancelled(e),
    })
}

impl From<TransportError> for LoadError {
    #[inline]
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<FormatError> for LoadError {
    #[inline]
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl error::Error for LoadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Format(e) => Some(e),
            Self::Cancelled(e) => Some(e),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Format(e) => write!(f, "malformed container: {e}"),
            Self::Cancelled(e) => write!(f, "decode aborted: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{joined, LoadError, WeightCache};
    use crate::{Fetch, TransportError};
    use pict::Dictionary;
    use std::{
        future::Future,
        io,
        sync::{
            atomic::{AtomicUsize, Ordering::SeqCst},
            Arc,
        },
    };
    use tensor::Tensor;

    /// Serves one container, counting requests and failing the first `failures`.
    struct CountingFetch {
        bytes: Vec<u8>,
        count: AtomicUsize,
        failures: usize,
    }

    impl CountingFetch {
        fn new(bytes: Vec<u8>, failures: usize) -> Self {
            Self {
                bytes,
                count: AtomicUsize::new(0),
                failures,
            }
        }
    }

    impl Fetch for CountingFetch {
        fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
            let n = self.count.fetch_add(1, SeqCst);
            let ans = if n < self.failures {
                Err(TransportError::new(path, io::Error::other("unreachable host")))
            } else {
                Ok(self.bytes.clone())
            };
            async move {
                tokio::task::yield_now().await;
                ans
            }
        }
    }

    fn container() -> Vec<u8> {
        let a = Tensor::new(&[2, 2], vec![0., 0.25, 0.5, 1.]);
        let dictionary = Dictionary::new(vec![0., 0.25, 0.5, 1.]).unwrap();
        pict::encode([("a", &a)], &dictionary).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight() {
        let cache = Arc::new(WeightCache::new(CountingFetch::new(container(), 0)));
        let tasks = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.load("a.pict").await.unwrap() })
            })
            .collect::<Vec<_>>();
        let mut loaded = Vec::new();
        for task in tasks {
            loaded.push(task.await.unwrap());
        }

        assert_eq!(cache.fetcher().count.load(SeqCst), 1);
        assert!(loaded.iter().all(|w| Arc::ptr_eq(w, &loaded[0])));
        assert_eq!(loaded[0].get("a").unwrap().as_slice(), &[0., 0.25, 0.5, 1.]);

        // later calls are hits
        let again = cache.load("a.pict").await.unwrap();
        assert!(Arc::ptr_eq(&again, &loaded[0]));
        assert_eq!(cache.fetcher().count.load(SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let cache = WeightCache::new(CountingFetch::new(container(), 1));
        assert!(matches!(
            cache.load("a.pict").await,
            Err(LoadError::Transport(ref e)) if e.path == "a.pict"
        ));
        assert!(cache.get("a.pict").is_none());
        assert!(cache.load("a.pict").await.is_ok());
        assert_eq!(cache.fetcher().count.load(SeqCst), 2);
        assert!(cache.get("a.pict").is_some());
    }

    #[tokio::test]
    async fn test_format_error() {
        let cache = WeightCache::new(CountingFetch::new(vec![0, 0, 0], 0));
        assert!(matches!(
            cache.load("bad.pict").await,
            Err(LoadError::Format(_))
        ));
    }

    #[tokio::test]
    async fn test_memoized_per_path() {
        let cache = WeightCache::new(CountingFetch::new(container(), 0));
        let a = cache.load("a.pict").await.unwrap();
        let b = cache.load("b.pict").await.unwrap();
        for _ in 0..3 {
            assert!(Arc::ptr_eq(&cache.load("a.pict").await.unwrap(), &a));
            assert!(Arc::ptr_eq(&cache.load("b.pict").await.unwrap(), &b));
        }
        assert_eq!(cache.fetcher().count.load(SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_decode() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let e = handle.await.unwrap_err();
        assert!(e.is_cancelled());
        assert!(matches!(joined(Err::<(), _>(e)), Err(LoadError::Cancelled(_))));
        assert!(matches!(joined(Ok(7)), Ok(7)));
    }
}
