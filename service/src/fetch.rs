use std::{
    error, fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
};

/// Byte source for weight containers, keyed by path.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Failure to obtain the bytes of a container.
#[derive(Debug)]
pub struct TransportError {
    pub path: String,
    pub source: io::Error,
}

impl TransportError {
    #[inline]
    pub fn new(path: impl Into<String>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

impl error::Error for TransportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.source)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "failed to fetch \"{}\": {}", self.path, self.source)
    }
}

/// Reads containers from the local filesystem, relative to `root`.
#[derive(Clone, Debug)]
pub struct FileFetch {
    root: PathBuf,
}

impl FileFetch {
    #[inline]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Fetch for FileFetch {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let full = self.root.join(path);
        let path = path.to_string();
        async move {
            tokio::fs::read(&full)
                .await
                .map_err(|e| TransportError::new(path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Fetch, FileFetch};
    use std::{fs, io::ErrorKind};

    #[tokio::test]
    async fn test_file_fetch() {
        let dir = std::env::temp_dir().join(format!("file-fetch-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("weights.pict"), [1, 2, 3]).unwrap();

        let fetch = FileFetch::new(&dir);
        assert_eq!(fetch.fetch("weights.pict").await.unwrap(), [1, 2, 3]);

        let e = fetch.fetch("missing.pict").await.unwrap_err();
        assert_eq!(e.path, "missing.pict");
        assert_eq!(e.source.kind(), ErrorKind::NotFound);

        fs::remove_dir_all(&dir).unwrap();
    }
}
