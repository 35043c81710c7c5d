//! Serves generator passes over cached weight containers.

mod cache;
mod fetch;
pub mod image;

#[macro_use]
extern crate log;

use common_cpu::CpuKernels;
use common_devices::Kernels;
use pix2pix::{EvalError, Generator};
use std::{
    collections::HashMap,
    error, fmt,
    sync::{Arc, Mutex},
    time::Instant,
};
use tensor::Tensor;
use tokio::{sync::OnceCell, task::JoinError};

pub use cache::{LoadError, WeightCache};
pub use fetch::{Fetch, FileFetch, TransportError};

/// Image translation over weights named by path.
pub struct Service<F, K = CpuKernels> {
    cache: WeightCache<F>,
    /// Validated generators, built once per path.
    generators: Mutex<HashMap<String, Arc<OnceCell<Arc<Generator>>>>>,
    kernels: K,
}

#[derive(Debug)]
pub enum InferError {
    Load(LoadError),
    Eval(EvalError),
    /// The pass panicked.
    Join(JoinError),
}

impl<F: Fetch> Service<F> {
    #[inline]
    pub fn new(fetch: F) -> Self {
        Self::with_kernels(fetch, CpuKernels)
    }
}

impl<F, K> Service<F, K>
where
    F: Fetch,
    K: Kernels + Clone + Send + 'static,
{
    #[inline]
    pub fn with_kernels(fetch: F, kernels: K) -> Self {
        Self {
            cache: WeightCache::new(fetch),
            generators: Mutex::new(HashMap::new()),
            kernels,
        }
    }

    #[inline]
    pub fn cache(&self) -> &WeightCache<F> {
        &self.cache
    }

    /// Returns the generator stored at `path`, validating its weights on first use.
    ///
    /// A container that fails validation is not remembered; the next call checks it again.
    pub async fn generator(&self, path: &str) -> Result<Arc<Generator>, InferError> {
        let cell = self
            .generators
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .clone();
        cell.get_or_try_init(|| async {
            let weights = self.cache.load(path).await?;
            Ok::<_, InferError>(Arc::new(Generator::new(&weights)?))
        })
        .await
        .cloned()
    }

    /// Runs the generator stored at `path` on an `[h, w, 3]` image in [0, 1].
    pub async fn infer(&self, path: &str, input: Tensor<Vec<f32>>) -> Result<Tensor<Vec<f32>>, InferError> {
        let generator = self.generator(path).await?;

        let kernels = self.kernels.clone();
        let time = Instant::now();
        let output = tokio::task::spawn_blocking(move || generator.evaluate(&kernels, &input))
            .await
            .map_err(InferError::Join)??;
        info!("{path}: {:?} translated in {:?}", output.shape(), time.elapsed());
        Ok(output)
    }
}

impl From<LoadError> for InferError {
    #[inline]
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<EvalError> for InferError {
    #[inline]
    fn from(e: EvalError) -> Self {
        Self::Eval(e)
    }
}

impl error::Error for InferError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Load(e) => Some(e),
            Self::Eval(e) => Some(e),
            Self::Join(e) => Some(e),
        }
    }
}

impl fmt::Display for InferError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Load(e) => write!(f, "{e}"),
            Self::Eval(e) => write!(f, "{e}"),
            Self::Join(e) => write!(f, "generator pass aborted: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FileFetch, InferError, Service};
    use pict::Dictionary;
    use pix2pix::{EvalError, Role, Stage, DEPTH};
    use std::{fs, sync::Arc};
    use tensor::Tensor;

    /// A narrow generator (base width 1) with deterministic weights.
    fn generator_container() -> Vec<u8> {
        let channels = |i: u8| 1u32 << (i - 1).min(3);
        let mut entries = Vec::new();
        for stage in Stage::all() {
            let (kernel, co) = match stage {
                Stage::Encoder(1) => ([4, 4, 3, 1], 1),
                Stage::Encoder(i) => ([4, 4, channels(i - 1), channels(i)], channels(i)),
                Stage::Decoder(i) => {
                    let ci = if i == DEPTH { channels(DEPTH) } else { 2 * channels(i) };
                    let co = if i == 1 { 3 } else { channels(i - 1) };
                    ([4, 4, co, ci], co)
                }
            };
            for &role in stage.roles() {
                let shape = match role {
                    Role::Kernel => kernel.to_vec(),
                    _ => vec![co],
                };
                let size = shape.iter().product::<u32>() as usize;
                let values = (0..size)
                    .map(|k| match role {
                        Role::Gamma => 1.,
                        _ => ((k * 7 % 11) as f32 - 5.) / 50.,
                    })
                    .collect::<Vec<f32>>();
                entries.push((stage.name(role), Tensor::new(&shape, values)));
            }
        }
        let dictionary = Dictionary::fit(
            entries.iter().flat_map(|(_, t)| t.as_slice().iter().copied()),
            256,
        );
        pict::encode(
            entries.iter().map(|(name, t)| (name.as_str(), t)),
            &dictionary,
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_infer() {
        let dir = std::env::temp_dir().join(format!("service-infer-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("generator.pict"), generator_container()).unwrap();
        let a = Tensor::new(&[1], vec![0.]);
        let dictionary = Dictionary::new(vec![0.]).unwrap();
        fs::write(
            dir.join("partial.pict"),
            pict::encode([("generator/encoder_1/conv2d/kernel", &a)], &dictionary).unwrap(),
        )
        .unwrap();

        let service = Service::new(FileFetch::new(&dir));

        let input = Tensor::new(&[256, 256, 3], vec![0.25; 256 * 256 * 3]);
        let output = service.infer("generator.pict", input).await.unwrap();
        assert_eq!(output.shape(), &[256, 256, 3]);
        assert!(output.as_slice().iter().all(|&x| (0. ..=1.).contains(&x)));
        assert!(service.cache().get("generator.pict").is_some());

        // validated once, shared by later passes
        let generator = service.generator("generator.pict").await.unwrap();
        let input = Tensor::new(&[256, 256, 3], vec![0.75; 256 * 256 * 3]);
        service.infer("generator.pict", input).await.unwrap();
        assert!(Arc::ptr_eq(
            &generator,
            &service.generator("generator.pict").await.unwrap()
        ));

        let input = Tensor::alloc(&[128, 256, 3]);
        assert!(matches!(
            service.infer("generator.pict", input).await,
            Err(InferError::Eval(EvalError::Input(_)))
        ));

        let input = Tensor::alloc(&[256, 256, 3]);
        assert!(matches!(
            service.infer("partial.pict", input).await,
            Err(InferError::Eval(EvalError::MissingWeight(ref name)))
                if name == "generator/encoder_1/conv2d/bias"
        ));

        let input = Tensor::alloc(&[256, 256, 3]);
        assert!(matches!(
            service.infer("absent.pict", input).await,
            Err(InferError::Load(_))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
