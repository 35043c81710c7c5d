use crate::common::logger_init;
use image::{imageops::FilterType, ColorType};
use service::{image::from_rgb8, image::to_rgba8, FileFetch, Service};
use std::time::Instant;

#[derive(Args, Default)]
pub(crate) struct InferArgs {
    /// Weight container.
    #[clap(short, long)]
    weights: String,
    /// Input image.
    #[clap(short, long)]
    input: String,
    /// Output PNG.
    #[clap(short, long)]
    output: String,
    /// Side length the input is resized to, a multiple of 256.
    #[clap(long)]
    size: Option<u32>,
    /// Log level, may be "off", "trace", "debug", "info" or "error".
    #[clap(long)]
    log: Option<String>,
}

impl InferArgs {
    pub fn invoke(self) -> crate::Result {
        logger_init(self.log.as_deref());
        let size = self.size.unwrap_or(256);

        let time = Instant::now();
        let image = image::open(&self.input)?.to_rgb8();
        let (w, h) = image.dimensions();
        let image = image::imageops::resize(&image, size, size, FilterType::Triangle);
        info!("load image {w}x{h} as {size}x{size} ... {:?}", time.elapsed());

        let input = from_rgb8(image.as_raw(), size, size);
        // absolute paths replace the root on join
        let service = Service::new(FileFetch::new("."));
        let runtime = tokio::runtime::Builder::new_multi_thread().build()?;
        let time = Instant::now();
        let output = runtime.block_on(service.infer(&self.weights, input))?;
        info!("translate ... {:?}", time.elapsed());

        image::save_buffer(&self.output, &to_rgba8(&output), size, size, ColorType::Rgba8)?;
        println!("{} -> {}", self.input, self.output);
        Ok(())
    }
}
