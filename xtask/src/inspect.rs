use crate::common::logger_init;
use memmap2::Mmap;
use pix2pix::Generator;
use std::fs::File;

#[derive(Args, Default)]
pub(crate) struct InspectArgs {
    /// Weight container.
    #[clap(short, long)]
    weights: String,
    /// Log level, may be "off", "trace", "debug", "info" or "error".
    #[clap(long)]
    log: Option<String>,
}

impl InspectArgs {
    pub fn invoke(self) -> crate::Result {
        logger_init(self.log.as_deref());
        let file = File::open(&self.weights)?;
        let bytes = unsafe { Mmap::map(&file) }?;
        let [manifest, dictionary, codes] = pict::segments(&bytes)?;
        println!(
            "segments: manifest {} bytes, dictionary {} bytes, codes {} bytes",
            manifest.len(),
            dictionary.len(),
            codes.len(),
        );

        let weights = pict::decode(&bytes)?;
        for (name, tensor) in &weights {
            println!("{name:<56} {:<16} {}", format!("{:?}", tensor.shape()), tensor.size());
        }
        println!(
            "{} tensors, {} values, dictionary of {}",
            weights.len(),
            weights.values_count(),
            weights.dictionary_len(),
        );

        match Generator::new(&weights) {
            Ok(generator) => {
                println!("complete generator; activations for 256x256:");
                for (stage, shape) in generator.stage_shapes(256, 256) {
                    println!("  {stage:?} {shape:?}");
                }
            }
            Err(e) => println!("not a complete generator: {e}"),
        }
        Ok(())
    }
}
