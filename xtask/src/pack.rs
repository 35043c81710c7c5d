use crate::common::logger_init;
use pict::Dictionary;
use serde::Deserialize;
use std::{fs, time::Instant};
use tensor::{udim, Tensor};

#[derive(Args, Default)]
pub(crate) struct PackArgs {
    /// JSON document `[{"name", "shape", "values"}]`.
    #[clap(short, long)]
    manifest: String,
    /// Container to write.
    #[clap(short, long)]
    output: String,
    /// Dictionary size, at most 256.
    #[clap(long)]
    levels: Option<usize>,
    /// Log level, may be "off", "trace", "debug", "info" or "error".
    #[clap(long)]
    log: Option<String>,
}

#[derive(Deserialize)]
struct Entry {
    name: String,
    shape: Vec<udim>,
    values: Vec<f32>,
}

impl PackArgs {
    pub fn invoke(self) -> crate::Result {
        logger_init(self.log.as_deref());
        let entries: Vec<Entry> = serde_json::from_str(&fs::read_to_string(&self.manifest)?)?;
        if let Some(e) = entries
            .iter()
            .find(|e| e.shape.iter().map(|&d| d as usize).product::<usize>() != e.values.len())
        {
            return Err(format!(
                "\"{}\" has shape {:?} but {} values",
                e.name,
                e.shape,
                e.values.len()
            )
            .into());
        }

        let time = Instant::now();
        let dictionary = Dictionary::fit(
            entries.iter().flat_map(|e| e.values.iter().copied()),
            self.levels.unwrap_or(Dictionary::MAX_LEN),
        );
        let tensors = entries
            .into_iter()
            .map(|e| (e.name, Tensor::new(&e.shape, e.values)))
            .collect::<Vec<_>>();
        let bytes = pict::encode(tensors.iter().map(|(name, t)| (name.as_str(), t)), &dictionary)?;
        fs::write(&self.output, &bytes)?;
        info!("pack ... {:?}", time.elapsed());

        println!(
            "{} tensors, dictionary of {}, {} bytes -> {}",
            tensors.len(),
            dictionary.len(),
            bytes.len(),
            self.output,
        );
        Ok(())
    }
}
