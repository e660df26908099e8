//! render-chunks - write every waveform chunk of a WAV file as PNG
//!
//! Usage: `render-chunks <input.wav> <output-dir> [config.yaml]`
//!
//! Without a config argument the default `waveform.yaml` in the user config
//! directory is used (defaults if it does not exist). Set RUST_LOG=debug for
//! cache and render details.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use crossbeam::channel;

use recall_core::audio_file::WavAudioSource;
use recall_core::config::{default_config_path, load_config, WaveformConfig};
use recall_waveform::{RenderedChunk, Waveform};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <input.wav> <output-dir> [config.yaml]", args[0]);
    }
    let input = PathBuf::from(&args[1]);
    let out_dir = PathBuf::from(&args[2]);
    let config_path = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_config_path("waveform.yaml"));

    let config: WaveformConfig = load_config(&config_path);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;

    let waveform = Waveform::open(&input, Arc::new(WavAudioSource::new()), config)
        .with_context(|| format!("Failed to open {:?}", input))?;
    let last_chunk = waveform.last_chunk_number();

    // Encoding PNGs is slow enough to overlap with rendering
    let (tx, rx) = channel::bounded::<RenderedChunk>(4);
    let writer_dir = out_dir.clone();
    let writer = thread::Builder::new()
        .name("png-writer".to_string())
        .spawn(move || -> Result<usize> {
            let mut written = 0;
            for chunk in rx {
                let path = writer_dir.join(format!("chunk_{:04}.png", chunk.chunk_number()));
                chunk
                    .image
                    .save(&path)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                log::debug!("Wrote {:?}", path);
                written += 1;
            }
            Ok(written)
        })
        .context("Failed to spawn png-writer thread")?;

    for chunk_number in 0..=last_chunk {
        let chunk = waveform
            .render_chunk(chunk_number)
            .with_context(|| format!("Failed to render chunk {}", chunk_number))?;
        if tx.send(chunk).is_err() {
            // Writer hit an error; its result says which
            break;
        }
    }
    drop(tx);

    let written = match writer.join() {
        Ok(result) => result?,
        Err(_) => bail!("png-writer thread panicked"),
    };

    log::info!(
        "Rendered {} chunks of {:?} into {:?} ({})",
        written,
        input,
        out_dir,
        waveform.cache_stats()
    );
    waveform.close();
    Ok(())
}
