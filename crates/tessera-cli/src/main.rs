//! Tessera CLI: compress WAV audio into `.tsra` containers and back.
//!
//! # Usage
//!
//! ```bash
//! tessera compress speech.wav -o speech.tsra
//! tessera compress music.wav -o music.tsra --window-secs 2 --overlap-secs 0.25 --jobs 4
//! tessera decompress speech.tsra -o restored.wav
//! tessera info speech.tsra
//! tessera info speech.tsra --json
//! ```
//!
//! The bundled transform is the reference residual quantizer shaped like the
//! 44.1 kHz DAC model (hop 512, 9 codebooks of 1024 entries), built at the
//! input's sample rate.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use tessera_codec::{AudioBuffer, CodecTransform, Pipeline, PipelineConfig, ScalarRvq};
use tessera_format::{CompressedContainer, ContainerFlags, PaddingMode, HEADER_SIZE};

/// Samples per code frame of the bundled transform.
const REFERENCE_HOP: usize = 512;
/// Codebooks of the bundled transform.
const REFERENCE_CODEBOOKS: usize = 9;
/// Entries per codebook of the bundled transform.
const REFERENCE_CODEBOOK_SIZE: usize = 1024;

// ───────────────────────────── CLI definition ─────────────────────────────

/// Top-level CLI entry point for the `tessera` binary.
#[derive(Parser)]
#[command(
    name = "tessera",
    about = "Chunked neural audio compression",
    version,
    long_about = "Compresses long recordings with a frame-based neural audio codec by splitting\n\
                  them into fixed-length windows, encoding the windows in parallel and storing\n\
                  the codes in a self-describing .tsra container."
)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available sub-commands.
#[derive(Subcommand)]
enum Commands {
    /// Compress a WAV file into a .tsra container.
    Compress {
        /// Input WAV file.
        input: PathBuf,

        /// Output .tsra file.
        #[arg(short, long)]
        output: PathBuf,

        /// Window length in seconds.
        #[arg(long, default_value_t = 1.0)]
        window_secs: f64,

        /// Overlap between consecutive windows in seconds.
        #[arg(long, default_value_t = 0.0)]
        overlap_secs: f64,

        /// Keep only the first N codebooks (coarser, smaller output).
        #[arg(short, long)]
        n_quantizers: Option<usize>,

        /// Encode the input level as is instead of normalizing to -16 dBFS.
        #[arg(long)]
        no_normalize: bool,

        /// Pad the final window by mirroring the signal instead of silence.
        #[arg(long)]
        reflect: bool,

        /// Encode the whole file as a single window.
        #[arg(long, conflicts_with_all = ["window_secs", "overlap_secs"])]
        whole: bool,

        /// Maximum number of windows encoded concurrently.
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Decompress a .tsra container to a 32-bit float WAV file.
    Decompress {
        /// Input .tsra file.
        input: PathBuf,

        /// Output WAV file.
        #[arg(short, long)]
        output: PathBuf,

        /// Maximum number of windows decoded concurrently.
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Display information about a .tsra container.
    Info {
        /// Input .tsra file.
        input: PathBuf,

        /// Output the information as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compress {
            input,
            output,
            window_secs,
            overlap_secs,
            n_quantizers,
            no_normalize,
            reflect,
            whole,
            jobs,
        } => cmd_compress(
            &input,
            &output,
            CompressOptions {
                window_secs,
                overlap_secs,
                n_quantizers,
                normalize: !no_normalize,
                reflect,
                whole,
                jobs,
            },
        ),

        Commands::Decompress {
            input,
            output,
            jobs,
        } => cmd_decompress(&input, &output, jobs),

        Commands::Info { input, json } => cmd_info(&input, json),
    }
}

// ──────────────────────────── compress ────────────────────────────

/// Flags of the `compress` sub-command.
struct CompressOptions {
    window_secs: f64,
    overlap_secs: f64,
    n_quantizers: Option<usize>,
    normalize: bool,
    reflect: bool,
    whole: bool,
    jobs: Option<usize>,
}

fn cmd_compress(input: &Path, output: &Path, opts: CompressOptions) -> Result<()> {
    let audio = read_wav(input)
        .with_context(|| format!("Failed to read WAV file: {}", input.display()))?;

    let mut config =
        PipelineConfig::from_durations(opts.window_secs, opts.overlap_secs, audio.sample_rate())
            .context("Invalid window settings")?;
    config.n_quantizers = opts.n_quantizers;
    if !opts.normalize {
        config.normalize_db = None;
    }
    if opts.reflect {
        config.padding = PaddingMode::Reflect;
    }
    if let Some(jobs) = opts.jobs {
        config.workers = jobs;
    }

    let transform = reference_transform(audio.sample_rate())?;
    let pipeline = Pipeline::new(transform, config).context("Invalid pipeline configuration")?;

    println!("\n  Tessera Compressor");
    println!("  ============================================");
    println!(
        "  Input:    {} ({}ch, {} Hz, {:.2}s, {} samples)",
        input.display(),
        audio.num_channels(),
        audio.sample_rate(),
        audio.duration_secs(),
        audio.len()
    );

    let container = if opts.whole {
        pipeline.compress_whole(&audio)
    } else {
        pipeline.compress(&audio)
    }
    .context("Compression failed")?;

    persist(output, |path| {
        container
            .save(path)
            .with_context(|| format!("Failed to write container: {}", path.display()))
    })?;

    let file_size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    let h = &container.header;

    println!("  --------------------------------------------");
    println!("  Output:   {} ({})", output.display(), human_size(file_size));
    println!(
        "  Windows:  {} x {} samples, hop {}",
        container.chunks.len(),
        h.frame_length,
        h.hop
    );
    println!(
        "  Codes:    {} codebooks x {} entries",
        h.n_codebooks, h.codebook_size
    );
    println!("  Bitrate:  {:.2} kbps", code_bitrate_kbps(&container));
    println!("  Done!\n");

    Ok(())
}

// ──────────────────────────── decompress ────────────────────────────

fn cmd_decompress(input: &Path, output: &Path, jobs: Option<usize>) -> Result<()> {
    let container = CompressedContainer::load(input)
        .with_context(|| format!("Failed to open container: {}", input.display()))?;
    let h = container.header;

    let mut config = PipelineConfig::default();
    if let Some(jobs) = jobs {
        config.workers = jobs;
    }
    let transform = reference_transform(h.sample_rate)?;
    let pipeline = Pipeline::new(transform, config).context("Invalid pipeline configuration")?;

    println!("\n  Tessera Decompressor");
    println!("  ============================================");
    println!("  Input:    {}", input.display());
    println!(
        "  Audio:    {}ch, {} Hz, {:.2}s",
        h.channels,
        h.sample_rate,
        h.duration_secs()
    );

    let audio = pipeline
        .decompress(&container)
        .context("Decompression failed")?;

    persist(output, |path| {
        write_wav(path, &audio)
            .with_context(|| format!("Failed to write WAV file: {}", path.display()))
    })?;

    let file_size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    println!("  --------------------------------------------");
    println!("  Output:   {} ({})", output.display(), human_size(file_size));
    println!("  Samples:  {}", audio.len());
    println!("  Done!\n");

    Ok(())
}

// ───────────────────────────── info ───────────────────────────────

fn cmd_info(input: &Path, json: bool) -> Result<()> {
    let container = CompressedContainer::load(input)
        .with_context(|| format!("Failed to open container: {}", input.display()))?;
    let file_size = std::fs::metadata(input)
        .with_context(|| format!("Failed to stat {}", input.display()))?
        .len();
    let h = &container.header;

    if json {
        let info = serde_json::json!({
            "file": input.display().to_string(),
            "file_size": file_size,
            "header": serde_json::to_value(h)?,
            "chunk_count": container.chunks.len(),
            "code_count": container.code_count(),
            "duration_secs": h.duration_secs(),
            "bitrate_kbps": code_bitrate_kbps(&container),
            "loudness_normalized": h.flags.has(ContainerFlags::LOUDNESS_NORMALIZED),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!();
    println!("  Tessera Container");
    println!("  ============================================");
    println!("  File:      {}", input.display());
    println!("  Size:      {} bytes ({})", file_size, human_size(file_size));
    println!("  Version:   {}", h.version);
    println!("  Rate:      {} Hz", h.sample_rate);
    println!("  Channels:  {}", h.channels);
    println!(
        "  Duration:  {:.2}s ({} samples)",
        h.duration_secs(),
        h.original_length
    );
    println!(
        "  Windows:   {} x {} samples, hop {} ({} padding)",
        container.chunks.len(),
        h.frame_length,
        h.hop,
        h.padding.as_str()
    );
    println!(
        "  Codes:     {} codebooks x {} entries, {} samples/frame",
        h.n_codebooks, h.codebook_size, h.downsampling_ratio
    );
    println!("  Bitrate:   {:.2} kbps", code_bitrate_kbps(&container));
    if h.flags.has(ContainerFlags::LOUDNESS_NORMALIZED) {
        println!(
            "  Loudness:  {:.2} dBFS normalized to {:.2} dBFS",
            h.input_db, h.target_db
        );
    } else {
        println!("  Loudness:  not normalized");
    }
    println!(
        "  Integrity: Verified (BLAKE3 over {} payload bytes)",
        file_size.saturating_sub(HEADER_SIZE as u64)
    );
    println!();

    Ok(())
}

// ──────────────────────────── helpers ────────────────────────────

/// The bundled transform, built for `sample_rate`.
fn reference_transform(sample_rate: u32) -> Result<Box<dyn CodecTransform>> {
    let rvq = ScalarRvq::new(
        sample_rate,
        REFERENCE_HOP,
        REFERENCE_CODEBOOKS,
        REFERENCE_CODEBOOK_SIZE,
    )
    .with_context(|| format!("Cannot build transform for {sample_rate} Hz"))?;
    Ok(Box::new(rvq))
}

/// Produce `output` through `write`, which receives a temporary sibling path.
/// The temporary file is renamed over `output` only after `write` succeeds.
fn persist(output: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".tessera-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Cannot create temporary file in {}", dir.display()))?;

    write(tmp.path())?;
    tracing::debug!(
        tmp = %tmp.path().display(),
        output = %output.display(),
        "Moving output into place"
    );
    tmp.persist(output)
        .with_context(|| format!("Cannot move output into place: {}", output.display()))?;
    Ok(())
}

/// Read a WAV file into a planar buffer, converting integer PCM to f32.
fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Cannot open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("WAV file declares zero channels");
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    let s = s.context("Failed to read WAV sample")?;
                    Ok(s as f32 / max_val)
                })
                .collect::<Result<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.context("Failed to read WAV sample"))
            .collect::<Result<Vec<f32>>>()?,
    };

    AudioBuffer::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
        .context("Malformed WAV sample data")
}

/// Write a buffer as an interleaved 32-bit float WAV file.
fn write_wav(path: &Path, audio: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.num_channels() as u16,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Cannot create WAV file: {}", path.display()))?;
    for sample in audio.to_interleaved() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Bits per second spent on codes, in kbps.
fn code_bitrate_kbps(container: &CompressedContainer) -> f64 {
    let h = &container.header;
    let bits_per_code = (h.codebook_size as f64).log2().ceil();
    let frames_per_sec = h.sample_rate as f64 / h.downsampling_ratio as f64;
    bits_per_code * h.n_codebooks as f64 * h.channels as f64 * frames_per_sec / 1000.0
}

/// Format a byte count as a human-readable size string.
fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
