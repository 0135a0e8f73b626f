use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use qpmark_core::learned::REFERENCE_PROFILE_LEN;
use qpmark_core::{
    AnalysisMethod, EmbeddingEngine, ExtractionConfig, Extractor, Frame, ImageSequence,
    ModelProfile, Payload, QpPlanWriter, VecSource, WatermarkConfig,
};

#[derive(Parser)]
#[command(name = "qpmark", about = "Block-QP video watermarking tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule a watermark over a directory of frames and write the QP plan
    Embed {
        /// Directory of PNG/JPEG frames, read in file name order
        #[arg(short, long)]
        input: PathBuf,

        /// Output QP plan (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Payload: 0x-prefixed hex, or any label to hash
        #[arg(short, long)]
        payload: String,

        /// Session seed (random if omitted)
        #[arg(short, long)]
        seed: Option<u32>,

        /// Fraction of blocks modified per temporal period
        #[arg(short, long, default_value = "0.008")]
        density: f64,

        /// Frames between pattern repetitions
        #[arg(long, default_value = "30")]
        period: u32,

        /// Mask the payload with a key derived from this passphrase
        #[arg(long)]
        encrypt_key: Option<String>,

        /// Stop after this many frames
        #[arg(long, default_value = "1000")]
        max_frames: usize,
    },
    /// Detect a watermark in a directory of frames
    Detect {
        /// Directory of PNG/JPEG frames, read in file name order
        #[arg(short, long)]
        input: PathBuf,

        /// Weight profile (JSON); a reference profile is used if omitted
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Detector selection
        #[arg(long, value_enum, default_value = "fused")]
        method: Method,

        /// Minimum confidence for a detection
        #[arg(short, long, default_value = "0.7")]
        threshold: f64,

        /// Minimum frames required for analysis
        #[arg(long, default_value = "10")]
        min_frames: usize,

        /// Stop after this many frames
        #[arg(long, default_value = "1000")]
        max_frames: usize,

        /// Edge of the square analysis raster
        #[arg(long, default_value = "720")]
        analysis_size: u32,
    },
    /// Run a synthetic embed + detect session
    Demo {
        /// Frame width
        #[arg(long, default_value = "320")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "240")]
        height: u32,

        /// Number of frames
        #[arg(long, default_value = "60")]
        frames: u32,

        /// Session seed
        #[arg(short, long, default_value = "12345")]
        seed: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    Statistical,
    Learned,
    Fused,
}

impl From<Method> for AnalysisMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Statistical => AnalysisMethod::Statistical,
            Method::Learned => AnalysisMethod::Learned,
            Method::Fused => AnalysisMethod::Fused,
        }
    }
}

fn parse_payload(text: &str) -> Payload {
    if text.starts_with("0x") || text.starts_with("0X") {
        Payload::from_hex(text)
    } else {
        Payload::from_label(text)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Embed {
            input,
            output,
            payload,
            seed,
            density,
            period,
            encrypt_key,
            max_frames,
        } => {
            if !(density > 0.0 && density <= 1.0) {
                return Err(format!("density must be in (0, 1], got {density}").into());
            }
            if period == 0 {
                return Err("period must be at least 1 frame".into());
            }

            let seed = seed.unwrap_or_else(rand::random);
            let config = WatermarkConfig {
                payload: parse_payload(&payload),
                seed,
                block_density: density,
                temporal_period: period,
                enable_encryption: encrypt_key.is_some(),
                encryption_key: encrypt_key.unwrap_or_default(),
            };

            let sequence = ImageSequence::open(&input)?;
            eprintln!(
                "Scheduling watermark over {} ({} frames)...",
                input.display(),
                sequence.len().min(max_frames)
            );

            let writer = Arc::new(QpPlanWriter::new());
            let mut engine = EmbeddingEngine::with_writer(config, Box::new(writer.clone()));
            for frame in sequence.take(max_frames) {
                let frame = frame?;
                if engine.geometry().is_none() {
                    engine.bind(frame.width, frame.height)?;
                }
                engine.apply(&frame.data, frame.index)?;
            }
            if engine.geometry().is_none() {
                return Err(format!("no frames found in {}", input.display()).into());
            }

            let plan = writer.plan(&engine);
            serde_json::to_writer_pretty(BufWriter::new(File::create(&output)?), &plan)?;

            eprintln!("QP plan written to {}", output.display());
            eprintln!("{}", engine.stats());
            println!("Payload: {}", engine.config().payload.to_hex());
            println!("Seed:    {seed}");
        }
        Command::Detect {
            input,
            model,
            method,
            threshold,
            min_frames,
            max_frames,
            analysis_size,
        } => {
            let profile = match model {
                Some(path) => ModelProfile::from_json_file(path)?,
                None => {
                    eprintln!("Warning: no model given, using the reference weight profile.");
                    ModelProfile::reference(REFERENCE_PROFILE_LEN)
                }
            };
            let config = ExtractionConfig {
                min_frames,
                max_frames,
                confidence_threshold: threshold,
                analysis_size,
                method: method.into(),
            };

            let sequence = ImageSequence::open(&input)?;
            eprintln!(
                "Detecting watermark in {} ({} frames, {:?})...",
                input.display(),
                sequence.len(),
                method
            );

            let extractor = Extractor::new(config, Arc::new(profile));
            let result = extractor.analyze_source(sequence);
            eprintln!("{}", extractor.stats());

            if !result.detected {
                eprintln!("No watermark detected: {}", result.diagnostic);
                std::process::exit(1);
            }
            println!("Payload:    {}", result.payload.to_hex());
            println!("Seed:       {}", result.seed);
            println!("Confidence: {:.4}", result.confidence);
            println!("Details:    {}", result.diagnostic);
        }
        Command::Demo {
            width,
            height,
            frames,
            seed,
        } => {
            let config = WatermarkConfig {
                payload: Payload::from_label("qpmark-demo"),
                seed,
                block_density: 0.3,
                temporal_period: 10,
                ..WatermarkConfig::default()
            };
            let mut engine = EmbeddingEngine::new(config);
            engine.bind(width, height)?;

            let synthetic: Vec<Frame> = (0..frames)
                .map(|i| {
                    Frame::from_fn(i, width, height, move |x, y| {
                        ((x / 8 + y / 8 + i) % 2 * 64 + 96) as u8
                    })
                })
                .collect();
            for frame in &synthetic {
                let blocks = engine.blocks_for_frame(frame.index);
                engine.apply(&frame.data, frame.index)?;
                if frame.index < 3 {
                    println!("Frame {}: {} blocks scheduled", frame.index, blocks.len());
                    for block in blocks.iter().take(4) {
                        println!("  ({:4}, {:4}) delta {:+}", block.x, block.y, block.delta);
                    }
                }
            }
            println!("{}", engine.stats());

            let extractor = Extractor::new(
                ExtractionConfig {
                    analysis_size: 64,
                    ..ExtractionConfig::default()
                },
                Arc::new(ModelProfile::reference(REFERENCE_PROFILE_LEN)),
            );
            let result = extractor.analyze_source(VecSource::new(synthetic));
            println!("Detection: {result}");
            println!("{}", extractor.stats());
        }
    }

    Ok(())
}
