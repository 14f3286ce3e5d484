//! ebcot CLI - JPEG 2000 Tier-1 block coder command-line utility.
//!
//! Codes a sub-band of quantized wavelet coefficients, forms quality layers and
//! reports rates and distortions per layer.

use clap::{Parser, Subcommand, ValueEnum};
use ebcot_rs::constants::{
    CINEMA_24_CODESTREAM_BYTES, CINEMA_24_COMPONENT_BYTES, CINEMA_48_CODESTREAM_BYTES,
    CINEMA_48_COMPONENT_BYTES, MAXIMUM_BIT_PLANES, MAXIMUM_CODE_BLOCK_AREA,
    MAXIMUM_CODE_BLOCK_DIMENSION, MAXIMUM_LAYERS, MAXIMUM_RESOLUTION_LEVELS, MQ_STATE_COUNT,
    NUM_AGG_CONTEXTS, NUM_CONTEXTS, NUM_MAG_CONTEXTS, NUM_SC_CONTEXTS, NUM_UNI_CONTEXTS,
    NUM_ZC_CONTEXTS,
};
use ebcot_rs::{
    CinemaProfile, CodeBlock, CodeBlockStyle, DecodeParameters, DecodeStatus, DistortionModel,
    EncodeParameters, LayeredCodeBlocks, SubbandOrientation, Tier1Decoder, Tier1Encoder,
};
use std::fs;
use std::path::PathBuf;

/// JPEG 2000 Tier-1 block coder with PCRD-opt layer formation
#[derive(Parser)]
#[command(name = "ebcot")]
#[command(version)]
#[command(about = "EBCOT bit-plane coding and quality layer formation for wavelet sub-bands", long_about = None)]
#[command(after_help = "EXAMPLES:
    ebcot layers -i band.raw -w 256 -H 256 --rates 0.25,0.5,1.0,0
    ebcot roundtrip -w 128 -H 128 --orientation hh --style 0x14
    ebcot info

Coefficient files hold row-major little-endian signed integers. Without an
input file a synthetic sub-band is generated.")]
struct Cli {
    /// Log progress to stderr (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SubbandArgs {
    /// Coefficient file (synthetic data when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Sample format of the coefficient file
    #[arg(short, long, default_value = "i32", value_enum)]
    format: SampleFormat,

    /// Sub-band width
    #[arg(short, long)]
    width: u32,

    /// Sub-band height
    #[arg(short = 'H', long)]
    height: u32,

    /// Sub-band orientation
    #[arg(long, default_value = "ll", value_enum)]
    orientation: Orientation,

    /// Nominal code-block size (power of two)
    #[arg(short, long, default_value = "64")]
    block_size: u32,

    /// Cumulative layer rates in bits per sample; 0 as the last rate keeps everything
    #[arg(short, long, value_delimiter = ',')]
    rates: Vec<f64>,

    /// Code-block style bits (SPcod), e.g. 0x14 for per-pass predictable termination
    /// or 0x01 for selective arithmetic-coding bypass
    #[arg(long, default_value = "0", value_parser = parse_style)]
    style: u8,

    /// Use the exact distortion estimator instead of the table
    #[arg(long)]
    exact: bool,

    /// Apply a digital cinema profile
    #[arg(long, value_enum)]
    cinema: Option<Cinema>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a sub-band and print the formed quality layers
    #[command(visible_alias = "l")]
    Layers {
        #[command(flatten)]
        subband: SubbandArgs,
    },

    /// Encode, then decode layer by layer and report the reconstruction error
    #[command(visible_alias = "r")]
    Roundtrip {
        #[command(flatten)]
        subband: SubbandArgs,

        /// Decode at most this many layers
        #[arg(long)]
        max_layers: Option<usize>,
    },

    /// Show coder limits and constants
    #[command(visible_alias = "i")]
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum SampleFormat {
    I16,
    I32,
}

#[derive(Clone, Copy, ValueEnum)]
enum Orientation {
    Ll,
    Hl,
    Lh,
    Hh,
}

impl From<Orientation> for SubbandOrientation {
    fn from(value: Orientation) -> Self {
        match value {
            Orientation::Ll => SubbandOrientation::LL,
            Orientation::Hl => SubbandOrientation::HL,
            Orientation::Lh => SubbandOrientation::LH,
            Orientation::Hh => SubbandOrientation::HH,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Cinema {
    /// 2K at 24 frames per second
    Cinema2k24,
    /// 2K at 48 frames per second
    Cinema2k48,
    /// 4K at 24 frames per second
    Cinema4k24,
}

impl From<Cinema> for CinemaProfile {
    fn from(value: Cinema) -> Self {
        match value {
            Cinema::Cinema2k24 => CinemaProfile::Cinema2k24,
            Cinema::Cinema2k48 => CinemaProfile::Cinema2k48,
            Cinema::Cinema4k24 => CinemaProfile::Cinema4k24,
        }
    }
}

fn parse_style(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid style '{}': {}", s, e))
}

/// A simple stderr logger.
static LOGGER: SimpleLogger = SimpleLogger;
struct SimpleLogger;
impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let target = record.module_path().unwrap_or_else(|| record.target());
            match record.level() {
                log::Level::Error => eprintln!("Error (in {}): {}", target, record.args()),
                log::Level::Warn => eprintln!("Warning (in {}): {}", target, record.args()),
                log::Level::Info => eprintln!("Info (in {}): {}", target, record.args()),
                log::Level::Debug => eprintln!("Debug (in {}): {}", target, record.args()),
                log::Level::Trace => eprintln!("Trace (in {}): {}", target, record.args()),
            }
        }
    }

    fn flush(&self) {}
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }

    let result = match cli.command {
        Commands::Layers { subband } => show_layers(&subband),
        Commands::Roundtrip {
            subband,
            max_layers,
        } => roundtrip(&subband, max_layers),
        Commands::Info => {
            show_info();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn read_coefficients(args: &SubbandArgs) -> Result<Vec<i32>, Box<dyn std::error::Error>> {
    let count = args.width as usize * args.height as usize;
    let Some(path) = &args.input else {
        return Ok(synthetic_subband(args.width, args.height));
    };

    let data = fs::read(path)?;
    let coefficients: Vec<i32> = match args.format {
        SampleFormat::I16 => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as i32)
            .collect(),
        SampleFormat::I32 => data
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    };
    if coefficients.len() != count {
        return Err(format!(
            "{:?} holds {} coefficients, expected {}x{} = {}",
            path,
            coefficients.len(),
            args.width,
            args.height,
            count
        )
        .into());
    }
    Ok(coefficients)
}

// Laplacian-like detail coefficients with a smooth low-frequency trend.
fn synthetic_subband(width: u32, height: u32) -> Vec<i32> {
    let mut state = 0x2545_F491u32;
    (0..width * height)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let (x, y) = ((i % width) as i32, (i / width) as i32);
            let trend = ((x - y) * 3) % 41;
            let noise = (state % 64) as i32 - 32;
            (trend + noise) >> (state >> 28).min(4)
        })
        .collect()
}

fn encode_subband(
    args: &SubbandArgs,
) -> Result<(Vec<CodeBlock>, LayeredCodeBlocks), Box<dyn std::error::Error>> {
    let coefficients = read_coefficients(args)?;

    let mut parameters = EncodeParameters {
        code_block_width: args.block_size,
        code_block_height: args.block_size,
        style: CodeBlockStyle::try_from_bits(args.style)?,
        layer_rates: args.rates.clone(),
        distortion_model: if args.exact {
            DistortionModel::Exact
        } else {
            DistortionModel::Table
        },
        cinema: None,
    };
    if let Some(cinema) = args.cinema {
        parameters = parameters.with_cinema_profile(cinema.into());
    }

    let encoder = Tier1Encoder::new(parameters)?;
    let blocks = CodeBlock::split_subband(
        &coefficients,
        args.width,
        args.height,
        args.orientation.into(),
        encoder.parameters().code_block_width,
        encoder.parameters().code_block_height,
    )?;
    let layered = encoder.encode(&blocks, coefficients.len())?;
    Ok((blocks, layered))
}

fn show_layers(args: &SubbandArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (blocks, layered) = encode_subband(args)?;
    let samples = args.width as f64 * args.height as f64;
    let passes: usize = layered.blocks.iter().map(|b| b.num_passes()).sum();

    println!(
        "{}x{} sub-band, {} code-blocks, {} coding passes, {} bytes",
        args.width,
        args.height,
        blocks.len(),
        passes,
        layered.blocks.iter().map(|b| b.data.len()).sum::<usize>()
    );
    println!("{:>5} {:>10} {:>8} {:>14} {:>12}", "layer", "bytes", "bpp", "reduction", "threshold");
    for layer in 0..layered.num_layers() {
        let bytes = layered.layer_bytes(layer);
        println!(
            "{:>5} {:>10} {:>8.4} {:>14.1} {:>12.4}",
            layer,
            bytes,
            bytes as f64 * 8.0 / samples,
            layered.plan.layer_distortion(layer),
            layered.plan.threshold(layer)
        );
    }
    Ok(())
}

fn roundtrip(args: &SubbandArgs, max_layers: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let (blocks, layered) = encode_subband(args)?;
    let layers = max_layers.map_or(layered.num_layers(), |m| m.min(layered.num_layers()));
    let samples = args.width as f64 * args.height as f64;

    println!("{:>5} {:>10} {:>12} {:>10}", "layer", "bytes", "mse", "corrupted");
    for layer in 1..=layers {
        let decoder = Tier1Decoder::new(DecodeParameters {
            reduce: 0,
            max_layers: Some(layer),
        })?;
        let decoded = decoder.decode(&layered, 1)?;

        let mut squared_error = 0.0;
        let mut corrupted = 0;
        for (block, decoded) in blocks.iter().zip(decoded.iter().flatten()) {
            if decoded.status != DecodeStatus::Complete {
                corrupted += 1;
            }
            for (a, b) in block.coefficients.iter().zip(&decoded.coefficients) {
                let d = (*a as f64) - (*b as f64);
                squared_error += d * d;
            }
        }
        println!(
            "{:>5} {:>10} {:>12.4} {:>10}",
            layer - 1,
            layered.layer_bytes(layer - 1),
            squared_error / samples,
            corrupted
        );
    }
    Ok(())
}

fn show_info() {
    println!("Tier-1 coder limits");
    println!(
        "  Contexts:              {} (zero coding {}, sign {}, refinement {}, run-length {}, uniform {})",
        NUM_CONTEXTS,
        NUM_ZC_CONTEXTS,
        NUM_SC_CONTEXTS,
        NUM_MAG_CONTEXTS,
        NUM_AGG_CONTEXTS,
        NUM_UNI_CONTEXTS
    );
    println!("  MQ probability states: {}", MQ_STATE_COUNT);
    println!("  Bit-planes:            {}", MAXIMUM_BIT_PLANES);
    println!(
        "  Code-block:            {} max dimension, {} max area",
        MAXIMUM_CODE_BLOCK_DIMENSION, MAXIMUM_CODE_BLOCK_AREA
    );
    println!("  Resolution levels:     {}", MAXIMUM_RESOLUTION_LEVELS);
    println!("  Quality layers:        {}", MAXIMUM_LAYERS);
    println!();
    println!("Digital cinema caps (bytes per frame)");
    println!(
        "  24 fps: codestream {}, component {}",
        CINEMA_24_CODESTREAM_BYTES, CINEMA_24_COMPONENT_BYTES
    );
    println!(
        "  48 fps: codestream {}, component {}",
        CINEMA_48_CODESTREAM_BYTES, CINEMA_48_COMPONENT_BYTES
    );
}
