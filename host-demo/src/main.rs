use clap::{Parser, ValueEnum};
use membridge::{Bridge, BridgeConfig, FileBlob, FileSource, OptLevel, TracingSink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "host-demo",
    about = "Load a wasm module, copy a file into its memory and call an export."
)]
struct Args {
    /// Path to the .wasm module
    module: PathBuf,

    /// File to ingest into module memory
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Export to call; receives (offset, len) of the ingested input when --input is set
    #[arg(short, long)]
    entry: Option<String>,

    /// Read size used when streaming the input file
    #[arg(long, default_value_t = membridge::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Print up to N ingested bytes as hex
    #[arg(long, value_name = "N", default_value_t = 0)]
    hex_preview: usize,

    /// Cranelift optimization level
    #[arg(long, value_enum, default_value_t = Opt::Speed)]
    opt_level: Opt,

    /// Log filter directive (defaults to RUST_LOG, then `info`)
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Opt {
    None,
    Speed,
    SpeedAndSize,
}

impl From<Opt> for OptLevel {
    fn from(opt: Opt) -> Self {
        match opt {
            Opt::None => OptLevel::None,
            Opt::Speed => OptLevel::Speed,
            Opt::SpeedAndSize => OptLevel::SpeedAndSize,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log.as_deref())?;
    tracing::debug!(?args, "starting host");

    let config = BridgeConfig::default().with_opt_level(args.opt_level.into());
    let source = FileSource::new(&args.module);
    let mut bridge = Bridge::load(&source, Arc::new(TracingSink), config).await?;

    let Some(input) = args.input.as_ref() else {
        if let Some(entry) = args.entry.as_deref() {
            bridge.invoke(entry)?;
        }
        println!(
            "✅ module loaded: {} memory={} bytes",
            args.module.display(),
            bridge.memory_size()
        );
        return Ok(());
    };

    let blob = FileBlob::open(input).await?.with_chunk_size(args.chunk_size);
    let allocation = bridge.ingest_from_blob(blob).await?;

    if args.hex_preview > 0 {
        println!("{}", hex_preview(allocation.bytes(&bridge)?, args.hex_preview));
    }

    if let Some(entry) = args.entry.as_deref() {
        bridge.call::<(u32, u32), ()>(entry, (allocation.offset(), allocation.size()))?;
    }

    println!(
        "✅ ingested: module={} input={} offset={} bytes={} entry=`{}`",
        args.module.display(),
        input.display(),
        allocation.offset(),
        allocation.size(),
        args.entry.as_deref().unwrap_or("-")
    );

    allocation.free(&mut bridge)?;
    Ok(())
}

fn init_tracing(directive: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn hex_preview(bytes: &[u8], limit: usize) -> String {
    let shown = &bytes[..bytes.len().min(limit)];
    let rest = bytes.len() - shown.len();
    if rest == 0 {
        hex::encode(shown)
    } else {
        format!("{} (+{} bytes)", hex::encode(shown), rest)
    }
}
