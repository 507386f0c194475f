//! Boots the kerncfg services in-process, logs a few records and dumps the
//! kernel-log ring through the byte-ring client.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use service_abi::{GetFlags, Status};
use services_fabric::{ByteRingClient, ClientResult, KerncfgClient};
use services_kerncfg::{Kerncfg, KerncfgConfig, KernelLogLayer, RingConfig, RingPurpose};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};
use transport::LogRing;
use transport_fabric::Runtime;

/// Text rendering for everything the dump prints.
mod render {
    use service_abi::{BufferContents, MemoryInformation};
    use std::fmt::Write;

    pub fn system(cmdline: &str, memory: &MemoryInformation, cpus: u32) -> String {
        format!(
            "cmdline: {cmdline}\nmemory:  {} of {} units available, {} bytes per unit\ncpus:    {cpus}",
            memory.available_memory, memory.total_usable_memory, memory.memory_unit
        )
    }

    /// One response from the ring. Record payloads are printed as text.
    pub fn chunk(contents: &BufferContents, one_record: bool) -> String {
        let mut out = String::new();
        if contents.missed {
            let _ = writeln!(
                out,
                "-- missed data, resuming at {} --",
                contents.effective_dequeue
            );
        }
        if contents.truncated {
            out.push_str("[truncated] ");
        }
        let text = String::from_utf8_lossy(&contents.data);
        if one_record {
            let _ = write!(out, "[{:>6}] {text}", contents.effective_dequeue);
        } else {
            out.push_str(&text);
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    pub fn summary(reads: u64, bytes: u64, missed: u64, cursor: u64) -> String {
        format!("{reads} read(s), {bytes} byte(s), {missed} byte(s) missed, cursor {cursor}")
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Dump the kernel-log ring of an in-process kerncfg")]
struct Args {
    /// TOML file holding a kerncfg configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Kernel command line reported by kerncfg
    #[arg(long)]
    cmdline: Option<String>,

    /// Demo log records to emit before dumping
    #[arg(long, default_value_t = 8)]
    records: u32,

    /// Kernel-log ring capacity (power of two, at least 64)
    #[arg(long)]
    ring_bytes: Option<usize>,

    /// Return as soon as the ring is drained instead of blocking
    #[arg(long)]
    no_wait: bool,

    /// Fetch one record per request
    #[arg(long)]
    one_record: bool,

    /// Keep gathering records until this many bytes are available
    #[arg(long, default_value_t = 0)]
    watermark: u32,

    /// Largest number of bytes per request
    #[arg(long, default_value_t = 4096, value_parser = clap::value_parser!(u32).range(1..))]
    chunk: u32,
}

impl Args {
    fn flags(&self) -> GetFlags {
        let mut flags = GetFlags::empty();
        flags.set(GetFlags::NO_WAIT, self.no_wait);
        flags.set(GetFlags::ONE_RECORD, self.one_record);
        flags
    }
}

#[derive(Debug, Default)]
struct Dump {
    reads: u64,
    bytes: u64,
    missed: u64,
    cursor: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let mut runtime = Runtime::new();
    let kerncfg = Kerncfg::start(&config, &runtime.spawner()).context("failed to start kerncfg")?;
    init_tracing(Arc::clone(kerncfg.kernel_log()));

    for record in 0..args.records {
        info!(target: "ringdump", record, "demo record");
    }

    let client = KerncfgClient::new(kerncfg.connect()?);
    let system = runtime
        .run_until(async {
            let cmdline = client.cmdline().await?;
            let memory = client.memory_information().await?;
            let cpus = client.num_cpu().await?;
            Ok::<_, services_fabric::ClientError>(render::system(&cmdline, &memory, cpus))
        })
        .context("kerncfg query failed")?;
    println!("{system}");

    let ring = ByteRingClient::new(kerncfg.connect_ring(RingPurpose::KernelLog)?);
    let dump = Rc::new(RefCell::new(Dump::default()));
    let outcome = Rc::new(RefCell::new(None));
    {
        let dump = Rc::clone(&dump);
        let outcome = Rc::clone(&outcome);
        let flags = args.flags();
        let (chunk, watermark) = (args.chunk, args.watermark);
        runtime.spawn(async move {
            let result = drain(&ring, chunk, watermark, flags, &dump).await;
            *outcome.borrow_mut() = Some(result);
        })?;
    }
    // Without NO_WAIT the last read parks until more is logged, which never
    // happens here; a stalled executor means the ring is drained.
    runtime.run_until_stalled();

    match outcome.borrow_mut().take() {
        Some(Err(err)) => return Err(err).context("ring read failed"),
        Some(Ok(())) => {}
        None => info!(target: "ringdump", "reader parked at end of ring"),
    }

    let dump = dump.borrow();
    if dump.missed > 0 {
        warn!(target: "ringdump", missed = dump.missed, "ring overwrote unread data");
    }
    println!(
        "{}",
        render::summary(dump.reads, dump.bytes, dump.missed, dump.cursor)
    );
    Ok(())
}

async fn drain(
    ring: &ByteRingClient,
    chunk: u32,
    watermark: u32,
    flags: GetFlags,
    dump: &RefCell<Dump>,
) -> ClientResult<()> {
    let mut reader = ring.reader(0);
    loop {
        let before = reader.cursor();
        let contents = reader.read(chunk, watermark, flags).await?;
        if contents.status == Status::WouldBlock {
            return Ok(());
        }
        if contents.data.is_empty() && reader.cursor() == before {
            return Ok(());
        }
        print!(
            "{}",
            render::chunk(&contents, flags.contains(GetFlags::ONE_RECORD))
        );

        let mut dump = dump.borrow_mut();
        dump.reads += 1;
        dump.bytes += contents.data.len() as u64;
        dump.missed = reader.missed_bytes();
        dump.cursor = reader.cursor();
    }
}

fn load_config(args: &Args) -> Result<KerncfgConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => KerncfgConfig::default(),
    };
    if let Some(cmdline) = &args.cmdline {
        config.cmdline = cmdline.clone();
    }
    if let Some(bytes) = args.ring_bytes {
        config.log_ring = RingConfig::new(bytes);
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<KerncfgConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn init_tracing(kernel_log: Arc<LogRing>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // Ignore error if already set (e.g., during tests).
    let _ = tracing_subscriber::registry()
        .with(KernelLogLayer::new(kernel_log))
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(env_filter))
        .try_init();
}
