use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stdout_relay::app::{handle_fatal_error, init_logging, AppConfig};
use stdout_relay::config::{loader, RelayConfig};
use stdout_relay::error::DocumentError;
use stdout_relay::results::relay_document;
use stdout_relay::streaming::{Clock, OutputMode, StreamPipeline, SystemClock};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long buffered output may take to drain before the process exits
const FLUSH_GRACE: Duration = Duration::from_secs(2);

/// Relay an automation engine's output from stdin to stdout
#[derive(Parser, Debug)]
#[command(name = "stdout-relay", version)]
#[command(
    about = "Decorate, filter or re-encode an automation engine's output while it runs",
    long_about = None
)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// How to interpret the input
    #[arg(long, value_enum)]
    mode: Option<OutputMode>,

    /// Text placed before every line
    #[arg(long)]
    prepend: Option<String>,

    /// Text placed after every line
    #[arg(long)]
    append: Option<String>,

    /// Prefix every line with the current time
    #[arg(long)]
    timestamp: bool,

    /// strftime layout for --timestamp
    #[arg(long)]
    timestamp_layout: Option<String>,

    /// Blank lines matching this regex (repeatable)
    #[arg(long = "skip", value_name = "REGEX")]
    skip: Vec<String>,

    /// Records buffered between reading and writing
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Stop relaying after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// In json mode, fail when any host has failures or is unreachable
    #[arg(long)]
    check_stats: bool,
}

impl Cli {
    /// Command-line values win over the config file
    fn apply_overrides(&self, config: &mut RelayConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(prepend) = &self.prepend {
            config.prepend = Some(prepend.clone());
        }
        if let Some(append) = &self.append {
            config.append = Some(append.clone());
        }
        if self.timestamp {
            config.timestamp = true;
        }
        if let Some(layout) = &self.timestamp_layout {
            config.timestamp_layout = layout.clone();
        }
        config.skip_patterns.extend(self.skip.iter().cloned());
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Some(Duration::from_secs(secs));
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app_config = AppConfig::new(cli.verbose);
    init_logging(&app_config);

    match run(cli).await {
        // Exit right away: the blocking stdin read of a cancelled run only
        // returns once the upstream writes or closes
        Ok(()) => std::process::exit(0),
        Err(e) => handle_fatal_error(e, app_config.verbose),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = loader::load_or_default(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    debug!("Effective configuration: {:?}", config);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping relay");
                cancel.cancel();
            }
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if cli.check_stats {
        if config.mode != OutputMode::Json {
            bail!("--check-stats needs --mode json");
        }
        return relay_and_check(&config, clock, &cancel).await;
    }

    let pipeline = StreamPipeline::new(config.pipeline_config(), config.build_processor(clock)?)?;
    let outcome = pipeline
        .run(tokio::io::stdin(), tokio::io::stdout(), &cancel)
        .await
        .context("Relay failed")?;

    if outcome.is_cancelled() {
        warn!("Relay cancelled; output may be incomplete");
    }
    flush_stdout(outcome.sink).await
}

/// Relay the document as it arrives, then check its stats
async fn relay_and_check(
    config: &RelayConfig,
    clock: Arc<dyn Clock>,
    cancel: &CancellationToken,
) -> Result<()> {
    let relayed = relay_document(
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.build_chain(clock)?,
        config.pipeline_config(),
        cancel,
    )
    .await;
    let relayed = match relayed {
        Ok(relayed) => relayed,
        Err(DocumentError::Parse(e)) => {
            return Err(e).context("Relayed output is not a result document")
        }
        Err(e) => return Err(e).context("Relay failed"),
    };
    flush_stdout(relayed.sink).await?;

    let Some(document) = relayed.document else {
        warn!("Relay cancelled before the document was complete; stats not checked");
        return Ok(());
    };
    debug!("Run summary:\n{}", document);

    document.check_stats()?;
    info!("All hosts finished without failures");
    Ok(())
}

/// Push out output a cancelled write stage left unflushed
async fn flush_stdout(mut stdout: Stdout) -> Result<()> {
    match tokio::time::timeout(FLUSH_GRACE, stdout.flush()).await {
        Ok(flushed) => flushed.context("Failed to flush stdout"),
        Err(_) => {
            warn!("Stdout did not drain within {:?}", FLUSH_GRACE);
            Ok(())
        }
    }
}
