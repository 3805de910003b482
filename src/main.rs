use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use hostpulse::config::{self, LogFormat, LoggingConfig, OutputFormat, load_config, load_config_from_path};
use hostpulse::format::{format_bytes, format_uptime};
use hostpulse::system::source::{CounterSource, SourceKind, open_source};
use hostpulse::{Sampler, SystemStats};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hostpulse",
    about = "Periodically sample CPU, memory, processes and uptime"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Refresh rate in milliseconds
    #[arg(long)]
    refresh_rate: Option<u64>,

    /// Number of snapshots to print (0 = until interrupted)
    #[arg(long)]
    iterations: Option<u64>,

    /// Counter source: auto, procfs, sysinfo
    #[arg(long)]
    source: Option<String>,

    /// Output: json, pretty, summary
    #[arg(long)]
    output: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli)?;
    init_tracing(&config.logging)?;

    let source = open_source(config.source.kind, &config.source.proc_root)?;
    let sampler = Sampler::with_ranking(source, config.processes.ranking);

    run(&sampler, &config).await
}

async fn run<S: CounterSource>(sampler: &Sampler<S>, config: &config::Config) -> Result<()> {
    let tick_rate = Duration::from_millis(config.general.refresh_rate_ms.max(1));
    let mut ticker = tokio::time::interval(tick_rate);
    let mut taken = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are logged by the sampler; the next tick retries.
                if let Ok(stats) = sampler.get_system_stats() {
                    print_stats(&stats, config.general.output)?;
                }
                taken += 1;
                if config.general.iterations != 0 && taken >= config.general.iterations {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

fn print_stats(stats: &SystemStats, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string(stats)?),
        OutputFormat::Pretty => println!("{}", serde_json::to_string_pretty(stats)?),
        OutputFormat::Summary => println!("{}", summary_line(stats)),
    }
    Ok(())
}

fn summary_line(stats: &SystemStats) -> String {
    let model = if stats.cpu.model_name.is_empty() {
        "Unknown"
    } else {
        stats.cpu.model_name.as_str()
    };
    format!(
        "cpu {:.1}% ({} cores, {}) | mem {:.1}% ({} / {}) | swap {} / {} | {} procs | up {}",
        stats.cpu.usage,
        stats.cpu.cores,
        model,
        stats.memory.used_percent,
        format_bytes(stats.memory.used),
        format_bytes(stats.memory.total),
        format_bytes(stats.memory.swap_used),
        format_bytes(stats.memory.swap_total),
        stats.processes.len(),
        format_uptime(stats.uptime),
    )
}

fn load_config_for_cli(cli: &Cli) -> Result<config::Config> {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(rate) = cli.refresh_rate {
        config.general.refresh_rate_ms = rate;
    }
    if let Some(iterations) = cli.iterations {
        config.general.iterations = iterations;
    }
    if let Some(ref source) = cli.source {
        config.source.kind = source.parse::<SourceKind>().map_err(|e| eyre!(e))?;
    }
    if let Some(ref output) = cli.output {
        config.general.output = output.parse::<OutputFormat>().map_err(|e| eyre!(e))?;
    }

    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .map_err(|e| eyre!("invalid log level `{}`: {e}", logging.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match logging.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| eyre!("failed to set tracing subscriber: {e}"))
}
