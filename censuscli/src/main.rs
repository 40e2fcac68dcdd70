mod config;

use clap::{Parser, ValueEnum};
use config::{config_path, default_config_toml, Config, ConfigError};
use console::style;
use libdomain_census::{
    create_http_pool, doh_classifier, generator::GeneratorError, resolver::ResolverError,
    wordlist::{fetch_wordlists, WordListError},
    Agent, AgentError, Candidate, CandidateSource, CheckpointError, CheckpointStore,
    Classification, Mode, RunOutcome, ShortLabelGenerator, UploadClient, UploadError,
    UploadOutcome, WordGenerator, WordList,
};
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Short,
    Word,
    Both,
}

impl ModeArg {
    fn modes(self) -> &'static [Mode] {
        match self {
            ModeArg::Short => &[Mode::Short],
            ModeArg::Word => &[Mode::Word],
            ModeArg::Both => &[Mode::Short, Mode::Word],
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "census", version)]
#[command(about = "Domain census agent - probe candidate domains and upload anonymous aggregates", long_about = None)]
struct Args {
    /// Config file (default: <config dir>/domain-census/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enumeration(s) to run; overrides the enabled flags in the config
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Probe and aggregate but never upload or commit checkpoints
    #[arg(long)]
    dry_run: bool,

    /// Print one line per classified candidate
    #[arg(long, short = 'p')]
    print: bool,

    /// Delete the saved enumeration pointer (for --mode, or every mode)
    #[arg(long)]
    reset_pointer: bool,

    /// Clear all aggregates in the remote stats store
    #[arg(long)]
    reset_db: bool,

    /// Seconds to pause between blocks
    #[arg(long, value_name = "SECS")]
    block_pause: Option<u64>,

    /// Candidates per block
    #[arg(long)]
    batch_size: Option<usize>,

    /// Stop after this many blocks
    #[arg(long)]
    max_blocks: Option<u64>,

    /// Stats store base URL
    #[arg(long, env = "CENSUS_API_BASE")]
    api_base: Option<String>,

    /// Stats store admin key
    #[arg(long, env = "CENSUS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Download the part-of-speech word lists into the words directory and exit
    #[arg(long)]
    fetch_wordlists: bool,

    /// Print the default config to stdout and exit
    #[arg(long)]
    print_default_config: bool,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_default_config: bool,

    /// Remove a stale agent lock before starting
    #[arg(long)]
    break_lock: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    WordList(#[from] WordListError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_)
            | CliError::Generator(_)
            | CliError::Resolver(ResolverError::NoEndpoints)
            | CliError::WordList(WordListError::Empty(_))
            | CliError::Checkpoint(CheckpointError::Locked(_))
            | CliError::Agent(AgentError::Unauthorized(_)) => 2,
            CliError::Upload(e) if e.is_auth_failure() => 2,
            _ => 1,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn apply_args(config: &mut Config, args: &Args) {
    if let Some(base) = &args.api_base {
        config.api.base = base.clone();
    }
    if let Some(key) = &args.api_key {
        config.api.key = Some(key.clone());
    }
    if let Some(batch_size) = args.batch_size {
        config.probe.batch_size = batch_size;
    }
    if let Some(secs) = args.block_pause {
        config.probe.block_pause_secs = secs;
    }
    if let Some(mode) = args.mode {
        let modes = mode.modes();
        config.short.enabled = modes.contains(&Mode::Short);
        config.words.enabled = modes.contains(&Mode::Word);
    }
}

fn print_candidate(candidate: &Candidate, result: &Classification) {
    let label = if !result.is_registered() {
        style("unregistered").green()
    } else if result.product().is_active_product() {
        style("active_product").cyan()
    } else if result.usage().is_active() {
        style(result.usage().as_str()).dim()
    } else {
        style(result.usage().as_str()).yellow()
    };
    println!("{:<28} {}", candidate.domain(), label);
}

fn build_sources(config: &Config) -> Result<Vec<Box<dyn CandidateSource>>, CliError> {
    let tlds = config.tld_list().map_err(ConfigError::from)?;
    let mut sources: Vec<Box<dyn CandidateSource>> = Vec::new();

    if config.short.enabled {
        let space = config.label_space().map_err(ConfigError::from)?;
        sources.push(Box::new(ShortLabelGenerator::new(space, tlds.clone())?));
    }
    if config.words.enabled {
        let words = WordList::load_dir(&config.words.dir, config.words.max_length)?;
        info!(count = words.len(), dir = %config.words.dir.display(), "Word list loaded");
        sources.push(Box::new(WordGenerator::new(words, tlds)?));
    }
    Ok(sources)
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn spawn_shutdown_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, stopping at the next safe point");
        tx.send_replace(true);
    });
}

fn write_default_config(path: Option<PathBuf>) -> Result<(), CliError> {
    let path = path
        .or_else(config_path)
        .ok_or(ConfigError::NoDefaultDir("config"))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, default_config_toml())?;
    println!("Default config written to: {}", path.display());
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    if args.print_default_config {
        print!("{}", default_config_toml());
        return Ok(());
    }
    if args.write_default_config {
        return write_default_config(args.config.clone());
    }

    let mut config = Config::load(args.config.as_deref())?;
    apply_args(&mut config, &args);
    config.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_agent(args, config))
}

async fn run_agent(args: Args, config: Config) -> Result<(), CliError> {
    let client = create_http_pool(config.timeout())?;

    if args.fetch_wordlists {
        let summary = fetch_wordlists(&client, &config.words.dir, config.words.max_length).await?;
        for (pos, count) in &summary.per_pos {
            println!("{:>10}: {} words", pos, count);
        }
        println!(
            "{} unique words written to {}",
            summary.unique,
            config.words.dir.display()
        );
        return Ok(());
    }

    let store = CheckpointStore::open(config.state_dir()?)?;
    if args.break_lock && store.break_lock()? {
        println!("Removed stale lock in {}", store.dir().display());
    }
    let _lock = store.lock()?;

    if args.reset_pointer {
        let modes = args.mode.unwrap_or(ModeArg::Both).modes();
        for mode in modes {
            store.reset(*mode)?;
            println!("Reset {} pointer", mode);
        }
        if !args.reset_db {
            return Ok(());
        }
    }

    let api_key = match config.api_key() {
        Some(key) => key.to_string(),
        None if args.dry_run => String::new(),
        None => return Err(ConfigError::MissingApiKey.into()),
    };
    let uploader = UploadClient::new(client.clone(), &config.api.base, &api_key, config.timeout())
        .dry_run(args.dry_run);

    if args.reset_db {
        match uploader.reset().await? {
            UploadOutcome::Sent => println!("Remote stats reset"),
            UploadOutcome::DryRun(_) => println!("Dry run: remote stats left untouched"),
        }
        return Ok(());
    }

    let sources = build_sources(&config)?;
    let classifier = doh_classifier(client, config.resolvers.clone(), &config.probe_config())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_listener(shutdown_tx);

    let dry_run = uploader.is_dry_run();
    let mut agent = Agent::new(classifier, uploader, store, sources, config.agent_settings())
        .with_shutdown(shutdown_rx);
    if args.print {
        agent = agent.with_observer(Box::new(print_candidate));
    }

    info!(
        api = %config.api.base,
        dry_run,
        batch_size = config.probe.batch_size,
        "Agent started"
    );
    match agent.run(args.max_blocks).await? {
        RunOutcome::BlockLimit { blocks } => println!("Stopped after {} blocks", blocks),
        RunOutcome::Exhausted { blocks } => {
            println!("Enumeration complete after {} blocks", blocks)
        }
        RunOutcome::Interrupted { blocks } => {
            println!("Interrupted after {} committed blocks", blocks)
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("census").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn mode_flag_overrides_enabled_sections() {
        let mut config = Config::default();
        apply_args(&mut config, &args(&["--mode", "word"]));
        assert!(!config.short.enabled);
        assert!(config.words.enabled);

        apply_args(&mut config, &args(&["--mode", "both"]));
        assert!(config.short.enabled);
        assert!(config.words.enabled);
    }

    #[test]
    fn numeric_flags_override_probe_section() {
        let mut config = Config::default();
        apply_args(
            &mut config,
            &args(&["--batch-size", "10", "--block-pause", "5", "--api-base", "http://localhost:8787"]),
        );
        assert_eq!(config.probe.batch_size, 10);
        assert_eq!(config.probe.block_pause_secs, 5);
        assert_eq!(config.api.base, "http://localhost:8787");
    }

    #[test]
    fn failures_map_to_exit_codes() {
        assert_eq!(CliError::Config(ConfigError::MissingApiKey).exit_code(), 2);
        assert_eq!(CliError::Upload(UploadError::Unauthorized(401)).exit_code(), 2);
        assert_eq!(
            CliError::Agent(AgentError::Unauthorized(UploadError::Unauthorized(403))).exit_code(),
            2
        );
        assert_eq!(
            CliError::Agent(AgentError::UploadFailures {
                attempts: 3,
                last: UploadError::Timeout
            })
            .exit_code(),
            1
        );
        assert_eq!(CliError::Upload(UploadError::Timeout).exit_code(), 1);
    }
}
