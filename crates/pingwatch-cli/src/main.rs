mod config;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::{style, Term};
use tracing_subscriber::{fmt, EnvFilter};

use pingwatch_core::{
    ConfigError, HttpProber, IntervalScheduler, LogGrowthMonitor, NotificationChannel, Notifier,
    ProbeDispatcher, SourceRegistry, TelegramChannel, WebhookChannel,
};

use crate::config::{AppConfig, NotifyBackend, NotifySection};

/// Endpoint monitor: probe URLs on their own intervals and alert when the probe log fills up.
#[derive(Parser)]
#[command(name = "pingwatch", version, about)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Sources file. Overrides the config file.
    #[arg(short, long, global = true)]
    sources: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring every registered source until Ctrl+C.
    Run,
    /// Register a source. Prompts interactively when no URL is given.
    Add {
        /// Endpoint URL to probe.
        url: Option<String>,

        /// Probe interval in seconds.
        #[arg(requires = "url")]
        frequency: Option<i64>,
    },
    /// Print the registered sources.
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let app_config = match cli.config {
        Some(ref path) => match AppConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                init_tracing("pretty", "info");
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };

    let sources_path = cli
        .sources
        .clone()
        .unwrap_or_else(|| app_config.general.sources_file.clone());

    match cli.command {
        Commands::Run => {
            init_tracing(&app_config.general.log_format, "info");
            if let Some(ref path) = cli.config {
                tracing::info!(path = %path.display(), "Loaded config file");
            }
            run_monitor(&app_config, &sources_path).await;
        }
        Commands::Add { url, frequency } => {
            init_tracing("pretty", "warn");
            run_add(&sources_path, url, frequency);
        }
        Commands::List => {
            init_tracing("pretty", "warn");
            run_list(&sources_path);
        }
    }
}

async fn run_monitor(app_config: &AppConfig, sources_path: &Path) {
    load_env_file(&app_config.general.env_file);

    let notifier = build_notifier(&app_config.notify).unwrap_or_else(|e| fatal(e));
    let monitor_config = app_config.monitor.to_monitor_config();
    let log_config = app_config.log.to_log_config();
    log_config.validate().unwrap_or_else(|e| fatal(e));

    let registry = SourceRegistry::load(sources_path).unwrap_or_else(|e| fatal(e));
    if registry.is_empty() {
        println!(
            "No sources to monitor. Add some first with `{}`.",
            style("pingwatch add").bold()
        );
        return;
    }

    let prober = HttpProber::from_config(&monitor_config).unwrap_or_else(|e| fatal(e));
    let log = Arc::new(LogGrowthMonitor::new(log_config.clone(), notifier.clone()));
    let dispatcher = Arc::new(ProbeDispatcher::new(Arc::new(prober), log));

    let mut scheduler = IntervalScheduler::new(dispatcher, &monitor_config);
    scheduler.register_all(&registry).unwrap_or_else(|e| fatal(e));

    let term = Term::stdout();
    term.write_line(&format!(
        "{} {}",
        style("pingwatch").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    ))
    .ok();
    term.write_line(&format!(
        "  {} {}",
        style("sources:").dim(),
        registry.len()
    ))
    .ok();
    term.write_line(&format!(
        "  {} {}",
        style("log:    ").dim(),
        log_config.path.display()
    ))
    .ok();
    term.write_line(&format!(
        "  {} {}",
        style("notify: ").dim(),
        notifier.as_ref().map(Notifier::channel_name).unwrap_or("none")
    ))
    .ok();
    term.write_line(&format!("{}", style("Press Ctrl+C to stop").dim()))
        .ok();

    scheduler
        .run_forever(monitor_config.tick_period, shutdown_signal())
        .await;

    term.write_line(&format!("\n{}", style("Monitoring stopped.").dim()))
        .ok();
}

fn run_add(sources_path: &Path, url: Option<String>, frequency: Option<i64>) {
    let mut registry = SourceRegistry::load(sources_path).unwrap_or_else(|e| fatal(e));
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = Term::stdout();

    let added = match (url, frequency) {
        (Some(url), Some(frequency)) => add_one(&mut out, &mut registry, &url, frequency),
        (Some(url), None) => match prompt_frequency(&mut input, &mut out) {
            Ok(Some(frequency)) => add_one(&mut out, &mut registry, &url, frequency),
            Ok(None) => fatal("No frequency given"),
            Err(e) => fatal(e),
        },
        _ => prompt_sources(&mut input, &mut out, &mut registry).unwrap_or_else(|e| fatal(e)),
    };

    if added > 0 {
        registry.save(sources_path).unwrap_or_else(|e| fatal(e));
        tracing::debug!(added, path = %sources_path.display(), "Saved sources");
    }
}

fn add_one<W: Write>(out: &mut W, registry: &mut SourceRegistry, url: &str, frequency: i64) -> usize {
    match registry.add(url, frequency) {
        Ok(source) => {
            writeln!(out, "  {} {}", style("added").green(), source).ok();
            1
        }
        Err(e) => fatal(e),
    }
}

fn run_list(sources_path: &Path) {
    let registry = SourceRegistry::load(sources_path).unwrap_or_else(|e| fatal(e));
    if registry.is_empty() {
        println!("{}", style("No sources registered.").dim());
        return;
    }
    for (i, source) in registry.iter().enumerate() {
        println!(
            "  {:>3}  {:<8} {}",
            style(i + 1).dim(),
            format!("{}s", source.interval.as_secs()),
            style(&source.endpoint).bold()
        );
    }
}

/// One trimmed line of input, or `None` at end of input.
fn read_answer<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> io::Result<Option<String>> {
    write!(out, "{}", question)?;
    out.flush()?;
    read_answer(input)
}

/// Prompt for sources until the user declines, enters an empty URL, or input ends.
fn prompt_sources<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    registry: &mut SourceRegistry,
) -> io::Result<usize> {
    let mut added = 0;
    loop {
        let url = match ask(input, out, "Enter website URL: ")? {
            Some(url) if !url.is_empty() => url,
            _ => return Ok(added),
        };
        let Some(frequency) = prompt_frequency(input, out)? else {
            return Ok(added);
        };

        match registry.add(&url, frequency) {
            Ok(source) => {
                writeln!(out, "  {} {}", style("added").green(), source)?;
                added += 1;
            }
            Err(e) => {
                writeln!(out, "{}", style(e).red())?;
                continue;
            }
        }

        match ask(input, out, "Add another? (y/n): ")? {
            Some(answer) if answer.eq_ignore_ascii_case("y") => {}
            _ => return Ok(added),
        }
    }
}

fn prompt_frequency<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> io::Result<Option<i64>> {
    loop {
        let Some(answer) = ask(input, out, "Enter ping frequency (in seconds): ")? else {
            return Ok(None);
        };
        match answer.parse::<i64>() {
            Ok(f) if f > 0 => return Ok(Some(f)),
            _ => writeln!(out, "{}", style("Frequency must be a positive integer.").red())?,
        }
    }
}

fn build_notifier(notify: &NotifySection) -> Result<Option<Notifier>, ConfigError> {
    let policy = notify.to_retry_policy();
    let channel: Arc<dyn NotificationChannel> = match notify.backend {
        NotifyBackend::Telegram => Arc::new(TelegramChannel::new(
            env_any(&["TELEGRAM_TOKEN", "telegram_token"]),
            env_any(&["TELEGRAM_CHAT_ID", "telegram_chat_id"]),
            policy.attempt_timeout,
        )?),
        NotifyBackend::Webhook => {
            let url = notify
                .webhook_url
                .as_deref()
                .ok_or(ConfigError::Missing("notify.webhook_url"))?;
            Arc::new(WebhookChannel::new(
                url,
                env_any(&["WEBHOOK_SECRET"]),
                policy.attempt_timeout,
            )?)
        }
        NotifyBackend::Disabled => {
            tracing::warn!("Notifications disabled, log rotations will not be reported");
            return Ok(None);
        }
    };
    tracing::info!(channel = channel.name(), "Notification channel configured");
    Ok(Some(Notifier::new(channel, policy)))
}

fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| std::env::var(k).ok())
}

fn load_env_file(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to load environment file"),
    }
}

fn fatal<E: std::fmt::Display>(e: E) -> ! {
    tracing::error!("{}", e);
    std::process::exit(1);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing(log_format: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_format {
        "json" => {
            fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt().with_env_filter(filter).init();
        }
    }
}
