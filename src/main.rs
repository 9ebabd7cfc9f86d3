//! dnsfence - a policy-enforcing DNS proxy
//!
//! Loads a YAML rule file, answers DNS over UDP and TCP by routing each
//! query to the rules of its longest matching domain, and reloads the rules
//! on SIGHUP or on a timer when the file changes.

use anyhow::Context;
use clap::Parser;
use dnsfence::config::{loader, Config, ReloadCoordinator};
use dnsfence::logging::init_logging;
use dnsfence::proxy::{Forwarder, PolicyHandler};
use dnsfence::rules::{compile, RuleStore};
use dnsfence::server::ServerLauncher;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// dnsfence command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format override (text, json)
    #[arg(long)]
    log_format: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Compile the rules, report problems and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Taken before reading so an edit racing the load triggers a reload
    let marker = loader::modified_marker(&args.config).ok();
    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    config
        .override_log(args.log_level, args.log_format)
        .context("invalid log option")?;
    init_logging(&config.log, args.verbose)?;

    info!("dnsfence starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let report = compile(&config.rules);

    if args.check {
        for e in &report.errors {
            println!("{}", e);
        }
        if !report.is_clean() {
            anyhow::bail!("{} rule error(s) in {}", report.errors.len(), args.config);
        }
        println!(
            "{}: OK ({} domains, {} rules)",
            args.config,
            report.ruleset.len(),
            report.ruleset.rule_count()
        );
        return Ok(());
    }

    let dropped = report.dropped_rules();
    let ruleset = report.into_ruleset(config.reload.allow_partial)?;
    if dropped > 0 {
        warn!(dropped, "starting with a partial rule set");
    }
    info!(
        domains = ruleset.len(),
        rules = ruleset.rule_count(),
        "rule set compiled"
    );

    let listeners = config.listeners()?;
    let store = Arc::new(RuleStore::new(ruleset));
    let handler = Arc::new(PolicyHandler::new(
        Arc::clone(&store),
        Forwarder::from_config(&config.upstream),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let launcher = ServerLauncher::new(handler, config.server.clone());
    let servers = launcher.launch_all(&listeners, &shutdown_rx).await?;

    let grace = std::time::Duration::from_millis(config.server.shutdown_grace_ms);
    let coordinator = ReloadCoordinator::new(&args.config, Arc::clone(&store), config, marker);
    #[cfg(unix)]
    let _sighup = dnsfence::config::reload::spawn_sighup_forwarder(coordinator.trigger())?;
    let reload_task = tokio::spawn(coordinator.run(shutdown_rx.clone()));

    info!("dnsfence initialized successfully");

    wait_for_shutdown_signal().await?;
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(grace * 2, servers.join()).await.is_err() {
        error!("listeners did not stop in time");
    }
    let _ = reload_task.await;

    info!("dnsfence stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
