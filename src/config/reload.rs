//! Rule set hot reload
//!
//! The coordinator re-reads the configuration file when asked to (signal,
//! timer or an explicit [`ReloadTrigger`]), but only when the file's
//! modification time moved. A successfully compiled set replaces the active
//! one in the [`RuleStore`] in one atomic step; anything else leaves the
//! active set in place.

use crate::config::{loader, Config};
use crate::rules::{compile, CompileError, RuleStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of a single reload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Modification marker did not change; nothing was read
    Unchanged,
    /// A new rule set is active
    Applied {
        /// Store generation after the swap
        generation: u64,
        /// Domains in the new set
        domains: usize,
        /// Rules in the new set
        rules: usize,
        /// Rules left out because of compile errors
        dropped: usize,
    },
    /// The previous rule set stays active
    Rejected {
        /// Why the new configuration was not applied
        reason: String,
    },
}

/// Cloneable handle that requests a reload from anywhere
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    tx: mpsc::Sender<()>,
}

impl ReloadTrigger {
    /// Request a reload
    ///
    /// Requests coalesce while one is already pending. Returns false once
    /// the coordinator has stopped.
    pub fn trigger(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Watches the configuration file and swaps the active rule set
///
/// # Example
///
/// ```no_run
/// use dnsfence::config::{loader, Config, ReloadCoordinator};
/// use dnsfence::rules::{compile, RuleStore};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let marker = loader::modified_marker("config.yaml").ok();
/// let config = Config::from_file("config.yaml")?;
/// let ruleset = compile(&config.rules).into_ruleset(false)?;
/// let store = Arc::new(RuleStore::new(ruleset));
///
/// let mut coordinator = ReloadCoordinator::new("config.yaml", Arc::clone(&store), config, marker);
/// let outcome = coordinator.reload_once();
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
pub struct ReloadCoordinator {
    state: ReloadState,
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
}

/// What a reload reads and writes; moved onto a blocking thread per attempt
struct ReloadState {
    path: PathBuf,
    store: Arc<RuleStore>,
    active: Config,
    last_marker: Option<SystemTime>,
}

impl ReloadCoordinator {
    /// Create a coordinator
    ///
    /// `active` is the configuration the process started with and `marker`
    /// the modification time observed before it was read.
    pub fn new(
        path: impl AsRef<Path>,
        store: Arc<RuleStore>,
        active: Config,
        marker: Option<SystemTime>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            state: ReloadState {
                path: path.as_ref().to_path_buf(),
                store,
                active,
                last_marker: marker,
            },
            tx,
            rx,
        }
    }

    /// Handle for requesting reloads
    pub fn trigger(&self) -> ReloadTrigger {
        ReloadTrigger {
            tx: self.tx.clone(),
        }
    }

    /// Check the marker and, if it moved, re-read, compile and swap
    ///
    /// Blocks on file I/O and rule compilation.
    pub fn reload_once(&mut self) -> ReloadOutcome {
        self.state.reload_once()
    }

    /// Serve reload requests until shutdown
    ///
    /// Reloads run on the interval timer (if configured) and on every
    /// [`ReloadTrigger`] request, each on the blocking thread pool.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // `_tx` keeps the request channel open while no trigger is alive
        let Self {
            mut state,
            tx: _tx,
            mut rx,
        } = self;

        let mut ticker = state.active.reload.interval().map(|period| {
            let mut t = interval_at(Instant::now() + period, period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });

        info!(
            path = %state.path.display(),
            interval_secs = state.active.reload.interval_secs,
            "reload coordinator started"
        );

        loop {
            tokio::select! {
                _ = tick(&mut ticker) => {
                    debug!("reload by timer");
                }
                Some(()) = rx.recv() => {
                    debug!("reload by request");
                }
                _ = shutdown.changed() => {
                    break;
                }
            }

            let attempt = tokio::task::spawn_blocking(move || {
                state.reload_once();
                state
            });
            state = match attempt.await {
                Ok(state) => state,
                Err(e) => {
                    error!(error = %e, "reload attempt panicked, stopping coordinator");
                    return;
                }
            };
        }

        debug!("reload coordinator stopped");
    }
}

impl ReloadState {
    fn reload_once(&mut self) -> ReloadOutcome {
        let marker = match loader::modified_marker(&self.path) {
            Ok(marker) => marker,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot stat config file");
                return ReloadOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        if self.last_marker == Some(marker) {
            debug!(path = %self.path.display(), "config file unchanged");
            return ReloadOutcome::Unchanged;
        }
        self.last_marker = Some(marker);

        let config = match Config::from_file(&self.path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "config reload failed, keeping current rules");
                return ReloadOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        let report = compile(&config.rules);
        let dropped = report.dropped_rules();
        let allow_partial = self.active.reload.allow_partial;

        if !report.is_clean() && !allow_partial {
            let reason = CompileError::summary(&report.errors);
            error!(
                path = %self.path.display(),
                errors = report.errors.len(),
                "rule compile failed, keeping current rules"
            );
            return ReloadOutcome::Rejected { reason };
        }

        if self.active.runtime_differs(&config) {
            warn!("config changes outside `rules` take effect after a restart");
        }

        let ruleset = report.ruleset;
        let domains = ruleset.len();
        let rules = ruleset.rule_count();
        let generation = self.store.replace(ruleset);
        self.active.rules = config.rules;

        info!(generation, domains, rules, dropped, "rules reloaded");

        ReloadOutcome::Applied {
            generation,
            domains,
            rules,
            dropped,
        }
    }
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Forward SIGHUP to a reload trigger
#[cfg(unix)]
pub fn spawn_sighup_forwarder(trigger: ReloadTrigger) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hup.recv().await.is_some() {
            info!("SIGHUP received, reloading rules");
            if !trigger.trigger() {
                break;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::TempDir;

    const BASE: &str = r#"
listen: { udp: { address: 127.0.0.1, port: 5353 } }
rules:
  example.com:
    - name: block
      then: { action: refused }
"#;

    const NEXT: &str = r#"
listen: { udp: { address: 127.0.0.1, port: 5353 } }
rules:
  example.com:
    - name: block
      then: { action: refused }
  example.org:
    - name: fwd
      then: { action: forward, targets: [1.1.1.1:53] }
"#;

    const BROKEN_RULE: &str = r#"
listen: { udp: { address: 127.0.0.1, port: 5353 } }
rules:
  example.com:
    - name: ok
      then: { action: refused }
    - name: bad
      match: { patterns: ['('] }
      then: { action: refused }
"#;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    /// Replace the file with `contents` stamped `secs` past a fixed epoch
    ///
    /// Goes through a rename so a concurrent stat never sees the new
    /// contents with an intermediate mtime.
    fn write_at(path: &Path, contents: &str, secs: u64) {
        let staged = path.with_extension("staged");
        fs::write(&staged, contents).unwrap();
        let file = File::options().write(true).open(&staged).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs))
            .unwrap();
        drop(file);
        fs::rename(&staged, path).unwrap();
    }

    fn setup(contents: &str) -> (TempDir, PathBuf, Arc<RuleStore>, ReloadCoordinator) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        write_at(&path, contents, 0);

        let marker = loader::modified_marker(&path).ok();
        let config = Config::from_file(&path).unwrap();
        let ruleset = compile(&config.rules).into_ruleset(false).unwrap();
        let store = Arc::new(RuleStore::new(ruleset));
        let coordinator = ReloadCoordinator::new(&path, Arc::clone(&store), config, marker);
        (dir, path, store, coordinator)
    }

    #[test]
    fn test_unchanged_marker_keeps_identity() {
        let (_dir, _path, store, mut coordinator) = setup(BASE);
        let before = store.snapshot();

        assert_eq!(coordinator.reload_once(), ReloadOutcome::Unchanged);
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_modified_file_is_applied() {
        let (_dir, path, store, mut coordinator) = setup(BASE);
        write_at(&path, NEXT, 10);

        let outcome = coordinator.reload_once();
        assert_eq!(
            outcome,
            ReloadOutcome::Applied {
                generation: 2,
                domains: 2,
                rules: 2,
                dropped: 0,
            }
        );
        assert!(store.snapshot().get("example.org.").is_some());

        // Same marker again: nothing to do
        assert_eq!(coordinator.reload_once(), ReloadOutcome::Unchanged);
    }

    #[test]
    fn test_unparsable_file_keeps_current_set() {
        let (_dir, path, store, mut coordinator) = setup(BASE);
        let before = store.snapshot();
        write_at(&path, "rules: [not: a map", 10);

        assert!(matches!(
            coordinator.reload_once(),
            ReloadOutcome::Rejected { .. }
        ));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));

        // The broken file is not re-read until it changes again
        assert_eq!(coordinator.reload_once(), ReloadOutcome::Unchanged);

        write_at(&path, NEXT, 20);
        assert!(matches!(
            coordinator.reload_once(),
            ReloadOutcome::Applied { .. }
        ));
    }

    #[test]
    fn test_compile_error_rejects_whole_set() {
        let (_dir, path, store, mut coordinator) = setup(BASE);
        let before = store.snapshot();
        write_at(&path, BROKEN_RULE, 10);

        match coordinator.reload_once() {
            ReloadOutcome::Rejected { reason } => assert!(reason.contains("bad")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn test_allow_partial_applies_remaining_rules() {
        let base = format!("{}\nreload: {{ allow_partial: true }}\n", BASE);
        let broken = format!("{}\nreload: {{ allow_partial: true }}\n", BROKEN_RULE);
        let (_dir, path, store, mut coordinator) = setup(&base);
        write_at(&path, &broken, 10);

        assert_eq!(
            coordinator.reload_once(),
            ReloadOutcome::Applied {
                generation: 2,
                domains: 1,
                rules: 1,
                dropped: 1,
            }
        );
        let snap = store.snapshot();
        assert_eq!(snap.get("example.com.").unwrap().rules[0].name, "ok");
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let (_dir, path, store, mut coordinator) = setup(BASE);
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            coordinator.reload_once(),
            ReloadOutcome::Rejected { .. }
        ));
        assert_eq!(store.generation(), 1);
    }

    #[tokio::test]
    async fn test_trigger_drives_run_loop() {
        let (_dir, path, store, coordinator) = setup(BASE);
        let trigger = coordinator.trigger();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(coordinator.run(shutdown_rx));

        write_at(&path, NEXT, 10);
        assert!(trigger.trigger());

        let deadline = Instant::now() + millis(2000);
        while store.generation() < 2 && Instant::now() < deadline {
            tokio::time::sleep(millis(10)).await;
        }
        assert_eq!(store.generation(), 2);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(!trigger.trigger());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_timer_reloads_modified_file() {
        let base = format!("{}\nreload: {{ interval_secs: 1 }}\n", BASE);
        let next = format!("{}\nreload: {{ interval_secs: 1 }}\n", NEXT);
        let (_dir, path, store, coordinator) = setup(&base);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(coordinator.run(shutdown_rx));

        // Ticks over an unchanged file keep the active set
        tokio::time::sleep(millis(3500)).await;
        assert_eq!(store.generation(), 1);

        write_at(&path, &next, 10);
        // Bounded in wall time: the reload itself runs on a real thread
        let started = std::time::Instant::now();
        while store.generation() < 2 && started.elapsed() < Duration::from_secs(5) {
            tokio::time::sleep(millis(100)).await;
        }
        assert_eq!(store.generation(), 2);
        assert!(store.snapshot().get("example.org.").is_some());

        tokio::time::sleep(millis(3000)).await;
        assert_eq!(store.generation(), 2);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
