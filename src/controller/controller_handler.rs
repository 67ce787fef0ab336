use crate::authentication::FileCredentialStore;
use crate::configuration::Config;
use crate::error_handling::types::*;
use crate::firewall::{Firewall, IptablesBackend, PacketFilter};
use crate::network::tls::build_tls_acceptor;
use crate::network::{NeighborTableResolver, NetworkListener};
use crate::session_management::SessionStore;
use crate::storage::FileStorage;
use crate::web_interface::{TemplateSet, WebServer};
use log::{debug, error, info, warn};
use std::future::Future;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Owns the validated configuration and the firewall, and builds everything else on demand.
///
/// `run` starts the full gateway; `sessions_report`, `revoke_ip` and `rules` are the
/// one-shot operator commands.
pub struct Controller {
    pub config: Config,
    firewall: Arc<Firewall>,
}

impl Controller {
    /// Validates `config` and sets up the `iptables` backend it names.
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        let backend = IptablesBackend::new(config.iptables_bin.clone(), config.conntrack_bin.clone());
        if !backend.is_available() {
            error!(
                "[!] '{}' not found on PATH, grants and revokes will not be applied",
                config.iptables_bin
            );
        }
        Self::with_packet_filter(config, Arc::new(backend))
    }

    /// Same as [`Controller::new`] with an explicit rule backend.
    pub fn with_packet_filter(
        config: Config,
        backend: Arc<dyn PacketFilter>,
    ) -> Result<Self, ControllerError> {
        config.validate().map_err(|e| {
            error!("[!] Invalid configuration: {}", e);
            ControllerError::ConfigurationError(e)
        })?;

        let firewall = Arc::new(Firewall::new(
            backend,
            config.lan_interface.clone(),
            config.intercept_port,
            config.max_rule_removals,
        ));
        Ok(Self { config, firewall })
    }

    /// Restores the persisted session table, re-granting every surviving session.
    pub fn open_sessions(&self) -> SessionStore {
        SessionStore::open(
            Arc::new(FileStorage::new(&self.config.sessions_file)),
            self.firewall.clone(),
            self.config.session_ttl_secs,
        )
    }

    /// Runs the gateway until Ctrl-C.
    pub async fn run(&self) -> Result<(), ControllerError> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => error!("[!] Unable to listen for shutdown signal: {}", e),
            }
        })
        .await
    }

    /// Runs the gateway until `shutdown` resolves, then drains in-flight connections and
    /// stops the sweeper.
    ///
    /// Every startup failure is returned before the listener binds.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ControllerError>
    where
        F: Future<Output = ()>,
    {
        info!("[+] Starting portal gateway");

        let credentials = load_credentials(&self.config.users_file)?;
        if credentials.is_empty() {
            warn!("No valid credentials loaded, every login will fail");
        }
        let tls = build_tls_acceptor(&self.config)?;
        let templates = TemplateSet::load(self.config.templates_dir.as_deref());

        let storage = Arc::new(FileStorage::new(&self.config.sessions_file));
        let firewall = self.firewall.clone();
        let ttl = self.config.session_ttl_secs;
        let sessions = tokio::task::spawn_blocking(move || SessionStore::open(storage, firewall, ttl))
            .await
            .map(Arc::new)
            .map_err(|e| ControllerError::InitializationFailed(format!("session restore: {}", e)))?;

        let server = Arc::new(WebServer::new(
            Arc::new(credentials),
            Arc::new(NeighborTableResolver::new()),
            sessions.clone(),
            Arc::new(templates),
            self.config.max_request_bytes,
            self.config.read_timeout(),
        ));

        let listener = NetworkListener::bind(&self.config, tls).await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = spawn_sweeper(
            sessions,
            Duration::from_secs(self.config.sweep_interval_secs),
            stop_rx,
        );

        listener
            .serve(server, async move {
                shutdown.await;
                let _ = stop_tx.send(true);
            })
            .await;

        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                error!("[!] Session sweeper ended abnormally: {}", e);
            }
        }
        info!("[+] Portal gateway stopped");
        Ok(())
    }

    /// One line per active session, sorted by key.
    pub fn sessions_report(&self) -> String {
        let store = self.open_sessions();
        let snapshot = store.snapshot();
        if snapshot.is_empty() {
            return "no active sessions\n".to_string();
        }
        snapshot
            .values()
            .map(|session| format!("{}\n", session))
            .collect()
    }

    /// Drops every session of `ip`, including ones another running instance persisted.
    pub fn revoke_ip(&self, ip: IpAddr) -> usize {
        let removed = self.open_sessions().remove_by_ip(ip);
        info!("Revoked {} session(s) for {}", removed, ip);
        removed
    }

    pub fn rules(&self) -> Result<String, ControllerError> {
        Ok(self.firewall.list()?)
    }
}

/// Reads the credentials file. An unreadable file is fatal; malformed content leaves the
/// gateway running with no valid credentials.
pub fn load_credentials(path: &Path) -> Result<FileCredentialStore, ControllerError> {
    match FileCredentialStore::load(path) {
        Ok(store) => Ok(store),
        Err(e @ AuthError::Unreadable(..)) => {
            error!("[!] {}", e);
            Err(ControllerError::AuthError(e))
        }
        Err(e) => {
            error!("[!] {}; all logins will be rejected until it is fixed", e);
            Ok(FileCredentialStore::empty())
        }
    }
}

/// Periodically removes expired sessions until `stop` changes. A zero interval disables it.
fn spawn_sweeper(
    sessions: Arc<SessionStore>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        info!("Session sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    let sessions = sessions.clone();
                    match tokio::task::spawn_blocking(move || sessions.sweep_expired()).await {
                        Ok(0) => debug!("Sweep found no expired session"),
                        Ok(n) => info!("Sweep removed {} expired session(s)", n),
                        Err(e) => error!("[!] Sweep task failed: {}", e),
                    }
                }
            }
        }
        debug!("Session sweeper stopped");
    }))
}
