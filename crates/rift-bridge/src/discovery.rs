//! Finding the local control plane.
//!
//! The control plane advertises itself through a lockfile of the form
//! `name:pid:port:password:protocol`. [`LockfileDiscovery`] polls that file
//! and reports when an instance appears, changes, or goes away.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rift_config::BridgeConfig;
use tokio::sync::mpsc;

use crate::error::BridgeError;

/// A running control-plane instance as advertised in its lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCandidate {
    pub name: String,
    pub pid: u32,
    pub port: u16,
    pub password: String,
    pub protocol: String,
}

impl LocalCandidate {
    /// Instances are told apart by port.
    pub fn identity(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("{}://127.0.0.1:{}", self.protocol, self.port)
    }
}

impl FromStr for LocalCandidate {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let [name, pid, port, password, protocol] = parts.as_slice() else {
            return Err(BridgeError::Discovery(format!(
                "expected 5 lockfile fields, got {}",
                parts.len()
            )));
        };
        let pid = pid
            .parse()
            .map_err(|_| BridgeError::Discovery(format!("bad pid: {pid}")))?;
        let port = port
            .parse()
            .map_err(|_| BridgeError::Discovery(format!("bad port: {port}")))?;
        Ok(Self {
            name: name.to_string(),
            pid,
            port,
            password: password.to_string(),
            protocol: protocol.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Found(LocalCandidate),
    Lost,
}

pub trait Discovery: Send + Sync {
    /// Start watching. The watch stops when the receiver is dropped.
    fn watch(&self) -> mpsc::Receiver<DiscoveryEvent>;
}

/// Polls a lockfile on a fixed interval.
#[derive(Debug, Clone)]
pub struct LockfileDiscovery {
    path: PathBuf,
    interval: Duration,
}

impl LockfileDiscovery {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
        }
    }

    /// Discovery for the lockfile named in the bridge config, if any.
    pub fn from_config(config: &BridgeConfig) -> Option<Self> {
        let path = config.lockfile_path.clone()?;
        Some(Self::new(
            path,
            Duration::from_millis(config.discovery_interval_ms),
        ))
    }

    /// `Ok(None)` when no lockfile exists. A file that does not parse is an
    /// error, usually a write caught halfway.
    async fn read(&self) -> Result<Option<LocalCandidate>, BridgeError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text.parse::<LocalCandidate>().map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Discovery(e.to_string())),
        }
    }
}

impl Discovery for LockfileDiscovery {
    fn watch(&self) -> mpsc::Receiver<DiscoveryEvent> {
        let (tx, rx) = mpsc::channel(8);
        let this = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            let mut current: Option<LocalCandidate> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tx.closed() => break,
                }

                let seen = match this.read().await {
                    Ok(seen) => seen,
                    Err(e) => {
                        tracing::debug!(path = %this.path.display(), error = %e, "Skipping unreadable lockfile");
                        continue;
                    }
                };
                let event = match (&current, &seen) {
                    (_, Some(found)) if current.as_ref() != Some(found) => {
                        tracing::info!(port = found.port, name = %found.name, "Control plane lockfile found");
                        DiscoveryEvent::Found(found.clone())
                    }
                    (Some(_), None) => {
                        tracing::info!("Control plane lockfile removed");
                        DiscoveryEvent::Lost
                    }
                    _ => continue,
                };
                current = seen;

                if tx.send(event).await.is_err() {
                    break;
                }
            }
            tracing::debug!(path = %this.path.display(), "Lockfile watch stopped");
        });

        rx
    }
}
