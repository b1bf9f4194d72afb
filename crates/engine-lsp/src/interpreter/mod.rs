//
// mod.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The interpreter process manager (spec.md §4.2): owns the connection
//! policy state machine (`Disconnected → Connecting → Connected`) and
//! decides, based on configuration, whether to spawn an owned process or
//! attach to an existing one.

pub mod attached;
pub mod handshake;
pub mod owned;

use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::Mutex;
use url::Url;

use crate::bus::Bus;
use crate::bus::ConnectionEvent;
use crate::config::ConnectionTiming;
use crate::config::Configuration;
use crate::errors::Error;
use crate::errors::Result;

enum ManagerState {
    Disconnected,
    Connected { bus: Bus, child: Option<Child> },
}

/// Shared handle to the single interpreter connection this server
/// maintains. Cloning is cheap; every clone sees the same underlying
/// connection attempt.
#[derive(Clone)]
pub struct InterpreterManager {
    state: Arc<Mutex<ManagerState>>,
}

impl InterpreterManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState::Disconnected)),
        }
    }

    /// Returns a connected [`Bus`], establishing a connection first if
    /// necessary. Respects `matlabConnectionTiming`: when it is `never`,
    /// returns [`Error::InterpreterUnavailable`] without attempting
    /// anything.
    pub async fn ensure_connection(&self, config: &Configuration) -> Result<Bus> {
        if config.matlab_connection_timing == ConnectionTiming::Never {
            return Err(Error::InterpreterUnavailable);
        }

        {
            let state = self.state.lock().await;
            if let ManagerState::Connected { bus, .. } = &*state {
                if !bus.is_closed() {
                    return Ok(bus.clone());
                }
            }
        }

        // `connect` is not awaited with the lock held: a dead attached URL
        // only retries a bounded number of times here (unlike the
        // background reconnect supervisor, which retries forever), but even
        // so this must not block `shutdown()` from acquiring the lock in
        // the meantime.
        let (bus, child) = connect(config).await?;

        let mut state = self.state.lock().await;
        *state = ManagerState::Connected { bus: bus.clone(), child };
        drop(state);

        if let Some(url) = config.matlab_url.clone() {
            self.spawn_reconnect_supervisor(url);
        }

        Ok(bus)
    }

    /// Watches the currently-held bus for a `Disconnected` lifecycle event
    /// and, for an attached-process connection, keeps retrying
    /// `connectToExisting(url)` every second until a new connection is
    /// established (spec.md §4.2) or the manager is shut down. Each
    /// reconnect re-arms its own supervisor for the bus it just installed.
    fn spawn_reconnect_supervisor(&self, url: String) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut lifecycle = {
                let state = this.state.lock().await;
                match &*state {
                    ManagerState::Connected { bus, .. } => bus.subscribe_lifecycle(),
                    ManagerState::Disconnected => return,
                }
            };

            loop {
                match lifecycle.recv().await {
                    Ok(ConnectionEvent::Disconnected) => break,
                    Ok(ConnectionEvent::Connected) => continue,
                    Err(_) => return,
                }
            }

            // The shutdown path clears state to `Disconnected` before
            // closing the bus; don't race a deliberate shutdown with a
            // reconnect attempt.
            if matches!(&*this.state.lock().await, ManagerState::Disconnected) {
                return;
            }

            let url = match Url::parse(&url) {
                Ok(url) => url,
                Err(err) => {
                    log::error!("reconnect supervisor has an unparseable matlabUrl: {err}");
                    return;
                }
            };

            if let Ok(bus) = attached::connect(&url, None).await {
                let mut state = this.state.lock().await;
                if matches!(&*state, ManagerState::Disconnected) {
                    // Shut down while we were reconnecting; drop the bus we
                    // just opened instead of resurrecting the connection.
                    bus.close();
                    return;
                }
                *state = ManagerState::Connected { bus, child: None };
                drop(state);
                this.spawn_reconnect_supervisor(url.to_string());
            }
        });
    }

    /// True if a live connection is currently held, without attempting to
    /// establish one.
    pub async fn is_connected(&self) -> bool {
        matches!(&*self.state.lock().await, ManagerState::Connected { bus, .. } if !bus.is_closed())
    }

    /// Tears down the connection. For an owned process, kills the recorded
    /// child PID directly first (spec.md §4.2: on some platforms the
    /// process tree includes an intermediate launcher that ignores a plain
    /// `kill`), then lets `Child`'s own `kill_on_drop` clean up anything
    /// that's left.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let ManagerState::Connected { bus, mut child } = std::mem::replace(&mut *state, ManagerState::Disconnected) {
            bus.close();
            if let Some(child) = child.as_mut() {
                kill_child(child);
            }
        }
    }
}

impl Default for InterpreterManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Attempts on the initial connect to an attached interpreter before giving
/// up; unlike the background reconnect supervisor, this one must return so
/// callers awaiting `ensure_connection` (e.g. `initialized`) don't hang
/// forever against a dead URL.
const INITIAL_CONNECT_ATTEMPTS: u32 = 5;

async fn connect(config: &Configuration) -> Result<(Bus, Option<Child>)> {
    if let Some(url) = config.matlab_url.as_deref() {
        let url = Url::parse(url).map_err(|err| Error::Anyhow(anyhow::anyhow!("invalid matlabUrl: {err}")))?;
        let bus = attached::connect(&url, Some(INITIAL_CONNECT_ATTEMPTS)).await?;
        return Ok((bus, None));
    }

    let install_path = config.matlab_install_path.as_deref();
    let process = owned::launch(install_path, &config.matlab_launch_command_args).await?;
    Ok((process.bus, Some(process.child)))
}

#[cfg(unix)]
fn kill_child(child: &mut Child) {
    use nix::sys::signal::kill;
    use nix::sys::signal::Signal;
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn kill_child(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::sync::mpsc;

    use super::*;

    fn connected_manager() -> (InterpreterManager, Bus) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = Bus::new(tx);
        let manager = InterpreterManager {
            state: Arc::new(Mutex::new(ManagerState::Connected { bus: bus.clone(), child: None })),
        };
        (manager, bus)
    }

    #[tokio::test]
    async fn fresh_manager_is_disconnected() {
        let manager = InterpreterManager::new();
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn ensure_connection_rejects_when_timing_is_never() {
        let manager = InterpreterManager::new();
        let mut config = Configuration::default();
        config.matlab_connection_timing = ConnectionTiming::Never;

        let result = manager.ensure_connection(&config).await;
        assert_matches!(result, Err(Error::InterpreterUnavailable));
    }

    #[tokio::test]
    async fn ensure_connection_reuses_an_open_bus() {
        let (manager, bus) = connected_manager();
        let config = Configuration::default();

        let reused = manager.ensure_connection(&config).await.unwrap();
        assert!(!reused.is_closed());
        assert!(!bus.is_closed());
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn shutdown_closes_the_bus_and_resets_state_to_disconnected() {
        let (manager, bus) = connected_manager();

        manager.shutdown().await;

        assert!(bus.is_closed());
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn shutdown_on_a_fresh_manager_is_a_noop() {
        let manager = InterpreterManager::new();
        manager.shutdown().await;
        assert!(!manager.is_connected().await);
    }
}
