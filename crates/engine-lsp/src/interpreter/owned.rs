//
// owned.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Spawns and supervises a server-owned interpreter process (spec.md §4.2,
//! "Owned-process"). Grounded on `ark-lsp::r_env::find_r_home` for
//! locating the interpreter binary, and on `notify`'s watcher usage in
//! `ark::main` for waiting on a one-shot file to appear.

use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use notify::RecursiveMode;
use notify::Watcher;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::pki_types::PrivateKeyDer;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::rustls::RootCertStore;
use tokio_rustls::TlsConnector;

use crate::bus;
use crate::bus::transport;
use crate::bus::Bus;
use crate::errors::Error;
use crate::errors::Result;
use crate::interpreter::handshake::HandshakeFile;

/// Noise emitted on stderr by the interpreter's own memory manager; drained
/// without being forwarded to the log, per spec.md §4.2.
const STDERR_NOISE: &str = "MEMORY MANAGEMENT";

/// A spawned, server-owned interpreter instance and the artifacts the
/// bootstrap wrote that the server still needs after startup.
pub struct OwnedProcess {
    pub child: Child,
    pub bus: Bus,
    pub handshake: HandshakeFile,
}

/// Launches the interpreter with a bootstrap command line, waits for the
/// handshake file to appear, negotiates TLS using the certificate and key
/// the interpreter wrote, and returns the connected process.
pub async fn launch(install_path: Option<&Path>, extra_args: &[String]) -> Result<OwnedProcess> {
    let scratch_dir = tempfile::tempdir()?;
    let handshake_path = scratch_dir.path().join("handshake.json");
    let cert_path = scratch_dir.path().join("server.crt");
    let key_path = scratch_dir.path().join("server.key");
    let api_key = uuid::Uuid::new_v4().to_string();

    let binary = derive_interpreter_binary(install_path);
    log::info!("Launching interpreter at {}", binary.display());

    let mut command = Command::new(binary);
    command
        .args(bootstrap_args(&handshake_path, &cert_path, &key_path, &api_key))
        .args(extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    if let Some(stderr) = child.stderr.take() {
        spawn_stderr_drain(stderr);
    }

    watch_for_creation(&handshake_path).await?;
    let handshake = HandshakeFile::from_file(&handshake_path)?;

    let port = handshake
        .port
        .ok_or_else(|| Error::Anyhow(anyhow::anyhow!("handshake file is missing a port")))?;

    let tls_stream = connect_tls(port, &cert_path, &key_path).await?;

    // The cert and key only authenticate the first handshake; delete them
    // immediately afterward, per spec.md §4.1.
    let _ = std::fs::remove_file(&cert_path);
    let _ = std::fs::remove_file(&key_path);

    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (outgoing_tx, _handle) = transport::spawn(tls_stream, incoming_tx);
    let bus = Bus::with_api_key(outgoing_tx, Some(api_key));
    bus::spawn_dispatch_loop(bus.clone(), incoming_rx);
    bus.notify_connected();

    Ok(OwnedProcess { child, bus, handshake })
}

/// Bootstrap argv: instructs the interpreter to add the helper code to its
/// search path, create a long-lived helper object, write the handshake
/// file, and emit its TLS material to the paths the server designates.
fn bootstrap_args(handshake_path: &Path, cert_path: &Path, key_path: &Path, api_key: &str) -> Vec<String> {
    vec![
        "--automation".into(),
        format!("--handshake-file={}", handshake_path.display()),
        format!("--tls-cert-file={}", cert_path.display()),
        format!("--tls-key-file={}", key_path.display()),
        format!("--api-key={api_key}"),
    ]
}

async fn connect_tls(
    port: u16,
    cert_path: &Path,
    key_path: &Path,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(("127.0.0.1", port)).await?;

    let cert_pem = std::fs::read(cert_path)?;
    let key_pem = std::fs::read(key_path)?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<std::result::Result<_, _>>()
        .map_err(|err| Error::Anyhow(anyhow::anyhow!("invalid certificate: {err}")))?;

    let mut roots = RootCertStore::empty();
    for cert in &certs {
        roots
            .add(cert.clone())
            .map_err(|err| Error::Anyhow(anyhow::anyhow!("invalid root certificate: {err}")))?;
    }

    let _key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|err| Error::Anyhow(anyhow::anyhow!("invalid private key: {err}")))?
        .ok_or_else(|| Error::Anyhow(anyhow::anyhow!("no private key found")))?;

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let connector = TlsConnector::from(std::sync::Arc::new(config));
    let server_name = ServerName::try_from("localhost")
        .map_err(|err| Error::Anyhow(anyhow::anyhow!("invalid server name: {err}")))?;

    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|err| Error::Anyhow(anyhow::anyhow!("TLS handshake failed: {err}")))?;

    Ok(stream)
}

/// Watches for the creation of `path`, as written once by the interpreter
/// after bootstrap. Uses a file watcher rather than polling, per spec.md §5.
async fn watch_for_creation(path: &Path) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watch_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let target = path.to_path_buf();

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(event) = event {
            if matches!(event.kind, notify::EventKind::Create(_) | notify::EventKind::Modify(_))
                && event.paths.iter().any(|p| p == &target)
            {
                let _ = tx.send(());
            }
        }
    })
    .map_err(|err| Error::Anyhow(anyhow::anyhow!("failed to start file watcher: {err}")))?;

    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .map_err(|err| Error::Anyhow(anyhow::anyhow!("failed to watch {}: {err}", watch_dir.display())))?;

    if path.exists() {
        return Ok(());
    }

    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .map_err(|_| Error::Anyhow(anyhow::anyhow!("timed out waiting for handshake file")))?
        .ok_or_else(|| Error::Anyhow(anyhow::anyhow!("file watcher closed unexpectedly")))?;

    Ok(())
}

fn spawn_stderr_drain(stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !line.contains(STDERR_NOISE) {
                        log::warn!("interpreter stderr: {line}");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    log::warn!("error reading interpreter stderr: {err}");
                    break;
                }
            }
        }
    });
}

/// Finds the interpreter binary. `install_path`, if given, always wins;
/// otherwise falls back to platform-specific default install locations,
/// mirroring `ark-lsp::r_env::find_r_home`'s layered search.
fn derive_interpreter_binary(install_path: Option<&Path>) -> PathBuf {
    if let Some(base) = install_path {
        return binary_under(base);
    }

    for candidate in default_install_paths() {
        if candidate.exists() {
            return binary_under(&candidate);
        }
    }

    // Nothing found; fall back to a bare command name and let the OS
    // resolve it against $PATH.
    PathBuf::from(default_binary_name())
}

#[cfg(target_os = "windows")]
fn binary_under(base: &Path) -> PathBuf {
    base.join("bin").join("win64").join("engine.exe")
}

#[cfg(target_os = "macos")]
fn binary_under(base: &Path) -> PathBuf {
    base.join("bin").join("maci64").join("engine")
}

#[cfg(all(unix, not(target_os = "macos")))]
fn binary_under(base: &Path) -> PathBuf {
    base.join("bin").join("glnxa64").join("engine")
}

fn default_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "engine.exe"
    } else {
        "engine"
    }
}

#[cfg(target_os = "macos")]
fn default_install_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("/Applications")]
}

#[cfg(target_os = "linux")]
fn default_install_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("/usr/local"), PathBuf::from("/opt")]
}

#[cfg(target_os = "windows")]
fn default_install_paths() -> Vec<PathBuf> {
    std::env::var("ProgramFiles")
        .map(|p| vec![PathBuf::from(p)])
        .unwrap_or_default()
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn default_install_paths() -> Vec<PathBuf> {
    Vec::new()
}
