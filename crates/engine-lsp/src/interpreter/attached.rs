//
// attached.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Connects to an already-running interpreter at a user-supplied URL
//! (spec.md §4.2, "Attached-process"), instead of spawning one. No TLS
//! material changes hands here: the attached interpreter is trusted by
//! virtue of the URL the user configured.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use url::Url;

use crate::bus;
use crate::bus::transport;
use crate::bus::Bus;
use crate::errors::Error;
use crate::errors::Result;

/// Delay between reconnect attempts while the attached interpreter is
/// unreachable, per spec.md §4.2.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connects to `url`, retrying every second until it succeeds or
/// `max_attempts` is exhausted. A `None` `max_attempts` retries forever,
/// matching the background-reconnect behavior described in spec.md §4.2.
pub async fn connect(url: &Url, max_attempts: Option<u32>) -> Result<Bus> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Anyhow(anyhow::anyhow!("interpreter URL has no host")))?;
    let port = url
        .port()
        .ok_or_else(|| Error::Anyhow(anyhow::anyhow!("interpreter URL has no port")))?;

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match TcpStream::connect((host, port)).await {
            Ok(tcp) => {
                let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
                let (outgoing_tx, _handle) = transport::spawn(tcp, incoming_tx);
                let bus = Bus::new(outgoing_tx);
                bus::spawn_dispatch_loop(bus.clone(), incoming_rx);
                bus.notify_connected();

                // Announces the server's presence to whatever is already
                // running, mirroring the owned flavor's implicit bootstrap.
                bus.publish("/startup", serde_json::json!({}));

                return Ok(bus);
            }
            Err(err) => {
                if let Some(max) = max_attempts {
                    if attempt >= max {
                        return Err(Error::Io(err));
                    }
                }
                log::warn!("failed to connect to interpreter at {url} (attempt {attempt}): {err}");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
