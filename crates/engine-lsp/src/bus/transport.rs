//
// transport.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

use std::io;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::frame::Frame;

/// Drives a single duplex stream (TCP, TLS-over-TCP, or a test pipe): reads
/// frames off the wire and forwards them to `incoming_tx`, and writes
/// whatever arrives on `outgoing_rx` to the wire. Returns the join handle so
/// the caller can detect when the connection drops.
///
/// Splitting read and write into one task keeps ordering simple: frames are
/// written in the order `publish` calls arrive, and read in the order the
/// peer sent them, matching the ordering guarantees in spec.md §5.
pub fn spawn<S>(stream: S, incoming_tx: mpsc::UnboundedSender<Frame>) -> (mpsc::UnboundedSender<Frame>, JoinHandle<io::Result<()>>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Frame>();
    let (mut read_half, mut write_half) = tokio::io::split(stream);

    let handle = tokio::spawn(async move {
        let mut reader = BufReader::new(&mut read_half);
        loop {
            tokio::select! {
                frame = read_frame(&mut reader) => {
                    match frame? {
                        Some(frame) => {
                            if incoming_tx.send(frame).is_err() {
                                // Nobody is listening for inbound frames anymore.
                                break;
                            }
                        }
                        None => break, // EOF
                    }
                }
                outgoing = outgoing_rx.recv() => {
                    match outgoing {
                        Some(frame) => {
                            let bytes = frame
                                .encode()
                                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
                            write_half.write_all(&bytes).await?;
                            write_half.flush().await?;
                        }
                        None => break, // writer side closed
                    }
                }
            }
        }
        Ok(())
    });

    (outgoing_tx, handle)
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> io::Result<Option<Frame>> {
    let content_length = match read_headers(reader).await? {
        Some(len) => len,
        None => return Ok(None),
    };

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let frame: Frame = serde_json::from_slice(&body)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(Some(frame))
}

/// Reads `Content-Length: N\r\n\r\n` headers and returns `N`, or `None` on a
/// clean EOF before any header bytes arrive.
async fn read_headers<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> io::Result<Option<usize>> {
    use tokio::io::AsyncBufReadExt;

    let mut content_length = None;
    let mut saw_any = false;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return if saw_any {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated frame header"))
            } else {
                Ok(None)
            };
        }
        saw_any = true;

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
    }

    content_length
        .map(Some)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header"))
}
