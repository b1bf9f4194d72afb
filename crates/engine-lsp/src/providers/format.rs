//
// format.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! `documentFormattingProvider` (spec.md §6.1 `/formatDocument/*`,
//! §6.2). One round trip: the whole document's text out, the
//! reformatted text back.

use std::time::Duration;

use serde::Deserialize;
use tower_lsp::lsp_types::FormattingOptions;
use tower_lsp::lsp_types::Position;
use tower_lsp::lsp_types::Range;
use tower_lsp::lsp_types::TextEdit;

use crate::bus::Bus;
use crate::errors::Error;
use crate::errors::Result;

/// Formatting is a user-facing blocking operation; spec.md §5 recommends a
/// floor of 10s before giving up locally.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct FormatReply {
    data: String,
}

/// Replaces the whole document with `reply.data`. `Position::new(u32::MAX,
/// 0)` as the end of the edit range is the usual trick for "rest of the
/// document" when the exact line count isn't tracked by this layer.
pub async fn format_document(bus: &Bus, text: &str, options: &FormattingOptions) -> Result<Vec<TextEdit>> {
    let reply = bus
        .request_reply(
            "/formatDocument/request",
            "/formatDocument/response",
            REQUEST_TIMEOUT,
            |id| {
                serde_json::json!({
                    "requestId": id,
                    "data": text,
                    "insertSpaces": options.insert_spaces,
                    "tabSize": options.tab_size,
                    "indentSize": options.tab_size,
                })
            },
        )
        .await?;

    let reply: FormatReply = serde_json::from_value(reply).map_err(|_| Error::MalformedReply)?;

    Ok(vec![TextEdit {
        range: Range::new(Position::new(0, 0), Position::new(u32::MAX, 0)),
        new_text: reply.data,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn format_document_times_out_without_a_reply() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = Bus::new(tx);
        let options = FormattingOptions {
            tab_size: 4,
            insert_spaces: true,
            ..Default::default()
        };

        // No interpreter is listening, so request_reply's own timeout (far
        // shorter in a real deployment than REQUEST_TIMEOUT) would normally
        // fire; here we just check the call doesn't panic wiring the
        // request up. A real reply is exercised via the bus's own tests.
        let result = tokio::time::timeout(Duration::from_millis(50), format_document(&bus, "x=1", &options)).await;
        assert!(result.is_err(), "expected the outer test timeout to win the race");
    }
}
