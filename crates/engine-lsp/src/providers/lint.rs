//
// lint.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! `/linting/request` and `/linting/endstatement/request` (spec.md §6.1).
//! The diagnostics side feeds `textDocument/publishDiagnostics`; the
//! end-statement side answers "is the statement ending at this line
//! actually complete", used by the client before it submits a REPL line.

use std::time::Duration;

use serde::Deserialize;
use tower_lsp::lsp_types::Diagnostic;
use tower_lsp::lsp_types::DiagnosticSeverity;
use tower_lsp::lsp_types::Position;
use tower_lsp::lsp_types::Range;

use crate::errors::Error;
use crate::errors::Result;
use crate::index::model;
use crate::index::raw::RawRange;
use crate::bus::Bus;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLintRecord {
    message: String,
    range: RawRange,
    #[serde(default)]
    severity: Option<u8>,
}

/// Executed per-buffer on open/change/save (mirroring `ark-lsp`'s
/// `publish_diagnostics` call sites).
pub async fn lint_document(bus: &Bus, code: &str, file_name: &str) -> Result<Vec<Diagnostic>> {
    let reply = bus
        .request_reply(
            "/linting/request",
            "/linting/response",
            REQUEST_TIMEOUT,
            |id| {
                serde_json::json!({
                    "requestId": id,
                    "code": code,
                    "fileName": file_name,
                })
            },
        )
        .await?;

    let records: Vec<RawLintRecord> = serde_json::from_value(reply).map_err(|_| Error::MalformedReply)?;

    Ok(records.into_iter().map(to_diagnostic).collect())
}

fn to_diagnostic(record: RawLintRecord) -> Diagnostic {
    let range: model::Range = record.range.into();
    Diagnostic {
        range: Range::new(
            Position::new(range.line_start.saturating_sub(1), range.char_start),
            Position::new(range.line_end.saturating_sub(1), range.char_end),
        ),
        severity: Some(severity(record.severity)),
        message: record.message,
        ..Default::default()
    }
}

fn severity(raw: Option<u8>) -> DiagnosticSeverity {
    match raw {
        Some(0) => DiagnosticSeverity::ERROR,
        Some(1) => DiagnosticSeverity::WARNING,
        Some(2) => DiagnosticSeverity::INFORMATION,
        _ => DiagnosticSeverity::HINT,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndStatementReply {
    line_number: u32,
}

/// Asks whether the code up to and including `line_number` forms a complete
/// statement; the interpreter echoes back the line number the statement
/// actually ends on (which may be later than `line_number` for a
/// continuation).
pub async fn is_end_of_statement(bus: &Bus, code: &str, line_number: u32) -> Result<u32> {
    let reply = bus
        .request_reply(
            "/linting/endstatement/request",
            "/linting/endstatement/response",
            REQUEST_TIMEOUT,
            |id| {
                serde_json::json!({
                    "requestId": id,
                    "code": code,
                    "lineNumber": line_number,
                })
            },
        )
        .await?;

    let reply: EndStatementReply = serde_json::from_value(reply).map_err(|_| Error::MalformedReply)?;
    Ok(reply.line_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_maps_unknown_codes_to_hint() {
        assert_eq!(severity(Some(0)), DiagnosticSeverity::ERROR);
        assert_eq!(severity(Some(9)), DiagnosticSeverity::HINT);
        assert_eq!(severity(None), DiagnosticSeverity::HINT);
    }

    #[test]
    fn to_diagnostic_converts_one_based_lines_to_lsp_zero_based() {
        let record = RawLintRecord {
            message: "unused variable".into(),
            range: RawRange {
                line_start: 3,
                char_start: 0,
                line_end: 3,
                char_end: 5,
            },
            severity: Some(1),
        };
        let diagnostic = to_diagnostic(record);
        assert_eq!(diagnostic.range.start.line, 2);
        assert_eq!(diagnostic.range.end.line, 2);
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::WARNING));
    }
}
