//
// folding.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! `foldingRangeProvider` (spec.md §6.1 `/foldDocument/request` /
//! `.../response/<id>`): the interpreter returns a flat sequence of
//! `[startLine, endLine, startLine, endLine, ...]` pairs.

use std::time::Duration;

use tower_lsp::lsp_types::FoldingRange;
use tower_lsp::lsp_types::FoldingRangeKind;

use crate::bus::Bus;
use crate::errors::Error;
use crate::errors::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn folding_ranges(bus: &Bus, code: &str) -> Result<Vec<FoldingRange>> {
    let reply = bus
        .request_reply(
            "/foldDocument/request",
            "/foldDocument/response",
            REQUEST_TIMEOUT,
            |id| {
                serde_json::json!({
                    "requestId": id,
                    "code": code,
                })
            },
        )
        .await?;

    let lines: Vec<u32> = serde_json::from_value(reply).map_err(|_| Error::MalformedReply)?;
    Ok(to_folding_ranges(&lines))
}

fn to_folding_ranges(lines: &[u32]) -> Vec<FoldingRange> {
    lines
        .chunks_exact(2)
        .map(|pair| FoldingRange {
            start_line: pair[0].saturating_sub(1),
            end_line: pair[1].saturating_sub(1),
            kind: Some(FoldingRangeKind::Region),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_become_ranges() {
        let ranges = to_folding_ranges(&[3, 9, 12, 20]);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].start_line, 2);
        assert_eq!(ranges[0].end_line, 8);
        assert_eq!(ranges[1].start_line, 11);
        assert_eq!(ranges[1].end_line, 19);
    }

    #[test]
    fn a_trailing_unpaired_line_is_dropped() {
        let ranges = to_folding_ranges(&[3, 9, 12]);
        assert_eq!(ranges.len(), 1);
    }
}
