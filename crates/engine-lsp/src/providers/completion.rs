//
// completion.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! `completionProvider` (spec.md §6.1 `/completions/request`, §6.2 trigger
//! characters `. ( , / \ <space>`). The interpreter has already filtered
//! candidates against the prefix at the cursor; this layer only reshapes
//! them into LSP `CompletionItem`s.

use std::time::Duration;

use serde::Deserialize;
use tower_lsp::lsp_types::CompletionItem;
use tower_lsp::lsp_types::CompletionItemKind;

use crate::bus::Bus;
use crate::errors::Error;
use crate::errors::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompletion {
    name: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    insert_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompletionResult {
    #[serde(default)]
    completions: Vec<RawCompletion>,
}

pub async fn completions(bus: &Bus, code: &str, file_name: &str, cursor_position: u32) -> Result<Vec<CompletionItem>> {
    let reply = bus
        .request_reply(
            "/completions/request",
            "/completions/response",
            REQUEST_TIMEOUT,
            |id| {
                serde_json::json!({
                    "requestId": id,
                    "code": code,
                    "fileName": file_name,
                    "cursorPosition": cursor_position,
                })
            },
        )
        .await?;

    let result: RawCompletionResult = serde_json::from_value(reply).map_err(|_| Error::MalformedReply)?;

    Ok(result.completions.into_iter().map(to_completion_item).collect())
}

fn to_completion_item(raw: RawCompletion) -> CompletionItem {
    CompletionItem {
        label: raw.name,
        kind: raw.kind.as_deref().map(completion_kind),
        detail: raw.detail,
        insert_text: raw.insert_text,
        ..Default::default()
    }
}

fn completion_kind(kind: &str) -> CompletionItemKind {
    match kind {
        "function" => CompletionItemKind::FUNCTION,
        "variable" => CompletionItemKind::VARIABLE,
        "class" => CompletionItemKind::CLASS,
        "property" => CompletionItemKind::PROPERTY,
        "keyword" => CompletionItemKind::KEYWORD,
        _ => CompletionItemKind::TEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_kind_falls_back_to_text() {
        assert_eq!(completion_kind("widget"), CompletionItemKind::TEXT);
        assert_eq!(completion_kind("function"), CompletionItemKind::FUNCTION);
    }
}
