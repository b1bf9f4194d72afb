//
// path.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! `resolvePaths` (spec.md §4.7): a single bus round-trip to the
//! interpreter's `identifier-definition` algorithm. The algorithm itself
//! (private-folder lookup, class-folder handling, ancestor search, dotted
//! prefix recursion, byte-compiled alternates) runs on the interpreter side;
//! this module only packages the request and normalizes the reply.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::bus::Bus;
use crate::errors::Error;
use crate::errors::Result;
use crate::index::raw::RawCodeData;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFileInfo {
    file_name: String,
    #[serde(default)]
    line: u32,
    #[serde(default)]
    char: u32,
    code_data: RawCodeData,
    /// Set when the interpreter resolved this via the dotted-prefix
    /// recursion of spec.md §4.7 step 5, meaning the caller must still
    /// verify the trailing component actually exists inside `code_data`.
    #[serde(default)]
    requires_symbol_search: bool,
    /// Set when the candidate path named a directory rather than a file
    /// (spec.md §4.6 stage 4: "If the result is a directory, treat as
    /// not-found").
    #[serde(default)]
    is_directory: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResolvedIdentifier {
    identifier: String,
    file_info: Option<RawFileInfo>,
}

/// One resolved file, normalized out of the interpreter's reply. `code_data`
/// is already-computed, per spec.md §4.4.1 ("so no second round-trip is
/// needed").
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub uri: Url,
    pub line: u32,
    pub char: u32,
    pub code_data: RawCodeData,
    pub requires_symbol_search: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedIdentifier {
    pub identifier: String,
    pub file: Option<ResolvedFile>,
}

impl ResolvedIdentifier {
    /// spec.md §8 invariant 9: a result with `line <= 1` together with the
    /// requires-symbol flag is treated as not-found.
    pub fn is_not_found(&self) -> bool {
        match &self.file {
            None => true,
            Some(file) => file.requires_symbol_search && file.line <= 1,
        }
    }
}

#[derive(Clone)]
pub struct PathResolver {
    bus: Bus,
}

impl PathResolver {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }

    /// Resolves each of `identifiers` against `context`, the file the
    /// lookup originates from.
    pub async fn resolve(&self, identifiers: &[String], context: &Url) -> Result<Vec<ResolvedIdentifier>> {
        if identifiers.is_empty() {
            return Ok(Vec::new());
        }

        let context_path = context.to_string();
        let identifiers_owned = identifiers.to_vec();

        let reply = self
            .bus
            .request_reply(
                "/findIdentifierDefinition/request",
                "/findIdentifierDefinition/response",
                REQUEST_TIMEOUT,
                move |id| {
                    serde_json::json!({
                        "requestId": id,
                        "containingFile": context_path,
                        "identifiers": identifiers_owned,
                    })
                },
            )
            .await?;

        let raw: Vec<RawResolvedIdentifier> = serde_json::from_value(reply).map_err(|_| Error::MalformedReply)?;

        Ok(raw.into_iter().map(normalize).collect())
    }

    /// Resolves a single identifier, for the common case (navigation
    /// resolver stage 4, class-closure base-class expansion).
    pub async fn resolve_one(&self, identifier: &str, context: &Url) -> Result<ResolvedIdentifier> {
        let mut results = self.resolve(&[identifier.to_string()], context).await?;
        results
            .pop()
            .ok_or(Error::ResolverNotFound)
    }
}

fn normalize(raw: RawResolvedIdentifier) -> ResolvedIdentifier {
    let file = raw.file_info.and_then(|info| {
        if info.is_directory {
            return None;
        }
        let uri = Url::from_file_path(&info.file_name).ok()?;
        Some(ResolvedFile {
            uri,
            line: info.line,
            char: info.char,
            code_data: info.code_data,
            requires_symbol_search: info.requires_symbol_search,
        })
    });

    ResolvedIdentifier {
        identifier: raw.identifier,
        file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_when_no_file() {
        let resolved = ResolvedIdentifier {
            identifier: "foo".into(),
            file: None,
        };
        assert!(resolved.is_not_found());
    }

    #[test]
    fn not_found_when_symbol_search_required_and_line_is_trivial() {
        let resolved = ResolvedIdentifier {
            identifier: "foo".into(),
            file: Some(ResolvedFile {
                uri: Url::parse("file:///a.m").unwrap(),
                line: 1,
                char: 0,
                code_data: RawCodeData {
                    package_name: String::new(),
                    class_info: Default::default(),
                    function_info: vec![],
                    references: vec![],
                },
                requires_symbol_search: true,
            }),
        };
        assert!(resolved.is_not_found());
    }

    #[test]
    fn found_when_line_is_meaningful() {
        let resolved = ResolvedIdentifier {
            identifier: "foo".into(),
            file: Some(ResolvedFile {
                uri: Url::parse("file:///a.m").unwrap(),
                line: 12,
                char: 4,
                code_data: RawCodeData {
                    package_name: String::new(),
                    class_info: Default::default(),
                    function_info: vec![],
                    references: vec![],
                },
                requires_symbol_search: true,
            }),
        };
        assert!(!resolved.is_not_found());
    }
}
