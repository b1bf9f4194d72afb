//
// signature_help.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! `signatureHelpProvider` (spec.md §6.2 triggers `( ,`). Not named in the
//! §6.1 wire table; grounded on the same `{code, fileName, cursorPosition}`
//! shape as `/completions/request` since both are "what does the interpreter
//! know about the call under the cursor" queries (documented as an Open
//! Question resolution in DESIGN.md).

use std::time::Duration;

use serde::Deserialize;
use tower_lsp::lsp_types::Documentation;
use tower_lsp::lsp_types::ParameterInformation;
use tower_lsp::lsp_types::ParameterLabel;
use tower_lsp::lsp_types::SignatureHelp;
use tower_lsp::lsp_types::SignatureInformation;

use crate::bus::Bus;
use crate::errors::Error;
use crate::errors::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParameter {
    label: String,
    #[serde(default)]
    documentation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignature {
    label: String,
    #[serde(default)]
    documentation: Option<String>,
    #[serde(default)]
    parameters: Vec<RawParameter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignatureHelp {
    #[serde(default)]
    signatures: Vec<RawSignature>,
    #[serde(default)]
    active_signature: Option<u32>,
    #[serde(default)]
    active_parameter: Option<u32>,
}

pub async fn signature_help(bus: &Bus, code: &str, file_name: &str, cursor_position: u32) -> Result<Option<SignatureHelp>> {
    let reply = bus
        .request_reply(
            "/signatureHelp/request",
            "/signatureHelp/response",
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

    let raw: RawSignatureHelp = serde_json::from_value(reply).map_err(|_| Error::MalformedReply)?;
    if raw.signatures.is_empty() {
        return Ok(None);
    }

    Ok(Some(SignatureHelp {
        signatures: raw.signatures.into_iter().map(to_signature_information).collect(),
        active_signature: raw.active_signature,
        active_parameter: raw.active_parameter,
    }))
}

fn to_signature_information(raw: RawSignature) -> SignatureInformation {
    SignatureInformation {
        label: raw.label,
        documentation: raw.documentation.map(Documentation::String),
        parameters: Some(
            raw.parameters
                .into_iter()
                .map(|p| ParameterInformation {
                    label: ParameterLabel::Simple(p.label),
                    documentation: p.documentation.map(Documentation::String),
                })
                .collect(),
        ),
        active_parameter: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_signature_with_no_parameters_still_converts() {
        let raw = RawSignature {
            label: "foo()".into(),
            documentation: None,
            parameters: vec![],
        };
        let info = to_signature_information(raw);
        assert_eq!(info.label, "foo()");
        assert_eq!(info.parameters.unwrap().len(), 0);
    }
}
