//
// raw.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! `RawCodeData`, the wire shape the interpreter sends back from
//! `/indexDocument/response` and the streamed workspace-index responses
//! (spec.md §6.1), and its normalization into the index's owned model.

use indexmap::IndexMap;
use indexmap::IndexSet;
use serde::Deserialize;
use url::Url;

use crate::index::model;

#[derive(Debug, Clone, Deserialize)]
pub struct RawRange {
    pub line_start: u32,
    pub char_start: u32,
    pub line_end: u32,
    pub char_end: u32,
}

impl From<RawRange> for model::Range {
    fn from(raw: RawRange) -> Self {
        model::Range {
            line_start: raw.line_start,
            char_start: raw.char_start,
            line_end: raw.line_end,
            char_end: raw.char_end,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMemberInfo {
    pub name: String,
    pub range: RawRange,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClassInfo {
    #[serde(default)]
    pub is_class_def: bool,
    #[serde(default)]
    pub has_class_info: bool,
    #[serde(default)]
    pub name: String,
    pub range: Option<RawRange>,
    pub declaration: Option<RawRange>,
    #[serde(default)]
    pub properties: Vec<RawMemberInfo>,
    #[serde(default)]
    pub enumerations: Vec<RawMemberInfo>,
    #[serde(default)]
    pub class_def_folder: String,
    #[serde(default)]
    pub base_classes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVariableInfo {
    #[serde(default)]
    pub definitions: Vec<RawRange>,
    #[serde(default)]
    pub references: Vec<RawRange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFunctionInfo {
    pub name: String,
    #[serde(default)]
    pub parent_class: String,
    pub range: RawRange,
    pub declaration: Option<RawRange>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_prototype: bool,
    #[serde(default)]
    pub variable_info: IndexMap<String, RawVariableInfo>,
    #[serde(default)]
    pub globals: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCodeData {
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub class_info: RawClassInfo,
    #[serde(default)]
    pub function_info: Vec<RawFunctionInfo>,
    /// Each entry is `[name, range]`, matching the interpreter's array-pair
    /// encoding (spec.md §6.1) rather than a JSON object.
    #[serde(default)]
    pub references: Vec<(String, RawRange)>,
}

fn convert_function(raw: RawFunctionInfo, uri: &Url) -> model::FunctionInfo {
    model::FunctionInfo {
        name: raw.name,
        parent_class: (!raw.parent_class.is_empty()).then_some(raw.parent_class),
        uri: uri.clone(),
        range: raw.range.into(),
        declaration: raw.declaration.map(Into::into),
        visibility: if raw.is_public {
            model::Visibility::Public
        } else {
            model::Visibility::Private
        },
        is_prototype: raw.is_prototype,
        variable_info: raw
            .variable_info
            .into_iter()
            .map(|(name, v)| {
                (
                    name,
                    model::VariableInfo {
                        definitions: v.definitions.into_iter().map(Into::into).collect(),
                        references: v.references.into_iter().map(Into::into).collect(),
                    },
                )
            })
            .collect(),
        globals: raw.globals.into_iter().collect::<IndexSet<_>>(),
    }
}

fn convert_member(raw: RawMemberInfo, parent_class: &str, uri: &Url) -> model::MemberInfo {
    model::MemberInfo {
        name: raw.name,
        uri: uri.clone(),
        range: raw.range.into(),
        visibility: if raw.is_public {
            model::Visibility::Public
        } else {
            model::Visibility::Private
        },
        parent_class: parent_class.to_string(),
    }
}

/// The product of normalizing one `RawCodeData` payload: the file-level
/// entry plus, when the file contributes to a class, the freshly-parsed
/// `ClassInfo` fragment to be merged into the long-lived aggregate by the
/// caller (`SymbolIndex::parse_and_store`).
pub struct Normalized {
    pub file: model::FileCodeData,
    pub class_fragment: Option<model::ClassInfo>,
}

pub fn normalize(uri: Url, raw: RawCodeData) -> Normalized {
    let class_name = (raw.class_info.has_class_info && !raw.class_info.name.is_empty())
        .then(|| raw.class_info.name.clone());

    let class_fragment = class_name.as_ref().map(|name| {
        let methods: IndexMap<String, model::FunctionInfo> = raw
            .function_info
            .iter()
            .filter(|f| f.parent_class == *name)
            .cloned()
            .map(|f| (f.name.clone(), convert_function(f, &uri)))
            .collect();

        model::ClassInfo {
            name: name.clone(),
            uri: Some(uri.clone()),
            range: raw.class_info.range.clone().map(Into::into).unwrap_or(model::Range::ZERO),
            declaration: raw.class_info.declaration.clone().map(Into::into).unwrap_or(model::Range::ZERO),
            properties: raw
                .class_info
                .properties
                .iter()
                .cloned()
                .map(|m| (m.name.clone(), convert_member(m, name, &uri)))
                .collect(),
            enumerations: raw
                .class_info
                .enumerations
                .iter()
                .cloned()
                .map(|m| (m.name.clone(), convert_member(m, name, &uri)))
                .collect(),
            methods,
            class_def_folder: (!raw.class_info.class_def_folder.is_empty())
                .then(|| raw.class_info.class_def_folder.clone()),
            base_classes: raw.class_info.base_classes.clone(),
        }
    });

    let functions: IndexMap<String, model::FunctionInfo> = raw
        .function_info
        .into_iter()
        .filter(|f| f.parent_class.is_empty())
        .map(|f| (f.name.clone(), convert_function(f, &uri)))
        .collect();

    let mut references: IndexMap<String, Vec<model::Range>> = IndexMap::new();
    for (name, range) in raw.references {
        references.entry(name).or_default().push(range.into());
    }

    let file = model::FileCodeData {
        uri,
        package_name: raw.package_name,
        is_class_def: raw.class_info.is_class_def,
        class_name,
        functions,
        references,
    };

    Normalized { file, class_fragment }
}
