//
// document_symbols.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! `documentSymbolProvider` (spec.md §6.2: "derived from the symbol
//! index"). Unlike the feature providers in `providers/`, this needs no
//! bus round trip: everything it returns already lives in the
//! [`SymbolIndex`] entry for the requested file.

use tower_lsp::lsp_types::DocumentSymbol;
use tower_lsp::lsp_types::Position;
use tower_lsp::lsp_types::Range;
use tower_lsp::lsp_types::SymbolKind;
use url::Url;

use crate::index::model::FunctionInfo;
use crate::index::model::MemberInfo;
use crate::index::model::Range as ModelRange;
use crate::index::SymbolIndex;

pub fn document_symbols(index: &SymbolIndex, uri: &Url) -> Option<Vec<DocumentSymbol>> {
    let file = index.file(uri)?;

    let mut symbols: Vec<DocumentSymbol> = file.functions.values().map(function_symbol).collect();

    if let Some(class_name) = file.class_name.as_deref() {
        if let Some(class) = index.class(class_name) {
            let children: Vec<DocumentSymbol> = class
                .properties
                .values()
                .map(|m| member_symbol(m, SymbolKind::PROPERTY))
                .chain(class.enumerations.values().map(|m| member_symbol(m, SymbolKind::ENUM_MEMBER)))
                .chain(
                    class
                        .methods
                        .values()
                        .filter(|method| method.uri == *uri)
                        .map(method_symbol),
                )
                .collect();

            #[allow(deprecated)]
            symbols.push(DocumentSymbol {
                name: class.name.clone(),
                detail: None,
                kind: SymbolKind::CLASS,
                tags: None,
                deprecated: None,
                range: to_lsp_range(class.range),
                selection_range: to_lsp_range(class.declaration),
                children: Some(children),
            });
        }
    }

    Some(symbols)
}

fn function_symbol(function: &FunctionInfo) -> DocumentSymbol {
    #[allow(deprecated)]
    DocumentSymbol {
        name: function.name.clone(),
        detail: None,
        kind: SymbolKind::FUNCTION,
        tags: None,
        deprecated: None,
        range: to_lsp_range(function.range),
        selection_range: to_lsp_range(function.definition_range()),
        children: None,
    }
}

fn method_symbol(method: &FunctionInfo) -> DocumentSymbol {
    #[allow(deprecated)]
    DocumentSymbol {
        name: method.name.clone(),
        detail: None,
        kind: SymbolKind::METHOD,
        tags: None,
        deprecated: None,
        range: to_lsp_range(method.range),
        selection_range: to_lsp_range(method.definition_range()),
        children: None,
    }
}

fn member_symbol(member: &MemberInfo, kind: SymbolKind) -> DocumentSymbol {
    #[allow(deprecated)]
    DocumentSymbol {
        name: member.name.clone(),
        detail: None,
        kind,
        tags: None,
        deprecated: None,
        range: to_lsp_range(member.range),
        selection_range: to_lsp_range(member.range),
        children: None,
    }
}

fn to_lsp_range(range: ModelRange) -> Range {
    Range::new(
        Position::new(range.line_start.saturating_sub(1), range.char_start),
        Position::new(range.line_end.saturating_sub(1), range.char_end),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::raw::RawClassInfo;
    use crate::index::raw::RawCodeData;
    use crate::index::raw::RawFunctionInfo;
    use crate::index::raw::RawMemberInfo;
    use crate::index::raw::RawRange;

    fn range(ls: u32, le: u32) -> RawRange {
        RawRange { line_start: ls, char_start: 0, line_end: le, char_end: 0 }
    }

    #[test]
    fn plain_functions_become_top_level_symbols() {
        let mut index = SymbolIndex::new();
        let uri = Url::parse("file:///a.m").unwrap();
        index.parse_and_store(
            uri.clone(),
            RawCodeData {
                package_name: String::new(),
                class_info: RawClassInfo::default(),
                function_info: vec![RawFunctionInfo {
                    name: "foo".into(),
                    parent_class: String::new(),
                    range: range(1, 3),
                    declaration: None,
                    is_public: true,
                    is_prototype: false,
                    variable_info: Default::default(),
                    globals: vec![],
                }],
                references: vec![],
            },
        );

        let symbols = document_symbols(&index, &uri).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "foo");
        assert_eq!(symbols[0].kind, SymbolKind::FUNCTION);
    }

    #[test]
    fn a_class_def_file_nests_properties_and_methods() {
        let mut index = SymbolIndex::new();
        let uri = Url::parse("file:///@K/K.m").unwrap();
        index.parse_and_store(
            uri.clone(),
            RawCodeData {
                package_name: String::new(),
                class_info: RawClassInfo {
                    is_class_def: true,
                    has_class_info: true,
                    name: "K".into(),
                    range: Some(range(1, 10)),
                    declaration: Some(range(1, 1)),
                    properties: vec![RawMemberInfo {
                        name: "Value".into(),
                        range: range(2, 2),
                        is_public: true,
                    }],
                    enumerations: vec![],
                    class_def_folder: String::new(),
                    base_classes: vec![],
                },
                function_info: vec![RawFunctionInfo {
                    name: "bar".into(),
                    parent_class: "K".into(),
                    range: range(5, 6),
                    declaration: None,
                    is_public: true,
                    is_prototype: false,
                    variable_info: Default::default(),
                    globals: vec![],
                }],
                references: vec![],
            },
        );

        let symbols = document_symbols(&index, &uri).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "K");
        let children = symbols[0].children.as_ref().unwrap();
        assert_eq!(children.len(), 2);
    }
}
