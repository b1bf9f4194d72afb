//
// mod.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The symbol index (spec.md §4.3): a process-wide store of per-file code
//! data and per-class aggregates, shared by the document indexer, the
//! workspace indexer, and the navigation resolver.

pub mod model;
pub mod raw;

use indexmap::IndexMap;
use url::Url;

use self::model::ClassInfo;
use self::model::FileCodeData;
use self::model::FunctionInfo;
use self::raw::RawCodeData;

/// `codeData` and `classInfo` from spec.md §4.3, held together so
/// `parse_and_store` can maintain the class-folder invariant (§3: "when
/// multiple files contribute to the same class, exactly one `ClassInfo`
/// exists") in one place.
#[derive(Default)]
pub struct SymbolIndex {
    code_data: IndexMap<Url, FileCodeData>,
    class_info: IndexMap<String, ClassInfo>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, uri: &Url) -> Option<&FileCodeData> {
        self.code_data.get(uri)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileCodeData> {
        self.code_data.values()
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.code_data.contains_key(uri)
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.class_info.get(name)
    }

    /// Normalizes `raw` and stores it under `uri`, replacing any prior entry
    /// (spec.md §8 invariant 1). When the file contributes to a class, the
    /// freshly-parsed fragment is merged into the long-lived `ClassInfo`,
    /// last-writer-wins per member name (invariant 2).
    pub fn parse_and_store(&mut self, uri: Url, raw: RawCodeData) -> &FileCodeData {
        let normalized = raw::normalize(uri.clone(), raw);

        if let Some(fragment) = normalized.class_fragment {
            self.class_info
                .entry(fragment.name.clone())
                .and_modify(|existing| existing.merge_from(fragment.clone()))
                .or_insert(fragment);
        }

        self.code_data.insert(uri.clone(), normalized.file);
        self.code_data
            .get(&uri)
            .expect("entry was just inserted under this uri")
    }

    /// The innermost function (or class method) whose range encloses
    /// `(line, character)`, used by scope-local variable resolution
    /// (spec.md §4.6 stage 1). `line` is 1-based to match [`model::Range`].
    pub fn find_containing_function(&self, uri: &Url, line: u32, character: u32) -> Option<&FunctionInfo> {
        let file = self.code_data.get(uri)?;

        let candidates = file.functions.values().chain(
            file.class_name
                .as_deref()
                .and_then(|name| self.class_info.get(name))
                .into_iter()
                .flat_map(|class| class.methods.values()),
        );

        let mut best: Option<&FunctionInfo> = None;
        for candidate in candidates {
            if !candidate.range.contains(line, character) {
                continue;
            }
            let narrower = match best {
                Some(current) => span(candidate.range) <= span(current.range),
                None => true,
            };
            if narrower {
                best = Some(candidate);
            }
        }
        best
    }

    /// Drops the entry for `uri` (file close/delete, spec.md §4.3). Whether
    /// a `ClassInfo` it contributed to should be reclaimed is an open
    /// question the source leaves unanswered (spec.md §9); we keep it
    /// forever, same as the source, and note the tradeoff in DESIGN.md.
    pub fn clear(&mut self, uri: &Url) {
        self.code_data.shift_remove(uri);
    }
}

fn span(range: model::Range) -> u64 {
    let lines = (range.line_end.saturating_sub(range.line_start)) as u64;
    let chars = range.char_end as u64;
    lines * 1_000_000 + chars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::raw::RawClassInfo;
    use crate::index::raw::RawFunctionInfo;
    use crate::index::raw::RawRange;

    fn range(line_start: u32, line_end: u32) -> RawRange {
        RawRange {
            line_start,
            char_start: 0,
            line_end,
            char_end: 0,
        }
    }

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///{name}")).unwrap()
    }

    #[test]
    fn parse_and_store_replaces_prior_entry() {
        let mut index = SymbolIndex::new();
        let a = uri("a.m");

        index.parse_and_store(
            a.clone(),
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
        assert!(index.file(&a).unwrap().functions.contains_key("foo"));

        index.parse_and_store(
            a.clone(),
            RawCodeData {
                package_name: String::new(),
                class_info: RawClassInfo::default(),
                function_info: vec![],
                references: vec![],
            },
        );
        assert!(index.file(&a).unwrap().functions.is_empty());
    }

    #[test]
    fn class_folder_union_across_files() {
        let mut index = SymbolIndex::new();
        let k = uri("@K/K.m");
        let bar = uri("@K/bar.m");

        let class_info = |class_def_folder: &str| RawClassInfo {
            is_class_def: true,
            has_class_info: true,
            name: "K".into(),
            range: Some(range(1, 1)),
            declaration: Some(range(1, 1)),
            properties: vec![],
            enumerations: vec![],
            class_def_folder: class_def_folder.into(),
            base_classes: vec![],
        };

        index.parse_and_store(
            k,
            RawCodeData {
                package_name: String::new(),
                class_info: class_info("@K"),
                function_info: vec![RawFunctionInfo {
                    name: "bar".into(),
                    parent_class: "K".into(),
                    range: range(1, 1),
                    declaration: Some(range(1, 1)),
                    is_public: true,
                    is_prototype: true,
                    variable_info: Default::default(),
                    globals: vec![],
                }],
                references: vec![],
            },
        );

        index.parse_and_store(
            bar,
            RawCodeData {
                package_name: String::new(),
                class_info: class_info("@K"),
                function_info: vec![RawFunctionInfo {
                    name: "bar".into(),
                    parent_class: "K".into(),
                    range: range(2, 4),
                    declaration: None,
                    is_public: true,
                    is_prototype: false,
                    variable_info: Default::default(),
                    globals: vec![],
                }],
                references: vec![],
            },
        );

        let class = index.class("K").unwrap();
        assert_eq!(class.methods.len(), 1);
        // Last writer (the file with the real body) wins.
        assert_eq!(class.methods["bar"].range.line_start, 2);
    }

    #[test]
    fn find_containing_function_picks_innermost() {
        let mut index = SymbolIndex::new();
        let a = uri("a.m");
        index.parse_and_store(
            a.clone(),
            RawCodeData {
                package_name: String::new(),
                class_info: RawClassInfo::default(),
                function_info: vec![RawFunctionInfo {
                    name: "outer".into(),
                    parent_class: String::new(),
                    range: range(1, 10),
                    declaration: None,
                    is_public: true,
                    is_prototype: false,
                    variable_info: Default::default(),
                    globals: vec![],
                }],
                references: vec![],
            },
        );
        let found = index.find_containing_function(&a, 5, 0).unwrap();
        assert_eq!(found.name, "outer");
        assert!(index.find_containing_function(&a, 20, 0).is_none());
    }
}
