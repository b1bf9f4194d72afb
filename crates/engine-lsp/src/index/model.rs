//
// model.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The normalized symbol-index data model (spec.md §3).

use indexmap::IndexMap;
use indexmap::IndexSet;
use url::Url;

/// A source range. Lines are 1-based, characters 0-based, matching the
/// convention the interpreter's raw code data uses (spec.md §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub line_start: u32,
    pub char_start: u32,
    pub line_end: u32,
    pub char_end: u32,
}

impl Range {
    pub const ZERO: Range = Range {
        line_start: 0,
        char_start: 0,
        line_end: 0,
        char_end: 0,
    };

    /// Whether `position` (1-based line, 0-based character) falls within
    /// this range, inclusive of both endpoints.
    pub fn contains(&self, line: u32, character: u32) -> bool {
        if line < self.line_start || line > self.line_end {
            return false;
        }
        if line == self.line_start && character < self.char_start {
            return false;
        }
        if line == self.line_end && character > self.char_end {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// A resolved location, either inside the index or pointing at a file the
/// caller should open without a precise range (the navigation resolver's
/// path-resolved fallback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub uri: Url,
    pub range: Range,
}

/// Ranges where a variable is assigned and where it is subsequently used,
/// both in source order.
#[derive(Debug, Clone, Default)]
pub struct VariableInfo {
    pub definitions: Vec<Range>,
    pub references: Vec<Range>,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub parent_class: Option<String>,
    /// The file this function (or method) was actually parsed from. For a
    /// class-folder method this is the sibling file (e.g. `@K/bar.m`), not
    /// necessarily the classdef file — the "weak owning pointer" of
    /// spec.md §3, realized as a plain value since ownership stays with
    /// `SymbolIndex::code_data`.
    pub uri: Url,
    pub range: Range,
    pub declaration: Option<Range>,
    pub visibility: Visibility,
    pub is_prototype: bool,
    pub variable_info: IndexMap<String, VariableInfo>,
    pub globals: IndexSet<String>,
}

impl FunctionInfo {
    /// The range callers should land on for a "go to definition" of this
    /// function: its declaration header when present, otherwise the whole
    /// body (spec.md §4.6 stage 2).
    pub fn definition_range(&self) -> Range {
        self.declaration.unwrap_or(self.range)
    }
}

#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub name: String,
    /// The file this member was actually parsed from; see
    /// [`FunctionInfo::uri`].
    pub uri: Url,
    pub range: Range,
    pub visibility: Visibility,
    pub parent_class: String,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub uri: Option<Url>,
    pub range: Range,
    pub declaration: Range,
    pub properties: IndexMap<String, MemberInfo>,
    pub enumerations: IndexMap<String, MemberInfo>,
    pub methods: IndexMap<String, FunctionInfo>,
    pub class_def_folder: Option<String>,
    pub base_classes: Vec<String>,
}

impl ClassInfo {
    /// Merges `other` (freshly parsed from one contributing file) into
    /// `self` (the long-lived aggregate), per spec.md §4.3: union of
    /// members, last-writer-wins on name collisions.
    pub fn merge_from(&mut self, other: ClassInfo) {
        self.range = other.range;
        self.declaration = other.declaration;
        if other.uri.is_some() {
            self.uri = other.uri;
        }
        if !other.base_classes.is_empty() {
            self.base_classes = other.base_classes;
        }
        if other.class_def_folder.is_some() {
            self.class_def_folder = other.class_def_folder;
        }
        for (name, member) in other.properties {
            self.properties.insert(name, member);
        }
        for (name, member) in other.enumerations {
            self.enumerations.insert(name, member);
        }
        for (name, method) in other.methods {
            self.methods.insert(name, method);
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCodeData {
    pub uri: Url,
    pub package_name: String,
    pub is_class_def: bool,
    /// The fully-qualified class name this file contributes to, when
    /// `is_class_def` is set. The owning `ClassInfo` itself lives in
    /// `SymbolIndex::class_info`, keyed by this name (spec.md §3: "weak
    /// owning pointer... lookup via URI, never ownership").
    pub class_name: Option<String>,
    pub functions: IndexMap<String, FunctionInfo>,
    pub references: IndexMap<String, Vec<Range>>,
}
