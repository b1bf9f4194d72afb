//
// mod.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The navigation resolver (spec.md §4.6): expression extraction at the
//! cursor, and the layered definition/reference search over the symbol
//! index, falling back to the path resolver for cross-file lookups.

pub mod expression;

use url::Url;

use self::expression::Expression;
use crate::index::model::Location;
use crate::index::model::Range;
use crate::index::model::Visibility;
use crate::index::SymbolIndex;
use crate::resolver::PathResolver;

/// Extracts the expression under the cursor from `line_text`. `character` is
/// the 0-based UTF-16/byte offset the LSP client reported (spec.md §4.6).
fn expression_at(line_text: &str, character: u32) -> Option<Expression> {
    Expression::extract(line_text, character as usize)
}

/// `findDefinition` (spec.md §4.6): tries stages 1 through 5 in order,
/// returning the first non-empty result.
pub async fn find_definition(
    index: &mut SymbolIndex,
    resolver: &PathResolver,
    uri: &Url,
    line_text: &str,
    line: u32,
    character: u32,
) -> Vec<Location> {
    let Some(expr) = expression_at(line_text, character) else {
        return Vec::new();
    };
    // spec.md's Range is 1-based on the line axis.
    let model_line = line + 1;

    if let Some(locations) = scope_local_definitions(index, uri, model_line, character, &expr) {
        return locations;
    }
    if let Some(locations) = in_file_function_definition(index, uri, &expr) {
        return locations;
    }
    if let Some(locations) = class_member_definition(index, uri, &expr) {
        return locations;
    }
    if let Some(locations) = path_resolved_definition(index, resolver, uri, &expr).await {
        return locations;
    }
    workspace_wide_definition(index, uri, &expr)
}

/// Stage 1: scope-local variable, only considered on the expression's first
/// component.
fn scope_local_definitions(
    index: &SymbolIndex,
    uri: &Url,
    model_line: u32,
    character: u32,
    expr: &Expression,
) -> Option<Vec<Location>> {
    if !expr.is_cursor_on_first_component() {
        return None;
    }
    let function = index.find_containing_function(uri, model_line, character)?;
    let variable = function.variable_info.get(expr.unqualified_target())?;
    if variable.definitions.is_empty() {
        return None;
    }
    Some(ranges_at(uri, &variable.definitions))
}

/// Stage 2: an in-file function (or, for a class file, an owning class
/// method) whose name equals the full expression.
fn in_file_function_definition(index: &SymbolIndex, uri: &Url, expr: &Expression) -> Option<Vec<Location>> {
    let file = index.file(uri)?;
    let full = expr.full_expression();

    if let Some(function) = file.functions.get(&full) {
        return Some(vec![Location {
            uri: function.uri.clone(),
            range: function.definition_range(),
        }]);
    }

    let class_name = file.class_name.as_deref()?;
    let class = index.class(class_name)?;
    let method = class.methods.get(&full)?;
    Some(vec![Location {
        uri: method.uri.clone(),
        range: method.definition_range(),
    }])
}

/// Stage 3: a class property, only considered in a class definition file
/// with the cursor on the second component (`obj.PROP`).
fn class_member_definition(index: &SymbolIndex, uri: &Url, expr: &Expression) -> Option<Vec<Location>> {
    let file = index.file(uri)?;
    if !file.is_class_def || expr.cursor_component() != 1 {
        return None;
    }
    let class_name = file.class_name.as_deref()?;
    let class = index.class(class_name)?;
    let property = class.properties.get(expr.last_component())?;
    Some(vec![Location {
        uri: property.uri.clone(),
        range: property.range,
    }])
}

/// Stage 4: ask the path resolver for the target expression, index the
/// result if needed, then re-check stages 2-3 against the resolved file.
/// Falls back to a zero-range location at the resolved URI so the editor at
/// least opens the file (spec.md §8 invariant 3c).
async fn path_resolved_definition(
    index: &mut SymbolIndex,
    resolver: &PathResolver,
    uri: &Url,
    expr: &Expression,
) -> Option<Vec<Location>> {
    let target = expr.target_expression();
    let resolved = resolver.resolve_one(&target, uri).await.ok()?;
    if resolved.is_not_found() {
        return None;
    }
    let file = resolved.file?;

    if !index.contains(&file.uri) {
        index.parse_and_store(file.uri.clone(), file.code_data.clone());
    }

    let last = expr.last_component();
    if let Some(location) = member_in_file(index, &file.uri, last) {
        return Some(vec![location]);
    }

    Some(vec![Location {
        uri: file.uri,
        range: Range::ZERO,
    }])
}

/// Checks whether `name` is a function or class member of `uri`'s file,
/// used both by stage 4's re-check and implicitly mirroring stages 2-3.
fn member_in_file(index: &SymbolIndex, uri: &Url, name: &str) -> Option<Location> {
    let file = index.file(uri)?;

    if let Some(function) = file.functions.get(name) {
        return Some(Location {
            uri: function.uri.clone(),
            range: function.definition_range(),
        });
    }

    let class_name = file.class_name.as_deref()?;
    let class = index.class(class_name)?;

    if let Some(method) = class.methods.get(name) {
        return Some(Location {
            uri: method.uri.clone(),
            range: method.definition_range(),
        });
    }
    if let Some(property) = class.properties.get(name) {
        return Some(Location {
            uri: property.uri.clone(),
            range: property.range,
        });
    }
    if let Some(member) = class.enumerations.get(name) {
        return Some(Location {
            uri: member.uri.clone(),
            range: member.range,
        });
    }

    None
}

/// Stage 5: scan every cached file for a `<package>[.<class>].<member>`
/// candidate equal to the full expression, skipping the originating URI.
fn workspace_wide_definition(index: &SymbolIndex, uri: &Url, expr: &Expression) -> Vec<Location> {
    let full = expr.full_expression();

    for file in index.files() {
        if file.uri == *uri {
            continue;
        }

        for (name, function) in &file.functions {
            if candidate_name(&file.package_name, None, name) == full {
                return vec![Location {
                    uri: function.uri.clone(),
                    range: function.definition_range(),
                }];
            }
        }

        let Some(class_name) = file.class_name.as_deref() else {
            continue;
        };
        let Some(class) = index.class(class_name) else {
            continue;
        };

        for (name, function) in &class.methods {
            if candidate_name(&file.package_name, Some(class_name), name) == full {
                return vec![Location {
                    uri: function.uri.clone(),
                    range: function.definition_range(),
                }];
            }
        }
        for (name, member) in class.properties.iter().chain(class.enumerations.iter()) {
            if candidate_name(&file.package_name, Some(class_name), name) == full {
                return vec![Location {
                    uri: member.uri.clone(),
                    range: member.range,
                }];
            }
        }
    }

    Vec::new()
}

fn candidate_name(package_name: &str, class_name: Option<&str>, member_name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !package_name.is_empty() {
        parts.push(package_name);
    }
    if let Some(class_name) = class_name {
        parts.push(class_name);
    }
    parts.push(member_name);
    parts.join(".")
}

/// `findReferences` (spec.md §4.6): scope-local variable references, then
/// function references across the workspace (skipping files where the
/// function is private to someone else).
pub fn find_references(index: &SymbolIndex, uri: &Url, line_text: &str, line: u32, character: u32) -> Vec<Location> {
    let Some(expr) = expression_at(line_text, character) else {
        return Vec::new();
    };
    let model_line = line + 1;

    if expr.is_cursor_on_first_component() {
        if let Some(function) = index.find_containing_function(uri, model_line, character) {
            if let Some(variable) = function.variable_info.get(expr.unqualified_target()) {
                if !variable.references.is_empty() {
                    return ranges_at(uri, &variable.references);
                }
            }
        }
    }

    let full = expr.full_expression();

    if let Some(file) = index.file(uri) {
        if let Some(function) = file.functions.get(&full) {
            if function.visibility == Visibility::Private {
                return file
                    .references
                    .get(&full)
                    .map(|ranges| ranges_at(uri, ranges))
                    .unwrap_or_default();
            }
        }
    }

    let mut out = Vec::new();
    for file in index.files() {
        if let Some(function) = file.functions.get(&full) {
            if function.visibility == Visibility::Private {
                continue;
            }
        }
        if let Some(ranges) = file.references.get(&full) {
            out.extend(ranges_at(&file.uri, ranges));
        }
    }
    out
}

fn ranges_at(uri: &Url, ranges: &[Range]) -> Vec<Location> {
    ranges
        .iter()
        .map(|range| Location {
            uri: uri.clone(),
            range: *range,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::raw::RawClassInfo;
    use crate::index::raw::RawFunctionInfo;
    use crate::index::raw::RawRange;
    use crate::index::raw::RawCodeData;
    use crate::index::raw::RawVariableInfo;
    use indexmap::IndexMap;

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn range(ls: u32, cs: u32, le: u32, ce: u32) -> RawRange {
        RawRange {
            line_start: ls,
            char_start: cs,
            line_end: le,
            char_end: ce,
        }
    }

    #[test]
    fn scope_local_variable_reference_covers_s3() {
        // foo.m: `x = 1; y = x + 2;` -- find_references on the `x` in `x + 2`
        // should return both the LHS definition site and the use site.
        let mut index = SymbolIndex::new();
        let foo = uri("file:///foo.m");

        let mut variable_info = IndexMap::new();
        variable_info.insert(
            "x".to_string(),
            RawVariableInfo {
                definitions: vec![range(1, 0, 1, 1)],
                references: vec![range(1, 0, 1, 1), range(1, 11, 1, 12)],
            },
        );

        index.parse_and_store(
            foo.clone(),
            RawCodeData {
                package_name: String::new(),
                class_info: RawClassInfo::default(),
                function_info: vec![RawFunctionInfo {
                    name: "foo".into(),
                    parent_class: String::new(),
                    range: range(1, 0, 1, 30),
                    declaration: None,
                    is_public: true,
                    is_prototype: false,
                    variable_info,
                    globals: vec![],
                }],
                references: vec![],
            },
        );

        let locations = find_references(&index, &foo, "x = 1; y = x + 2;", 0, 11);
        assert_eq!(locations.len(), 2);
    }

    #[test]
    fn private_function_references_stay_local() {
        let mut index = SymbolIndex::new();
        let a = uri("file:///a.m");
        let b = uri("file:///b.m");

        index.parse_and_store(
            a.clone(),
            RawCodeData {
                package_name: String::new(),
                class_info: RawClassInfo::default(),
                function_info: vec![RawFunctionInfo {
                    name: "helper".into(),
                    parent_class: String::new(),
                    range: range(1, 0, 5, 0),
                    declaration: None,
                    is_public: false,
                    is_prototype: false,
                    variable_info: Default::default(),
                    globals: vec![],
                }],
                references: vec![("helper".into(), range(3, 0, 3, 6))],
            },
        );
        index.parse_and_store(
            b.clone(),
            RawCodeData {
                package_name: String::new(),
                class_info: RawClassInfo::default(),
                function_info: vec![],
                references: vec![("helper".into(), range(2, 0, 2, 6))],
            },
        );

        let locations = find_references(&index, &a, "helper()", 2, 0);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri, a);
    }
}
