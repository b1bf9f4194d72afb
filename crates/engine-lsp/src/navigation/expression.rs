//
// expression.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Expression extraction at a cursor position (spec.md §4.6): the maximal
//! dotted-identifier run covering the cursor, split into components so the
//! navigation resolver knows which segment the user actually asked about.

use std::sync::LazyLock;

use regex::Regex;

/// `[A-Za-z_][A-Za-z_0-9]*(\.[A-Za-z_][A-Za-z_0-9]*)*`, per spec.md §4.6.
static DOTTED_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z_0-9]*(?:\.[A-Za-z_][A-Za-z_0-9]*)*").unwrap());

/// A dotted expression under the cursor, e.g. `pkg.sub.Cls.PROP`, plus which
/// component the cursor sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    components: Vec<String>,
    cursor_component: usize,
}

impl Expression {
    /// Extracts the expression covering byte-offset `character` in `line`.
    /// Returns `None` if no dotted-identifier match spans the cursor; a
    /// match ending exactly at the cursor counts as covering it (spec.md §8
    /// invariant 8), a match ending strictly before it does not.
    pub fn extract(line: &str, character: usize) -> Option<Expression> {
        for m in DOTTED_IDENTIFIER.find_iter(line) {
            if m.start() <= character && character <= m.end() {
                let components: Vec<String> = m.as_str().split('.').map(str::to_string).collect();
                let cursor_component = component_at(&components, m.start(), character);
                return Some(Expression {
                    components,
                    cursor_component,
                });
            }
        }
        None
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn cursor_component(&self) -> usize {
        self.cursor_component
    }

    pub fn is_cursor_on_first_component(&self) -> bool {
        self.cursor_component == 0
    }

    /// The whole matched expression, every component joined with `.`.
    pub fn full_expression(&self) -> String {
        self.components.join(".")
    }

    /// The expression up to and including the component the cursor sits in.
    pub fn target_expression(&self) -> String {
        self.components[..=self.cursor_component].join(".")
    }

    /// The single component the cursor is inside.
    pub fn unqualified_target(&self) -> &str {
        &self.components[self.cursor_component]
    }

    pub fn last_component(&self) -> &str {
        self.components.last().expect("at least one component")
    }
}

/// Walks component lengths (plus one byte for each joining `.`) to find
/// which component contains `character`, given the match started at
/// `match_start`.
fn component_at(components: &[String], match_start: usize, character: usize) -> usize {
    let mut offset = match_start;
    for (index, component) in components.iter().enumerate() {
        let end = offset + component.len();
        if character <= end {
            return index;
        }
        offset = end + 1; // skip the '.'
    }
    components.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_identifier() {
        let expr = Expression::extract("foo(x)", 1).unwrap();
        assert_eq!(expr.components(), &["foo"]);
        assert_eq!(expr.cursor_component(), 0);
    }

    #[test]
    fn extracts_dotted_chain_and_locates_component() {
        let expr = Expression::extract("obj.bar()", 5).unwrap();
        assert_eq!(expr.components(), &["obj", "bar"]);
        assert_eq!(expr.cursor_component(), 1);
        assert_eq!(expr.full_expression(), "obj.bar");
        assert_eq!(expr.target_expression(), "obj.bar");
        assert_eq!(expr.unqualified_target(), "bar");
    }

    #[test]
    fn cursor_at_component_boundary_is_inclusive() {
        // "x" is at offset 0, "y" at offset 2, cursor sitting exactly at the
        // end of "x" (offset 1) still covers "x".
        let expr = Expression::extract("x.y", 1).unwrap();
        assert_eq!(expr.cursor_component(), 0);
    }

    #[test]
    fn match_ending_before_cursor_is_not_covering() {
        assert!(Expression::extract("foo ", 3).is_some());
        assert!(Expression::extract("foo ", 4).is_none());
    }

    #[test]
    fn no_match_returns_none() {
        assert!(Expression::extract("123 + 456", 1).is_none());
    }

    #[test]
    fn target_expression_truncates_at_cursor_component() {
        let expr = Expression::extract("pkg.sub.Cls.PROP", 5).unwrap();
        assert_eq!(expr.cursor_component(), 1);
        assert_eq!(expr.target_expression(), "pkg.sub");
        assert_eq!(expr.full_expression(), "pkg.sub.Cls.PROP");
    }
}
