//
// mod.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The document and workspace indexers (spec.md §4.4, §4.5): keep the
//! symbol index fresh from what the interpreter reports about open buffers
//! and whole folder trees.

pub mod document;
pub mod workspace;

pub use document::DocumentIndexer;
pub use workspace::WorkspaceIndexer;
