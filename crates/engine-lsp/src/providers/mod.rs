//
// mod.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Feature providers (spec.md §4.8): thin LSP handlers whose only
//! interesting behavior is publishing a request and awaiting exactly one
//! correlated reply on the bus. Specified at the wire boundary in
//! spec.md §6.1/§6.2; everything else is the interpreter's business.

pub mod completion;
pub mod folding;
pub mod format;
pub mod lint;
pub mod signature_help;
