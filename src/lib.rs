//! Crate root: public surface and core aliases
//!
//! This module is the single canonical entry point for downstream users of
//! the compiler. It declares the submodules, centralizes the few
//! crate-root re-exports worth reaching for directly, and nothing else —
//! the real API lives in the submodules.
//!
//! ## Invariants
//!
//! - A diagram built against one [`cache::Cache`] must never be combined
//!   with a diagram from another: handle equality is only meaningful
//!   within one cache.
//! - Every [`fdd::Fdd`] is built against exactly one [`field::FieldOrder`],
//!   fixed for the cache's lifetime.
//! - `compile_local` rejects any policy containing a `Link` term;
//!   `compile_global` additionally requires the whole policy to be local
//!   (links must already have been lowered by an external collaborator).

#![forbid(unsafe_code)]

/// Packet header field and value model (`Field`, `Value`, `FieldOrder`, …).
pub mod field;
/// The action algebra (`Action`, `ActionSet`).
pub mod action;
/// The input policy AST (`Pred`, `Policy`).
pub mod policy;
/// The hash-consed node table and per-operator memo tables.
pub mod cache;
/// The forwarding decision diagram engine (`union`, `seq`, `restrict`, …).
pub mod fdd;
/// Policy-to-FDD compilation (`compile_local`, `compile_global`, `specialize`).
pub mod compiler;
/// Single-table flow-rule emission.
pub mod table;
/// Multi-table (layout-driven) flow-rule emission.
pub mod multitable;
/// Shared group table for multicast/fast-failover actions.
pub mod group_table;
/// Reference interpreter (`eval`, `eval_pipes`, `pipes`, `queries`).
pub mod interp;
/// Compiler options (`Options`, JSON round-trip).
pub mod options;

pub use action::{Action, ActionSet};
pub use cache::{Cache, NodeId};
pub use compiler::{compile_global, compile_local, specialize, CompileError};
pub use fdd::{restrict, Fdd, FddError};
pub use field::{Field, FieldOrder, Value};
pub use multitable::{to_multitable, Instruction, Layout, MultiTable};
pub use options::{Options, OptionsError};
pub use policy::{Policy, Pred, SwitchId};
pub use table::{to_table, FlowRule, FlowTable, TableError};
