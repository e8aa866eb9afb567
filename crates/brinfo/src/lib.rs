//! Brinfo: branch-trace instrumentation for C/C++ test suites.
//!
//! Instruments sources so that, at test time, the program emits a structured
//! trace of every decision-point evaluation, every top-level invocation of a
//! function under test, and the test-harness lifecycle. Downstream tools
//! join the static shape of each function (its condition chains and return
//! forms) with the dynamic trace to compute per-test, per-chain coverage and
//! oracle-boundary information.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  [source AST] ──► Instrumenter ──► probed source ──► compile+run │
//! │       │                                                  │       │
//! │       ▼                                                  ▼       │
//! │  MetaCollector ─► {conditions,functions,chains}     Runtime ─►   │
//! │                    .meta.json                       runtime.ndjson│
//! │             └────────── same hashes link both sides ──────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Three components share one identity scheme:
//!
//! - [`meta::MetaCollector`] interns conditions, functions, and chains into
//!   stable tables and serializes them as JSON.
//! - [`instrument::CondInstrumenter`] and [`autowrap::CallWrapper`] rewrite
//!   source text, injecting probes whose baked-in hashes reproduce the
//!   static identities.
//! - [`runtime`] appends NDJSON events from the instrumented binary, with
//!   strict nesting rules for tests, assertions, and invocations.
//!
//! The normalization rule in [`norm`] and the hashes in [`hash`] are the
//! contract between the sides; both are deliberately tiny modules consumed
//! everywhere.

#![warn(missing_docs)]

pub mod adapter;
pub mod ast;
pub mod autowrap;
pub mod chain;
pub mod ffi;
pub mod hash;
pub mod instrument;
pub mod meta;
pub mod norm;
pub mod result;
pub mod rewrite;
pub mod runtime;

pub use autowrap::{CallWrapConfig, CallWrapper};
pub use instrument::CondInstrumenter;
pub use meta::MetaCollector;
pub use norm::{normalize, Normalized};
pub use result::{BrinfoError, BrinfoResult};
