//! Condition-chain input contract.
//!
//! The chain analyzer (an external collaborator) walks a function's decision
//! structure and produces, per function, the acyclic paths through its nested
//! decisions. This module defines only the shape the meta collector consumes;
//! how the chains are discovered is not this crate's concern.

use crate::ast::{CondKind, Expr};

/// One condition as the chain analyzer saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct CondRef {
    /// The condition expression as written, `None` when the analyzer could
    /// not attach a live expression (such steps are skipped)
    pub expr: Option<Expr>,
    /// Structural role of the condition
    pub kind: CondKind,
}

/// One step along a chain: a condition plus the branch the path takes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    /// The condition, when live
    pub cond: Option<CondRef>,
    /// Branch flag: `true` when the path takes the condition's true edge
    pub flag: bool,
}

/// One path through a function's decisions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CondChain {
    /// Ordered steps along the path
    pub steps: Vec<ChainStep>,
    /// Marked by the analyzer when the step constraints are unsatisfiable;
    /// contradictory chains are dropped before recording
    pub contradictory: bool,
}

/// Identity facts of the function a chain set belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFacts {
    /// Canonical signature, see [`crate::ast::FunctionDef::signature`]
    pub signature: String,
    /// Simple name
    pub name: String,
    /// Declaring file
    pub file: String,
}

impl FunctionFacts {
    /// Facts derived from a function definition
    #[must_use]
    pub fn of(def: &crate::ast::FunctionDef) -> Self {
        Self {
            signature: def.signature(),
            name: def.name.clone(),
            file: def.origin.file.clone(),
        }
    }
}
