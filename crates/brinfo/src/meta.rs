//! Static meta collector.
//!
//! Canonicalizes each analyzed function into three cross-linked, append-only
//! tables (conditions, functions, chains) keyed by stable hashes, then
//! serializes them to `<root>/llm_reqs/{conditions,functions,chains}.meta.json`.
//! Runtime `cond` events carry the same hashes, which is how downstream
//! tooling joins the static shape of a function with its dynamic trace.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::ast::CondKind;
use crate::chain::{CondChain, FunctionFacts};
use crate::hash;
use crate::norm;
use crate::result::BrinfoResult;

/// One interned condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionMeta {
    /// Dense id, index into the conditions table
    pub id: u32,
    /// Spelling file
    pub file: String,
    /// Spelling line
    pub line: u32,
    /// Normalized text
    pub cond_norm: String,
    /// Structural kind
    pub kind: CondKind,
    /// `H(file ":" line ":" cond_norm)`
    pub hash: u64,
}

/// One recorded return form of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnExprMeta {
    /// Ordinal of the chain the return belongs to, zero-padded to 3 digits
    pub chain_id: String,
    /// `H(return_norm)`, `0` when empty
    pub return_hash: u64,
    /// Normalized return text
    pub return_norm: String,
}

/// One interned function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMeta {
    /// Dense id, index into the functions table
    pub func_id: u32,
    /// Canonical signature
    pub signature: String,
    /// Simple name
    pub name: String,
    /// Declaring file
    pub file: String,
    /// `H(signature)`
    pub func_hash: u64,
    /// Ids of every condition referenced by the function's chains, sorted
    pub condition_ids: BTreeSet<u32>,
    /// Per-chain return forms
    pub returns: Vec<ReturnExprMeta>,
}

/// One recorded chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMeta {
    /// Ordinal within the owning function, zero-padded to 3 digits
    pub chain_id: String,
    /// Owning function's hash
    pub func_hash: u64,
    /// Ordered `(cond_id, value)` steps
    pub sequence: Vec<(u32, bool)>,
    /// Rolling signature over the sequence
    pub signature: u64,
    /// Chain belongs to the minimum covering set
    pub min_cover: bool,
    /// Hash of the chain's return form, `0` when none
    pub return_hash: u64,
}

/// The collector: three growing tables plus two identity indices.
#[derive(Debug, Default)]
pub struct MetaCollector {
    conditions: Vec<ConditionMeta>,
    functions: Vec<FunctionMeta>,
    chains: Vec<ChainMeta>,
    cond_index: HashMap<String, u32>,
    func_index: HashMap<u64, u32>,
    chain_index: HashSet<(u64, String)>,
}

impl MetaCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interned conditions, in id order
    #[must_use]
    pub fn conditions(&self) -> &[ConditionMeta] {
        &self.conditions
    }

    /// Interned functions, in id order
    #[must_use]
    pub fn functions(&self) -> &[FunctionMeta] {
        &self.functions
    }

    /// Recorded chains, in recording order
    #[must_use]
    pub fn chains(&self) -> &[ChainMeta] {
        &self.chains
    }

    /// Record one function's surviving chains.
    ///
    /// Contradictory chains are dropped; ordinals are assigned to survivors
    /// in encounter order. `return_strs` parallels `chains` by input index.
    /// Idempotent per `(func_hash, chain ordinal)`: replaying identical
    /// inputs leaves the tables unchanged.
    pub fn record_function(
        &mut self,
        facts: &FunctionFacts,
        chains: &[CondChain],
        min_cover: &HashSet<usize>,
        return_strs: &[String],
    ) {
        if facts.signature.is_empty() {
            debug!(name = %facts.name, "skipping function with empty signature");
            return;
        }
        let func_hash = hash::hash64(&facts.signature);
        let func_id = self.get_or_create_function(func_hash, facts);

        let mut ordinal = 0usize;
        for (input_idx, chain) in chains.iter().enumerate() {
            if chain.contradictory {
                continue;
            }
            let chain_id = format!("{ordinal:03}");
            ordinal += 1;
            if !self.chain_index.insert((func_hash, chain_id.clone())) {
                continue;
            }

            let mut sequence = Vec::with_capacity(chain.steps.len());
            for step in &chain.steps {
                let Some(cond) = &step.cond else { continue };
                let Some(expr) = &cond.expr else { continue };
                let normalized = norm::normalize(expr);
                // A source `if (!X)` whose true branch the path takes
                // records X=false: the step flag is XORed with the
                // normalization's polarity flip.
                let value = step.flag ^ normalized.flipped;
                let cid = self.get_or_create_condition(
                    &expr.origin.file,
                    expr.origin.line,
                    &normalized.text,
                    cond.kind,
                );
                sequence.push((cid, value));
                self.functions[func_id as usize].condition_ids.insert(cid);
            }

            let signature = hash::chain_signature(&sequence);
            let mut return_hash = 0u64;
            if let Some(ret) = return_strs.get(input_idx) {
                return_hash = Self::return_hash(ret);
                if !ret.is_empty() {
                    self.functions[func_id as usize].returns.push(ReturnExprMeta {
                        chain_id: chain_id.clone(),
                        return_hash,
                        return_norm: ret.clone(),
                    });
                }
            }

            self.chains.push(ChainMeta {
                chain_id,
                func_hash,
                sequence,
                signature,
                min_cover: min_cover.contains(&input_idx),
                return_hash,
            });
        }
    }

    /// Serialize the tables under `<project_root>/llm_reqs/`.
    pub fn dump_all(&self, project_root: &Path) -> BrinfoResult<()> {
        let version = now_iso8601();
        let out_dir = project_root.join("llm_reqs");
        fs::create_dir_all(&out_dir)?;

        let conditions = ConditionsDoc {
            analysis_version: &version,
            conditions: self
                .conditions
                .iter()
                .map(|c| ConditionRecord {
                    id: c.id,
                    file: &c.file,
                    line: c.line,
                    cond_norm: &c.cond_norm,
                    kind: c.kind,
                    hash: c.hash,
                })
                .collect(),
        };
        let functions = FunctionsDoc {
            analysis_version: &version,
            functions: self
                .functions
                .iter()
                .map(|f| FunctionRecord {
                    func_id: f.func_id,
                    signature: &f.signature,
                    name: &f.name,
                    file: &f.file,
                    hash: f.func_hash,
                    condition_ids: f.condition_ids.iter().copied().collect(),
                    return_exprs: f
                        .returns
                        .iter()
                        .map(|r| ReturnRecord {
                            chain_id: &r.chain_id,
                            ret_hash: r.return_hash,
                            ret_norm: &r.return_norm,
                        })
                        .collect(),
                })
                .collect(),
        };
        let chains = ChainsDoc {
            analysis_version: &version,
            chains: self
                .chains
                .iter()
                .map(|ch| ChainRecord {
                    chain_id: &ch.chain_id,
                    func_hash: ch.func_hash,
                    mincover: ch.min_cover,
                    signature: ch.signature,
                    return_hash: ch.return_hash,
                    sequence: ch
                        .sequence
                        .iter()
                        .map(|&(cond_id, value)| SeqRecord { cond_id, value })
                        .collect(),
                })
                .collect(),
        };

        fs::write(
            out_dir.join("conditions.meta.json"),
            serde_json::to_string_pretty(&conditions)?,
        )?;
        fs::write(
            out_dir.join("functions.meta.json"),
            serde_json::to_string_pretty(&functions)?,
        )?;
        fs::write(
            out_dir.join("chains.meta.json"),
            serde_json::to_string_pretty(&chains)?,
        )?;
        debug!(
            conditions = self.conditions.len(),
            functions = self.functions.len(),
            chains = self.chains.len(),
            dir = %out_dir.display(),
            "meta tables dumped"
        );
        Ok(())
    }

    fn get_or_create_condition(
        &mut self,
        file: &str,
        line: u32,
        cond_norm: &str,
        kind: CondKind,
    ) -> u32 {
        let key = format!("{file}#{line}#{cond_norm}");
        if let Some(&id) = self.cond_index.get(&key) {
            return id;
        }
        let id = u32::try_from(self.conditions.len()).unwrap_or(u32::MAX);
        self.conditions.push(ConditionMeta {
            id,
            file: file.to_string(),
            line,
            cond_norm: cond_norm.to_string(),
            kind,
            hash: hash::condition_hash(file, line, cond_norm),
        });
        self.cond_index.insert(key, id);
        id
    }

    fn get_or_create_function(&mut self, func_hash: u64, facts: &FunctionFacts) -> u32 {
        if let Some(&id) = self.func_index.get(&func_hash) {
            return id;
        }
        let id = u32::try_from(self.functions.len()).unwrap_or(u32::MAX);
        self.functions.push(FunctionMeta {
            func_id: id,
            signature: facts.signature.clone(),
            name: facts.name.clone(),
            file: facts.file.clone(),
            func_hash,
            condition_ids: BTreeSet::new(),
            returns: Vec::new(),
        });
        self.func_index.insert(func_hash, id);
        id
    }

    fn return_hash(s: &str) -> u64 {
        if s.is_empty() {
            0
        } else {
            hash::hash64(s)
        }
    }
}

fn now_iso8601() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// Serialization shapes of the three documents. Field names and hash
// rendering are part of the external interface.

#[derive(Serialize)]
struct ConditionsDoc<'a> {
    analysis_version: &'a str,
    conditions: Vec<ConditionRecord<'a>>,
}

#[derive(Serialize)]
struct ConditionRecord<'a> {
    id: u32,
    file: &'a str,
    line: u32,
    cond_norm: &'a str,
    kind: CondKind,
    #[serde(serialize_with = "hash::serialize_hex64")]
    hash: u64,
}

#[derive(Serialize)]
struct FunctionsDoc<'a> {
    analysis_version: &'a str,
    functions: Vec<FunctionRecord<'a>>,
}

#[derive(Serialize)]
struct FunctionRecord<'a> {
    func_id: u32,
    signature: &'a str,
    name: &'a str,
    file: &'a str,
    #[serde(serialize_with = "hash::serialize_hex64")]
    hash: u64,
    condition_ids: Vec<u32>,
    return_exprs: Vec<ReturnRecord<'a>>,
}

#[derive(Serialize)]
struct ReturnRecord<'a> {
    chain_id: &'a str,
    #[serde(serialize_with = "hash::serialize_hex64")]
    ret_hash: u64,
    ret_norm: &'a str,
}

#[derive(Serialize)]
struct ChainsDoc<'a> {
    analysis_version: &'a str,
    chains: Vec<ChainRecord<'a>>,
}

#[derive(Serialize)]
struct ChainRecord<'a> {
    chain_id: &'a str,
    #[serde(serialize_with = "hash::serialize_hex64")]
    func_hash: u64,
    mincover: bool,
    #[serde(serialize_with = "hash::serialize_hex64")]
    signature: u64,
    #[serde(serialize_with = "hash::serialize_hex64")]
    return_hash: u64,
    sequence: Vec<SeqRecord>,
}

#[derive(Serialize)]
struct SeqRecord {
    cond_id: u32,
    value: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Origin, Span};
    use crate::chain::{ChainStep, CondRef};

    fn cond_at(text: &str, line: u32) -> CondRef {
        CondRef {
            expr: Some(Expr::atom(
                text,
                Origin::main_file("unit.cpp", line, Span::new(0, text.len())),
            )),
            kind: CondKind::If,
        }
    }

    fn step(text: &str, line: u32, flag: bool) -> ChainStep {
        ChainStep {
            cond: Some(cond_at(text, line)),
            flag,
        }
    }

    fn facts() -> FunctionFacts {
        FunctionFacts {
            signature: "int f(int)".into(),
            name: "f".into(),
            file: "unit.cpp".into(),
        }
    }

    #[test]
    fn first_chain_gets_ordinal_000() {
        let mut mc = MetaCollector::new();
        mc.record_function(
            &facts(),
            &[CondChain {
                steps: vec![step("x > 0", 2, true)],
                contradictory: false,
            }],
            &HashSet::new(),
            &[],
        );
        assert_eq!(mc.chains().len(), 1);
        assert_eq!(mc.chains()[0].chain_id, "000");
        assert_eq!(mc.chains()[0].sequence, vec![(0, true)]);
        assert_eq!(
            mc.conditions()[0].hash,
            hash::condition_hash("unit.cpp", 2, "x > 0")
        );
    }

    #[test]
    fn contradictory_chains_are_dropped_and_survivors_renumbered() {
        let mut mc = MetaCollector::new();
        mc.record_function(
            &facts(),
            &[
                CondChain {
                    steps: vec![step("x > 0", 2, true)],
                    contradictory: false,
                },
                CondChain {
                    steps: vec![step("x > 0", 2, true), step("x > 0", 2, false)],
                    contradictory: true,
                },
                CondChain {
                    steps: vec![step("x > 0", 2, false)],
                    contradictory: false,
                },
            ],
            &HashSet::new(),
            &[],
        );
        let ids: Vec<&str> = mc.chains().iter().map(|c| c.chain_id.as_str()).collect();
        assert_eq!(ids, vec!["000", "001"]);
    }

    #[test]
    fn identical_triples_intern_to_one_condition() {
        let mut mc = MetaCollector::new();
        mc.record_function(
            &facts(),
            &[CondChain {
                steps: vec![step("x > 0", 2, true), step("x > 0", 2, false)],
                contradictory: false,
            }],
            &HashSet::new(),
            &[],
        );
        assert_eq!(mc.conditions().len(), 1);
        assert_eq!(mc.chains()[0].sequence, vec![(0, true), (0, false)]);
    }

    #[test]
    fn negated_condition_flips_recorded_value() {
        use crate::ast::{ExprKind, UnaryOp};
        let expr = Expr {
            kind: ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(Expr::atom(
                    "X",
                    Origin::main_file("unit.cpp", 3, Span::new(1, 2)),
                )),
            },
            origin: Origin::main_file("unit.cpp", 3, Span::new(0, 2)),
        };
        let mut mc = MetaCollector::new();
        mc.record_function(
            &facts(),
            &[CondChain {
                steps: vec![ChainStep {
                    cond: Some(CondRef {
                        expr: Some(expr),
                        kind: CondKind::If,
                    }),
                    flag: true,
                }],
                contradictory: false,
            }],
            &HashSet::new(),
            &[],
        );
        // `if (!X)` taking the true branch records X=false.
        assert_eq!(mc.conditions()[0].cond_norm, "X");
        assert_eq!(mc.chains()[0].sequence, vec![(0, false)]);
    }

    #[test]
    fn return_forms_attach_to_function_and_chain() {
        let mut mc = MetaCollector::new();
        mc.record_function(
            &facts(),
            &[
                CondChain {
                    steps: vec![step("x > 0", 2, true)],
                    contradictory: false,
                },
                CondChain {
                    steps: vec![step("x > 0", 2, false)],
                    contradictory: false,
                },
            ],
            &HashSet::new(),
            &["1".to_string(), String::new()],
        );
        assert_eq!(mc.chains()[0].return_hash, hash::hash64("1"));
        assert_eq!(mc.chains()[1].return_hash, 0);
        let f = &mc.functions()[0];
        assert_eq!(f.returns.len(), 1);
        assert_eq!(f.returns[0].chain_id, "000");
        assert_eq!(f.returns[0].return_norm, "1");
    }

    #[test]
    fn record_function_is_idempotent() {
        let chains = [CondChain {
            steps: vec![step("x > 0", 2, true)],
            contradictory: false,
        }];
        let rets = ["1".to_string()];
        let mut mc = MetaCollector::new();
        mc.record_function(&facts(), &chains, &HashSet::new(), &rets);
        let once = (
            mc.conditions().to_vec(),
            mc.functions().to_vec(),
            mc.chains().to_vec(),
        );
        mc.record_function(&facts(), &chains, &HashSet::new(), &rets);
        assert_eq!(mc.conditions(), once.0.as_slice());
        assert_eq!(mc.functions(), once.1.as_slice());
        assert_eq!(mc.chains(), once.2.as_slice());
    }

    #[test]
    fn steps_without_live_condition_are_skipped() {
        let mut mc = MetaCollector::new();
        mc.record_function(
            &facts(),
            &[CondChain {
                steps: vec![
                    ChainStep { cond: None, flag: true },
                    step("x > 0", 2, true),
                    ChainStep {
                        cond: Some(CondRef { expr: None, kind: CondKind::If }),
                        flag: false,
                    },
                ],
                contradictory: false,
            }],
            &HashSet::new(),
            &[],
        );
        assert_eq!(mc.chains()[0].sequence.len(), 1);
    }

    #[test]
    fn dump_writes_three_linked_documents() {
        let mut mc = MetaCollector::new();
        let mut min_cover = HashSet::new();
        min_cover.insert(0usize);
        mc.record_function(
            &facts(),
            &[CondChain {
                steps: vec![step("x > 0", 2, true)],
                contradictory: false,
            }],
            &min_cover,
            &["1".to_string()],
        );
        let dir = tempfile::tempdir().expect("tempdir");
        mc.dump_all(dir.path()).expect("dump");

        let conds: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("llm_reqs/conditions.meta.json")).expect("read"),
        )
        .expect("json");
        let funcs: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("llm_reqs/functions.meta.json")).expect("read"),
        )
        .expect("json");
        let chains: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("llm_reqs/chains.meta.json")).expect("read"),
        )
        .expect("json");

        assert_eq!(conds["conditions"][0]["cond_norm"], "x > 0");
        assert_eq!(conds["conditions"][0]["kind"], "IF");
        let cond_hash = conds["conditions"][0]["hash"].as_str().expect("hash");
        assert!(cond_hash.starts_with("0x") && cond_hash.len() == 18);

        assert_eq!(funcs["functions"][0]["signature"], "int f(int)");
        assert_eq!(funcs["functions"][0]["condition_ids"][0], 0);
        assert_eq!(funcs["functions"][0]["return_exprs"][0]["ret_norm"], "1");

        assert_eq!(chains["chains"][0]["chain_id"], "000");
        assert_eq!(chains["chains"][0]["mincover"], true);
        assert_eq!(chains["chains"][0]["sequence"][0]["cond_id"], 0);
        assert_eq!(chains["chains"][0]["sequence"][0]["value"], true);
        assert_eq!(
            chains["chains"][0]["func_hash"],
            funcs["functions"][0]["hash"]
        );
        assert_eq!(
            conds["analysis_version"],
            chains["analysis_version"]
        );
    }
}
