//! Source instrumenter: decision-point probes.
//!
//! Rewrites a translation unit so that every decision point reports its
//! evaluated boolean through the runtime's `brinfo_log_cond`, preserving the
//! original semantics and short-circuit behavior. Whole conditions without
//! `&&`/`||` are wrapped in place; short-circuited conditions are left intact
//! and their non-logical operands are wrapped individually, so evaluation
//! order and laziness never change. `case`/`default` labels and range-`for`
//! bodies get statement probes that always report `true`.
//!
//! Probe call sites bake in the same normalized text and identity hash the
//! meta collector interns, which is the whole point: a `cond` event at
//! runtime is a foreign key into the static tables.

use tracing::debug;

use crate::ast::{CondKind, Expr, ExprKind, FunctionDef, Span, Stmt, StmtKind, TranslationUnit};
use crate::hash;
use crate::norm;
use crate::result::BrinfoResult;
use crate::rewrite::Rewriter;

/// Include directive injected once at the top of the main file
pub const RUNTIME_INCLUDE: &str = "#include \"brinfo/runtime.h\"\n";

/// Exported runtime symbol the probes call
pub const LOG_COND_SYMBOL: &str = "brinfo_log_cond";

#[derive(Debug)]
struct SwitchCtx {
    file: String,
    line: u32,
    switch_norm: String,
    case_norms: Vec<String>,
}

/// Condition-probe rewriter for one translation unit.
#[derive(Debug)]
pub struct CondInstrumenter<'a> {
    tu: &'a TranslationUnit,
    rw: Rewriter,
    func_stack: Vec<u64>,
    switch_stack: Vec<SwitchCtx>,
}

impl<'a> CondInstrumenter<'a> {
    /// Instrument every decision point of the unit and return the rewritten
    /// main-file text.
    pub fn instrument(tu: &'a TranslationUnit) -> BrinfoResult<String> {
        let mut this = Self {
            tu,
            rw: Rewriter::new(tu.source.clone()),
            func_stack: Vec::new(),
            switch_stack: Vec::new(),
        };
        for f in &tu.functions {
            this.walk_function(f)?;
        }
        if !tu.source.contains("brinfo/runtime.h") {
            this.rw.set_prefix(RUNTIME_INCLUDE);
        }
        Ok(this.rw.into_string())
    }

    fn walk_function(&mut self, f: &FunctionDef) -> BrinfoResult<()> {
        self.func_stack.push(hash::hash64(&f.signature()));
        let res = self.walk_stmt(&f.body);
        self.func_stack.pop();
        res
    }

    fn current_func_hash(&self) -> u64 {
        self.func_stack.last().copied().unwrap_or(0)
    }

    fn walk_stmt(&mut self, s: &Stmt) -> BrinfoResult<()> {
        match &s.kind {
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.wrap_condition(cond, CondKind::If)?;
                self.walk_expr(cond, true)?;
                self.walk_stmt(then_branch)?;
                if let Some(e) = else_branch {
                    self.walk_stmt(e)?;
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                self.wrap_condition(cond, CondKind::Loop)?;
                self.walk_expr(cond, true)?;
                self.walk_stmt(body)
            }
            StmtKind::DoWhile { body, cond } => {
                self.walk_stmt(body)?;
                self.wrap_condition(cond, CondKind::Loop)?;
                self.walk_expr(cond, true)
            }
            StmtKind::For {
                init,
                cond,
                inc,
                body,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init)?;
                }
                if let Some(cond) = cond {
                    self.wrap_condition(cond, CondKind::Loop)?;
                    self.walk_expr(cond, true)?;
                }
                if let Some(inc) = inc {
                    self.walk_expr(inc, false)?;
                }
                self.walk_stmt(body)
            }
            StmtKind::RangeFor { range_init, body } => {
                self.probe_range_for(s, range_init.as_ref(), body)?;
                if let Some(init) = range_init {
                    self.walk_expr(init, false)?;
                }
                self.walk_stmt(body)
            }
            StmtKind::Switch { cond, body } => {
                let ctx = self.switch_context(cond.as_ref(), body);
                if let Some(cond) = cond {
                    self.walk_expr(cond, false)?;
                }
                self.switch_stack.push(ctx);
                let res = self.walk_stmt(body);
                self.switch_stack.pop();
                res
            }
            StmtKind::Case {
                value,
                after_colon,
                inner,
            } => {
                self.probe_case(s, value, *after_colon)?;
                self.walk_expr(value, false)?;
                self.walk_stmt(inner)
            }
            StmtKind::Default { after_colon, inner } => {
                self.probe_default(s, *after_colon)?;
                self.walk_stmt(inner)
            }
            StmtKind::Compound(stmts) => {
                for st in stmts {
                    self.walk_stmt(st)?;
                }
                Ok(())
            }
            StmtKind::ExprStmt(e) => self.walk_expr(e, false),
            StmtKind::Return(Some(e)) => self.walk_expr(e, false),
            StmtKind::NestedFunction(f) => self.walk_function(f),
            StmtKind::Return(None) | StmtKind::Opaque => Ok(()),
        }
    }

    fn walk_expr(&mut self, e: &Expr, in_cond: bool) -> BrinfoResult<()> {
        match &e.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_logical() && in_cond {
                    self.wrap_operand(lhs)?;
                    self.wrap_operand(rhs)?;
                }
                self.walk_expr(lhs, in_cond)?;
                self.walk_expr(rhs, in_cond)
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand, in_cond),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.wrap_condition(cond, CondKind::If)?;
                self.walk_expr(cond, true)?;
                self.walk_expr(then_expr, in_cond)?;
                self.walk_expr(else_expr, in_cond)
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.walk_expr(arg, in_cond)?;
                }
                Ok(())
            }
            ExprKind::Paren(inner) | ExprKind::ImplicitCast(inner) => {
                self.walk_expr(inner, in_cond)
            }
            ExprKind::Atom(_) => Ok(()),
        }
    }

    /// Wrap a whole condition expression, unless it short-circuits.
    fn wrap_condition(&mut self, cond: &Expr, kind: CondKind) -> BrinfoResult<()> {
        if cond.contains_logical() {
            // Operand probes preserve the short-circuit; the whole
            // expression stays untouched.
            return Ok(());
        }
        self.wrap_boolean_expr(cond, cond.origin.span, kind)
    }

    /// Wrap one operand of a short-circuit operator, parens stripped.
    fn wrap_operand(&mut self, operand: &Expr) -> BrinfoResult<()> {
        let peeled = operand.peel();
        if peeled.is_logical() {
            // The inner visit wraps its own operands.
            return Ok(());
        }
        self.wrap_boolean_expr(peeled, peeled.origin.span, CondKind::Logic)
    }

    fn wrap_boolean_expr(&mut self, expr: &Expr, span: Span, kind: CondKind) -> BrinfoResult<()> {
        if !self.probe_site_ok(&expr.origin, span) {
            return Ok(());
        }
        let file = &expr.origin.file;
        let line = expr.origin.line;
        let normalized = norm::normalize(expr);
        let cond_hash = hash::condition_hash(file, line, &normalized.text);
        let prefix = format!(
            "{LOG_COND_SYMBOL}({}ULL, \"{}\", {line}, (bool)(",
            hash::hex64(self.current_func_hash()),
            escape_c(file),
        );
        let suffix = format!(
            "), \"{}\", {}ULL, {}, \"{}\")",
            escape_c(&normalized.text),
            hash::hex64(cond_hash),
            normalized.flipped,
            kind.as_str(),
        );
        self.rw.insert(span.start, prefix)?;
        self.rw.insert(span.end, suffix)?;
        Ok(())
    }

    fn switch_context(&self, cond: Option<&Expr>, body: &Stmt) -> SwitchCtx {
        let (file, line, switch_norm) = cond.map_or_else(
            || (String::new(), 0, String::new()),
            |c| {
                (
                    c.origin.file.clone(),
                    c.origin.line,
                    norm::normalize(c).text,
                )
            },
        );
        let mut cases: Vec<(usize, String)> = Vec::new();
        collect_case_norms(body, &mut cases);
        cases.sort_by_key(|&(offset, _)| offset);
        SwitchCtx {
            file,
            line,
            switch_norm,
            case_norms: cases.into_iter().map(|(_, n)| n).collect(),
        }
    }

    fn probe_case(&mut self, stmt: &Stmt, value: &Expr, after_colon: usize) -> BrinfoResult<()> {
        if !stmt.origin.in_main_file || after_colon > self.tu.source.len() {
            debug!(line = stmt.origin.line, "skipping case label probe");
            return Ok(());
        }
        let case_norm = norm::normalize(value).text;
        let (file, line, norm) = match self.switch_stack.last() {
            Some(ctx) if !ctx.switch_norm.is_empty() => (
                ctx.file.clone(),
                ctx.line,
                format!("{} == {case_norm}", ctx.switch_norm),
            ),
            Some(ctx) if !ctx.file.is_empty() => {
                (ctx.file.clone(), ctx.line, format!("case {case_norm}"))
            }
            _ => (
                stmt.origin.file.clone(),
                stmt.origin.line,
                format!("case {case_norm}"),
            ),
        };
        self.insert_label_probe(after_colon, &file, line, &norm, CondKind::Case)
    }

    fn probe_default(&mut self, stmt: &Stmt, after_colon: usize) -> BrinfoResult<()> {
        if !stmt.origin.in_main_file || after_colon > self.tu.source.len() {
            debug!(line = stmt.origin.line, "skipping default label probe");
            return Ok(());
        }
        let (file, line, norm) = match self.switch_stack.last() {
            Some(ctx) if !ctx.switch_norm.is_empty() && !ctx.case_norms.is_empty() => {
                let joined = ctx
                    .case_norms
                    .iter()
                    .map(|c| format!("{} == {c}", ctx.switch_norm))
                    .collect::<Vec<_>>()
                    .join(" || ");
                (ctx.file.clone(), ctx.line, joined)
            }
            Some(ctx) if !ctx.switch_norm.is_empty() => {
                (ctx.file.clone(), ctx.line, ctx.switch_norm.clone())
            }
            _ => (
                stmt.origin.file.clone(),
                stmt.origin.line,
                "default".to_string(),
            ),
        };
        self.insert_label_probe(after_colon, &file, line, &norm, CondKind::Default)
    }

    fn probe_range_for(
        &mut self,
        stmt: &Stmt,
        range_init: Option<&Expr>,
        body: &Stmt,
    ) -> BrinfoResult<()> {
        if !stmt.origin.is_probe_site() {
            debug!(line = stmt.origin.line, "skipping range-for probe");
            return Ok(());
        }
        let norm = range_init.map_or_else(
            || "range_for".to_string(),
            |init| format!("range_for:{}", norm::rtrim(&init.pretty())),
        );
        let file = stmt.origin.file.clone();
        let line = stmt.origin.line;
        let probe = self.label_probe_text(&file, line, &norm, CondKind::Loop);
        let span = body.origin.span;
        if span.end > self.tu.source.len() || !span.is_valid() {
            debug!(line, "skipping range-for probe with invalid body span");
            return Ok(());
        }
        if matches!(body.kind, StmtKind::Compound(_)) {
            // Just after the `{`.
            self.rw.insert(span.start + 1, probe)?;
        } else {
            // Wrap the single-statement body in braces and prepend the probe.
            self.rw.insert(span.start, format!("{{ {probe}"))?;
            self.rw.insert(span.end, " }".to_string())?;
        }
        Ok(())
    }

    fn insert_label_probe(
        &mut self,
        at: usize,
        file: &str,
        line: u32,
        norm: &str,
        kind: CondKind,
    ) -> BrinfoResult<()> {
        let probe = self.label_probe_text(file, line, norm, kind);
        self.rw.insert(at, probe)?;
        Ok(())
    }

    fn label_probe_text(&self, file: &str, line: u32, norm: &str, kind: CondKind) -> String {
        let cond_hash = hash::condition_hash(file, line, norm);
        format!(
            " {LOG_COND_SYMBOL}({}ULL, \"{}\", {line}, true, \"{}\", {}ULL, false, \"{}\");",
            hash::hex64(self.current_func_hash()),
            escape_c(file),
            escape_c(norm),
            hash::hex64(cond_hash),
            kind.as_str(),
        )
    }

    fn probe_site_ok(&self, origin: &crate::ast::Origin, span: Span) -> bool {
        if !origin.is_probe_site() {
            debug!(
                file = %origin.file,
                line = origin.line,
                "skipping probe outside main-file spelling"
            );
            return false;
        }
        if span.end > self.tu.source.len() {
            debug!(line = origin.line, "skipping probe with out-of-range span");
            return false;
        }
        true
    }
}

/// Collect `case` value norms in source order, not descending into nested
/// switches (their labels belong to the inner statement).
fn collect_case_norms(s: &Stmt, out: &mut Vec<(usize, String)>) {
    match &s.kind {
        StmtKind::Case {
            value,
            inner,
            ..
        } => {
            out.push((s.origin.span.start, norm::normalize(value).text));
            collect_case_norms(inner, out);
        }
        StmtKind::Default { inner, .. } => collect_case_norms(inner, out),
        StmtKind::Compound(stmts) => {
            for st in stmts {
                collect_case_norms(st, out);
            }
        }
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_case_norms(then_branch, out);
            if let Some(e) = else_branch {
                collect_case_norms(e, out);
            }
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::RangeFor { body, .. } => collect_case_norms(body, out),
        StmtKind::Switch { .. }
        | StmtKind::ExprStmt(_)
        | StmtKind::Return(_)
        | StmtKind::NestedFunction(_)
        | StmtKind::Opaque => {}
    }
}

/// Escape text for embedding in a C string literal. Control characters
/// other than tab and newline are dropped.
fn escape_c(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}
