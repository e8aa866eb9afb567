//! Invocation auto-wrapper.
//!
//! Inside test bodies, rewrites each direct call `F(args)` into
//! `BRINFO_CALL(F(args))`, which brackets the call with
//! `begin_invocation`/`end_invocation` at runtime. Wrapping is post-order:
//! inner calls are wrapped first and the outer wrap re-reads the rewritten
//! text, so nesting composes. An optional allowlist restricts wrapping to
//! callees whose fully qualified name matches a pattern.

use regex::Regex;
use tracing::debug;

use crate::ast::{Expr, ExprKind, FunctionDef, Stmt, StmtKind, TranslationUnit};
use crate::result::BrinfoResult;
use crate::rewrite::Rewriter;

/// The wrapper macro spelled into rewritten source
pub const CALL_MACRO: &str = "BRINFO_CALL";

/// How far back to scan for an existing wrapper before a call
const WRAP_LOOKBACK: usize = 48;

/// Header block prepended once to a modified main file
pub const AUTO_WRAP_HEADER: &str = "#define BRINFO_AUTO_WRAP\n\
                                    #include \"brinfo/autowrap.h\"\n\
                                    #include \"brinfo/runtime.h\"\n\n";

/// Markers whose presence means the header block is already installed
const HEADER_MARKERS: &[&str] = &["BRINFO_AUTO_WRAP", "brinfo/autowrap.h", "brinfo/runtime.h"];

/// Options for the call wrapper.
#[derive(Debug, Clone)]
pub struct CallWrapConfig {
    /// Only wrap callees whose fully qualified name matches
    pub allow: Option<Regex>,
    /// Restrict wrapping to recognized test bodies
    pub only_tests: bool,
    /// Recognize test bodies only when their definition is in the main file
    pub main_file_only: bool,
    /// Wrap calls spelled inside macro arguments
    pub wrap_macro_args: bool,
    /// Qualified name of the known test base class
    pub test_base_class: String,
    /// Method name marking a test body
    pub test_method: String,
}

impl Default for CallWrapConfig {
    fn default() -> Self {
        Self {
            allow: None,
            only_tests: true,
            main_file_only: true,
            wrap_macro_args: false,
            test_base_class: "testing::Test".to_string(),
            test_method: "TestBody".to_string(),
        }
    }
}

impl CallWrapConfig {
    /// Restrict wrapping to callees matching `pattern`
    pub fn with_allowlist(mut self, pattern: &str) -> BrinfoResult<Self> {
        self.allow = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Wrap calls in every function, not only test bodies
    #[must_use]
    pub const fn wrap_all_functions(mut self) -> Self {
        self.only_tests = false;
        self
    }

    /// Opt in to wrapping calls spelled inside macro arguments
    #[must_use]
    pub const fn include_macro_args(mut self) -> Self {
        self.wrap_macro_args = true;
        self
    }
}

/// Call-wrapping rewriter for one translation unit.
#[derive(Debug)]
pub struct CallWrapper<'a> {
    tu: &'a TranslationUnit,
    cfg: &'a CallWrapConfig,
    rw: Rewriter,
    in_test_body: bool,
    modified_main: bool,
}

impl<'a> CallWrapper<'a> {
    /// Wrap calls per `cfg` and return the rewritten main-file text.
    pub fn rewrite(tu: &'a TranslationUnit, cfg: &'a CallWrapConfig) -> BrinfoResult<String> {
        let mut this = Self {
            tu,
            cfg,
            rw: Rewriter::new(tu.source.clone()),
            in_test_body: false,
            modified_main: false,
        };
        for f in &tu.functions {
            this.walk_function(f)?;
        }
        if this.modified_main && !HEADER_MARKERS.iter().any(|m| tu.source.contains(m)) {
            this.rw.set_prefix(AUTO_WRAP_HEADER);
        }
        Ok(this.rw.into_string())
    }

    fn walk_function(&mut self, f: &FunctionDef) -> BrinfoResult<()> {
        let prev = self.in_test_body;
        if self.is_test_body(f) {
            self.in_test_body = true;
        }
        let res = self.walk_stmt(&f.body);
        self.in_test_body = prev;
        res
    }

    /// Test-body identification, in preference order: overrides the known
    /// base test method; class transitively derives from the known test base;
    /// class name ends in `_Test`.
    fn is_test_body(&self, f: &FunctionDef) -> bool {
        if f.name != self.cfg.test_method {
            return false;
        }
        if self.cfg.main_file_only && !f.origin.in_main_file {
            return false;
        }
        let base_method = format!("{}::{}", self.cfg.test_base_class, self.cfg.test_method);
        if f.overrides.iter().any(|o| strip_root(o) == base_method) {
            return true;
        }
        if let Some(class) = &f.class {
            if class
                .bases
                .iter()
                .any(|b| strip_root(b) == self.cfg.test_base_class)
            {
                return true;
            }
            if class.name.ends_with("_Test") {
                return true;
            }
        }
        false
    }

    fn walk_stmt(&mut self, s: &Stmt) -> BrinfoResult<()> {
        match &s.kind {
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(cond)?;
                self.walk_stmt(then_branch)?;
                if let Some(e) = else_branch {
                    self.walk_stmt(e)?;
                }
                Ok(())
            }
            StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
                self.walk_expr(cond)?;
                self.walk_stmt(body)
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
                    self.walk_expr(cond)?;
                }
                if let Some(inc) = inc {
                    self.walk_expr(inc)?;
                }
                self.walk_stmt(body)
            }
            StmtKind::RangeFor { range_init, body } => {
                if let Some(init) = range_init {
                    self.walk_expr(init)?;
                }
                self.walk_stmt(body)
            }
            StmtKind::Switch { cond, body } => {
                if let Some(cond) = cond {
                    self.walk_expr(cond)?;
                }
                self.walk_stmt(body)
            }
            StmtKind::Case { value, inner, .. } => {
                self.walk_expr(value)?;
                self.walk_stmt(inner)
            }
            StmtKind::Default { inner, .. } => self.walk_stmt(inner),
            StmtKind::Compound(stmts) => {
                for st in stmts {
                    self.walk_stmt(st)?;
                }
                Ok(())
            }
            StmtKind::ExprStmt(e) => self.walk_expr(e),
            StmtKind::Return(Some(e)) => self.walk_expr(e),
            StmtKind::NestedFunction(f) => self.walk_function(f),
            StmtKind::Return(None) | StmtKind::Opaque => Ok(()),
        }
    }

    /// Post-order: children first, so an outer wrap sees inner wraps through
    /// the rewritten text.
    fn walk_expr(&mut self, e: &Expr) -> BrinfoResult<()> {
        match &e.kind {
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs)?;
                self.walk_expr(rhs)?;
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand)?,
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.walk_expr(cond)?;
                self.walk_expr(then_expr)?;
                self.walk_expr(else_expr)?;
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.walk_expr(arg)?;
                }
                self.wrap_call(e)?;
            }
            ExprKind::Paren(inner) | ExprKind::ImplicitCast(inner) => self.walk_expr(inner)?,
            ExprKind::Atom(_) => {}
        }
        Ok(())
    }

    fn wrap_call(&mut self, call: &Expr) -> BrinfoResult<()> {
        let ExprKind::Call { callee, .. } = &call.kind else {
            return Ok(());
        };
        let origin = &call.origin;
        if origin.in_system_header {
            return Ok(());
        }
        if self.cfg.only_tests && !self.in_test_body {
            return Ok(());
        }
        let Some(callee) = callee else {
            // Indirect calls have no resolvable name to match or attribute.
            return Ok(());
        };
        if let Some(allow) = &self.cfg.allow {
            if !allow.is_match(callee) {
                return Ok(());
            }
        }
        if origin.in_macro {
            if origin.macro_name.as_deref() == Some(CALL_MACRO) {
                return Ok(());
            }
            if !self.cfg.wrap_macro_args {
                debug!(callee, "skipping call inside macro expansion");
                return Ok(());
            }
        }
        let span = origin.span;
        if !origin.in_main_file || !span.is_valid() || span.end > self.tu.source.len() {
            debug!(callee, "skipping call without main-file spelling");
            return Ok(());
        }
        if self.already_wrapped(span.start) {
            return Ok(());
        }
        let current = self.rw.rewritten_text(span.start, span.end)?;
        if current.is_empty() {
            return Ok(());
        }
        let wrapped = format!("{CALL_MACRO}({current})");
        if self.rw.replace(span.start, span.end, wrapped).is_err() {
            debug!(callee, "skipping call overlapping an earlier rewrite");
            return Ok(());
        }
        self.modified_main = true;
        Ok(())
    }

    /// Look back a bounded window of file text; if the preceding token is
    /// `BRINFO_CALL(`, this call is already wrapped.
    fn already_wrapped(&self, start: usize) -> bool {
        let mut from = start.saturating_sub(WRAP_LOOKBACK);
        while !self.tu.source.is_char_boundary(from) {
            from += 1;
        }
        let before = self.tu.source[from..start].trim_end();
        before.ends_with("BRINFO_CALL(")
    }
}

/// Drop a leading `::` qualifier
fn strip_root(name: &str) -> &str {
    name.strip_prefix("::").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassInfo, Origin, Span};

    fn body() -> Stmt {
        Stmt {
            kind: StmtKind::Compound(vec![]),
            origin: Origin::main_file("t.cpp", 1, Span::new(0, 1)),
        }
    }

    fn test_method(class: Option<ClassInfo>, overrides: Vec<String>) -> FunctionDef {
        FunctionDef {
            name: "TestBody".into(),
            qualified_name: "Suite_Case_Test::TestBody".into(),
            return_type: "void".into(),
            class,
            overrides,
            params: vec![],
            body: body(),
            origin: Origin::main_file("t.cpp", 3, Span::new(0, 1)),
        }
    }

    fn wrapper_over<'a>(
        tu: &'a TranslationUnit,
        cfg: &'a CallWrapConfig,
    ) -> CallWrapper<'a> {
        CallWrapper {
            tu,
            cfg,
            rw: Rewriter::new(tu.source.clone()),
            in_test_body: false,
            modified_main: false,
        }
    }

    #[test]
    fn test_body_recognized_by_override() {
        let tu = TranslationUnit {
            file: "t.cpp".into(),
            source: String::new(),
            functions: vec![],
        };
        let cfg = CallWrapConfig::default();
        let w = wrapper_over(&tu, &cfg);
        let f = test_method(None, vec!["::testing::Test::TestBody".into()]);
        assert!(w.is_test_body(&f));
    }

    #[test]
    fn test_body_recognized_by_base_class_then_name_suffix() {
        let tu = TranslationUnit {
            file: "t.cpp".into(),
            source: String::new(),
            functions: vec![],
        };
        let cfg = CallWrapConfig::default();
        let w = wrapper_over(&tu, &cfg);

        let by_base = test_method(
            Some(ClassInfo {
                name: "MyFixture".into(),
                qualified_name: "MyFixture".into(),
                bases: vec!["testing::Test".into()],
            }),
            vec![],
        );
        assert!(w.is_test_body(&by_base));

        let by_suffix = test_method(
            Some(ClassInfo {
                name: "Parse_Handles_Test".into(),
                qualified_name: "Parse_Handles_Test".into(),
                bases: vec![],
            }),
            vec![],
        );
        assert!(w.is_test_body(&by_suffix));

        let neither = test_method(
            Some(ClassInfo {
                name: "Helper".into(),
                qualified_name: "Helper".into(),
                bases: vec![],
            }),
            vec![],
        );
        assert!(!w.is_test_body(&neither));
    }

    #[test]
    fn test_body_outside_main_file_is_rejected_by_default() {
        let tu = TranslationUnit {
            file: "t.cpp".into(),
            source: String::new(),
            functions: vec![],
        };
        let cfg = CallWrapConfig::default();
        let w = wrapper_over(&tu, &cfg);
        let mut f = test_method(None, vec!["testing::Test::TestBody".into()]);
        f.origin.in_main_file = false;
        assert!(!w.is_test_body(&f));
    }

    #[test]
    fn lookback_detects_existing_wrapper() {
        let src = "auto v = BRINFO_CALL(  f(1));";
        let tu = TranslationUnit {
            file: "t.cpp".into(),
            source: src.into(),
            functions: vec![],
        };
        let cfg = CallWrapConfig::default();
        let w = wrapper_over(&tu, &cfg);
        let call_at = src.find("f(1)").expect("call");
        assert!(w.already_wrapped(call_at));
        assert!(!w.already_wrapped(0));
    }
}
