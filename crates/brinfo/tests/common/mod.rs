//! Shared AST construction helpers for the rewriting tests.
//!
//! Source snippets are plain strings; spans are located by substring search
//! so each scenario reads like the C/C++ it instruments.

#![allow(dead_code)]

use brinfo::ast::{
    BinaryOp, ClassInfo, Expr, ExprKind, FunctionDef, Origin, Span, Stmt, StmtKind,
    TranslationUnit,
};

/// 1-based line of a byte offset
pub fn line_at(src: &str, offset: usize) -> u32 {
    u32::try_from(src[..offset].bytes().filter(|&b| b == b'\n').count()).expect("line fits") + 1
}

/// Span of the first occurrence of `needle`
pub fn span_of(src: &str, needle: &str) -> Span {
    let start = src
        .find(needle)
        .unwrap_or_else(|| panic!("{needle:?} not found in source"));
    Span::new(start, start + needle.len())
}

/// Main-file origin of the first occurrence of `needle`
pub fn origin_of(file: &str, src: &str, needle: &str) -> Origin {
    let span = span_of(src, needle);
    Origin::main_file(file, line_at(src, span.start), span)
}

/// Atom spelled exactly as `needle`
pub fn atom(file: &str, src: &str, needle: &str) -> Expr {
    Expr::atom(needle, origin_of(file, src, needle))
}

/// Binary expression spanning `needle`
pub fn binary(file: &str, src: &str, needle: &str, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        origin: origin_of(file, src, needle),
    }
}

/// Direct call expression spanning `needle`
pub fn call(file: &str, src: &str, needle: &str, callee: &str, args: Vec<Expr>) -> Expr {
    Expr {
        kind: ExprKind::Call {
            callee: Some(callee.to_string()),
            args,
        },
        origin: origin_of(file, src, needle),
    }
}

/// Statement with no probing relevance
pub fn opaque(file: &str, src: &str, needle: &str) -> Stmt {
    Stmt {
        kind: StmtKind::Opaque,
        origin: origin_of(file, src, needle),
    }
}

/// Expression statement
pub fn expr_stmt(e: Expr) -> Stmt {
    let origin = e.origin.clone();
    Stmt {
        kind: StmtKind::ExprStmt(e),
        origin,
    }
}

/// Compound statement spanning `needle`
pub fn compound(file: &str, src: &str, needle: &str, stmts: Vec<Stmt>) -> Stmt {
    Stmt {
        kind: StmtKind::Compound(stmts),
        origin: origin_of(file, src, needle),
    }
}

/// Free function named `name` with the given body statements
pub fn function(file: &str, src: &str, name: &str, return_type: &str, body: Vec<Stmt>) -> FunctionDef {
    FunctionDef {
        name: name.to_string(),
        qualified_name: name.to_string(),
        return_type: return_type.to_string(),
        class: None,
        overrides: vec![],
        params: vec![],
        body: Stmt {
            kind: StmtKind::Compound(body),
            origin: origin_of(file, src, "{"),
        },
        origin: Origin::main_file(file, 1, Span::new(0, 1)),
    }
}

/// A recognized test body (class name ends in `_Test`)
pub fn test_body(file: &str, src: &str, class_name: &str, body: Vec<Stmt>) -> FunctionDef {
    FunctionDef {
        name: "TestBody".to_string(),
        qualified_name: format!("{class_name}::TestBody"),
        return_type: "void".to_string(),
        class: Some(ClassInfo {
            name: class_name.to_string(),
            qualified_name: class_name.to_string(),
            bases: vec!["testing::Test".to_string()],
        }),
        overrides: vec!["testing::Test::TestBody".to_string()],
        params: vec![],
        body: Stmt {
            kind: StmtKind::Compound(body),
            origin: origin_of(file, src, "{"),
        },
        origin: Origin::main_file(file, 1, Span::new(0, 1)),
    }
}

/// Translation unit over one source buffer
pub fn unit(file: &str, src: &str, functions: Vec<FunctionDef>) -> TranslationUnit {
    TranslationUnit {
        file: file.to_string(),
        source: src.to_string(),
        functions,
    }
}
