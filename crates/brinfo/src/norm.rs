//! The condition normalization rule.
//!
//! This is the single most load-bearing contract in the crate: the meta
//! collector and the instrumenter both canonicalize condition spellings
//! through [`normalize`], and the probe hashes baked into rewritten source
//! must reproduce the hashes stored in the meta documents. Keeping the rule
//! in one module is what makes that hold.
//!
//! The rule, applied after stripping parentheses and implicit conversions:
//!
//! 1. `lhs != rhs` becomes `lhs == rhs`, with flipped polarity.
//! 2. `!operand` becomes the operand's text, with flipped polarity.
//! 3. Anything else keeps its canonical text, polarity unchanged.
//! 4. Trailing whitespace and trailing `;` are trimmed.

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::hash;

/// A normalized condition spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Canonical text after the rule
    pub text: String,
    /// Whether normalization inverted the expression's polarity
    pub flipped: bool,
}

/// Apply the normalization rule to a condition expression.
#[must_use]
pub fn normalize(expr: &Expr) -> Normalized {
    let peeled = expr.peel();
    match &peeled.kind {
        ExprKind::Binary {
            op: BinaryOp::Ne,
            lhs,
            rhs,
        } => Normalized {
            text: rtrim(&format!(
                "{} == {}",
                lhs.peel().pretty(),
                rhs.peel().pretty()
            )),
            flipped: true,
        },
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => Normalized {
            text: rtrim(&operand.peel().pretty()),
            flipped: true,
        },
        _ => Normalized {
            text: rtrim(&peeled.pretty()),
            flipped: false,
        },
    }
}

/// Identity hash of a condition at its spelling location.
///
/// Convenience over [`hash::condition_hash`] for callers that hold the
/// expression rather than its normalized text.
#[must_use]
pub fn cond_identity(file: &str, line: u32, expr: &Expr) -> (Normalized, u64) {
    let norm = normalize(expr);
    let h = hash::condition_hash(file, line, &norm.text);
    (norm, h)
}

/// Trim trailing whitespace and trailing semicolons
#[must_use]
pub fn rtrim(s: &str) -> String {
    s.trim_end_matches(|c: char| c.is_whitespace() || c == ';')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Origin, Span};
    use proptest::prelude::*;

    fn o() -> Origin {
        Origin::main_file("t.cpp", 1, Span::new(0, 1))
    }

    fn atom(s: &str) -> Expr {
        Expr::atom(s, o())
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            origin: o(),
        }
    }

    fn not(e: Expr) -> Expr {
        Expr {
            kind: ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(e),
            },
            origin: o(),
        }
    }

    fn paren(e: Expr) -> Expr {
        Expr {
            kind: ExprKind::Paren(Box::new(e)),
            origin: o(),
        }
    }

    #[test]
    fn not_equal_becomes_equal_with_flip() {
        let n = normalize(&binary(BinaryOp::Ne, atom("p"), atom("nullptr")));
        assert_eq!(n.text, "p == nullptr");
        assert!(n.flipped);
    }

    #[test]
    fn logical_not_unwraps_with_flip() {
        let n = normalize(&not(atom("done")));
        assert_eq!(n.text, "done");
        assert!(n.flipped);
    }

    #[test]
    fn plain_expression_is_verbatim() {
        let n = normalize(&binary(BinaryOp::Gt, atom("x"), atom("0")));
        assert_eq!(n.text, "x > 0");
        assert!(!n.flipped);
    }

    #[test]
    fn parens_and_casts_are_stripped_before_matching() {
        let n = normalize(&paren(binary(BinaryOp::Ne, paren(atom("a")), atom("b"))));
        assert_eq!(n.text, "a == b");
        assert!(n.flipped);
    }

    #[test]
    fn double_negation_unwraps_one_level() {
        // Only the outermost `!` is rewritten; the inner one stays in text.
        let n = normalize(&not(not(atom("x"))));
        assert_eq!(n.text, "!x");
        assert!(n.flipped);
    }

    #[test]
    fn trailing_semicolon_and_space_trimmed() {
        let n = normalize(&atom("ready() ; "));
        assert_eq!(n.text, "ready()");
    }

    #[test]
    fn identity_is_stable_across_calls() {
        let e = binary(BinaryOp::Ne, atom("p"), atom("nullptr"));
        let (_, h1) = cond_identity("a.cpp", 7, &e);
        let (_, h2) = cond_identity("a.cpp", 7, &e);
        assert_eq!(h1, h2);
        let (_, h3) = cond_identity("a.cpp", 8, &e);
        assert_ne!(h1, h3);
    }

    // Random expressions over the grammar subset the instrumenter sees:
    // comparisons, logical-not, arithmetic, calls, parens.
    fn arb_expr() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            "[a-z][a-z0-9_]{0,6}".prop_map(|s| atom(&s)),
            (0u32..1000).prop_map(|n| atom(&n.to_string())),
        ];
        leaf.prop_recursive(4, 32, 3, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| binary(BinaryOp::Ne, a, b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| binary(BinaryOp::Lt, a, b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| binary(BinaryOp::Add, a, b)),
                inner.clone().prop_map(not),
                inner.clone().prop_map(paren),
                (inner.clone(), proptest::collection::vec(inner, 0..3)).prop_map(
                    |(first, rest)| {
                        let mut args = vec![first];
                        args.extend(rest);
                        Expr {
                            kind: ExprKind::Call {
                                callee: Some("f".into()),
                                args,
                            },
                            origin: o(),
                        }
                    }
                ),
            ]
        })
    }

    proptest! {
        // Both pipeline sides call this one function, so agreement reduces to
        // determinism of the rule itself.
        #[test]
        fn normalization_is_deterministic(e in arb_expr()) {
            let a = normalize(&e);
            let b = normalize(&e);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn flip_tracks_top_level_shape(e in arb_expr()) {
            let n = normalize(&e);
            let expect_flip = matches!(
                &e.peel().kind,
                ExprKind::Binary { op: BinaryOp::Ne, .. }
                    | ExprKind::Unary { op: UnaryOp::Not, .. }
            );
            prop_assert_eq!(n.flipped, expect_flip);
        }

        #[test]
        fn normalized_text_has_no_trailing_noise(e in arb_expr()) {
            let n = normalize(&e);
            prop_assert!(!n.text.ends_with(';'));
            prop_assert!(!n.text.ends_with(char::is_whitespace));
        }

        #[test]
        fn identity_hash_matches_manual_concat(e in arb_expr(), line in 1u32..10_000) {
            let (n, h) = cond_identity("unit.cpp", line, &e);
            prop_assert_eq!(
                h,
                crate::hash::hash64(&format!("unit.cpp:{line}:{}", n.text))
            );
        }
    }
}
