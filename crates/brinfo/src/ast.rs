//! Front-end AST contract.
//!
//! The instrumenter and the meta collector do not parse C/C++ themselves;
//! they consume a small statement/expression tree produced by an external
//! front-end. Every node carries an [`Origin`] describing where its spelling
//! lives in the translation unit's immutable source buffer, which is all the
//! rewriting layer needs: probe injection works purely on byte offsets.
//!
//! Pretty-printing ([`Expr::pretty`]) renders the canonical text the
//! normalization rule operates on. The front-end is expected to populate
//! atom leaves with the token text exactly as the compiler would re-print
//! it, so that both sides of the pipeline agree on condition spellings.

use serde::Serialize;

/// Half-open byte range into the translation unit's source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// First byte of the spelling
    pub start: usize,
    /// One past the last byte of the spelling
    pub end: usize,
}

impl Span {
    /// Create a span from byte offsets
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Whether the span covers at least one byte
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

/// Where a node's spelling comes from.
///
/// Spelling locations decide main-file membership and probe placement;
/// `in_macro` classifies nodes whose immediate context is a macro expansion
/// (those are skipped, or gated, by the rewriting passes).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Origin {
    /// Spelling file name
    pub file: String,
    /// Spelling line of the first token
    pub line: u32,
    /// Spelling byte range in the main buffer (empty when spelled elsewhere)
    pub span: Span,
    /// Spelling is inside the main file of the translation unit
    pub in_main_file: bool,
    /// Node comes from a macro expansion
    pub in_macro: bool,
    /// Immediate macro name when `in_macro` is set
    pub macro_name: Option<String>,
    /// Spelling lives in a system header
    pub in_system_header: bool,
}

impl Origin {
    /// Origin for a node written directly in the main file
    #[must_use]
    pub fn main_file(file: impl Into<String>, line: u32, span: Span) -> Self {
        Self {
            file: file.into(),
            line,
            span,
            in_main_file: true,
            ..Self::default()
        }
    }

    /// Whether a probe may be anchored at this spelling
    #[must_use]
    pub const fn is_probe_site(&self) -> bool {
        self.in_main_file && !self.in_macro && self.span.is_valid()
    }
}

/// Structural role of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CondKind {
    /// `if` or ternary condition
    If,
    /// `case` label
    Case,
    /// `default` label
    Default,
    /// `while`/`for`/`do` condition, or a range-`for` iteration
    Loop,
    /// `try` block entry
    Try,
    /// Operand of a short-circuited `&&`/`||`
    Logic,
}

impl CondKind {
    /// Uppercase textual form used in meta documents and trace events
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::If => "IF",
            Self::Case => "CASE",
            Self::Default => "DEFAULT",
            Self::Loop => "LOOP",
            Self::Try => "TRY",
            Self::Logic => "LOGIC",
        }
    }
}

/// Binary operators the condition grammar distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
}

impl BinaryOp {
    /// Source spelling of the operator
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }

    /// `&&` or `||`
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// Unary operators the condition grammar distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical `!`
    Not,
    /// Arithmetic `-`
    Neg,
    /// `*`
    Deref,
    /// `&`
    AddrOf,
}

impl UnaryOp {
    /// Source spelling of the operator
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Neg => "-",
            Self::Deref => "*",
            Self::AddrOf => "&",
        }
    }
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Expression shape
    pub kind: ExprKind,
    /// Spelling location
    pub origin: Origin,
}

/// Expression shapes relevant to condition probing and call wrapping.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Binary operator application
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Unary operator application
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// `cond ? then : else`
    Ternary {
        /// Condition
        cond: Box<Expr>,
        /// True arm
        then_expr: Box<Expr>,
        /// False arm
        else_expr: Box<Expr>,
    },
    /// Direct call expression
    Call {
        /// Fully qualified callee name, `None` for indirect calls
        callee: Option<String>,
        /// Argument expressions
        args: Vec<Expr>,
    },
    /// Parenthesized subexpression
    Paren(Box<Expr>),
    /// Implicit conversion inserted by the front-end (no spelling of its own)
    ImplicitCast(Box<Expr>),
    /// Opaque leaf carrying its canonical source text
    Atom(String),
}

impl Expr {
    /// Leaf expression from its canonical text
    #[must_use]
    pub fn atom(text: impl Into<String>, origin: Origin) -> Self {
        Self {
            kind: ExprKind::Atom(text.into()),
            origin,
        }
    }

    /// Strip parentheses and implicit conversions
    #[must_use]
    pub fn peel(&self) -> &Self {
        match &self.kind {
            ExprKind::Paren(inner) | ExprKind::ImplicitCast(inner) => inner.peel(),
            _ => self,
        }
    }

    /// Whether the peeled expression is a short-circuit operator
    #[must_use]
    pub fn is_logical(&self) -> bool {
        matches!(&self.peel().kind, ExprKind::Binary { op, .. } if op.is_logical())
    }

    /// Whether any subexpression is a short-circuit operator.
    ///
    /// Walks the whole tree, including call arguments and ternary arms, so
    /// the whole-condition wrap and the operand wrap never both fire for one
    /// condition.
    #[must_use]
    pub fn contains_logical(&self) -> bool {
        match &self.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                op.is_logical() || lhs.contains_logical() || rhs.contains_logical()
            }
            ExprKind::Unary { operand, .. } => operand.contains_logical(),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.contains_logical()
                    || then_expr.contains_logical()
                    || else_expr.contains_logical()
            }
            ExprKind::Call { args, .. } => args.iter().any(Expr::contains_logical),
            ExprKind::Paren(inner) | ExprKind::ImplicitCast(inner) => inner.contains_logical(),
            ExprKind::Atom(_) => false,
        }
    }

    /// Canonical textual rendering of the expression
    #[must_use]
    pub fn pretty(&self) -> String {
        match &self.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                format!("{} {} {}", lhs.pretty(), op.symbol(), rhs.pretty())
            }
            ExprKind::Unary { op, operand } => format!("{}{}", op.symbol(), operand.pretty()),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => format!(
                "{} ? {} : {}",
                cond.pretty(),
                then_expr.pretty(),
                else_expr.pretty()
            ),
            ExprKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(Expr::pretty)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}({args})", callee.as_deref().unwrap_or("<indirect>"))
            }
            ExprKind::Paren(inner) => format!("({})", inner.pretty()),
            ExprKind::ImplicitCast(inner) => inner.pretty(),
            ExprKind::Atom(text) => text.clone(),
        }
    }
}

/// Statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Statement shape
    pub kind: StmtKind,
    /// Spelling location
    pub origin: Origin,
}

/// Statement shapes relevant to probe placement.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `if (cond) then else`
    If {
        /// Condition
        cond: Expr,
        /// Taken branch
        then_branch: Box<Stmt>,
        /// Optional `else`
        else_branch: Option<Box<Stmt>>,
    },
    /// `while (cond) body`
    While {
        /// Condition
        cond: Expr,
        /// Loop body
        body: Box<Stmt>,
    },
    /// `do body while (cond);`
    DoWhile {
        /// Loop body
        body: Box<Stmt>,
        /// Condition
        cond: Expr,
    },
    /// Classic `for`
    For {
        /// Init statement
        init: Option<Box<Stmt>>,
        /// Condition, absent for `for(;;)`
        cond: Option<Expr>,
        /// Increment expression
        inc: Option<Expr>,
        /// Loop body
        body: Box<Stmt>,
    },
    /// Range-based `for`
    RangeFor {
        /// Range initializer expression, when the front-end can spell it
        range_init: Option<Expr>,
        /// Loop body
        body: Box<Stmt>,
    },
    /// `switch (cond) body`
    Switch {
        /// Controlling expression
        cond: Option<Expr>,
        /// Body containing the labels
        body: Box<Stmt>,
    },
    /// `case value: inner`
    Case {
        /// Label value
        value: Expr,
        /// Byte offset one past the `:`
        after_colon: usize,
        /// Labeled statement
        inner: Box<Stmt>,
    },
    /// `default: inner`
    Default {
        /// Byte offset one past the `:`
        after_colon: usize,
        /// Labeled statement
        inner: Box<Stmt>,
    },
    /// `{ ... }`
    Compound(Vec<Stmt>),
    /// Expression statement
    ExprStmt(Expr),
    /// `return expr;`
    Return(Option<Expr>),
    /// Lambda or local function definition
    NestedFunction(Box<FunctionDef>),
    /// Statement with no probing relevance (declarations, `break`, ...)
    Opaque,
}

/// Class context for a method, as the front-end resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassInfo {
    /// Unqualified class name
    pub name: String,
    /// Fully qualified class name
    pub qualified_name: String,
    /// Transitive closure of qualified base class names
    pub bases: Vec<String>,
}

/// One function definition with a body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Simple name
    pub name: String,
    /// Fully qualified name, used for allowlist matching
    pub qualified_name: String,
    /// Canonical-declaration return type spelling
    pub return_type: String,
    /// Enclosing class when the function is a method
    pub class: Option<ClassInfo>,
    /// Qualified names of overridden base methods
    pub overrides: Vec<String>,
    /// Canonical-declaration parameter type spellings
    pub params: Vec<String>,
    /// Function body
    pub body: Stmt,
    /// Spelling location of the definition
    pub origin: Origin,
}

impl FunctionDef {
    /// Canonical signature: `<return-type> [<Class>::]<name>(<param-type>[, ...])`
    #[must_use]
    pub fn signature(&self) -> String {
        let mut sig = String::with_capacity(64);
        sig.push_str(&self.return_type);
        sig.push(' ');
        if let Some(class) = &self.class {
            sig.push_str(&class.name);
            sig.push_str("::");
        }
        sig.push_str(&self.name);
        sig.push('(');
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                sig.push_str(", ");
            }
            sig.push_str(param);
        }
        sig.push(')');
        sig
    }
}

/// One parsed translation unit: the immutable main-file buffer plus the
/// function definitions the front-end found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    /// Main file name
    pub file: String,
    /// Main file contents, never mutated in place
    pub source: String,
    /// Function definitions with bodies
    pub functions: Vec<FunctionDef>,
}
