use crate::ast::{BinOp, LogicalOp, UnaryOp};

/// Abstract Syntax Tree node representing a parsed expression.
///
/// The tree is acyclic, owned exclusively by the parse that built it, and
/// discarded after compilation - only the resulting
/// [`CompiledExpression`](crate::compiler::CompiledExpression) is retained
/// by callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    /// Literal integer
    Integer(i64),

    /// Literal floating point number
    Float(f64),

    /// String literal
    Str(String),

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    /// `this` - the evaluation context object itself
    This,

    // References
    /// Bare identifier lookup
    ///
    /// Resolved against the `locals` bag first, falling back to the main
    /// context only when `locals` does not own the key.
    Identifier(String),

    /// Static member name used as the `key` of a non-computed [`Expr::Access`]
    /// and never anywhere else. Transformed from `Token::Identifier` during
    /// parsing.
    Key(String),

    // Literals (composite)
    /// Array literal
    ///
    /// # Examples
    /// ```text
    /// [1, 2, 3]
    /// [1, "two", [3],]      // trailing comma allowed
    /// ```
    Array(Vec<Expr>),

    /// Object literal with identifier-or-literal keys (in source order)
    ///
    /// # Examples
    /// ```text
    /// {a: 1, "b c": 2, 3: "three"}
    /// ```
    Object(Vec<(String, Expr)>),

    // Access and calls
    /// Member access, either static (`a.b`) or computed (`a[expr]`)
    ///
    /// Each level short-circuits to `undefined` when its base is falsy.
    Access {
        object: Box<Expr>,
        key: Box<Expr>,
        computed: bool,
    },

    /// Function call on whatever the callee expression resolves to
    ///
    /// When the callee is a member read, the receiver becomes the call's
    /// `this` binding.
    Call { callee: Box<Expr>, args: Vec<Expr> },

    /// Filter pipe stage: `input | name:arg1:arg2`
    ///
    /// The filter is resolved by name against the registry at compile time;
    /// the piped value is passed first, then the extra arguments.
    Filter {
        name: String,
        input: Box<Expr>,
        args: Vec<Expr>,
    },

    // Operations
    /// Assignment (`=`), right-associative
    ///
    /// The target must be an identifier or member path; missing intermediate
    /// containers are materialized as empty objects before the final write.
    Assign { target: Box<Expr>, value: Box<Expr> },

    /// Prefix unary operation
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Binary operation (arithmetic, equality, relational)
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Short-circuiting logical operation (`&&` / `||`)
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Ternary conditional (`test ? consequent : alternate`)
    ///
    /// Only the selected branch is evaluated at runtime.
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}

/// A complete parsed expression program: a `;`-separated statement list.
///
/// The program's value is the value of its last statement; an empty program
/// evaluates to `undefined`.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Expr>,
}
