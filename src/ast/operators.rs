/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    // Arithmetic
    /// Addition or string concatenation (`+`)
    ///
    /// An `undefined` operand is substituted with `0` before the operator
    /// is applied, so expressions over empty state still produce numbers.
    Add,
    /// Subtraction (`-`), with the same `undefined`-to-`0` substitution
    Subtract,
    /// Multiplication (`*`)
    Multiply,
    /// Division (`/`)
    Divide,
    /// Modulo (`%`)
    Modulo,

    // Equality
    /// Loose equality (`==`) - numeric across integer/float, structural for
    /// arrays and objects
    Equal,
    /// Loose inequality (`!=`)
    NotEqual,
    /// Strict equality (`===`) - same kind, reference identity for arrays,
    /// objects and functions
    StrictEqual,
    /// Strict inequality (`!==`)
    StrictNotEqual,

    // Relational
    /// Less than (`<`)
    LessThan,
    /// Greater than (`>`)
    GreaterThan,
    /// Less than or equal (`<=`)
    LessEqual,
    /// Greater than or equal (`>=`)
    GreaterEqual,
}

/// Short-circuiting logical operators.
///
/// These are kept apart from [`BinOp`] because their right operand must not
/// be evaluated unless the left operand's truthiness requires it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicalOp {
    /// Logical AND (`&&`)
    And,
    /// Logical OR (`||`)
    Or,
}

/// Prefix unary operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// Numeric identity (`+`), `undefined` becomes `0`
    Plus,
    /// Numeric negation (`-`), `undefined` becomes `0`
    Minus,
    /// Logical negation (`!`)
    Not,
}
