pub mod ast;
pub mod compiler;
pub mod filter;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod sandbox;
pub mod scheduler;
pub mod scope;
pub mod value;

pub use ast::{BinOp, Expr, LogicalOp, Program, Token, UnaryOp};
pub use compiler::{CompiledExpression, Compiler, EvalError};
pub use filter::{FilterFn, FilterRegistry};
pub use lexer::{LexError, Lexer};
pub use output::{from_json, to_json, to_json_pretty};
pub use parser::{ParseError, Parser};
pub use sandbox::{DenyListSandbox, SandboxPolicy};
pub use scheduler::Scheduler;
pub use scope::{Event, Scope, ScopeError};
pub use value::{ArrayRef, FunctionRef, ObjectRef, Value};

use std::rc::Rc;

/// Compiles `source` with the built-in filters and the default sandbox.
///
/// Convenience wrapper for one-off use; embedders that register their own
/// filters or supply a [`SandboxPolicy`] should hold a [`Compiler`] instead.
pub fn parse(source: &str) -> Result<CompiledExpression, ParseError> {
    Compiler::new(Rc::new(FilterRegistry::with_builtins())).parse(source)
}
