//! # Fennel Expression Language - Abstract Syntax Tree
//!
//! This module defines the token stream and Abstract Syntax Tree (AST) for the
//! Fennel expression language, a small dynamic expression language evaluated
//! against a key/value context.
//!
//! ## Architecture Overview
//!
//! The AST module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, access, calls, filters)
//! - **[operators]** - Unary, binary, and logical operators
//!
//! ## Core Concepts
//!
//! An expression source string is a `;`-separated sequence of statements; the
//! value of the whole program is the value of its last statement:
//!
//! ```text
//! a.b.c = 1; a.b.c + 1
//! ```
//!
//! Expressions read from (and assign into) a context object, optionally
//! shadowed by a `locals` bag. Member access never throws on missing
//! intermediate containers - it produces `undefined` instead:
//!
//! ```text
//! user.address.city        // undefined when `user` is absent
//! ```
//!
//! Values can be piped through named filters, with extra arguments separated
//! by colons:
//!
//! ```text
//! items | filter:{status: "active"} | uppercase
//! ```
//!
//! The tree is built by the recursive-descent [`Parser`](crate::parser::Parser)
//! and consumed exactly once by the [`Compiler`](crate::compiler::Compiler),
//! which turns it into a reusable
//! [`CompiledExpression`](crate::compiler::CompiledExpression).

pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{Expr, Program};
pub use operators::{BinOp, LogicalOp, UnaryOp};
pub use tokens::Token;
