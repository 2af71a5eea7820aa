//! Expression compilation and evaluation.
//!
//! The [`Compiler`] walks a parsed [`Program`] exactly once and lowers it
//! into a [`CompiledExpression`]: a closed tree of executable nodes with
//! filter references already resolved against the registry. Compiling is the
//! expensive step; the compiled form can be cached by source string and
//! evaluated any number of times against different contexts.

use std::rc::Rc;

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use thiserror::Error;

use crate::ast::{BinOp, Expr, LogicalOp, Program, UnaryOp};
use crate::filter::{FilterFn, FilterRegistry};
use crate::lexer::Lexer;
use crate::parser::{ParseError, Parser};
use crate::sandbox::{
    DenyListSandbox, SandboxPolicy, ensure_safe_callee, ensure_safe_name, ensure_safe_value,
};
use crate::value::{ArrayRef, ObjectRef, Value, kind_name};

/// Errors raised while evaluating a compiled expression.
///
/// These are runtime errors: whether an access is denied can depend on the
/// values flowing through the expression, so even sandbox violations only
/// surface at evaluation time.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// The expression tried to reach a denied name or a value the sandbox
    /// policy classifies as dangerous.
    #[error("security error: {0}")]
    Security(String),

    /// Type mismatch or invalid operation for the given value kind.
    #[error("type error: {0}")]
    Type(String),

    /// A call was attempted on something that is not a function.
    #[error("'{0}' is not a function")]
    NotCallable(String),
}

impl EvalError {
    pub fn is_security(&self) -> bool {
        matches!(self, EvalError::Security(_))
    }
}

/// Compiles expression source into reusable evaluators.
///
/// Holds the filter registry used to resolve `|` pipe stages and the
/// [`SandboxPolicy`] every produced evaluator will enforce.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use fennel::compiler::Compiler;
/// use fennel::filter::FilterRegistry;
/// use fennel::value::{ObjectRef, Value};
///
/// let compiler = Compiler::new(Rc::new(FilterRegistry::with_builtins()));
/// let expr = compiler.parse("a + 1").unwrap();
///
/// let context = ObjectRef::new();
/// context.set("a", Value::Integer(41));
/// assert_eq!(expr.eval(&context, None).unwrap(), Value::Integer(42));
/// ```
pub struct Compiler {
    registry: Rc<FilterRegistry>,
    sandbox: Rc<dyn SandboxPolicy>,
}

impl Compiler {
    /// Creates a compiler with the default deny-list-only sandbox.
    pub fn new(registry: Rc<FilterRegistry>) -> Self {
        Self::with_sandbox(registry, Rc::new(DenyListSandbox))
    }

    pub fn with_sandbox(registry: Rc<FilterRegistry>, sandbox: Rc<dyn SandboxPolicy>) -> Self {
        Compiler { registry, sandbox }
    }

    /// Lexes, parses and compiles `source` in one step.
    pub fn parse(&self, source: &str) -> Result<CompiledExpression, ParseError> {
        let lexer = Lexer::new(source);
        let mut parser = Parser::new(lexer)?;
        let program = parser.parse()?;
        self.compile(&program, source)
    }

    /// Lowers an already-parsed program.
    pub fn compile(
        &self,
        program: &Program,
        source: &str,
    ) -> Result<CompiledExpression, ParseError> {
        let body = program
            .body
            .iter()
            .map(|expr| self.lower(expr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledExpression {
            source: source.to_string(),
            body,
            sandbox: self.sandbox.clone(),
        })
    }

    fn lower(&self, expr: &Expr) -> Result<Code, ParseError> {
        match expr {
            Expr::Integer(n) => Ok(Code::Constant(Value::Integer(*n))),
            Expr::Float(n) => Ok(Code::Constant(Value::Float(*n))),
            Expr::Str(s) => Ok(Code::Constant(Value::String(s.clone()))),
            Expr::Boolean(b) => Ok(Code::Constant(Value::Boolean(*b))),
            Expr::Null => Ok(Code::Constant(Value::Null)),
            Expr::This => Ok(Code::This),
            Expr::Identifier(name) => Ok(Code::Identifier(name.clone())),
            Expr::Key(name) => Ok(Code::Constant(Value::String(name.clone()))),
            Expr::Array(elements) => Ok(Code::Array(
                elements
                    .iter()
                    .map(|e| self.lower(e))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Expr::Object(pairs) => Ok(Code::Object(
                pairs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.lower(v)?)))
                    .collect::<Result<Vec<_>, ParseError>>()?,
            )),
            Expr::Access {
                object,
                key,
                computed,
            } => {
                let object = Box::new(self.lower(object)?);
                let key = if *computed {
                    MemberKey::Computed(Box::new(self.lower(key)?))
                } else {
                    match key.as_ref() {
                        Expr::Key(name) => MemberKey::Static(name.clone()),
                        other => MemberKey::Computed(Box::new(self.lower(other)?)),
                    }
                };
                Ok(Code::Member { object, key })
            }
            Expr::Call { callee, args } => Ok(Code::Call {
                callee: Box::new(self.lower(callee)?),
                args: args
                    .iter()
                    .map(|a| self.lower(a))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            Expr::Filter { name, input, args } => {
                // Resolved once per usage site; repeated references to the
                // same filter name each get their own slot.
                let filter = self
                    .registry
                    .lookup(name)
                    .ok_or_else(|| ParseError::UnknownFilter(name.clone()))?;
                let mut lowered = vec![self.lower(input)?];
                for arg in args {
                    lowered.push(self.lower(arg)?);
                }
                Ok(Code::FilterCall {
                    filter,
                    args: lowered,
                })
            }
            Expr::Assign { target, value } => Ok(Code::Assign {
                target: Box::new(self.lower(target)?),
                value: Box::new(self.lower(value)?),
            }),
            Expr::Unary { op, operand } => Ok(Code::Unary {
                op: *op,
                operand: Box::new(self.lower(operand)?),
            }),
            Expr::Binary { op, left, right } => Ok(Code::Binary {
                op: *op,
                left: Box::new(self.lower(left)?),
                right: Box::new(self.lower(right)?),
            }),
            Expr::Logical { op, left, right } => Ok(Code::Logical {
                op: *op,
                left: Box::new(self.lower(left)?),
                right: Box::new(self.lower(right)?),
            }),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => Ok(Code::Conditional {
                test: Box::new(self.lower(test)?),
                consequent: Box::new(self.lower(consequent)?),
                alternate: Box::new(self.lower(alternate)?),
            }),
        }
    }
}

/// Executable form of one expression node.
enum Code {
    Constant(Value),
    Array(Vec<Code>),
    Object(Vec<(String, Code)>),
    This,
    Identifier(String),
    Member {
        object: Box<Code>,
        key: MemberKey,
    },
    Call {
        callee: Box<Code>,
        args: Vec<Code>,
    },
    FilterCall {
        filter: FilterFn,
        args: Vec<Code>,
    },
    Assign {
        target: Box<Code>,
        value: Box<Code>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Code>,
    },
    Binary {
        op: BinOp,
        left: Box<Code>,
        right: Box<Code>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Code>,
        right: Box<Code>,
    },
    Conditional {
        test: Box<Code>,
        consequent: Box<Code>,
        alternate: Box<Code>,
    },
}

enum MemberKey {
    Static(String),
    Computed(Box<Code>),
}

/// A compiled, reusable evaluator.
///
/// Safe to cache by source string and evaluate against any number of
/// different contexts; the only state an evaluation touches is the
/// `context`/`locals` pair it is given (plus the designed side effect of
/// assignment expressions writing into them).
pub struct CompiledExpression {
    source: String,
    body: Vec<Code>,
    sandbox: Rc<dyn SandboxPolicy>,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression against `context`, with keys in `locals`
    /// shadowing the context.
    pub fn eval(&self, context: &ObjectRef, locals: Option<&ObjectRef>) -> Result<Value, EvalError> {
        let frame = Frame {
            context,
            locals,
            sandbox: self.sandbox.as_ref(),
        };
        let mut result = Value::Undefined;
        for code in &self.body {
            result = frame.eval(code)?;
        }
        Ok(result)
    }
}

/// One evaluation activation: the context pair plus the sandbox, shared by
/// every node of the recursive walk.
struct Frame<'a> {
    context: &'a ObjectRef,
    locals: Option<&'a ObjectRef>,
    sandbox: &'a dyn SandboxPolicy,
}

impl Frame<'_> {
    fn eval(&self, code: &Code) -> Result<Value, EvalError> {
        match code {
            Code::Constant(v) => Ok(v.clone()),
            Code::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(element)?);
                }
                Ok(Value::Array(ArrayRef::from_vec(values)))
            }
            Code::Object(pairs) => {
                let object = ObjectRef::new();
                for (key, value) in pairs {
                    object.set(key, self.eval(value)?);
                }
                Ok(Value::Object(object))
            }
            Code::This => Ok(Value::Object(self.context.clone())),
            Code::Identifier(name) => {
                ensure_safe_name(name)?;
                let value = self.bag_for(name).0;
                ensure_safe_value(self.sandbox, &value)?;
                Ok(value)
            }
            Code::Member { object, key } => {
                let base = self.eval(object)?;
                let key = self.resolve_key(key)?;
                let value = member_read(&base, &key);
                ensure_safe_value(self.sandbox, &value)?;
                Ok(value)
            }
            Code::Call { callee, args } => self.eval_call(callee, args),
            Code::FilterCall { filter, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                filter(&values)
            }
            Code::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
            Code::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                eval_unary(*op, &operand)
            }
            Code::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                eval_binary(*op, &left, &right)
            }
            Code::Logical { op, left, right } => {
                let left = self.eval(left)?;
                // The right operand must not run unless needed
                match op {
                    LogicalOp::And => {
                        if left.is_truthy() {
                            self.eval(right)
                        } else {
                            Ok(left)
                        }
                    }
                    LogicalOp::Or => {
                        if left.is_truthy() {
                            Ok(left)
                        } else {
                            self.eval(right)
                        }
                    }
                }
            }
            Code::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
        }
    }

    /// Looks a name up in `locals` first (own keys only), then the context.
    /// Returns the value and the bag that owned the lookup, for `this`
    /// binding and assignment.
    fn bag_for(&self, name: &str) -> (Value, ObjectRef) {
        if let Some(locals) = self.locals {
            if locals.has_own(name) {
                return (locals.get_own(name), locals.clone());
            }
        }
        (self.context.get(name), self.context.clone())
    }

    fn resolve_key(&self, key: &MemberKey) -> Result<Value, EvalError> {
        let value = match key {
            MemberKey::Static(name) => Value::String(name.clone()),
            MemberKey::Computed(code) => self.eval(code)?,
        };
        if let Value::String(name) = &value {
            ensure_safe_name(name)?;
        }
        Ok(value)
    }

    fn eval_call(&self, callee: &Code, args: &[Code]) -> Result<Value, EvalError> {
        let (this, function, described) = match callee {
            Code::Member { object, key } => {
                let base = self.eval(object)?;
                let key = self.resolve_key(key)?;
                let function = member_read(&base, &key);
                (base, function, key_name(&key))
            }
            Code::Identifier(name) => {
                ensure_safe_name(name)?;
                let (function, bag) = self.bag_for(name);
                (Value::Object(bag), function, name.clone())
            }
            other => {
                let function = self.eval(other)?;
                (Value::Undefined, function, "expression".to_string())
            }
        };

        ensure_safe_value(self.sandbox, &function)?;
        ensure_safe_callee(self.sandbox, &function)?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.eval(arg)?;
            ensure_safe_value(self.sandbox, &value)?;
            values.push(value);
        }

        match &function {
            Value::Function(f) => {
                let result = f.call(&this, &values)?;
                ensure_safe_value(self.sandbox, &result)?;
                Ok(result)
            }
            _ => Err(EvalError::NotCallable(described)),
        }
    }

    fn assign(&self, target: &Code, value: Value) -> Result<(), EvalError> {
        match target {
            Code::Identifier(name) => {
                ensure_safe_name(name)?;
                let (_, bag) = self.bag_for(name);
                bag.set(name, value);
                Ok(())
            }
            Code::Member { object, key } => {
                let base = self.eval_creating(object)?;
                let key = self.resolve_key(key)?;
                member_write(&base, &key, value)
            }
            // The parser only admits identifiers and member paths here
            _ => Err(EvalError::Type(
                "invalid assignment target".to_string(),
            )),
        }
    }

    /// Evaluates an assignment target's container path, materializing empty
    /// objects for missing or null intermediates.
    fn eval_creating(&self, code: &Code) -> Result<Value, EvalError> {
        match code {
            Code::Identifier(name) => {
                ensure_safe_name(name)?;
                let (current, bag) = self.bag_for(name);
                if matches!(current, Value::Undefined | Value::Null) {
                    let fresh = ObjectRef::new();
                    bag.set(name, Value::Object(fresh.clone()));
                    Ok(Value::Object(fresh))
                } else {
                    Ok(current)
                }
            }
            Code::Member { object, key } => {
                let base = self.eval_creating(object)?;
                let key = self.resolve_key(key)?;
                let current = member_read(&base, &key);
                if matches!(current, Value::Undefined | Value::Null) {
                    let fresh = ObjectRef::new();
                    member_write(&base, &key, Value::Object(fresh.clone()))?;
                    Ok(Value::Object(fresh))
                } else {
                    Ok(current)
                }
            }
            other => self.eval(other),
        }
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Integer(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        other => format!("{:?}", other),
    }
}

fn key_index(key: &Value) -> Option<usize> {
    match key {
        Value::Integer(n) if *n >= 0 => Some(*n as usize),
        Value::Float(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        Value::String(s) => s.parse::<usize>().ok(),
        _ => None,
    }
}

/// Reads one member level. A falsy base short-circuits to `undefined`
/// rather than raising - broken member chains are an expected state in
/// reactive expressions.
fn member_read(base: &Value, key: &Value) -> Value {
    if !base.is_truthy() {
        return Value::Undefined;
    }
    match base {
        Value::Object(obj) => obj.get(&key_name(key)),
        Value::Array(arr) => {
            if key.as_str() == Some("length") {
                return Value::Integer(arr.len() as i64);
            }
            match key_index(key) {
                Some(index) => arr.get(index),
                None => Value::Undefined,
            }
        }
        Value::String(s) => {
            if key.as_str() == Some("length") {
                Value::Integer(s.chars().count() as i64)
            } else {
                Value::Undefined
            }
        }
        _ => Value::Undefined,
    }
}

fn member_write(base: &Value, key: &Value, value: Value) -> Result<(), EvalError> {
    match base {
        Value::Object(obj) => {
            obj.set(&key_name(key), value);
            Ok(())
        }
        Value::Array(arr) => match key_index(key) {
            Some(index) => {
                arr.set(index, value);
                Ok(())
            }
            None => Err(EvalError::Type(format!(
                "cannot use '{}' as an array index",
                key_name(key)
            ))),
        },
        other => Err(EvalError::Type(format!(
            "cannot assign to property '{}' of {}",
            key_name(key),
            kind_name(other)
        ))),
    }
}

/// Substitutes `0` for a missing operand, so arithmetic over empty state
/// produces numbers instead of errors.
fn if_defined(v: &Value) -> Value {
    if v.is_undefined() {
        Value::Integer(0)
    } else {
        v.clone()
    }
}

fn eval_unary(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!operand.is_truthy())),
        UnaryOp::Plus => {
            let operand = if_defined(operand);
            match operand {
                Value::Integer(_) | Value::Float(_) => Ok(operand),
                other => Err(EvalError::Type(format!(
                    "cannot apply unary '+' to {}",
                    kind_name(&other)
                ))),
            }
        }
        UnaryOp::Minus => match if_defined(operand) {
            Value::Integer(n) => Ok(n
                .checked_neg()
                .map(Value::Integer)
                .unwrap_or(Value::Float(-(n as f64)))),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(EvalError::Type(format!(
                "cannot apply unary '-' to {}",
                kind_name(&other)
            ))),
        },
    }
}

fn value_to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Integer(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        other => format!("{:?}", other),
    }
}

fn eval_binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add | BinOp::Subtract => {
            let left = if_defined(left);
            let right = if_defined(right);
            if op == BinOp::Add
                && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)))
            {
                return Ok(Value::String(format!(
                    "{}{}",
                    value_to_display(&left),
                    value_to_display(&right)
                )));
            }
            Ok(arithmetic(op, &left, &right))
        }
        BinOp::Multiply | BinOp::Divide | BinOp::Modulo => Ok(arithmetic(op, left, right)),
        BinOp::Equal => Ok(Value::Boolean(left.loose_eq(right))),
        BinOp::NotEqual => Ok(Value::Boolean(!left.loose_eq(right))),
        BinOp::StrictEqual => Ok(Value::Boolean(left.strict_eq(right))),
        BinOp::StrictNotEqual => Ok(Value::Boolean(!left.strict_eq(right))),
        BinOp::LessThan | BinOp::GreaterThan | BinOp::LessEqual | BinOp::GreaterEqual => {
            Ok(Value::Boolean(relational(op, left, right)))
        }
    }
}

fn relational(op: BinOp, left: &Value, right: &Value) -> bool {
    use std::cmp::Ordering;

    let ordering = match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };

    match ordering {
        None => false, // NaN or incomparable kinds
        Some(Ordering::Less) => matches!(op, BinOp::LessThan | BinOp::LessEqual),
        Some(Ordering::Equal) => matches!(op, BinOp::LessEqual | BinOp::GreaterEqual),
        Some(Ordering::Greater) => matches!(op, BinOp::GreaterThan | BinOp::GreaterEqual),
    }
}

/// Numeric arithmetic. Integer pairs stay integer where the result is
/// whole; mixed pairs go through high-precision decimal arithmetic that
/// demotes whole results back to integers. Non-numeric operands produce
/// NaN, matching the permissive semantics expressions expect over
/// partially-populated state.
fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Value {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        return integer_arithmetic(op, *a, *b);
    }

    let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
        return Value::Float(f64::NAN);
    };

    if let (Some(ad), Some(bd)) = (Decimal::from_f64(a), Decimal::from_f64(b)) {
        let rd = match op {
            BinOp::Add => ad.checked_add(bd),
            BinOp::Subtract => ad.checked_sub(bd),
            BinOp::Multiply => ad.checked_mul(bd),
            BinOp::Divide => ad.checked_div(bd),
            BinOp::Modulo => ad.checked_rem(bd),
            _ => None,
        };
        if let Some(rd) = rd {
            if rd.is_integer()
                && let Some(r) = rd.to_i64()
            {
                return Value::Integer(r);
            }
            if let Some(r) = rd.to_f64() {
                return Value::Float(r);
            }
        }
    }

    Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Subtract => a - b,
        BinOp::Multiply => a * b,
        BinOp::Divide => a / b,
        BinOp::Modulo => a % b,
        _ => f64::NAN,
    })
}

fn integer_arithmetic(op: BinOp, a: i64, b: i64) -> Value {
    match op {
        BinOp::Add => a
            .checked_add(b)
            .map(Value::Integer)
            .unwrap_or(Value::Float(a as f64 + b as f64)),
        BinOp::Subtract => a
            .checked_sub(b)
            .map(Value::Integer)
            .unwrap_or(Value::Float(a as f64 - b as f64)),
        BinOp::Multiply => a
            .checked_mul(b)
            .map(Value::Integer)
            .unwrap_or(Value::Float(a as f64 * b as f64)),
        BinOp::Divide => {
            if b == 0 {
                Value::Float(a as f64 / 0.0)
            } else if a.checked_rem(b) == Some(0) {
                // checked: i64::MIN / -1 does not fit and widens instead
                match a.checked_div(b) {
                    Some(q) => Value::Integer(q),
                    None => Value::Float(a as f64 / b as f64),
                }
            } else {
                Value::Float(a as f64 / b as f64)
            }
        }
        BinOp::Modulo => {
            if b == 0 {
                Value::Float(f64::NAN)
            } else {
                a.checked_rem(b)
                    .map(Value::Integer)
                    .unwrap_or(Value::Float(a as f64 % b as f64))
            }
        }
        _ => Value::Float(f64::NAN),
    }
}
