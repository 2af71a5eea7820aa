use crate::compiler::EvalError;
use crate::value::Value;

/// Member and identifier names that compiled expressions may never touch,
/// regardless of the active policy. Reaching any of these raises
/// [`EvalError::Security`] at evaluation time.
pub const DENIED_NAMES: [&str; 6] = [
    "constructor",
    "__proto__",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

pub fn is_denied_name(name: &str) -> bool {
    DENIED_NAMES.contains(&name)
}

/// Host-supplied classification of values a compiled expression must not be
/// allowed to reach.
///
/// The engine itself never enumerates host-environment properties; it only
/// asks the embedding host whether a value flowing through a member read, a
/// call argument, or a call return "looks like" something dangerous. The
/// default answers are all `false`, so embedders with no hostile surface pay
/// nothing.
///
/// # Examples
///
/// ```
/// use fennel::sandbox::SandboxPolicy;
/// use fennel::value::Value;
///
/// struct NoFunctions;
///
/// impl SandboxPolicy for NoFunctions {
///     fn is_forbidden_callee(&self, value: &Value) -> bool {
///         // Refuse calls entirely in this embedding
///         matches!(value, Value::Function(_))
///     }
/// }
/// ```
pub trait SandboxPolicy {
    /// Does this value expose the capability set of a global/window-like
    /// object?
    fn has_window_shape(&self, _value: &Value) -> bool {
        false
    }

    /// Does this value expose the capability set of a DOM-node-like object?
    fn has_dom_shape(&self, _value: &Value) -> bool {
        false
    }

    /// Is this value its own constructor (a function-constructor-like
    /// object)?
    fn is_self_constructing(&self, _value: &Value) -> bool {
        false
    }

    /// Is this value one of the host's call/apply/bind-equivalent
    /// primitives?
    fn is_forbidden_callee(&self, _value: &Value) -> bool {
        false
    }
}

/// The default policy: enforces only the fixed name deny-list, classifies no
/// values as dangerous.
pub struct DenyListSandbox;

impl SandboxPolicy for DenyListSandbox {}

pub(crate) fn ensure_safe_name(name: &str) -> Result<(), EvalError> {
    if is_denied_name(name) {
        return Err(EvalError::Security(format!(
            "access to '{}' is not allowed in expressions",
            name
        )));
    }
    Ok(())
}

pub(crate) fn ensure_safe_value(
    policy: &dyn SandboxPolicy,
    value: &Value,
) -> Result<(), EvalError> {
    if policy.has_window_shape(value) {
        return Err(EvalError::Security(
            "referencing a window-like object in an expression is not allowed".to_string(),
        ));
    }
    if policy.has_dom_shape(value) {
        return Err(EvalError::Security(
            "referencing a DOM-node-like object in an expression is not allowed".to_string(),
        ));
    }
    if policy.is_self_constructing(value) {
        return Err(EvalError::Security(
            "referencing a constructor-like function in an expression is not allowed".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_safe_callee(
    policy: &dyn SandboxPolicy,
    value: &Value,
) -> Result<(), EvalError> {
    if policy.is_forbidden_callee(value) {
        return Err(EvalError::Security(
            "calling a call/apply/bind-like primitive is not allowed".to_string(),
        ));
    }
    Ok(())
}
