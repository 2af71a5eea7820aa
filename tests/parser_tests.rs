// tests/parser_tests.rs

use fennel::ast::{BinOp, Expr, LogicalOp, Program, UnaryOp};
use fennel::lexer::Lexer;
use fennel::parser::{ParseError, Parser};

fn parse(source: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(Lexer::new(source))?;
    parser.parse()
}

fn parse_one(source: &str) -> Expr {
    let mut program = parse(source).unwrap();
    assert_eq!(program.body.len(), 1, "expected a single statement");
    program.body.remove(0)
}

// ============================================================================
// Precedence and associativity
// ============================================================================

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    // 1 + 2 * 3 => Add(1, Multiply(2, 3))
    match parse_one("1 + 2 * 3") {
        Expr::Binary {
            op: BinOp::Add,
            left,
            right,
        } => {
            assert!(matches!(*left, Expr::Integer(1)));
            assert!(matches!(
                *right,
                Expr::Binary {
                    op: BinOp::Multiply,
                    ..
                }
            ));
        }
        other => panic!("expected addition at the top, got {:?}", other),
    }
}

#[test]
fn test_parentheses_override_precedence() {
    match parse_one("(1 + 2) * 3") {
        Expr::Binary {
            op: BinOp::Multiply,
            left,
            right,
        } => {
            assert!(matches!(*left, Expr::Binary { op: BinOp::Add, .. }));
            assert!(matches!(*right, Expr::Integer(3)));
        }
        other => panic!("expected multiplication at the top, got {:?}", other),
    }
}

#[test]
fn test_relational_binds_tighter_than_equality() {
    // a == b < c => Equal(a, LessThan(b, c))
    match parse_one("a == b < c") {
        Expr::Binary {
            op: BinOp::Equal,
            right,
            ..
        } => {
            assert!(matches!(
                *right,
                Expr::Binary {
                    op: BinOp::LessThan,
                    ..
                }
            ));
        }
        other => panic!("expected equality at the top, got {:?}", other),
    }
}

#[test]
fn test_and_binds_tighter_than_or() {
    match parse_one("a || b && c") {
        Expr::Logical {
            op: LogicalOp::Or,
            right,
            ..
        } => {
            assert!(matches!(
                *right,
                Expr::Logical {
                    op: LogicalOp::And,
                    ..
                }
            ));
        }
        other => panic!("expected || at the top, got {:?}", other),
    }
}

#[test]
fn test_unary_is_right_associative() {
    match parse_one("!!a") {
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => assert!(matches!(
            *operand,
            Expr::Unary {
                op: UnaryOp::Not,
                ..
            }
        )),
        other => panic!("expected nested unary, got {:?}", other),
    }
}

#[test]
fn test_assignment_is_right_associative() {
    // a = b = 2 => Assign(a, Assign(b, 2))
    match parse_one("a = b = 2") {
        Expr::Assign { value, .. } => {
            assert!(matches!(*value, Expr::Assign { .. }));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn test_ternary_branches_allow_assignment() {
    match parse_one("a ? b = 1 : c = 2") {
        Expr::Conditional {
            consequent,
            alternate,
            ..
        } => {
            assert!(matches!(*consequent, Expr::Assign { .. }));
            assert!(matches!(*alternate, Expr::Assign { .. }));
        }
        other => panic!("expected ternary, got {:?}", other),
    }
}

// ============================================================================
// Postfix chains
// ============================================================================

#[test]
fn test_member_access_chain() {
    // a.b[c](d)
    match parse_one("a.b[c](d)") {
        Expr::Call { callee, args } => {
            assert_eq!(args.len(), 1);
            match *callee {
                Expr::Access { computed: true, object, .. } => {
                    assert!(matches!(
                        *object,
                        Expr::Access { computed: false, .. }
                    ));
                }
                other => panic!("expected computed access, got {:?}", other),
            }
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_dot_access_uses_key_node() {
    match parse_one("a.b") {
        Expr::Access { key, computed, .. } => {
            assert!(!computed);
            assert!(matches!(*key, Expr::Key(ref name) if name == "b"));
        }
        other => panic!("expected access, got {:?}", other),
    }
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_array_literal_trailing_comma() {
    match parse_one("[1, 2, 3,]") {
        Expr::Array(elements) => assert_eq!(elements.len(), 3),
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn test_object_literal_key_kinds() {
    match parse_one("{a: 1, 'b c': 2, 42: 3}") {
        Expr::Object(pairs) => {
            let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(keys, vec!["a", "b c", "42"]);
        }
        other => panic!("expected object, got {:?}", other),
    }
}

#[test]
fn test_object_literal_rejects_trailing_comma() {
    assert!(parse("{a: 1,}").is_err());
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_filter_chain_with_args() {
    // a | f:1 | g wraps left to right
    match parse_one("a | f:1 | g") {
        Expr::Filter { name, input, args } => {
            assert_eq!(name, "g");
            assert!(args.is_empty());
            match *input {
                Expr::Filter { name, args, .. } => {
                    assert_eq!(name, "f");
                    assert_eq!(args.len(), 1);
                }
                other => panic!("expected inner filter, got {:?}", other),
            }
        }
        other => panic!("expected filter, got {:?}", other),
    }
}

#[test]
fn test_pipe_binds_looser_than_or() {
    // a || b | f => Filter(f, Or(a, b))
    match parse_one("a || b | f") {
        Expr::Filter { input, .. } => {
            assert!(matches!(*input, Expr::Logical { op: LogicalOp::Or, .. }));
        }
        other => panic!("expected filter at the top, got {:?}", other),
    }
}

// ============================================================================
// Statements
// ============================================================================

#[test]
fn test_statement_sequence() {
    let program = parse("a = 1; b = 2; a + b").unwrap();
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_trailing_and_repeated_semicolons() {
    assert_eq!(parse("a;;b;").unwrap().body.len(), 2);
    assert_eq!(parse("").unwrap().body.len(), 0);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_invalid_assignment_target() {
    assert_eq!(parse("1 = 2"), Err(ParseError::InvalidAssignmentTarget));
    assert_eq!(parse("a + b = 2"), Err(ParseError::InvalidAssignmentTarget));
}

#[test]
fn test_missing_closing_bracket() {
    assert!(matches!(parse("[1, 2"), Err(ParseError::Expected { .. })));
    assert!(matches!(parse("a["), Err(ParseError::UnexpectedToken(_))));
}

#[test]
fn test_missing_ternary_colon() {
    assert!(matches!(
        parse("a ? b"),
        Err(ParseError::Expected { .. })
    ));
}

#[test]
fn test_lex_error_is_wrapped() {
    assert!(matches!(parse("'oops"), Err(ParseError::Lex(_))));
}
