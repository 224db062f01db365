//! Property-based tests for operator precedence and associativity.
//!
//! Tests the following properties:
//! - `*` and `/` bind tighter than `+` and `-`
//! - Operators of equal precedence associate to the left
//! - Parentheses override precedence
//! - Every program leaves bindings plus exactly one result on the stack

use popi::Value;
use proptest::prelude::*;

// =============================================================================
// Helpers
// =============================================================================

/// Non-negative operands; the grammar has no unary minus.
fn arb_operand() -> impl Strategy<Value = i64> {
    0i64..10_000
}

fn arb_divisor() -> impl Strategy<Value = i64> {
    1i64..100
}

fn eval_int(source: &str) -> i64 {
    let mut vm = popi::run(source).unwrap();
    match vm.pop() {
        Some(Value::Integer(n)) => n,
        other => panic!("expected integer result for '{}', got {:?}", source, other),
    }
}

// =============================================================================
// Precedence and associativity
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn mul_binds_tighter_than_add(
        a in arb_operand(),
        b in arb_operand(),
        c in arb_operand(),
        d in arb_operand(),
    ) {
        let source = format!("{} + {} * {} - {}", a, b, c, d);
        prop_assert_eq!(eval_int(&source), a + b * c - d);
    }

    #[test]
    fn div_binds_tighter_than_sub(a in arb_operand(), b in arb_operand(), c in arb_divisor()) {
        let source = format!("{} - {} / {}", a, b, c);
        prop_assert_eq!(eval_int(&source), a - b / c);
    }

    #[test]
    fn sub_is_left_associative(a in arb_operand(), b in arb_operand(), c in arb_operand()) {
        let source = format!("{} - {} - {}", a, b, c);
        prop_assert_eq!(eval_int(&source), (a - b) - c);
    }

    #[test]
    fn div_is_left_associative(a in arb_operand(), b in arb_divisor(), c in arb_divisor()) {
        let source = format!("{} / {} / {}", a, b, c);
        prop_assert_eq!(eval_int(&source), (a / b) / c);
    }

    #[test]
    fn parens_override_precedence(a in arb_operand(), b in arb_operand(), c in arb_operand()) {
        let source = format!("({} + {}) * {}", a, b, c);
        prop_assert_eq!(eval_int(&source), (a + b) * c);
    }

    #[test]
    fn bindings_accumulate_below_result(values in prop::collection::vec(arb_operand(), 1..8)) {
        let names: Vec<String> = (0..values.len()).map(|i| format!("v{}", i)).collect();
        let mut source: Vec<String> = names
            .iter()
            .zip(&values)
            .map(|(name, value)| format!("{} = {}", name, value))
            .collect();
        source.push(names.join(" + "));

        let mut vm = popi::run(&source.join("\n")).unwrap();
        prop_assert_eq!(vm.pop(), Some(Value::Integer(values.iter().sum())));
        prop_assert_eq!(vm.stack().len(), values.len());
    }
}
