//! Boolean expression evaluator for expression-backed component
//! definitions.
//!
//! Expressions are small strings evaluated against a vector of boolean
//! operands: single decimal digits index into the operand vector, `+` is
//! OR, `*` is AND, `^` is XOR, `!` is unary NOT and parentheses override
//! precedence. A full adder's sum output, for example, is `0^1^2`.

use thiserror::Error;

/// Failure while evaluating an expression.
///
/// These are reported to the engine as evaluation errors, never panics;
/// the owning component keeps its previous output when one occurs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("operand index {index} out of range (have {len} operands)")]
    OperandOutOfRange { index: usize, len: usize },

    #[error("unexpected character {0:?} in expression")]
    UnexpectedChar(char),

    #[error("malformed expression: {0}")]
    Malformed(&'static str),
}

// `*` and `^` share a tier and associate left; only `+` binds looser.
fn precedence(op: char) -> u8 {
    match op {
        '!' => 4,
        '*' | '^' => 2,
        '+' => 1,
        _ => 0,
    }
}

fn apply_binary(a: bool, b: bool, op: char) -> Result<bool, ExprError> {
    match op {
        '+' => Ok(a || b),
        '*' => Ok(a && b),
        '^' => Ok(a ^ b),
        _ => Err(ExprError::UnexpectedChar(op)),
    }
}

/// Pops and applies the operator on top of the operator stack.
fn apply_top(operands: &mut Vec<bool>, operators: &mut Vec<char>) -> Result<(), ExprError> {
    let op = operators
        .pop()
        .ok_or(ExprError::Malformed("dangling operand"))?;
    if op == '!' {
        let a = operands
            .pop()
            .ok_or(ExprError::Malformed("missing operand for '!'"))?;
        operands.push(!a);
    } else {
        let b = operands
            .pop()
            .ok_or(ExprError::Malformed("missing right operand"))?;
        let a = operands
            .pop()
            .ok_or(ExprError::Malformed("missing left operand"))?;
        operands.push(apply_binary(a, b, op)?);
    }
    Ok(())
}

/// Evaluates `expr` against the operand vector `values`.
///
/// Uses a two-stack precedence-climbing scheme: operands accumulate on one
/// stack, operators on the other, and an incoming operator first flushes
/// every stacked operator of greater or equal precedence.
pub fn evaluate(expr: &str, values: &[bool]) -> Result<bool, ExprError> {
    let mut operands: Vec<bool> = Vec::new();
    let mut operators: Vec<char> = Vec::new();

    for c in expr.chars() {
        if c.is_whitespace() {
            continue;
        }

        if let Some(digit) = c.to_digit(10) {
            let index = digit as usize;
            if index >= values.len() {
                return Err(ExprError::OperandOutOfRange {
                    index,
                    len: values.len(),
                });
            }
            operands.push(values[index]);
        } else if c == '(' {
            operators.push(c);
        } else if c == ')' {
            while operators.last().is_some_and(|&op| op != '(') {
                apply_top(&mut operands, &mut operators)?;
            }
            if operators.pop() != Some('(') {
                return Err(ExprError::Malformed("unbalanced ')'"));
            }
        } else if c == '+' || c == '*' || c == '^' {
            while operators
                .last()
                .is_some_and(|&op| precedence(op) >= precedence(c))
            {
                apply_top(&mut operands, &mut operators)?;
            }
            operators.push(c);
        } else if c == '!' {
            operators.push(c);
        } else {
            return Err(ExprError::UnexpectedChar(c));
        }
    }

    while !operators.is_empty() {
        if operators.last() == Some(&'(') {
            return Err(ExprError::Malformed("unbalanced '('"));
        }
        apply_top(&mut operands, &mut operators)?;
    }

    match operands.as_slice() {
        [result] => Ok(*result),
        [] => Err(ExprError::Malformed("empty expression")),
        _ => Err(ExprError::Malformed("dangling operand")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_operand() {
        assert_eq!(evaluate("0", &[true]), Ok(true));
        assert_eq!(evaluate("0", &[false]), Ok(false));
    }

    #[test]
    fn basic_operators() {
        assert_eq!(evaluate("0+1", &[false, true]), Ok(true));
        assert_eq!(evaluate("0*1", &[true, false]), Ok(false));
        assert_eq!(evaluate("0^1", &[true, true]), Ok(false));
        assert_eq!(evaluate("!0", &[true]), Ok(false));
    }

    #[test]
    fn precedence_and_over_or() {
        // 1 + (0 * 0) = true, not (1 + 0) * 0
        assert_eq!(evaluate("1+0*0", &[false, true]), Ok(true));
    }

    #[test]
    fn not_binds_tightest() {
        // !0 * 1 with 0=false,1=true -> true
        assert_eq!(evaluate("!0*1", &[false, true]), Ok(true));
        // !(0 * 1) would be true as well for these operands, so check the
        // distinguishing assignment 0=true,1=false: !0*1 = false*false
        assert_eq!(evaluate("!0*1", &[true, false]), Ok(false));
    }

    #[test]
    fn and_xor_left_associative() {
        // 0^1*2 groups as (0^1)*2, not 0^(1*2).
        assert_eq!(evaluate("0^1*2", &[true, true, false]), Ok(false));
        assert_eq!(evaluate("0^1*2", &[true, false, true]), Ok(true));
        // Mirrored order: 0*1^2 groups as (0*1)^2.
        assert_eq!(evaluate("0*1^2", &[true, true, true]), Ok(false));
    }

    #[test]
    fn parentheses_override() {
        assert_eq!(evaluate("(0+1)*2", &[false, true, false]), Ok(false));
        assert_eq!(evaluate("0+1*2", &[false, true, false]), Ok(false));
        assert_eq!(evaluate("(0+1)*2", &[false, true, true]), Ok(true));
    }

    #[test]
    fn full_adder_formulas() {
        // Sum = 0^1^2, Carry = (0*1) + 2*(0^1), the catalog's expressions.
        for a in [false, true] {
            for b in [false, true] {
                for cin in [false, true] {
                    let vals = [a, b, cin];
                    let sum = evaluate("0^1^2", &vals).unwrap();
                    let carry = evaluate("(0*1) + 2*(0^1)", &vals).unwrap();
                    assert_eq!(sum, a ^ b ^ cin);
                    assert_eq!(carry, (a && b) || (cin && (a ^ b)));
                }
            }
        }
    }

    #[test]
    fn mux_formula() {
        // 2-to-1 mux: (0*!2) + (1*2)
        assert_eq!(evaluate("(0*!2) + (1*2)", &[true, false, false]), Ok(true));
        assert_eq!(evaluate("(0*!2) + (1*2)", &[true, false, true]), Ok(false));
    }

    #[test]
    fn operand_out_of_range() {
        assert_eq!(
            evaluate("3", &[true, false]),
            Err(ExprError::OperandOutOfRange { index: 3, len: 2 })
        );
    }

    #[test]
    fn unexpected_character() {
        assert_eq!(evaluate("0&1", &[true, true]), Err(ExprError::UnexpectedChar('&')));
    }

    #[test]
    fn malformed_expressions() {
        assert!(evaluate("", &[true]).is_err());
        assert!(evaluate("(0", &[true]).is_err());
        assert!(evaluate("0)", &[true]).is_err());
        assert!(evaluate("0 1", &[true, true]).is_err());
        assert!(evaluate("+", &[true]).is_err());
    }

    #[test]
    fn whitespace_ignored() {
        assert_eq!(evaluate(" 0 + 1 ", &[false, true]), Ok(true));
    }
}
