//! Reverse-Polish pass-enablement conditions
//!
//! Shader passes carry mpv-style `WHEN` conditions deciding whether they run
//! for a given resolution ratio, e.g. `OUTPUT.w MAIN.w / 1.2 >` ("only if the
//! target is more than 1.2x the current width"). Conditions are tokenized
//! once at parse time and evaluated against a [`ResolutionContext`] during
//! pipeline construction.
//!
//! The evaluator is a fixed-capacity stack machine with explicit bounds
//! checks. Malformed input is always a hard error: a condition that cannot be
//! evaluated must never be coerced to a default boolean, since that would
//! silently reshape the pipeline.

use crate::resolution::{Axis, ResolutionContext, Scope};

/// Maximum operand stack depth
///
/// Real conditions peak at a handful of operands; the deepest shipped
/// expression needs six. 32 leaves generous headroom while keeping the
/// evaluator allocation-free.
const STACK_CAPACITY: usize = 32;

/// One token of a parsed condition
#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    /// Numeric literal
    Literal(f64),
    /// Named scalar reference such as `OUTPUT.w`
    Reference(Scope, Axis),
    /// Binary arithmetic or comparison operator
    Binary(BinaryOp),
    /// Unary logical negation (`!`)
    Not,
}

/// Binary operators of the condition language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    /// Applies the operator to the popped operands (left, right)
    ///
    /// Comparison results are encoded as 1.0/0.0 so they compose with `*`
    /// (logical and) and `+` (logical or) the way mpv conditions do.
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Rem => lhs % rhs,
            BinaryOp::Lt => f64::from(lhs < rhs),
            BinaryOp::Gt => f64::from(lhs > rhs),
            BinaryOp::Le => f64::from(lhs <= rhs),
            BinaryOp::Ge => f64::from(lhs >= rhs),
            BinaryOp::Eq => f64::from(lhs == rhs),
            BinaryOp::Ne => f64::from(lhs != rhs),
        }
    }

    /// True for `/` and `%`, whose right operand must not be zero
    fn divides(self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Rem)
    }
}

/// Errors raised while parsing or evaluating a condition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WhenError {
    /// A token is neither a literal, a known reference, nor an operator
    #[error("malformed condition token '{0}'")]
    MalformedToken(String),
    /// A `SCOPE.axis` reference names an unknown scope or axis
    #[error("unknown dimension reference '{0}'")]
    UnknownReference(String),
    /// An operator found fewer operands than it needs
    #[error("operand stack underflow at token '{0}'")]
    StackUnderflow(String),
    /// The expression pushed more operands than the evaluator supports
    #[error("operand stack overflow (capacity {STACK_CAPACITY})")]
    StackOverflow,
    /// Division or modulo with a zero right operand
    #[error("division by zero at token '{0}'")]
    DivisionByZero(String),
    /// Evaluation did not leave exactly one value on the stack
    #[error("condition left {depth} values on the stack, expected exactly 1")]
    UnbalancedStack {
        /// Stack depth after the last token
        depth: usize,
    },
}

/// A parsed, immutable pass-enablement condition
#[derive(Debug, Clone, PartialEq)]
pub struct WhenExpression {
    tokens: Vec<Token>,
}

impl WhenExpression {
    /// Tokenizes a whitespace-separated reverse-Polish condition
    ///
    /// Each token is interpreted as, in order: a numeric literal, a
    /// `SCOPE.axis` reference, the unary `!`, or a binary operator. Anything
    /// else is a parse error.
    pub fn parse(source: &str) -> Result<Self, WhenError> {
        let tokens = source.split_whitespace().map(parse_token).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    /// Evaluates the condition against a resolution context
    ///
    /// An empty token sequence is vacuously true, like an absent condition.
    /// Otherwise evaluation must leave exactly one value on the stack, and
    /// any nonzero final value is interpreted as `true`.
    pub fn evaluate(&self, ctx: &ResolutionContext) -> Result<bool, WhenError> {
        if self.tokens.is_empty() {
            return Ok(true);
        }

        let mut stack = [0.0f64; STACK_CAPACITY];
        let mut depth = 0usize;

        for token in &self.tokens {
            match token {
                Token::Literal(value) => {
                    push(&mut stack, &mut depth, *value)?;
                }
                Token::Reference(scope, axis) => {
                    push(&mut stack, &mut depth, ctx.resolve(*scope, *axis))?;
                }
                Token::Not => {
                    if depth < 1 {
                        return Err(WhenError::StackUnderflow("!".to_string()));
                    }
                    stack[depth - 1] = f64::from(stack[depth - 1] == 0.0);
                }
                Token::Binary(op) => {
                    if depth < 2 {
                        return Err(WhenError::StackUnderflow(op_symbol(*op).to_string()));
                    }
                    let rhs = stack[depth - 1];
                    let lhs = stack[depth - 2];
                    if op.divides() && rhs == 0.0 {
                        return Err(WhenError::DivisionByZero(op_symbol(*op).to_string()));
                    }
                    stack[depth - 2] = op.apply(lhs, rhs);
                    depth -= 1;
                }
            }
        }

        if depth != 1 {
            return Err(WhenError::UnbalancedStack { depth });
        }
        Ok(stack[0] != 0.0)
    }
}

/// Evaluates an optional condition; absence means "always enabled"
pub fn evaluate_opt(expression: Option<&WhenExpression>, ctx: &ResolutionContext) -> Result<bool, WhenError> {
    match expression {
        Some(expression) => expression.evaluate(ctx),
        None => Ok(true),
    }
}

/// Pushes a value with an explicit capacity check
fn push(stack: &mut [f64; STACK_CAPACITY], depth: &mut usize, value: f64) -> Result<(), WhenError> {
    if *depth >= STACK_CAPACITY {
        return Err(WhenError::StackOverflow);
    }
    stack[*depth] = value;
    *depth += 1;
    Ok(())
}

/// Interprets a single whitespace-delimited token
fn parse_token(raw: &str) -> Result<Token, WhenError> {
    if let Ok(value) = raw.parse::<f64>() {
        return Ok(Token::Literal(value));
    }

    if let Some((scope, axis)) = raw.split_once('.') {
        let scope = match scope {
            "NATIVE" => Scope::Native,
            "OUTPUT" => Scope::Output,
            "MAIN" => Scope::Main,
            _ => return Err(WhenError::UnknownReference(raw.to_string())),
        };
        let axis = match axis {
            "w" => Axis::Width,
            "h" => Axis::Height,
            _ => return Err(WhenError::UnknownReference(raw.to_string())),
        };
        return Ok(Token::Reference(scope, axis));
    }

    match raw {
        "!" => Ok(Token::Not),
        "+" => Ok(Token::Binary(BinaryOp::Add)),
        "-" => Ok(Token::Binary(BinaryOp::Sub)),
        "*" => Ok(Token::Binary(BinaryOp::Mul)),
        "/" => Ok(Token::Binary(BinaryOp::Div)),
        "%" => Ok(Token::Binary(BinaryOp::Rem)),
        "<" => Ok(Token::Binary(BinaryOp::Lt)),
        ">" => Ok(Token::Binary(BinaryOp::Gt)),
        "<=" => Ok(Token::Binary(BinaryOp::Le)),
        ">=" => Ok(Token::Binary(BinaryOp::Ge)),
        "==" => Ok(Token::Binary(BinaryOp::Eq)),
        "!=" => Ok(Token::Binary(BinaryOp::Ne)),
        _ => Err(WhenError::MalformedToken(raw.to_string())),
    }
}

/// Returns the source symbol of a binary operator for diagnostics
fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::Resolution;

    fn ctx(native: (u32, u32), output: (u32, u32)) -> ResolutionContext {
        ResolutionContext::at_native(
            Resolution::new(native.0, native.1).unwrap(),
            Resolution::new(output.0, output.1).unwrap(),
        )
    }

    #[test]
    fn absent_condition_is_always_enabled() {
        let context = ctx((100, 100), (200, 200));
        assert!(evaluate_opt(None, &context).unwrap());
    }

    #[test]
    fn ratio_comparison() {
        let expression = WhenExpression::parse("OUTPUT.w NATIVE.w / 2.0 <").unwrap();

        // 150/100 < 2.0
        assert!(expression.evaluate(&ctx((100, 100), (150, 150))).unwrap());
        // 250/100 >= 2.0
        assert!(!expression.evaluate(&ctx((100, 100), (250, 250))).unwrap());
    }

    #[test]
    fn shipped_downscale_condition() {
        // Runs only when the target sits strictly between 1.2x and 2x native.
        let expression = WhenExpression::parse(
            "OUTPUT.w NATIVE.w / 2.0 < OUTPUT.h NATIVE.h / 2.0 < * OUTPUT.w NATIVE.w / 1.2 > OUTPUT.h NATIVE.h / 1.2 > * *",
        )
        .unwrap();

        assert!(expression.evaluate(&ctx((100, 100), (150, 150))).unwrap());
        assert!(!expression.evaluate(&ctx((100, 100), (200, 200))).unwrap());
        assert!(!expression.evaluate(&ctx((100, 100), (110, 110))).unwrap());
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let expression = WhenExpression::parse("4 0 /").unwrap();
        let result = expression.evaluate(&ctx((100, 100), (200, 200)));
        assert_eq!(result, Err(WhenError::DivisionByZero("/".to_string())));
    }

    #[test]
    fn modulo_by_zero_is_fatal() {
        let expression = WhenExpression::parse("4 0 %").unwrap();
        let result = expression.evaluate(&ctx((100, 100), (200, 200)));
        assert_eq!(result, Err(WhenError::DivisionByZero("%".to_string())));
    }

    #[test]
    fn arithmetic_and_negation() {
        let context = ctx((100, 100), (200, 200));

        assert!(WhenExpression::parse("1 2 + 3 ==").unwrap().evaluate(&context).unwrap());
        assert!(WhenExpression::parse("7 2 % 1 ==").unwrap().evaluate(&context).unwrap());
        assert!(WhenExpression::parse("0 !").unwrap().evaluate(&context).unwrap());
        assert!(!WhenExpression::parse("5 !").unwrap().evaluate(&context).unwrap());
        // Nonzero arithmetic results count as true without a comparison.
        assert!(WhenExpression::parse("2 3 *").unwrap().evaluate(&context).unwrap());
    }

    #[test]
    fn unknown_reference_is_a_parse_error() {
        assert_eq!(
            WhenExpression::parse("SOURCE.w 2 <"),
            Err(WhenError::UnknownReference("SOURCE.w".to_string()))
        );
        assert_eq!(
            WhenExpression::parse("MAIN.x 2 <"),
            Err(WhenError::UnknownReference("MAIN.x".to_string()))
        );
    }

    #[test]
    fn malformed_token_is_a_parse_error() {
        assert_eq!(WhenExpression::parse("1 2 bogus"), Err(WhenError::MalformedToken("bogus".to_string())));
    }

    #[test]
    fn stack_underflow_and_leftovers_are_fatal() {
        let context = ctx((100, 100), (200, 200));

        assert_eq!(
            WhenExpression::parse("1 +").unwrap().evaluate(&context),
            Err(WhenError::StackUnderflow("+".to_string()))
        );
        assert_eq!(
            WhenExpression::parse("!").unwrap().evaluate(&context),
            Err(WhenError::StackUnderflow("!".to_string()))
        );
        assert_eq!(
            WhenExpression::parse("1 2").unwrap().evaluate(&context),
            Err(WhenError::UnbalancedStack { depth: 2 })
        );
    }

    #[test]
    fn empty_condition_is_vacuously_true() {
        let context = ctx((100, 100), (200, 200));
        assert!(WhenExpression::parse("").unwrap().evaluate(&context).unwrap());
        assert!(WhenExpression::parse("   ").unwrap().evaluate(&context).unwrap());
    }
}
