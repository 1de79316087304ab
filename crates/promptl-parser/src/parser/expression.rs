//! Embedded expressions.
//!
//! The grammar lives in `promptl.lalrpop`. [`TokenStream`] feeds it tokens
//! starting at an absolute offset of the template and ends the stream at the
//! first closing bracket that was not opened inside the expression, so the
//! template parser can resume right after the last consumed token.

use lalrpop_util::ParseError;

use crate::error::{CompileError, ErrorCode, Result};
use crate::expression::*;
use crate::lexer::Lexer;
use crate::promptl;
use crate::token::{keyword, SpannedToken, Token};

/// Lexer adapter producing the `(start, token, end)` triples lalrpop expects.
pub(crate) struct TokenStream<'a> {
    lexer: Lexer<'a>,
    depth: usize,
    /// End offset of the last yielded token.
    end: usize,
    /// The token the stream stopped at.
    stop: Option<SpannedToken>,
}

impl<'a> TokenStream<'a> {
    pub(crate) fn new(input: &'a str, offset: usize) -> Self {
        Self {
            lexer: Lexer::new(input, offset),
            depth: 0,
            end: offset,
            stop: None,
        }
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = std::result::Result<(usize, Token, usize), CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.is_some() {
            return None;
        }

        let spanned = match self.lexer.next_token() {
            Ok(spanned) => spanned,
            Err(err) => return Some(Err(err)),
        };

        match &spanned.token {
            Token::Eof => {
                self.stop = Some(spanned);
                return None;
            }
            Token::Punct("(" | "[" | "{") => self.depth += 1,
            Token::Punct(")" | "]" | "}") => {
                if self.depth == 0 {
                    self.stop = Some(spanned);
                    return None;
                }
                self.depth -= 1;
            }
            _ => {}
        }

        let SpannedToken { token, start, end } = spanned;
        let token = match token {
            Token::Identifier(name) => match keyword(&name) {
                Some(word) => Token::Keyword(word),
                None => Token::Identifier(name),
            },
            other => other,
        };
        self.end = end;
        Some(Ok((start, token, end)))
    }
}

/// Binary and logical operators share one precedence table.
pub(crate) enum Operator {
    Binary(BinaryOperator),
    Logical(LogicalOperator),
}

impl Operator {
    pub(crate) fn apply(self, left: Expression, right: Expression) -> Expression {
        let (start, end) = (left.start, right.end);
        let (left, right) = (Box::new(left), Box::new(right));
        let kind = match self {
            Operator::Binary(operator) => ExpressionKind::Binary { operator, left, right },
            Operator::Logical(operator) => ExpressionKind::Logical { operator, left, right },
        };
        Expression::new(kind, start, end)
    }
}

fn is_assignment_target(expression: &Expression) -> bool {
    matches!(
        expression.kind,
        ExpressionKind::Identifier(_) | ExpressionKind::Member { optional: false, .. }
    )
}

pub(crate) fn assignment(
    operator: AssignmentOperator,
    target: Expression,
    value: Expression,
) -> Result<Expression> {
    if !is_assignment_target(&target) {
        return Err(CompileError::new(
            ErrorCode::InvalidAssignment,
            "Invalid left-hand side in assignment",
            target.start,
            target.end,
        ));
    }
    let (start, end) = (target.start, value.end);
    Ok(Expression::new(
        ExpressionKind::Assignment {
            operator,
            target: Box::new(target),
            value: Box::new(value),
        },
        start,
        end,
    ))
}

pub(crate) fn update(
    operator: UpdateOperator,
    prefix: bool,
    argument: Expression,
    start: usize,
    end: usize,
) -> Result<Expression> {
    if !is_assignment_target(&argument) {
        return Err(CompileError::new(
            ErrorCode::InvalidUpdate,
            format!("Invalid operand for `{}`", operator.as_str()),
            argument.start,
            argument.end,
        ));
    }
    Ok(Expression::new(
        ExpressionKind::Update {
            operator,
            prefix,
            argument: Box::new(argument),
        },
        start,
        end,
    ))
}

pub(crate) fn member(
    object: Expression,
    property: MemberProperty,
    optional: bool,
    start: usize,
    end: usize,
) -> Expression {
    Expression::new(
        ExpressionKind::Member {
            object: Box::new(object),
            property,
            optional,
        },
        start,
        end,
    )
}

pub(crate) fn call(
    callee: Expression,
    arguments: Vec<ArrayElement>,
    optional: bool,
    start: usize,
    end: usize,
) -> Expression {
    Expression::new(
        ExpressionKind::Call {
            callee: Box::new(callee),
            arguments,
            optional,
        },
        start,
        end,
    )
}

pub(crate) fn format_number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

fn unexpected(token: &Token, start: usize, end: usize) -> CompileError {
    CompileError::new(
        ErrorCode::UnexpectedToken,
        format!("Unexpected token `{}`", token.describe()),
        start,
        end,
    )
}

fn parse_error(err: ParseError<usize, Token, CompileError>, stop: Option<&SpannedToken>) -> CompileError {
    match err {
        ParseError::User { error } => error,
        ParseError::UnrecognizedToken { token: (start, token, end), .. }
        | ParseError::ExtraToken { token: (start, token, end) } => unexpected(&token, start, end),
        ParseError::InvalidToken { location } => CompileError::new(
            ErrorCode::UnexpectedToken,
            "Invalid token",
            location,
            location,
        ),
        ParseError::UnrecognizedEof { location, .. } => match stop {
            Some(SpannedToken { token, start, end }) if *token != Token::Eof => unexpected(token, *start, *end),
            _ => CompileError::new(ErrorCode::UnexpectedEof, "Unexpected end of input", location, location),
        },
    }
}

/// Parse the expression starting at `offset` and return it with the offset
/// right after its last token.
pub(crate) fn parse_embedded(input: &str, offset: usize) -> Result<(Expression, usize)> {
    let mut tokens = TokenStream::new(input, offset);
    match promptl::ExpressionParser::new().parse(&mut tokens) {
        Ok(expression) => Ok((expression, tokens.end())),
        Err(err) => Err(parse_error(err, tokens.stop.as_ref())),
    }
}

/// Parse a complete standalone expression (used by tests and tooling).
pub fn parse_expression(input: &str) -> Result<Expression> {
    let (expression, end) = parse_embedded(input, 0)?;
    let rest = &input[end..];
    match rest.char_indices().find(|(_, c)| !c.is_whitespace()) {
        None => Ok(expression),
        Some((at, c)) => Err(CompileError::new(
            ErrorCode::UnexpectedToken,
            format!("Unexpected token `{}`", c),
            end + at,
            end + at + c.len_utf8(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(input: &str) -> ExpressionKind {
        parse_expression(input).unwrap().kind
    }

    #[test]
    fn test_precedence() {
        // 'a' + 'b' in {ab: 1}  ==  ('a' + 'b') in {ab: 1}
        match kind("'a' + 'b' in {ab: 1}") {
            ExpressionKind::Binary { operator, left, .. } => {
                assert_eq!(operator, BinaryOperator::In);
                assert!(matches!(left.kind, ExpressionKind::Binary { operator: BinaryOperator::Add, .. }));
            }
            other => panic!("Expected binary `in`, got {:?}", other),
        }
    }

    #[test]
    fn test_exponent_is_right_associative() {
        match kind("2 ** 3 ** 2") {
            ExpressionKind::Binary { right, .. } => {
                assert!(matches!(right.kind, ExpressionKind::Binary { operator: BinaryOperator::Exponent, .. }));
            }
            other => panic!("Expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_chain_is_wrapped() {
        match kind("a?.b.c") {
            ExpressionKind::Chain(inner) => match inner.kind {
                ExpressionKind::Member { object, optional, .. } => {
                    assert!(!optional);
                    assert!(matches!(object.kind, ExpressionKind::Member { optional: true, .. }));
                }
                other => panic!("Expected member, got {:?}", other),
            },
            other => panic!("Expected chain, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_targets() {
        assert!(matches!(kind("a.b[0] += 1"), ExpressionKind::Assignment { operator: AssignmentOperator::Add, .. }));
        let err = parse_expression("1 = 2").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAssignment);
        let err = parse_expression("a?.b = 2").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAssignment);
    }

    #[test]
    fn test_update_expressions() {
        assert!(matches!(kind("i++"), ExpressionKind::Update { prefix: false, .. }));
        assert!(matches!(kind("--i"), ExpressionKind::Update { prefix: true, .. }));
        assert_eq!(parse_expression("3++").unwrap_err().code, ErrorCode::InvalidUpdate);
    }

    #[test]
    fn test_object_literal_forms() {
        match kind("{ a, 'b c': 1, 2: x, [k]: v, ...rest }") {
            ExpressionKind::Object(members) => {
                assert_eq!(members.len(), 5);
                assert!(matches!(&members[0], ObjectMember::Property { key: PropertyKey::Static(k), .. } if k == "a"));
                assert!(matches!(&members[2], ObjectMember::Property { key: PropertyKey::Static(k), .. } if k == "2"));
                assert!(matches!(&members[3], ObjectMember::Property { key: PropertyKey::Computed(_), .. }));
                assert!(matches!(&members[4], ObjectMember::Spread(_)));
            }
            other => panic!("Expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_sequence_and_conditional() {
        assert!(matches!(kind("a = 1, b = 2"), ExpressionKind::Sequence(ref items) if items.len() == 2));
        assert!(matches!(kind("a ? b : c ? d : e"), ExpressionKind::Conditional { .. }));
    }

    #[test]
    fn test_offsets_are_absolute() {
        let (expression, end) = parse_embedded("{{ foo + 1 }}", 2).unwrap();
        assert_eq!((expression.start, expression.end), (3, 10));
        assert_eq!(end, 10);
    }

    #[test]
    fn test_stream_stops_at_unopened_closer() {
        let (expression, end) = parse_embedded("{{ {a: [1]} }} tail", 2).unwrap();
        assert!(matches!(expression.kind, ExpressionKind::Object(_)));
        assert_eq!(end, 11);

        let (_, end) = parse_embedded("(f(x)) in list", 1).unwrap();
        assert_eq!(end, 5);
    }

    #[test]
    fn test_keywords_as_property_names() {
        assert!(matches!(kind("a.in"), ExpressionKind::Member { .. }));
        assert!(matches!(kind("{ true: 1, typeof: 2 }"), ExpressionKind::Object(ref m) if m.len() == 2));
        assert!(matches!(kind("typeof a"), ExpressionKind::Unary { operator: UnaryOperator::TypeOf, .. }));
    }

    #[test]
    fn test_unexpected_token() {
        let err = parse_expression("a b").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedToken);
        assert_eq!((err.start, err.end), (2, 3));

        // the stream ends at `}`, which is reported instead of end of input
        let err = parse_embedded("{{ a + }}", 2).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedToken);
        assert_eq!(err.start, 7);
    }

    #[test]
    fn test_unexpected_eof() {
        assert_eq!(parse_expression("a +").unwrap_err().code, ErrorCode::UnexpectedEof);
        assert_eq!(parse_expression("(a").unwrap_err().code, ErrorCode::UnexpectedEof);
    }
}
