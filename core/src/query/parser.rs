use std::collections::HashMap;

use nom::branch::alt;
use nom::bytes::complete::{escaped, is_not, tag, tag_no_case, take_while, take_while1};
use nom::character::complete::{alpha1, char, digit1, multispace0, one_of};
use nom::combinator::{all_consuming, map, opt, recognize, value};
use nom::error::{convert_error, ErrorKind, VerboseError, VerboseErrorKind};
use nom::multi::{separated_list0, separated_list1};
use nom::sequence::{pair, preceded, separated_pair, tuple};

use common::Value;

use super::ast::*;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0}")]
    Message(String),
}

type IResult<'a, O> = nom::IResult<&'a str, O, VerboseError<&'a str>>;

fn fail<O>(input: &str, kind: ErrorKind) -> IResult<'_, O> {
    Err(nom::Err::Error(VerboseError {
        errors: vec![(input, VerboseErrorKind::Nom(kind))],
    }))
}

/// Skips whitespace and `//` line comments.
fn trivia(input: &str) -> IResult<'_, ()> {
    let mut rest = input;
    loop {
        let (after_space, _) = multispace0(rest)?;
        if after_space.starts_with("//") {
            let (after_comment, _) = opt(is_not("\r\n"))(after_space)?;
            rest = after_comment;
        } else {
            return Ok((after_space, ()));
        }
    }
}

fn ws<'a, F, O>(mut inner: F) -> impl FnMut(&'a str) -> IResult<'a, O>
where
    F: FnMut(&'a str) -> IResult<'a, O>,
{
    move |input| {
        let (input, _) = trivia(input)?;
        let (input, out) = inner(input)?;
        let (input, _) = trivia(input)?;
        Ok((input, out))
    }
}

/// Case-insensitive keyword with a word boundary on the right.
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<'a, &'a str> {
    move |input| {
        let (rest, matched) = tag_no_case(kw)(input)?;
        match rest.chars().next() {
            Some(c) if c.is_alphanumeric() || c == '_' => fail(input, ErrorKind::Tag),
            _ => Ok((rest, matched)),
        }
    }
}

fn identifier(input: &str) -> IResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn uint(input: &str) -> IResult<'_, u32> {
    let (rest, raw) = digit1(input)?;
    match raw.parse::<u32>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => fail(input, ErrorKind::Digit),
    }
}

fn number_literal(input: &str) -> IResult<'_, Value> {
    let fractional = tuple((char('.'), digit1));
    let exponent = tuple((one_of("eE"), opt(one_of("+-")), digit1));
    let (rest, raw) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(fractional),
        opt(exponent),
    )))(input)?;
    if raw.contains(['.', 'e', 'E']) {
        match raw.parse::<f64>() {
            Ok(v) => Ok((rest, Value::Float(v))),
            Err(_) => fail(input, ErrorKind::Float),
        }
    } else {
        match raw.parse::<i64>() {
            Ok(v) => Ok((rest, Value::Integer(v))),
            Err(_) => fail(input, ErrorKind::Digit),
        }
    }
}

fn bool_literal(input: &str) -> IResult<'_, Value> {
    alt((
        value(Value::Boolean(true), keyword("true")),
        value(Value::Boolean(false), keyword("false")),
    ))(input)
}

fn null_literal(input: &str) -> IResult<'_, Value> {
    value(Value::Null, keyword("null"))(input)
}

fn quoted_string(delimiter: char) -> impl FnMut(&str) -> IResult<'_, String> {
    move |input| {
        let (input, _) = char(delimiter)(input)?;
        let (input, content) = opt(escaped(
            take_while1(|c| c != delimiter && c != '\\'),
            '\\',
            one_of("\\\"'nrt"),
        ))(input)?;
        let (input, _) = char(delimiter)(input)?;
        Ok((input, interpret_escapes(content.unwrap_or(""))))
    }
}

fn string_literal(input: &str) -> IResult<'_, Value> {
    map(
        alt((quoted_string('"'), quoted_string('\''))),
        Value::String,
    )(input)
}

fn interpret_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn list_literal(input: &str) -> IResult<'_, Value> {
    let (input, _) = ws(char('['))(input)?;
    let (input, items) = separated_list0(ws(char(',')), ws(value_literal))(input)?;
    let (input, _) = ws(char(']'))(input)?;
    Ok((input, Value::List(items)))
}

fn value_literal(input: &str) -> IResult<'_, Value> {
    alt((
        string_literal,
        bool_literal,
        null_literal,
        number_literal,
        list_literal,
    ))(input)
}

fn properties_block(input: &str) -> IResult<'_, HashMap<String, Value>> {
    let entry = separated_pair(ws(identifier), ws(char(':')), ws(value_literal));
    let (input, _) = ws(char('{'))(input)?;
    let (input, pairs) = separated_list0(ws(char(',')), entry)(input)?;
    let (input, _) = ws(char('}'))(input)?;
    Ok((
        input,
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    ))
}

fn label_alternatives(input: &str) -> IResult<'_, LabelExpr> {
    map(
        separated_list1(ws(char('|')), ws(identifier)),
        |atoms| LabelExpr {
            alternatives: atoms.into_iter().map(|a| vec![a.to_string()]).collect(),
        },
    )(input)
}

fn alias_and_labels(input: &str) -> IResult<'_, (Option<String>, Option<LabelExpr>)> {
    let (input, alias) = opt(ws(identifier))(input)?;
    let (input, labels) = opt(preceded(ws(char(':')), label_alternatives))(input)?;
    Ok((input, (alias.map(str::to_string), labels)))
}

fn node_pattern(input: &str) -> IResult<'_, NodePattern> {
    let (input, _) = ws(char('('))(input)?;
    let (input, (alias, labels)) = alias_and_labels(input)?;
    let (input, properties) = opt(properties_block)(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((
        input,
        NodePattern {
            alias,
            labels,
            properties: properties.unwrap_or_default(),
        },
    ))
}

fn hop_range(input: &str) -> IResult<'_, HopRange> {
    let (input, _) = ws(char('*'))(input)?;
    let (input, min) = opt(ws(uint))(input)?;
    let (input, dots) = opt(ws(tag("..")))(input)?;
    let (input, max) = if dots.is_some() {
        opt(ws(uint))(input)?
    } else {
        (input, None)
    };
    let range = match (min, dots.is_some(), max) {
        (Some(n), false, _) => HopRange {
            min: n,
            max: Some(n),
        },
        (min, _, max) => HopRange {
            min: min.unwrap_or(1),
            max,
        },
    };
    Ok((input, range))
}

struct EdgeBody {
    alias: Option<String>,
    labels: Option<LabelExpr>,
    hops: Option<HopRange>,
    properties: HashMap<String, Value>,
}

fn edge_body(input: &str) -> IResult<'_, EdgeBody> {
    let (input, _) = ws(char('['))(input)?;
    let (input, (alias, labels)) = alias_and_labels(input)?;
    let (input, hops) = opt(hop_range)(input)?;
    let (input, properties) = opt(properties_block)(input)?;
    let (input, _) = ws(char(']'))(input)?;
    Ok((
        input,
        EdgeBody {
            alias,
            labels,
            hops,
            properties: properties.unwrap_or_default(),
        },
    ))
}

/// One edge connector, bracketed or bare: `-[r:L*1..2 {k: v}]->`, `<-[]-`,
/// `-[]-`, `-->`, `<--`, `--`, `<-->`.
fn edge_pattern(input: &str) -> IResult<'_, EdgePattern> {
    let (input, _) = trivia(input)?;
    let (input, left) = opt(char('<'))(input)?;
    let (input, _) = char('-')(input)?;
    let (input, body) = opt(edge_body)(input)?;
    let (input, _) = ws(char('-'))(input)?;
    let (input, right) = opt(char('>'))(input)?;

    let direction = match (left.is_some(), right.is_some()) {
        (true, false) => Direction::Reverse,
        (false, true) => Direction::Forward,
        _ => Direction::Either,
    };
    let body = body.unwrap_or(EdgeBody {
        alias: None,
        labels: None,
        hops: None,
        properties: HashMap::new(),
    });
    Ok((
        input,
        EdgePattern {
            alias: body.alias,
            labels: body.labels,
            properties: body.properties,
            direction,
            hops: body.hops,
        },
    ))
}

fn match_clause(input: &str) -> IResult<'_, MatchClause> {
    let (input, _) = ws(keyword("MATCH"))(input)?;
    let (mut input, first) = node_pattern(input)?;
    let mut nodes = vec![first];
    let mut edges = Vec::new();
    loop {
        let Ok((rest, edge)) = edge_pattern(input) else {
            break;
        };
        let (rest, node) = node_pattern(rest)?;
        edges.push(edge);
        nodes.push(node);
        input = rest;
    }
    Ok((input, MatchClause { nodes, edges }))
}

fn aggregate_function(input: &str) -> IResult<'_, AggregateFunction> {
    alt((
        value(AggregateFunction::Count, keyword("COUNT")),
        value(AggregateFunction::Sum, keyword("SUM")),
        value(AggregateFunction::Min, keyword("MIN")),
        value(AggregateFunction::Max, keyword("MAX")),
        value(AggregateFunction::Avg, keyword("AVG")),
    ))(input)
}

fn aggregate_expr(input: &str) -> IResult<'_, Expression> {
    let (input, function) = ws(aggregate_function)(input)?;
    let (input, _) = char('(')(input)?;
    let (input, star) = opt(ws(char('*')))(input)?;
    let (input, target) = if star.is_some() {
        (input, None)
    } else {
        let (input, expr) = expression(input)?;
        (input, Some(Box::new(expr)))
    };
    let (input, _) = ws(char(')'))(input)?;
    if target.is_none() && function != AggregateFunction::Count {
        return fail(input, ErrorKind::Verify);
    }
    Ok((input, Expression::Aggregate(AggregateExpression { function, target })))
}

fn function_expr(input: &str) -> IResult<'_, Expression> {
    let (input, _) = ws(keyword("ID"))(input)?;
    let (input, _) = char('(')(input)?;
    let (input, argument) = expression(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((
        input,
        Expression::Function {
            function: ScalarFunction::Id,
            argument: Box::new(argument),
        },
    ))
}

fn variable_or_property(input: &str) -> IResult<'_, Expression> {
    let (input, name) = ws(identifier)(input)?;
    let (input, attribute) = opt(preceded(char('.'), identifier))(input)?;
    let expr = match attribute {
        Some(attr) => Expression::Property {
            variable: name.to_string(),
            attribute: attr.to_string(),
        },
        None => Expression::Variable(name.to_string()),
    };
    Ok((input, expr))
}

fn parenthesized(input: &str) -> IResult<'_, Expression> {
    let (input, _) = ws(char('('))(input)?;
    let (input, expr) = expression(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((input, expr))
}

fn primary(input: &str) -> IResult<'_, Expression> {
    alt((
        aggregate_expr,
        function_expr,
        map(ws(value_literal), Expression::Literal),
        variable_or_property,
        parenthesized,
    ))(input)
}

fn unary(input: &str) -> IResult<'_, Expression> {
    if let Ok((rest, _)) = ws(char('-'))(input) {
        let (rest, operand) = unary(rest)?;
        return Ok((
            rest,
            Expression::Unary {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            },
        ));
    }
    primary(input)
}

fn multiplicative(input: &str) -> IResult<'_, Expression> {
    let (mut input, mut expr) = unary(input)?;
    while let Ok((rest, op)) = ws(alt((
        value(BinaryOperator::Multiply, char('*')),
        value(BinaryOperator::Divide, char('/')),
    )))(input)
    {
        let (rest, rhs) = unary(rest)?;
        expr = Expression::Binary {
            op,
            left: Box::new(expr),
            right: Box::new(rhs),
        };
        input = rest;
    }
    Ok((input, expr))
}

fn additive(input: &str) -> IResult<'_, Expression> {
    let (mut input, mut expr) = multiplicative(input)?;
    while let Ok((rest, op)) = ws(alt((
        value(BinaryOperator::Add, char('+')),
        value(BinaryOperator::Subtract, char('-')),
    )))(input)
    {
        let (rest, rhs) = multiplicative(rest)?;
        expr = Expression::Binary {
            op,
            left: Box::new(expr),
            right: Box::new(rhs),
        };
        input = rest;
    }
    Ok((input, expr))
}

fn comparison_operator(input: &str) -> IResult<'_, BinaryOperator> {
    alt((
        value(BinaryOperator::Equals, tag("==")),
        value(BinaryOperator::NotEquals, tag("<>")),
        value(BinaryOperator::NotEquals, tag("!=")),
        value(BinaryOperator::LessThanOrEqual, tag("<=")),
        value(BinaryOperator::GreaterThanOrEqual, tag(">=")),
        value(BinaryOperator::Equals, tag("=")),
        value(BinaryOperator::LessThan, tag("<")),
        value(BinaryOperator::GreaterThan, tag(">")),
    ))(input)
}

fn comparison(input: &str) -> IResult<'_, Expression> {
    let (input, left) = additive(input)?;

    if let Ok((rest, _)) = ws(keyword("IS"))(input) {
        let (rest, negated) = opt(ws(keyword("NOT")))(rest)?;
        let (rest, _) = ws(keyword("NULL"))(rest)?;
        return Ok((
            rest,
            Expression::IsNull {
                operand: Box::new(left),
                negated: negated.is_some(),
            },
        ));
    }

    let string_op = alt((
        value(BinaryOperator::In, keyword("IN")),
        value(BinaryOperator::Contains, keyword("CONTAINS")),
        value(
            BinaryOperator::StartsWith,
            recognize(tuple((keyword("STARTS"), trivia, keyword("WITH")))),
        ),
        value(
            BinaryOperator::EndsWith,
            recognize(tuple((keyword("ENDS"), trivia, keyword("WITH")))),
        ),
    ));
    if let Ok((rest, op)) = ws(string_op)(input) {
        let (rest, right) = additive(rest)?;
        return Ok((
            rest,
            Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        ));
    }

    if let Ok((rest, op)) = ws(comparison_operator)(input) {
        let (rest, right) = additive(rest)?;
        return Ok((
            rest,
            Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        ));
    }

    Ok((input, left))
}

fn not_expr(input: &str) -> IResult<'_, Expression> {
    if let Ok((rest, _)) = ws(keyword("NOT"))(input) {
        let (rest, operand) = not_expr(rest)?;
        return Ok((
            rest,
            Expression::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            },
        ));
    }
    comparison(input)
}

fn and_expr(input: &str) -> IResult<'_, Expression> {
    let (mut input, mut expr) = not_expr(input)?;
    while let Ok((rest, _)) = ws(keyword("AND"))(input) {
        let (rest, rhs) = not_expr(rest)?;
        expr = Expression::Binary {
            op: BinaryOperator::And,
            left: Box::new(expr),
            right: Box::new(rhs),
        };
        input = rest;
    }
    Ok((input, expr))
}

fn expression(input: &str) -> IResult<'_, Expression> {
    let (mut input, mut expr) = and_expr(input)?;
    while let Ok((rest, _)) = ws(keyword("OR"))(input) {
        let (rest, rhs) = and_expr(rest)?;
        expr = Expression::Binary {
            op: BinaryOperator::Or,
            left: Box::new(expr),
            right: Box::new(rhs),
        };
        input = rest;
    }
    Ok((input, expr))
}

fn where_clause(input: &str) -> IResult<'_, Expression> {
    let (input, _) = ws(keyword("WHERE"))(input)?;
    expression(input)
}

fn return_item(input: &str) -> IResult<'_, ReturnItem> {
    let (input, expr) = expression(input)?;
    let (input, alias) = opt(preceded(ws(keyword("AS")), ws(identifier)))(input)?;
    Ok((
        input,
        ReturnItem {
            expression: expr,
            alias: alias.map(str::to_string),
        },
    ))
}

fn return_clause(input: &str) -> IResult<'_, ReturnClause> {
    let (input, _) = ws(keyword("RETURN"))(input)?;
    let (input, distinct) = opt(ws(keyword("DISTINCT")))(input)?;
    let (input, items) = separated_list1(ws(char(',')), return_item)(input)?;
    Ok((
        input,
        ReturnClause {
            distinct: distinct.is_some(),
            items,
        },
    ))
}

fn order_key(input: &str) -> IResult<'_, OrderKey> {
    let (input, expr) = expression(input)?;
    let (input, direction) = opt(ws(alt((keyword("ASC"), keyword("DESC")))))(input)?;
    Ok((
        input,
        OrderKey {
            expression: expr,
            descending: matches!(direction, Some(d) if d.eq_ignore_ascii_case("DESC")),
        },
    ))
}

fn order_by_clause(input: &str) -> IResult<'_, Vec<OrderKey>> {
    let (input, _) = ws(keyword("ORDER"))(input)?;
    let (input, _) = ws(keyword("BY"))(input)?;
    separated_list1(ws(char(',')), order_key)(input)
}

fn skip_clause(input: &str) -> IResult<'_, usize> {
    let (input, _) = ws(keyword("SKIP"))(input)?;
    let (input, n) = ws(uint)(input)?;
    Ok((input, n as usize))
}

fn limit_clause(input: &str) -> IResult<'_, usize> {
    let (input, _) = ws(keyword("LIMIT"))(input)?;
    let (input, n) = ws(uint)(input)?;
    Ok((input, n as usize))
}

fn query(input: &str) -> IResult<'_, Query> {
    let (mut input, first) = match_clause(input)?;
    let mut matches = vec![first];
    while let Ok((rest, clause)) = match_clause(input) {
        matches.push(clause);
        input = rest;
    }
    let (input, predicate) = opt(where_clause)(input)?;
    let (input, returns) = return_clause(input)?;
    let (input, order_by) = opt(order_by_clause)(input)?;
    let (input, skip) = opt(skip_clause)(input)?;
    let (input, limit) = opt(limit_clause)(input)?;
    let (input, _) = trivia(input)?;
    Ok((
        input,
        Query {
            matches,
            predicate,
            returns,
            order_by: order_by.unwrap_or_default(),
            skip,
            limit,
        },
    ))
}

/// Parses one query, consuming the entire input.
pub fn parse_query(input: &str) -> Result<Query, ParseError> {
    match all_consuming(query)(input) {
        Ok((_, query)) => Ok(query),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            Err(ParseError::Message(convert_error(input, err)))
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError::Message("unexpected end of input".into())),
    }
}
