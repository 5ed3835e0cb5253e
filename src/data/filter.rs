use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use chumsky::error::SimpleReason;
use chumsky::prelude::*;
use chumsky::Stream;

use super::model::{CellValue, Table};

// ---------------------------------------------------------------------------
// Row filter: a small dataframe-style query language
// ---------------------------------------------------------------------------
//
//   env == "Pong" and lr < 1e-3
//   seed in [1, 2, 3] or not (`batch size` >= 64)
//
// Precedence (low → high): or, and, not, comparison, + -, * /, unary -.

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QueryError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated {what} starting at offset {offset}")]
    Unterminated { what: &'static str, offset: usize },

    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

type Span = Range<usize>;

/// Float literal with bitwise equality, so tokens can be hashed.
#[derive(Debug, Clone, Copy)]
struct Number(f64);

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Token {
    /// Bare or backtick-quoted column name.
    Ident(String),
    Str(String),
    Int(i64),
    Float(Number),
    Bool(bool),
    And,
    Or,
    Not,
    In,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    Amp,
    Pipe,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Token::Ident(s) => return write!(f, "'{s}'"),
            Token::Str(s) => return write!(f, "\"{s}\""),
            Token::Int(i) => return write!(f, "{i}"),
            Token::Float(n) => return write!(f, "{:?}", n.0),
            Token::Bool(b) => return write!(f, "{}", if *b { "True" } else { "False" }),
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::In => "in",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::LtEq => "<=",
            Token::GtEq => ">=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
        };
        write!(f, "'{op}'")
    }
}

fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let exponent = one_of("eE")
        .ignore_then(one_of("+-").or_not())
        .then(text::digits(10))
        .map(|(sign, digits): (Option<char>, String)| format!("e{}{digits}", sign.unwrap_or('+')));

    // (text, has a fraction or exponent)
    let mantissa = choice::<_, Simple<char>>((
        text::digits(10)
            .then(just('.').ignore_then(text::digits(10).or_not()).or_not())
            .map(|(int_part, frac): (String, Option<Option<String>>)| match frac {
                Some(frac) => (format!("{int_part}.{}", frac.unwrap_or_else(|| "0".into())), true),
                None => (int_part, false),
            }),
        just('.')
            .ignore_then(text::digits(10))
            .map(|frac: String| (format!("0.{frac}"), true)),
    ));

    let number = mantissa
        .then(exponent.or_not())
        .try_map(|((mut text, mut is_float), exp), span| {
            if let Some(exp) = exp {
                text.push_str(&exp);
                is_float = true;
            }
            if !is_float {
                // Integers too wide for i64 fall through to a float.
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(Token::Int(i));
                }
            }
            text.parse::<f64>()
                .map(|v| Token::Float(Number(v)))
                .map_err(|_| Simple::custom(span, "invalid number literal"))
        });

    let quoted = |delimiter: char| {
        just(delimiter)
            .ignore_then(filter(move |c: &char| *c != delimiter).repeated().collect::<String>())
            .then(just(delimiter).or_not())
            .try_map(move |(text, close), span: Span| match close {
                Some(_) => Ok(text),
                None => Err(Simple::unclosed_delimiter(
                    span.start..span.start + 1,
                    delimiter,
                    span.clone(),
                    delimiter,
                    None,
                )),
            })
    };
    let string = choice::<_, Simple<char>>((quoted('"'), quoted('\''))).map(Token::Str);
    let column = quoted('`').map(Token::Ident);

    let word = filter(|c: &char| c.is_alphabetic() || *c == '_')
        .then(filter(|c: &char| c.is_alphanumeric() || *c == '_').repeated())
        .map(|(first, rest)| std::iter::once(first).chain(rest).collect::<String>())
        .map(|word| match word.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "True" | "true" => Token::Bool(true),
            "False" | "false" => Token::Bool(false),
            _ => Token::Ident(word),
        });

    let op = choice::<_, Simple<char>>(vec![
        just("==").to(Token::EqEq).boxed(),
        just("!=").to(Token::NotEq).boxed(),
        just("<=").to(Token::LtEq).boxed(),
        just(">=").to(Token::GtEq).boxed(),
        just("<").to(Token::Lt).boxed(),
        just(">").to(Token::Gt).boxed(),
        just("&").to(Token::Amp).boxed(),
        just("|").to(Token::Pipe).boxed(),
        just("+").to(Token::Plus).boxed(),
        just("-").to(Token::Minus).boxed(),
        just("*").to(Token::Star).boxed(),
        just("/").to(Token::Slash).boxed(),
        just("(").to(Token::LParen).boxed(),
        just(")").to(Token::RParen).boxed(),
        just("[").to(Token::LBracket).boxed(),
        just("]").to(Token::RBracket).boxed(),
        just(",").to(Token::Comma).boxed(),
    ]);

    choice::<_, Simple<char>>((number, string, column, word, op))
        .map_with_span(|tok, span| (tok, span))
        .padded()
        .repeated()
        .then_ignore(end())
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(CellValue),
    /// Column resolved to its index in the table being filtered.
    Column(usize),
    Neg(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    In {
        needle: Box<Expr>,
        haystack: Vec<Expr>,
        negated: bool,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// What may follow the left operand of a comparison.
enum Comparison {
    Cmp(CmpOp, Expr),
    In { negated: bool, items: Vec<Expr> },
}

/// Token-level grammar. Column names resolve against `columns` while parsing;
/// an unknown name fails with a custom error carrying the name.
fn expr_parser(columns: &[String]) -> impl Parser<Token, Expr, Error = Simple<Token>> + '_ {
    recursive(move |expr| {
        let literal = select! {
            Token::Int(i) => Expr::Literal(CellValue::Integer(i)),
            Token::Float(Number(f)) => Expr::Literal(CellValue::Float(f)),
            Token::Str(s) => Expr::Literal(CellValue::String(s)),
            Token::Bool(b) => Expr::Literal(CellValue::Bool(b)),
        };

        let column = select! { Token::Ident(name) => name }.try_map(move |name: String, span| {
            columns
                .iter()
                .position(|c| *c == name)
                .map(Expr::Column)
                .ok_or_else(|| Simple::custom(span, name))
        });

        let atom = choice::<_, Simple<Token>>((
            literal,
            column,
            expr.delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        let unary = just(Token::Minus)
            .repeated()
            .then(atom)
            .foldr(|_, e| Expr::Neg(Box::new(e)));

        let product = unary
            .clone()
            .then(
                choice::<_, Simple<Token>>((
                    just(Token::Star).to(ArithOp::Mul),
                    just(Token::Slash).to(ArithOp::Div),
                ))
                .then(unary)
                .repeated(),
            )
            .foldl(|lhs, (op, rhs)| Expr::Arith(op, Box::new(lhs), Box::new(rhs)));

        let sum = product
            .clone()
            .then(
                choice::<_, Simple<Token>>((
                    just(Token::Plus).to(ArithOp::Add),
                    just(Token::Minus).to(ArithOp::Sub),
                ))
                .then(product)
                .repeated(),
            )
            .foldl(|lhs, (op, rhs)| Expr::Arith(op, Box::new(lhs), Box::new(rhs)));

        let cmp_op = choice::<_, Simple<Token>>((
            just(Token::EqEq).to(CmpOp::Eq),
            just(Token::NotEq).to(CmpOp::Ne),
            just(Token::LtEq).to(CmpOp::Le),
            just(Token::GtEq).to(CmpOp::Ge),
            just(Token::Lt).to(CmpOp::Lt),
            just(Token::Gt).to(CmpOp::Gt),
        ));

        let items = sum.clone().separated_by(just(Token::Comma)).allow_trailing();
        let list = choice::<_, Simple<Token>>((
            items
                .clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket)),
            items.delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        let membership = just(Token::Not)
            .or_not()
            .then_ignore(just(Token::In))
            .then(list)
            .map(|(not, items)| Comparison::In {
                negated: not.is_some(),
                items,
            });

        let comparison = sum
            .clone()
            .then(
                choice::<_, Simple<Token>>((
                    cmp_op
                        .then(sum)
                        .map(|(op, rhs)| Comparison::Cmp(op, rhs)),
                    membership,
                ))
                .or_not(),
            )
            .map(|(lhs, rest)| match rest {
                None => lhs,
                Some(Comparison::Cmp(op, rhs)) => Expr::Cmp(op, Box::new(lhs), Box::new(rhs)),
                Some(Comparison::In { negated, items }) => Expr::In {
                    needle: Box::new(lhs),
                    haystack: items,
                    negated,
                },
            });

        let negation = just(Token::Not)
            .repeated()
            .then(comparison)
            .foldr(|_, e| Expr::Not(Box::new(e)));

        let conjunction = negation
            .clone()
            .then(
                just(Token::And)
                    .or(just(Token::Amp))
                    .ignore_then(negation)
                    .repeated(),
            )
            .foldl(|lhs, rhs| Expr::And(Box::new(lhs), Box::new(rhs)));

        conjunction
            .clone()
            .then(
                just(Token::Or)
                    .or(just(Token::Pipe))
                    .ignore_then(conjunction)
                    .repeated(),
            )
            .foldl(|lhs, rhs| Expr::Or(Box::new(lhs), Box::new(rhs)))
    })
}

fn lex_error(text: &str, err: &Simple<char>) -> QueryError {
    let span = err.span();
    match (err.reason(), err.found()) {
        (SimpleReason::Unclosed { span, delimiter }, _) => QueryError::Unterminated {
            what: if *delimiter == '`' { "column name" } else { "string" },
            offset: span.start,
        },
        (SimpleReason::Custom(_), _) => QueryError::Expected {
            expected: "a number".into(),
            found: format!("'{}'", text.get(span).unwrap_or_default()),
        },
        (_, Some(&ch)) => QueryError::UnexpectedChar {
            ch,
            offset: span.start,
        },
        (_, None) => incomplete(),
    }
}

fn incomplete() -> QueryError {
    QueryError::Expected {
        expected: "more input".into(),
        found: "end of query".into(),
    }
}

fn parse_error(err: &Simple<Token>) -> QueryError {
    if let SimpleReason::Custom(name) = err.reason() {
        return QueryError::UnknownColumn(name.clone());
    }
    let mut expected: Vec<String> = err
        .expected()
        .map(|tok| match tok {
            Some(tok) => tok.to_string(),
            None => "end of query".into(),
        })
        .collect();
    expected.sort();
    expected.dedup();
    QueryError::Expected {
        expected: if expected.is_empty() {
            "a value or column".into()
        } else {
            expected.join(" or ")
        },
        found: err
            .found()
            .map_or_else(|| "end of query".into(), Token::to_string),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn compare(a: &CellValue, b: &CellValue) -> Option<Ordering> {
    match (a, b) {
        (CellValue::String(x), CellValue::String(y)) => Some(x.cmp(y)),
        (CellValue::Bool(x), CellValue::Bool(y)) => Some(x.cmp(y)),
        (CellValue::Integer(x), CellValue::Integer(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn truthy(v: &CellValue) -> bool {
    match v {
        CellValue::Bool(b) => *b,
        CellValue::Integer(i) => *i != 0,
        CellValue::Float(f) => *f != 0.0,
        CellValue::String(s) => !s.is_empty(),
        CellValue::Null => false,
    }
}

fn arith(op: ArithOp, a: &CellValue, b: &CellValue) -> CellValue {
    if let (CellValue::Integer(x), CellValue::Integer(y)) = (a, b) {
        let exact = match op {
            ArithOp::Add => x.checked_add(*y),
            ArithOp::Sub => x.checked_sub(*y),
            ArithOp::Mul => x.checked_mul(*y),
            ArithOp::Div => None,
        };
        if let Some(v) = exact {
            return CellValue::Integer(v);
        }
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => CellValue::Float(match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
        }),
        _ => CellValue::Null,
    }
}

impl Expr {
    fn eval(&self, row: &[CellValue]) -> CellValue {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Column(idx) => row[*idx].clone(),
            Expr::Neg(inner) => match inner.eval(row) {
                CellValue::Integer(i) => i
                    .checked_neg()
                    .map_or(CellValue::Float(-(i as f64)), CellValue::Integer),
                CellValue::Float(f) => CellValue::Float(-f),
                _ => CellValue::Null,
            },
            Expr::Arith(op, a, b) => arith(*op, &a.eval(row), &b.eval(row)),
            Expr::Cmp(op, a, b) => {
                let ord = compare(&a.eval(row), &b.eval(row));
                CellValue::Bool(match op {
                    CmpOp::Eq => ord == Some(Ordering::Equal),
                    CmpOp::Ne => ord != Some(Ordering::Equal),
                    CmpOp::Lt => ord == Some(Ordering::Less),
                    CmpOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    CmpOp::Gt => ord == Some(Ordering::Greater),
                    CmpOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                })
            }
            Expr::In {
                needle,
                haystack,
                negated,
            } => {
                let v = needle.eval(row);
                let found = haystack
                    .iter()
                    .any(|item| compare(&v, &item.eval(row)) == Some(Ordering::Equal));
                CellValue::Bool(found != *negated)
            }
            Expr::Not(inner) => CellValue::Bool(!truthy(&inner.eval(row))),
            Expr::And(a, b) => CellValue::Bool(truthy(&a.eval(row)) && truthy(&b.eval(row))),
            Expr::Or(a, b) => CellValue::Bool(truthy(&a.eval(row)) || truthy(&b.eval(row))),
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A query compiled against a table's column layout.
#[derive(Debug, Clone)]
pub struct Query {
    expr: Expr,
}

impl Query {
    /// Parse `text`, resolving column names against `columns`.
    pub fn parse(text: &str, columns: &[String]) -> Result<Self, QueryError> {
        let tokens = lexer().parse(text).map_err(|errs| match errs.first() {
            Some(err) => lex_error(text, err),
            None => incomplete(),
        })?;

        let eoi = text.len()..text.len() + 1;
        let stream = Stream::from_iter(eoi, tokens.into_iter());
        let expr = expr_parser(columns)
            .then_ignore(end())
            .parse(stream)
            .map_err(|errs| match errs.first() {
                Some(err) => parse_error(err),
                None => incomplete(),
            })?;
        Ok(Query { expr })
    }

    /// Whether `row` satisfies the query.
    pub fn matches(&self, row: &[CellValue]) -> bool {
        truthy(&self.expr.eval(row))
    }
}

/// Keep only the rows of `table` that satisfy `query_text`.
pub fn filter_table(table: &mut Table, query_text: &str) -> Result<(), QueryError> {
    let query = Query::parse(query_text, &table.columns)?;
    table.retain_rows(|row| query.matches(row));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs() -> Table {
        let mut t = Table::new(
            ["step", "loss", "env", "seed", "lr", "batch size"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let rows = [
            (0.0, 2.0, "Pong", 1, 1e-4, 32),
            (1.0, 1.5, "Pong", 2, 1e-3, 64),
            (0.0, 2.5, "Breakout", 1, 1e-4, 32),
            (1.0, 0.9, "Breakout", 3, 1e-3, 128),
        ];
        for (step, loss, env, seed, lr, batch) in rows {
            t.push_row(vec![
                CellValue::Float(step),
                CellValue::Float(loss),
                CellValue::String(env.into()),
                CellValue::Integer(seed),
                CellValue::Float(lr),
                CellValue::Integer(batch),
            ]);
        }
        t
    }

    fn kept(query: &str) -> Vec<usize> {
        let table = runs();
        let q = Query::parse(query, &table.columns).unwrap();
        table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| q.matches(r))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn string_equality() {
        assert_eq!(kept("env == 'Pong'"), vec![0, 1]);
        assert_eq!(kept(r#"env != "Pong""#), vec![2, 3]);
    }

    #[test]
    fn numeric_comparison_mixes_ints_and_floats() {
        assert_eq!(kept("lr < 5e-4"), vec![0, 2]);
        assert_eq!(kept("seed >= 2.0"), vec![1, 3]);
    }

    #[test]
    fn boolean_connectives_and_precedence() {
        assert_eq!(kept("env == 'Pong' and seed == 1 or loss < 1"), vec![0, 3]);
        assert_eq!(kept("env == 'Pong' & (seed == 1 | loss < 1)"), vec![0]);
        assert_eq!(kept("not env == 'Pong'"), vec![2, 3]);
    }

    #[test]
    fn membership() {
        assert_eq!(kept("seed in [1, 3]"), vec![0, 2, 3]);
        assert_eq!(kept("seed not in (1,)"), vec![1, 3]);
        assert_eq!(kept("env in ['Breakout']"), vec![2, 3]);
    }

    #[test]
    fn backtick_columns_and_arithmetic() {
        assert_eq!(kept("`batch size` * 2 > 100"), vec![1, 3]);
        assert_eq!(kept("loss - step == 1"), Vec::<usize>::new());
        assert_eq!(kept("-loss > -1"), vec![3]);
    }

    #[test]
    fn unknown_column_is_reported() {
        let table = runs();
        let err = Query::parse("gamma > 0.9", &table.columns).unwrap_err();
        assert_eq!(err, QueryError::UnknownColumn("gamma".into()));
    }

    #[test]
    fn malformed_queries_are_reported() {
        let cols = runs().columns;
        assert!(Query::parse("env ==", &cols).is_err());
        assert!(Query::parse("(seed == 1", &cols).is_err());
        assert!(Query::parse("env == 'Pong", &cols).is_err());
        assert!(Query::parse("seed == 1 seed", &cols).is_err());
        assert!(Query::parse("seed ? 1", &cols).is_err());
    }

    #[test]
    fn number_literals() {
        assert_eq!(kept("lr == .0001"), vec![0, 2]);
        assert_eq!(kept("lr == 1E-3"), vec![1, 3]);
        assert_eq!(kept("loss == 2."), vec![0]);
    }

    #[test]
    fn errors_locate_the_problem() {
        let cols = runs().columns;
        assert!(matches!(
            Query::parse("env == 'Pong", &cols),
            Err(QueryError::Unterminated { what: "string", .. })
        ));
        assert!(matches!(
            Query::parse("`batch size > 1", &cols),
            Err(QueryError::Unterminated { what: "column name", .. })
        ));
        assert_eq!(
            Query::parse("seed ? 1", &cols).unwrap_err(),
            QueryError::UnexpectedChar { ch: '?', offset: 5 }
        );
        assert!(matches!(
            Query::parse("env ==", &cols),
            Err(QueryError::Expected { .. })
        ));
    }

    #[test]
    fn keywords_can_be_quoted_as_columns() {
        let columns = vec!["in".to_string(), "and".to_string()];
        let q = Query::parse("`in` > 1 and `and` == 'x'", &columns).unwrap();
        assert!(q.matches(&[CellValue::Integer(2), CellValue::String("x".into())]));
        assert!(!q.matches(&[CellValue::Integer(0), CellValue::String("x".into())]));
    }

    #[test]
    fn negating_the_smallest_integer_widens_to_float() {
        let columns = vec!["x".to_string()];
        let row = [CellValue::Integer(i64::MIN)];
        assert!(Query::parse("-x > 0", &columns).unwrap().matches(&row));
        assert!(!Query::parse("-x < 0", &columns).unwrap().matches(&row));
    }

    #[test]
    fn filter_table_retains_matching_rows() {
        let mut table = runs();
        filter_table(&mut table, "env == 'Breakout'").unwrap();
        assert_eq!(table.len(), 2);
        assert!(table
            .rows
            .iter()
            .all(|r| r[2] == CellValue::String("Breakout".into())));
    }
}
