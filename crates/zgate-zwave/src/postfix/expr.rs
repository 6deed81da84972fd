//! Value mapping expressions used by `configVDev` fixes.
//!
//! A side-effect-free expression language:
//!
//! ```text
//! return value == 1 ? 99 : 0;
//! command == "on" ? 1 : (command == "off" ? 0 : Math.round(level / 10))
//! ```
//!
//! Literals are numbers, double or single quoted strings, `true`, `false`
//! and `null`. Variables are `value` (the parameter value, for
//! parameter-to-vDev mappings), `level` / `args.level` and `command` (for
//! vDev-to-parameter mappings). Operators are `+ - * / %`, comparisons,
//! `&& || !` and the ternary `?:`. Functions: `Math.round`, `Math.floor`,
//! `Math.ceil`, `Math.min`, `Math.max`, `Math.abs`.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, ZWaveError};

/// Variables an expression may reference.
pub const VARIABLES: &[&str] = &["value", "level", "args.level", "command"];

const FUNCTIONS: &[&str] = &[
    "Math.round",
    "Math.floor",
    "Math.ceil",
    "Math.min",
    "Math.max",
    "Math.abs",
];

/// Runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Num(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Bool(b) => *b,
        }
    }

    /// Numeric view; numeric strings and booleans convert.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Num(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "{}", s),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Num(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Num(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// Variable bindings for one evaluation.
#[derive(Debug, Clone, Default)]
pub struct Vars(BTreeMap<String, Value>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    fn get(&self, name: &str) -> Value {
        self.0.get(name).cloned().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Lit(Value),
    Var(String),
    Not(Box<Node>),
    Neg(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    Cond(Box<Node>, Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    const OPS: &[&str] = &[
        "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!",
        "?", ":", "(", ")", ",",
    ];

    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse()
                .map_err(|_| ZWaveError::Expression(format!("bad number '{}'", text)))?;
            tokens.push(Token::Num(n));
        } else if c == '"' || c == '\'' {
            let start = i + 1;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i >= chars.len() {
                return Err(ZWaveError::Expression("unterminated string".to_string()));
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let op = OPS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| ZWaveError::Expression(format!("unexpected character '{}'", c)))?;
            tokens.push(Token::Op(op));
            i += op.len();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_op(&self, op: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Op(o)) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(ZWaveError::Expression(format!("expected '{}'", op)))
        }
    }

    fn expr(&mut self) -> Result<Node> {
        let cond = self.binary(0)?;
        if self.eat_op("?") {
            let then = self.expr()?;
            self.expect_op(":")?;
            let otherwise = self.expr()?;
            return Ok(Node::Cond(Box::new(cond), Box::new(then), Box::new(otherwise)));
        }
        Ok(cond)
    }

    /// Precedence climbing over the binary operator levels.
    fn binary(&mut self, level: usize) -> Result<Node> {
        const LEVELS: &[&[(&str, BinOp)]] = &[
            &[("||", BinOp::Or)],
            &[("&&", BinOp::And)],
            &[
                ("===", BinOp::Eq),
                ("!==", BinOp::Ne),
                ("==", BinOp::Eq),
                ("!=", BinOp::Ne),
            ],
            &[
                ("<=", BinOp::Le),
                (">=", BinOp::Ge),
                ("<", BinOp::Lt),
                (">", BinOp::Gt),
            ],
            &[("+", BinOp::Add), ("-", BinOp::Sub)],
            &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Rem)],
        ];

        if level == LEVELS.len() {
            return self.unary();
        }
        let mut left = self.binary(level + 1)?;
        'outer: loop {
            for (text, op) in LEVELS[level] {
                if self.eat_op(text) {
                    let right = self.binary(level + 1)?;
                    left = Node::Bin(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn unary(&mut self) -> Result<Node> {
        if self.eat_op("!") {
            return Ok(Node::Not(Box::new(self.unary()?)));
        }
        if self.eat_op("-") {
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ZWaveError::Expression("unexpected end of expression".to_string()))?;
        self.pos += 1;
        match token {
            Token::Num(n) => Ok(Node::Lit(Value::Num(n))),
            Token::Str(s) => Ok(Node::Lit(Value::Str(s))),
            Token::Op("(") => {
                let inner = self.expr()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Node::Lit(Value::Bool(true))),
                "false" => Ok(Node::Lit(Value::Bool(false))),
                "null" | "undefined" => Ok(Node::Lit(Value::Null)),
                _ if self.peek_op("(") => {
                    if !FUNCTIONS.contains(&name.as_str()) {
                        return Err(ZWaveError::Expression(format!("unknown function '{}'", name)));
                    }
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !self.eat_op(")") {
                        loop {
                            args.push(self.expr()?);
                            if self.eat_op(")") {
                                break;
                            }
                            self.expect_op(",")?;
                        }
                    }
                    Ok(Node::Call(name, args))
                }
                _ if VARIABLES.contains(&name.as_str()) => Ok(Node::Var(name)),
                _ => Err(ZWaveError::Expression(format!("unknown variable '{}'", name))),
            },
            Token::Op(op) => Err(ZWaveError::Expression(format!("unexpected '{}'", op))),
        }
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    root: Node,
}

impl Expr {
    /// Parse an expression. An optional leading `return` and trailing `;`
    /// are accepted.
    pub fn parse(input: &str) -> Result<Self> {
        let mut text = input.trim();
        if let Some(rest) = text.strip_prefix("return ") {
            text = rest.trim_start();
        }
        let text = text.trim_end().trim_end_matches(';').trim_end();
        if text.is_empty() {
            return Err(ZWaveError::Expression("empty expression".to_string()));
        }

        let mut parser = Parser {
            tokens: tokenize(text)?,
            pos: 0,
        };
        let root = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(ZWaveError::Expression(format!(
                "trailing input in '{}'",
                text
            )));
        }
        Ok(Self {
            source: input.trim().to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, vars: &Vars) -> Result<Value> {
        eval(&self.root, vars)
    }
}

fn num(value: &Value, what: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| ZWaveError::Expression(format!("{} is not a number: {}", what, value)))
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn eval(node: &Node, vars: &Vars) -> Result<Value> {
    Ok(match node {
        Node::Lit(v) => v.clone(),
        Node::Var(name) => match name.as_str() {
            "args.level" => vars.get("level"),
            other => vars.get(other),
        },
        Node::Not(inner) => Value::Bool(!eval(inner, vars)?.truthy()),
        Node::Neg(inner) => Value::Num(-num(&eval(inner, vars)?, "operand")?),
        Node::Cond(cond, then, otherwise) => {
            if eval(cond, vars)?.truthy() {
                eval(then, vars)?
            } else {
                eval(otherwise, vars)?
            }
        }
        Node::Bin(BinOp::And, l, r) => {
            let left = eval(l, vars)?;
            if left.truthy() {
                eval(r, vars)?
            } else {
                left
            }
        }
        Node::Bin(BinOp::Or, l, r) => {
            let left = eval(l, vars)?;
            if left.truthy() {
                left
            } else {
                eval(r, vars)?
            }
        }
        Node::Bin(op, l, r) => {
            let left = eval(l, vars)?;
            let right = eval(r, vars)?;
            match op {
                BinOp::Add => match (&left, &right) {
                    (Value::Str(a), b) => Value::Str(format!("{}{}", a, b)),
                    (a, Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
                    _ => Value::Num(num(&left, "left operand")? + num(&right, "right operand")?),
                },
                BinOp::Sub => Value::Num(num(&left, "left operand")? - num(&right, "right operand")?),
                BinOp::Mul => Value::Num(num(&left, "left operand")? * num(&right, "right operand")?),
                BinOp::Div => {
                    let divisor = num(&right, "divisor")?;
                    if divisor == 0.0 {
                        return Err(ZWaveError::Expression("division by zero".to_string()));
                    }
                    Value::Num(num(&left, "dividend")? / divisor)
                }
                BinOp::Rem => {
                    let divisor = num(&right, "divisor")?;
                    if divisor == 0.0 {
                        return Err(ZWaveError::Expression("division by zero".to_string()));
                    }
                    Value::Num(num(&left, "dividend")? % divisor)
                }
                BinOp::Eq => Value::Bool(loose_eq(&left, &right)),
                BinOp::Ne => Value::Bool(!loose_eq(&left, &right)),
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                    let ordering = match (&left, &right) {
                        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                        _ => num(&left, "left operand")?.partial_cmp(&num(&right, "right operand")?),
                    };
                    let Some(ordering) = ordering else {
                        return Ok(Value::Bool(false));
                    };
                    Value::Bool(match op {
                        BinOp::Lt => ordering.is_lt(),
                        BinOp::Le => ordering.is_le(),
                        BinOp::Gt => ordering.is_gt(),
                        _ => ordering.is_ge(),
                    })
                }
                BinOp::And => Value::Bool(left.truthy() && right.truthy()),
                BinOp::Or => Value::Bool(left.truthy() || right.truthy()),
            }
        }
        Node::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, vars).and_then(|v| num(&v, name)))
                .collect::<Result<Vec<f64>>>()?;
            let first = || {
                values
                    .first()
                    .copied()
                    .ok_or_else(|| ZWaveError::Expression(format!("{} needs an argument", name)))
            };
            Value::Num(match name.as_str() {
                // halves round up
                "Math.round" => (first()? + 0.5).floor(),
                "Math.floor" => first()?.floor(),
                "Math.ceil" => first()?.ceil(),
                "Math.abs" => first()?.abs(),
                "Math.min" => values.iter().copied().fold(f64::INFINITY, f64::min),
                "Math.max" => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                other => return Err(ZWaveError::Expression(format!("unknown function '{}'", other))),
            })
        }
    })
}
