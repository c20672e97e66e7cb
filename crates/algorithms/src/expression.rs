//! Arithmetic expressions shared by the field calculator and the raster
//! calculator.
//!
//! Grammar:
//! ```text
//! expr   = term (('+' | '-') term)*
//! term   = factor (('*' | '/') factor)*
//! factor = number | variable | call | '(' expr ')' | '-' factor | '+' factor
//! call   = ident '(' expr ')'
//! variable = ident | '"' any-but-quote '"'
//! ```
//!
//! Variables are resolved positionally: the parser numbers them in order of
//! first appearance and [`Expression::evaluate`] takes one value per slot.
//! `None` is the null value; it propagates through every operator, and
//! division by zero yields `None`.

use mopst_core::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Quoted(String),
    Op(char),
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    ToReal,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "to_real" => Some(Function::ToReal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Num(f64),
    Var(usize),
    Neg(Box<Node>),
    BinOp {
        op: char,
        left: Box<Node>,
        right: Box<Node>,
    },
    Call {
        func: Function,
        arg: Box<Node>,
    },
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(chars[i]));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '"')
                    .map(|p| start + p)
                    .ok_or_else(|| Error::Expression(format!("unterminated field name in '{}'", source)))?;
                tokens.push(Token::Quoted(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // optional exponent: e[+-]digits
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Error::Expression(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => {
                return Err(Error::Expression(format!(
                    "unexpected character '{}' in '{}'",
                    c, source
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    variables: Vec<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn slot(&mut self, name: String) -> usize {
        match self.variables.iter().position(|v| *v == name) {
            Some(idx) => idx,
            None => {
                self.variables.push(name);
                self.variables.len() - 1
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Node> {
        let mut left = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = Node::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Node> {
        let mut left = self.parse_factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_factor()?;
            left = Node::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Node> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Node::Num(n)),
            Some(Token::Quoted(name)) => Ok(Node::Var(self.slot(name))),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let func = Function::lookup(&name)
                        .ok_or_else(|| Error::Expression(format!("unknown function '{}'", name)))?;
                    self.advance();
                    let arg = self.parse_expr()?;
                    self.expect_rparen()?;
                    Ok(Node::Call {
                        func,
                        arg: Box::new(arg),
                    })
                } else {
                    Ok(Node::Var(self.slot(name)))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token::Op('-')) => Ok(Node::Neg(Box::new(self.parse_factor()?))),
            Some(Token::Op('+')) => self.parse_factor(),
            other => Err(Error::Expression(format!("unexpected token {:?}", other))),
        }
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.advance() {
            Some(Token::RParen) => Ok(()),
            _ => Err(Error::Expression("expected closing parenthesis".into())),
        }
    }
}

/// A parsed arithmetic expression over named variables
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
    variables: Vec<String>,
}

impl Expression {
    /// Parse an expression, failing on syntax errors or trailing input
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(Error::Expression("empty expression".into()));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            variables: Vec::new(),
        };
        let root = parser.parse_expr()?;

        if let Some(extra) = parser.peek() {
            return Err(Error::Expression(format!(
                "unexpected trailing {:?} in '{}'",
                extra, source
            )));
        }

        Ok(Self {
            source: source.to_string(),
            root,
            variables: parser.variables,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names in slot order
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Evaluate with one value per variable slot
    pub fn evaluate(&self, values: &[Option<f64>]) -> Option<f64> {
        eval(&self.root, values)
    }
}

fn eval(node: &Node, values: &[Option<f64>]) -> Option<f64> {
    match node {
        Node::Num(n) => Some(*n),
        Node::Var(slot) => values.get(*slot).copied().flatten(),
        Node::Neg(inner) => eval(inner, values).map(|v| -v),
        Node::Call { func, arg } => match func {
            Function::ToReal => eval(arg, values),
        },
        Node::BinOp { op, left, right } => {
            let l = eval(left, values)?;
            let r = eval(right, values)?;
            match op {
                '+' => Some(l + r),
                '-' => Some(l - r),
                '*' => Some(l * r),
                '/' if r == 0.0 => None,
                '/' => Some(l / r),
                _ => None,
            }
        }
    }
}
