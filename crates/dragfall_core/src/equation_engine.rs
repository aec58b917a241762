use crate::traits::Scalar;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unexpected character '{0}' in expression")]
    UnexpectedCharacter(char),
    #[error("malformed number literal '{0}'")]
    MalformedNumber(String),
    #[error("expected ')'")]
    UnclosedParen,
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown variable or parameter: {0}")]
    UnknownSymbol(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
}

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of an independent variable (by index) onto the stack.
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes exp(a).
    Exp,
    /// Pops top value (a), pushes ln(a).
    Ln,
    /// Pops top value (a), pushes -a.
    Neg,
}

/// A compiled sequence of operations. Only the `Compiler` builds these, so
/// every instruction stream leaves exactly one value on the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    ops: Vec<OpCode>,
    max_depth: usize,
}

impl Bytecode {
    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }

    /// Stack capacity needed to execute without reallocation.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Stack-based virtual machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: instructions to run.
/// - `vars`: independent variable values (read-only).
/// - `params`: parameter values (read-only).
/// - `stack`: a mutable buffer for intermediate values.
pub struct VM;

impl VM {
    /// Executes the bytecode. Returns `None` only if the instruction stream
    /// references a variable or parameter slot that was not supplied.
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> Option<T> {
        stack.clear();
        stack.reserve(bytecode.max_depth);

        for op in &bytecode.ops {
            let value = match *op {
                OpCode::LoadConst(val) => T::from_f64(val)?,
                OpCode::LoadVar(idx) => *vars.get(idx)?,
                OpCode::LoadParam(idx) => *params.get(idx)?,
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    }
                }
                OpCode::Exp => stack.pop()?.exp(),
                OpCode::Ln => stack.pop()?.ln(),
                OpCode::Neg => -stack.pop()?,
            };
            stack.push(value);
        }

        stack.pop()
    }
}

// --- AST ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => " + ",
            BinaryOp::Sub => " - ",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Pow => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Exp,
    Ln,
}

impl Function {
    fn name(self) -> &'static str {
        match self {
            Function::Exp => "exp",
            Function::Ln => "ln",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "exp" => Some(Function::Exp),
            "ln" | "log" => Some(Function::Ln),
            _ => None,
        }
    }
}

const NEG_PRECEDENCE: u8 = 3;
const ATOM_PRECEDENCE: u8 = 5;

/// Abstract syntax tree for scalar expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Neg(Box<Expr>),
    Call(Function, Box<Expr>),
}

impl Expr {
    pub fn var(name: &str) -> Self {
        Expr::Variable(name.to_string())
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary(Box::new(left), op, Box::new(right))
    }

    pub fn call(func: Function, arg: Expr) -> Self {
        Expr::Call(func, Box::new(arg))
    }

    /// Folds `(negative, magnitude)` pairs into a left-leaning sum, so later
    /// negative terms become subtractions and a leading one is negated in place.
    pub fn signed_sum(terms: impl IntoIterator<Item = (bool, Expr)>) -> Self {
        let mut iter = terms.into_iter();
        let Some((negative, first)) = iter.next() else {
            return Expr::Number(0.0);
        };
        let first = if negative { first.negated() } else { first };
        iter.fold(first, |acc, (negative, term)| {
            let op = if negative { BinaryOp::Sub } else { BinaryOp::Add };
            Expr::binary(acc, op, term)
        })
    }

    /// Negation pushed into the leftmost factor of a product or quotient.
    pub fn negated(self) -> Self {
        match self {
            Expr::Number(n) => Expr::Number(-n),
            Expr::Neg(inner) => *inner,
            Expr::Binary(left, op @ (BinaryOp::Mul | BinaryOp::Div), right) => {
                Expr::Binary(Box::new(left.negated()), op, right)
            }
            other => Expr::Neg(Box::new(other)),
        }
    }

    /// Left-leaning product of factors; empty means 1.
    pub fn product(factors: impl IntoIterator<Item = Expr>) -> Self {
        let mut iter = factors.into_iter();
        let Some(first) = iter.next() else {
            return Expr::Number(1.0);
        };
        iter.fold(first, |acc, factor| Expr::binary(acc, BinaryOp::Mul, factor))
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(n) if *n < 0.0 => NEG_PRECEDENCE,
            Expr::Number(_) | Expr::Variable(_) | Expr::Call(..) => ATOM_PRECEDENCE,
            Expr::Binary(_, op, _) => op.precedence(),
            Expr::Neg(_) => NEG_PRECEDENCE,
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Variable(name) => f.write_str(name),
            Expr::Binary(left, op, right) => {
                let prec = op.precedence();
                // '^' is right-associative; the others print left-leaning trees bare.
                let (left_parens, right_parens) = if *op == BinaryOp::Pow {
                    (left.precedence() <= prec, right.precedence() < NEG_PRECEDENCE)
                } else {
                    (left.precedence() < prec, right.precedence() <= prec)
                };
                write_operand(f, left, left_parens)?;
                f.write_str(op.symbol())?;
                write_operand(f, right, right_parens)
            }
            Expr::Neg(inner) => {
                f.write_str("-")?;
                write_operand(f, inner, inner.precedence() <= NEG_PRECEDENCE)
            }
            Expr::Call(func, arg) => write!(f, "{}({arg})", func.name()),
        }
    }
}

/// Compiles an `Expr` into `Bytecode`, resolving variable and parameter
/// names to slot indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new<S: AsRef<str>>(var_names: &[S], param_names: &[S]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_ref().to_string(), i))
            .collect();
        let param_map = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_ref().to_string(), i))
            .collect();
        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, EngineError> {
        let mut ops = Vec::new();
        let mut depth = 0usize;
        let mut max_depth = 0usize;
        self.compile_recursive(expr, &mut ops, &mut depth, &mut max_depth)?;
        Ok(Bytecode { ops, max_depth })
    }

    fn compile_recursive(
        &self,
        expr: &Expr,
        ops: &mut Vec<OpCode>,
        depth: &mut usize,
        max_depth: &mut usize,
    ) -> Result<(), EngineError> {
        match expr {
            Expr::Number(n) => {
                ops.push(OpCode::LoadConst(*n));
                *depth += 1;
            }
            Expr::Variable(name) => {
                let op = if let Some(&idx) = self.var_map.get(name) {
                    OpCode::LoadVar(idx)
                } else if let Some(&idx) = self.param_map.get(name) {
                    OpCode::LoadParam(idx)
                } else {
                    return Err(EngineError::UnknownSymbol(name.clone()));
                };
                ops.push(op);
                *depth += 1;
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops, depth, max_depth)?;
                self.compile_recursive(right, ops, depth, max_depth)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Pow => OpCode::Pow,
                });
                *depth -= 1;
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops, depth, max_depth)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops, depth, max_depth)?;
                ops.push(match func {
                    Function::Exp => OpCode::Exp,
                    Function::Ln => OpCode::Ln,
                });
            }
        }
        *max_depth = (*max_depth).max(*depth);
        Ok(())
    }
}

// --- Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, EngineError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.consume() {
        None => Ok(expr),
        Some(token) => Err(EngineError::UnexpectedToken(format!("{token:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EngineError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                let exponent_sign =
                    (d == '-' || d == '+') && matches!(num_str.chars().last(), Some('e' | 'E'));
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| EngineError::MalformedNumber(num_str.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(EngineError::UnexpectedCharacter(other)),
            });
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr, EngineError> {
        let mut left = self.parse_product()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_product()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, EngineError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    // Unary minus binds looser than '^', so -x^2 is -(x^2).
    fn parse_unary(&mut self) -> Result<Expr, EngineError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(expr)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, EngineError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(base, BinaryOp::Pow, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let func = Function::from_name(&name)
                        .ok_or_else(|| EngineError::UnknownFunction(name.clone()))?;
                    let arg = self.parse_expression()?;
                    match self.consume() {
                        Some(Token::RParen) => Ok(Expr::call(func, arg)),
                        _ => Err(EngineError::UnclosedParen),
                    }
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(EngineError::UnclosedParen),
                }
            }
            Some(token) => Err(EngineError::UnexpectedToken(format!("{token:?}"))),
            None => Err(EngineError::UnexpectedEnd),
        }
    }
}
