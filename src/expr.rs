//! Expression mini-language used by `calc` and by split bucket functions.
//!
//! An expression is parsed once and compiled into a tree of boxed closures that
//! take the row's selected field values as positional `&str` arguments. There
//! is no access to files, the environment or the process from inside an
//! expression; nesting depth and string growth are bounded.
//!
//! Even so, expression text is code. Whoever supplies it (the command line,
//! a config file, a library caller) can make every row fail or burn CPU, so it
//! must come from the same trust level as the user running the tool. Field
//! values from the data stream are only ever passed in as arguments and are
//! never parsed as expressions.
//!
//! Values are integers, floats, strings and booleans. Field arguments arrive as
//! strings; arithmetic on them needs an explicit `int(..)`, `float(..)` or
//! `num(..)`.

use ahash::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use thiserror::Error;

const MAX_DEPTH: usize = 64;
const MAX_STR_BYTES: usize = 1 << 20;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("cannot parse expression '{src}' at column {col}: {msg}")]
    Parse { src: String, col: usize, msg: String },

    #[error("{0}")]
    Eval(String),
}

fn eval_err(msg: impl Into<String>) -> ExprError {
    ExprError::Eval(msg.into())
}

/// Runtime value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

type Compiled = Box<dyn Fn(&[&str]) -> Result<Value, ExprError>>;

/// A compiled expression over named positional parameters.
pub struct Expr {
    source: String,
    params: Vec<String>,
    eval: Compiled,
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expr").field("source", &self.source).field("params", &self.params).finish()
    }
}

impl Expr {
    /// Parse and compile `source`. Identifiers in the text must be one of
    /// `params` (bound positionally at call time) or a builtin function.
    pub fn compile<S: AsRef<str>>(source: &str, params: &[S]) -> Result<Self, ExprError> {
        let params: Vec<String> = params.iter().map(|p| p.as_ref().to_string()).collect();
        let toks = lex(source)?;
        let mut parser = Parser { src: source, toks, pos: 0, params: &params, depth: 0 };
        let ast = parser.parse_expr()?;
        if parser.pos < parser.toks.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self { source: source.to_string(), eval: compile(ast), params })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Evaluate with one string per parameter, in parameter order.
    pub fn call(&self, args: &[&str]) -> Result<Value, ExprError> {
        if args.len() != self.params.len() {
            return Err(eval_err(format!(
                "expression takes {} argument(s), {} given",
                self.params.len(),
                args.len()
            )));
        }
        (self.eval)(args)
    }
}

// ----------------------------- Lexing ------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Sym(&'static str),
}

#[derive(Clone, Debug)]
struct Token {
    tok: Tok,
    col: usize,
}

const TWO_CHAR: &[&str] = &["**", "//", "==", "!=", "<=", ">=", "&&", "||"];
const ONE_CHAR: &[&str] = &["+", "-", "*", "/", "%", "<", ">", "!", "(", ")", ","];

fn parse_error(src: &str, col: usize, msg: impl Into<String>) -> ExprError {
    ExprError::Parse { src: src.to_string(), col, msg: msg.into() }
}

fn lex(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let col = start + 1;

        let starts_number = c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).map_or(false, |d| d.is_ascii_digit()));
        if starts_number {
            let mut is_float = false;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < chars.len() && chars[i] == '.' {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    is_float = true;
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let tok = if is_float {
                Tok::Float(text.parse().map_err(|_| parse_error(src, col, format!("bad number '{}'", text)))?)
            } else {
                Tok::Int(text.parse().map_err(|_| parse_error(src, col, format!("integer '{}' out of range", text)))?)
            };
            out.push(Token { tok, col });
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut s = String::new();
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(parse_error(src, col, "unterminated string"));
                };
                i += 1;
                if ch == quote {
                    break;
                }
                if ch == '\\' {
                    let Some(&esc) = chars.get(i) else {
                        return Err(parse_error(src, col, "unterminated string"));
                    };
                    i += 1;
                    match esc {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        '\\' | '\'' | '"' => s.push(esc),
                        other => {
                            s.push('\\');
                            s.push(other);
                        }
                    }
                } else {
                    s.push(ch);
                }
            }
            out.push(Token { tok: Tok::Str(s), col });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            out.push(Token { tok: Tok::Ident(name), col });
            continue;
        }

        if let Some(&next) = chars.get(i + 1) {
            let pair: String = [c, next].iter().collect();
            if let Some(sym) = TWO_CHAR.iter().find(|s| **s == pair) {
                out.push(Token { tok: Tok::Sym(*sym), col });
                i += 2;
                continue;
            }
        }
        let single = c.to_string();
        if let Some(sym) = ONE_CHAR.iter().find(|s| **s == single) {
            out.push(Token { tok: Tok::Sym(*sym), col });
            i += 1;
            continue;
        }

        return Err(parse_error(src, col, format!("unexpected character '{}'", c)));
    }

    Ok(out)
}

// ----------------------------- Parsing ------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Builtin {
    Int,
    Float,
    Num,
    Str,
    Len,
    Lower,
    Upper,
    Strip,
    Abs,
    Round,
    Min,
    Max,
    Hash,
    If,
}

impl Builtin {
    /// (builtin, min args, max args)
    fn lookup(name: &str) -> Option<(Builtin, usize, usize)> {
        let found = match name {
            "int" => (Builtin::Int, 1, 1),
            "float" => (Builtin::Float, 1, 1),
            "num" => (Builtin::Num, 1, 1),
            "str" => (Builtin::Str, 1, 1),
            "len" => (Builtin::Len, 1, 1),
            "lower" => (Builtin::Lower, 1, 1),
            "upper" => (Builtin::Upper, 1, 1),
            "strip" => (Builtin::Strip, 1, 1),
            "abs" => (Builtin::Abs, 1, 1),
            "round" => (Builtin::Round, 1, 2),
            "min" => (Builtin::Min, 1, usize::MAX),
            "max" => (Builtin::Max, 1, usize::MAX),
            "hash" => (Builtin::Hash, 1, 1),
            "if" => (Builtin::If, 3, 3),
            _ => return None,
        };
        Some(found)
    }
}

#[derive(Debug)]
enum Ast {
    Lit(Value),
    Arg(usize),
    Neg(Box<Ast>),
    Not(Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
    Call(Builtin, Vec<Ast>),
}

struct Parser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    pos: usize,
    params: &'a [String],
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: impl Into<String>) -> ExprError {
        let col = match self.toks.get(self.pos) {
            Some(t) => t.col,
            None => self.src.chars().count() + 1,
        };
        parse_error(self.src, col, msg)
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|t| &t.tok)
    }

    fn at_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Tok::Sym(s)) if *s == sym)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(s)) if s == kw)
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), ExprError> {
        if self.at_sym(sym) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", sym)))
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Ast, ExprError> {
        self.enter()?;
        let result = self.parse_or();
        self.depth -= 1;
        result
    }

    // Each operator in a chain is one more level of the left-deep tree.
    fn parse_or(&mut self) -> Result<Ast, ExprError> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        while self.at_sym("||") || self.at_keyword("or") {
            self.pos += 1;
            self.enter()?;
            let right = self.parse_and()?;
            left = Ast::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Ast, ExprError> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        while self.at_sym("&&") || self.at_keyword("and") {
            self.pos += 1;
            self.enter()?;
            let right = self.parse_not()?;
            left = Ast::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Ast, ExprError> {
        if self.at_sym("!") || self.at_keyword("not") {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_not();
            self.depth -= 1;
            return Ok(Ast::Not(Box::new(inner?)));
        }
        self.parse_comparison()
    }

    fn comparison_op(&self) -> Option<BinOp> {
        match self.peek() {
            Some(Tok::Sym("==")) => Some(BinOp::Eq),
            Some(Tok::Sym("!=")) => Some(BinOp::Ne),
            Some(Tok::Sym("<")) => Some(BinOp::Lt),
            Some(Tok::Sym("<=")) => Some(BinOp::Le),
            Some(Tok::Sym(">")) => Some(BinOp::Gt),
            Some(Tok::Sym(">=")) => Some(BinOp::Ge),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Ast, ExprError> {
        let left = self.parse_additive()?;
        let Some(op) = self.comparison_op() else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.parse_additive()?;
        if self.comparison_op().is_some() {
            return Err(self.error("chained comparisons are not supported; use 'and'"));
        }
        Ok(Ast::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Ast, ExprError> {
        let base = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Sym("+")) => BinOp::Add,
                Some(Tok::Sym("-")) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            let right = self.parse_multiplicative()?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Ast, ExprError> {
        let base = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Sym("*")) => BinOp::Mul,
                Some(Tok::Sym("/")) => BinOp::Div,
                Some(Tok::Sym("//")) => BinOp::FloorDiv,
                Some(Tok::Sym("%")) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            let right = self.parse_unary()?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Ast, ExprError> {
        let negate = if self.at_sym("-") {
            true
        } else if self.at_sym("+") {
            false
        } else {
            return self.parse_power();
        };
        self.pos += 1;
        self.enter()?;
        let inner = self.parse_unary();
        self.depth -= 1;
        let inner = inner?;
        Ok(if negate { Ast::Neg(Box::new(inner)) } else { inner })
    }

    /// `**` binds tighter than unary minus on its left and is right-associative.
    fn parse_power(&mut self) -> Result<Ast, ExprError> {
        let base = self.parse_primary()?;
        if !self.at_sym("**") {
            return Ok(base);
        }
        self.pos += 1;
        self.enter()?;
        let exp = self.parse_unary();
        self.depth -= 1;
        Ok(Ast::Binary(BinOp::Pow, Box::new(base), Box::new(exp?)))
    }

    fn parse_primary(&mut self) -> Result<Ast, ExprError> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        match tok {
            Tok::Int(n) => {
                self.pos += 1;
                Ok(Ast::Lit(Value::Int(n)))
            }
            Tok::Float(x) => {
                self.pos += 1;
                Ok(Ast::Lit(Value::Float(x)))
            }
            Tok::Str(s) => {
                self.pos += 1;
                Ok(Ast::Lit(Value::Str(s)))
            }
            Tok::Sym("(") => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Tok::Ident(name) => self.parse_name(name),
            Tok::Sym(s) => Err(self.error(format!("unexpected '{}'", s))),
        }
    }

    fn parse_name(&mut self, name: String) -> Result<Ast, ExprError> {
        match name.as_str() {
            "true" => {
                self.pos += 1;
                return Ok(Ast::Lit(Value::Bool(true)));
            }
            "false" => {
                self.pos += 1;
                return Ok(Ast::Lit(Value::Bool(false)));
            }
            "and" | "or" | "not" => return Err(self.error(format!("unexpected keyword '{}'", name))),
            _ => {}
        }

        if matches!(self.toks.get(self.pos + 1).map(|t| &t.tok), Some(Tok::Sym("("))) {
            let Some((func, min, max)) = Builtin::lookup(&name) else {
                return Err(self.error(format!("unknown function '{}'", name)));
            };
            self.pos += 2;
            let mut args = Vec::new();
            if !self.at_sym(")") {
                loop {
                    args.push(self.parse_expr()?);
                    if self.at_sym(",") {
                        self.pos += 1;
                        continue;
                    }
                    break;
                }
            }
            self.expect_sym(")")?;
            if args.len() < min || args.len() > max {
                return Err(self.error(format!("{}() does not take {} argument(s)", name, args.len())));
            }
            return Ok(Ast::Call(func, args));
        }

        match self.params.iter().position(|p| *p == name) {
            Some(i) => {
                self.pos += 1;
                Ok(Ast::Arg(i))
            }
            None => Err(self.error(format!("unknown name '{}'", name))),
        }
    }
}

// ----------------------------- Compilation ------------------------------------

fn compile(ast: Ast) -> Compiled {
    match ast {
        Ast::Lit(v) => Box::new(move |_: &[&str]| Ok(v.clone())),
        Ast::Arg(i) => Box::new(move |args: &[&str]| Ok(Value::Str(args[i].to_string()))),
        Ast::Neg(inner) => {
            let inner = compile(*inner);
            Box::new(move |args: &[&str]| negate(inner(args)?))
        }
        Ast::Not(inner) => {
            let inner = compile(*inner);
            Box::new(move |args: &[&str]| Ok(Value::Bool(!inner(args)?.truthy())))
        }
        Ast::And(a, b) => {
            let (a, b) = (compile(*a), compile(*b));
            Box::new(move |args: &[&str]| Ok(Value::Bool(a(args)?.truthy() && b(args)?.truthy())))
        }
        Ast::Or(a, b) => {
            let (a, b) = (compile(*a), compile(*b));
            Box::new(move |args: &[&str]| Ok(Value::Bool(a(args)?.truthy() || b(args)?.truthy())))
        }
        Ast::Binary(op, a, b) => {
            let (a, b) = (compile(*a), compile(*b));
            Box::new(move |args: &[&str]| binary(op, a(args)?, b(args)?))
        }
        Ast::Call(Builtin::If, parts) => {
            let mut parts = parts.into_iter().map(compile);
            let (Some(cond), Some(then), Some(other)) = (parts.next(), parts.next(), parts.next()) else {
                return Box::new(|_: &[&str]| Err(eval_err("if() takes 3 arguments")));
            };
            Box::new(move |args: &[&str]| if cond(args)?.truthy() { then(args) } else { other(args) })
        }
        Ast::Call(func, parts) => {
            let parts: Vec<Compiled> = parts.into_iter().map(compile).collect();
            Box::new(move |args: &[&str]| {
                let vals = parts.iter().map(|p| p(args)).collect::<Result<Vec<_>, _>>()?;
                call_builtin(func, vals)
            })
        }
    }
}

// ----------------------------- Evaluation ------------------------------------

fn negate(v: Value) -> Result<Value, ExprError> {
    match v {
        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| eval_err("integer overflow")),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(eval_err(format!("cannot negate {} '{}'", other.kind(), other))),
    }
}

fn overflow() -> ExprError {
    eval_err("integer overflow")
}

fn repeat(s: &str, n: i64) -> Result<Value, ExprError> {
    let n = n.max(0) as usize;
    if s.len().saturating_mul(n) > MAX_STR_BYTES {
        return Err(eval_err("string result too large"));
    }
    Ok(Value::Str(s.repeat(n)))
}

fn type_error(op: BinOp, a: &Value, b: &Value) -> ExprError {
    eval_err(format!("unsupported operand kinds for {:?}: {} '{}' and {} '{}'", op, a.kind(), a, b.kind(), b))
}

fn binary(op: BinOp, a: Value, b: Value) -> Result<Value, ExprError> {
    use Value::{Float, Int, Str};
    match op {
        BinOp::Eq => return Ok(Value::Bool(values_equal(&a, &b))),
        BinOp::Ne => return Ok(Value::Bool(!values_equal(&a, &b))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => return compare(op, &a, &b),
        _ => {}
    }

    match (op, &a, &b) {
        (BinOp::Add, Str(x), Str(y)) => {
            if x.len() + y.len() > MAX_STR_BYTES {
                return Err(eval_err("string result too large"));
            }
            Ok(Str(format!("{}{}", x, y)))
        }
        (BinOp::Mul, Str(s), Int(n)) | (BinOp::Mul, Int(n), Str(s)) => repeat(s, *n),

        (BinOp::Add, Int(x), Int(y)) => x.checked_add(*y).map(Int).ok_or_else(overflow),
        (BinOp::Sub, Int(x), Int(y)) => x.checked_sub(*y).map(Int).ok_or_else(overflow),
        (BinOp::Mul, Int(x), Int(y)) => x.checked_mul(*y).map(Int).ok_or_else(overflow),
        (BinOp::FloorDiv, Int(x), Int(y)) => {
            if *y == 0 {
                return Err(eval_err("division by zero"));
            }
            let q = x.checked_div(*y).ok_or_else(overflow)?;
            let floor = if x % y != 0 && ((*x < 0) != (*y < 0)) { q - 1 } else { q };
            Ok(Int(floor))
        }
        (BinOp::Mod, Int(x), Int(y)) => {
            if *y == 0 {
                return Err(eval_err("modulo by zero"));
            }
            // i64::MIN % -1 overflows in hardware but is exactly 0.
            if *y == -1 {
                return Ok(Int(0));
            }
            let r = x % y;
            Ok(Int(if r != 0 && ((r < 0) != (*y < 0)) { r + y } else { r }))
        }
        (BinOp::Pow, Int(x), Int(y)) if *y >= 0 => {
            let exp = u32::try_from(*y).map_err(|_| overflow())?;
            x.checked_pow(exp).map(Int).ok_or_else(overflow)
        }

        _ => {
            let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
                return Err(type_error(op, &a, &b));
            };
            let v = match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div => {
                    if y == 0.0 {
                        return Err(eval_err("division by zero"));
                    }
                    x / y
                }
                BinOp::FloorDiv => {
                    if y == 0.0 {
                        return Err(eval_err("division by zero"));
                    }
                    (x / y).floor()
                }
                BinOp::Mod => {
                    if y == 0.0 {
                        return Err(eval_err("modulo by zero"));
                    }
                    let r = x % y;
                    if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r }
                }
                BinOp::Pow => x.powf(y),
                _ => return Err(type_error(op, &a, &b)),
            };
            Ok(Float(v))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn ordering(a: &Value, b: &Value) -> Result<Option<std::cmp::Ordering>, ExprError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Some(x.cmp(y))),
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(x.partial_cmp(&y)),
            _ => Err(eval_err(format!("cannot order {} '{}' against {} '{}'", a.kind(), a, b.kind(), b))),
        },
    }
}

fn compare(op: BinOp, a: &Value, b: &Value) -> Result<Value, ExprError> {
    use std::cmp::Ordering::{Equal, Greater, Less};
    let ord = ordering(a, b)?;
    let result = match (op, ord) {
        (_, None) => false,
        (BinOp::Lt, Some(o)) => o == Less,
        (BinOp::Le, Some(o)) => o != Greater,
        (BinOp::Gt, Some(o)) => o == Greater,
        (BinOp::Ge, Some(o)) => o != Less,
        (_, Some(o)) => o == Equal,
    };
    Ok(Value::Bool(result))
}

fn stable_hash(s: &str) -> i64 {
    let state = RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    );
    let mut h = state.build_hasher();
    s.hash(&mut h);
    (h.finish() >> 1) as i64
}

fn to_int(v: &Value) -> Result<i64, ExprError> {
    match v {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(*b as i64),
        Value::Float(x) => {
            if x.is_finite() && x.trunc() >= i64::MIN as f64 && x.trunc() < i64::MAX as f64 {
                Ok(x.trunc() as i64)
            } else {
                Err(eval_err(format!("cannot convert {} to int", x)))
            }
        }
        Value::Str(s) => s.trim().parse().map_err(|_| eval_err(format!("invalid int '{}'", s))),
    }
}

fn to_float(v: &Value) -> Result<f64, ExprError> {
    match v {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(x) => Ok(*x),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse().map_err(|_| eval_err(format!("invalid float '{}'", s))),
    }
}

fn as_str<'v>(func: &str, v: &'v Value) -> Result<&'v str, ExprError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(eval_err(format!("{}() expects str, got {} '{}'", func, other.kind(), other))),
    }
}

fn call_builtin(func: Builtin, mut vals: Vec<Value>) -> Result<Value, ExprError> {
    let first = vals.first().cloned().ok_or_else(|| eval_err("missing argument"))?;
    match func {
        Builtin::Int => Ok(Value::Int(to_int(&first)?)),
        Builtin::Float => Ok(Value::Float(to_float(&first)?)),
        Builtin::Num => match &first {
            Value::Str(s) => {
                let t = s.trim();
                if let Ok(n) = t.parse::<i64>() {
                    Ok(Value::Int(n))
                } else {
                    t.parse::<f64>().map(Value::Float).map_err(|_| eval_err(format!("invalid number '{}'", s)))
                }
            }
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            num => Ok(num.clone()),
        },
        Builtin::Str => Ok(Value::Str(first.to_string())),
        Builtin::Len => Ok(Value::Int(as_str("len", &first)?.chars().count() as i64)),
        Builtin::Lower => Ok(Value::Str(as_str("lower", &first)?.to_lowercase())),
        Builtin::Upper => Ok(Value::Str(as_str("upper", &first)?.to_uppercase())),
        Builtin::Strip => Ok(Value::Str(as_str("strip", &first)?.trim().to_string())),
        Builtin::Abs => match first {
            Value::Int(n) => n.checked_abs().map(Value::Int).ok_or_else(overflow),
            Value::Float(x) => Ok(Value::Float(x.abs())),
            other => Err(eval_err(format!("abs() expects a number, got {} '{}'", other.kind(), other))),
        },
        Builtin::Round => {
            let digits = match vals.get(1) {
                Some(d) => Some(to_int(d)?),
                None => None,
            };
            match (first, digits) {
                (Value::Int(n), _) => Ok(Value::Int(n)),
                (Value::Float(x), None) => to_int(&Value::Float(x.round_ties_even())).map(Value::Int),
                (Value::Float(x), Some(d)) => {
                    let scale = 10f64.powi(d.clamp(-308, 308) as i32);
                    Ok(Value::Float((x * scale).round_ties_even() / scale))
                }
                (other, _) => Err(eval_err(format!("round() expects a number, got {} '{}'", other.kind(), other))),
            }
        }
        Builtin::Min | Builtin::Max => {
            let want = if func == Builtin::Min { std::cmp::Ordering::Less } else { std::cmp::Ordering::Greater };
            let mut best = vals.remove(0);
            for v in vals {
                if ordering(&v, &best)? == Some(want) {
                    best = v;
                }
            }
            Ok(best)
        }
        Builtin::Hash => Ok(Value::Int(stable_hash(&first.to_string()))),
        Builtin::If => Err(eval_err("if() is evaluated lazily")),
    }
}
