//! A small, strict arithmetic expression language.
//!
//! Two consumers:
//!
//! - user model catalogs: a model body is an expression over the variables
//!   declared in its signature (e.g. `a * exp(-x / tau) + c`)
//! - numeric input fields: bounds and initial guesses accept constant
//!   expressions (e.g. `2*pi`, `-1e3`), parsed by [`parse_number`]
//!
//! The language is deliberately closed: numeric literals, `+ - * / ^`,
//! unary minus, parentheses, the constants `pi` / `e` / `inf`, a fixed set
//! of single-argument functions, and the declared variables. Anything else
//! is a parse error. Nothing here ever evaluates host-language code.

/// Parse/compile failure for an expression.
///
/// Callers map this into the appropriate [`crate::error::FitError`] variant
/// (discovery failure for model bodies, invalid-value for numeric fields).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ExprError(String);

/// Functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Sinh,
    Cosh,
    Tanh,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "exp" => Func::Exp,
            "ln" | "log" => Func::Ln,
            "log10" => Func::Log10,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "sinh" => Func::Sinh,
            "cosh" => Func::Cosh,
            "tanh" => Func::Tanh,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Sin => v.sin(),
            Func::Cos => v.cos(),
            Func::Tan => v.tan(),
            Func::Exp => v.exp(),
            Func::Ln => v.ln(),
            Func::Log10 => v.log10(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
            Func::Sinh => v.sinh(),
            Func::Cosh => v.cosh(),
            Func::Tanh => v.tanh(),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Num(f64),
    /// Slot index into the evaluation frame (position in the signature).
    Var(usize),
    Neg(Box<Node>),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    Pow(Box<Node>, Box<Node>),
    Call(Func, Box<Node>),
}

impl Node {
    fn eval(&self, frame: &[f64]) -> f64 {
        match self {
            Node::Num(v) => *v,
            Node::Var(slot) => frame[*slot],
            Node::Neg(a) => -a.eval(frame),
            Node::Add(a, b) => a.eval(frame) + b.eval(frame),
            Node::Sub(a, b) => a.eval(frame) - b.eval(frame),
            Node::Mul(a, b) => a.eval(frame) * b.eval(frame),
            Node::Div(a, b) => a.eval(frame) / b.eval(frame),
            Node::Pow(a, b) => a.eval(frame).powf(b.eval(frame)),
            Node::Call(f, a) => f.apply(a.eval(frame)),
        }
    }
}

/// An expression compiled against a fixed variable list.
///
/// Variables are resolved to frame slots at compile time, so evaluation is a
/// single allocation-free tree walk. The frame passed to [`Compiled::eval`]
/// must have the same length and order as the variable list the expression
/// was compiled against.
#[derive(Debug, Clone)]
pub struct Compiled {
    root: Node,
    n_vars: usize,
}

impl Compiled {
    /// Compile `src` with the given variable names (signature order).
    ///
    /// Identifiers that are neither a variable, a constant, nor a known
    /// function are rejected.
    pub fn compile(src: &str, vars: &[String]) -> Result<Self, ExprError> {
        let tokens = tokenize(src)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            vars,
            src,
        };
        let root = parser.parse_expr(0)?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            root,
            n_vars: vars.len(),
        })
    }

    /// Evaluate with one value per compiled variable.
    ///
    /// # Panics
    /// Panics if `frame.len()` does not match the compiled variable count.
    pub fn eval(&self, frame: &[f64]) -> f64 {
        assert_eq!(frame.len(), self.n_vars, "frame/signature length mismatch");
        self.root.eval(frame)
    }
}

/// Parse a constant numeric expression (no free variables).
///
/// This is the strict parser behind every numeric input field: plain
/// literals and closed arithmetic like `2*pi` or `1/3` are accepted,
/// anything referencing an unknown name fails.
pub fn parse_number(text: &str) -> Result<f64, ExprError> {
    let compiled = Compiled::compile(text, &[])?;
    Ok(compiled.eval(&[]))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                // Accept `**` as a power operator alias.
                if bytes.get(i + 1) == Some(&b'*') {
                    tokens.push(Token::Caret);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
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
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len() && matches!(bytes[i] as char, '0'..='9' | '.') {
                    i += 1;
                }
                // Exponent suffix: 1e-3, 2.5E6.
                if i < bytes.len() && matches!(bytes[i] as char, 'e' | 'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && matches!(bytes[j] as char, '+' | '-') {
                        j += 1;
                    }
                    if j < bytes.len() && (bytes[j] as char).is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &src[start..i];
                let value: f64 = text
                    .parse()
                    .map_err(|_| ExprError(format!("bad numeric literal '{text}'")))?;
                tokens.push(Token::Num(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(src[start..i].to_string()));
            }
            other => {
                return Err(ExprError(format!("unexpected character '{other}' in '{src}'")));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    vars: &'a [String],
    src: &'a str,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> ExprError {
        ExprError(format!("{message} in '{}'", self.src))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Pratt parse with binding powers: `+ -` (1), `* /` (2), unary minus
    /// (3), `^` (4, right-associative). This matches the usual reading where
    /// `-x^2` is `-(x^2)`.
    fn parse_expr(&mut self, min_bp: u8) -> Result<Node, ExprError> {
        let mut lhs = match self.bump() {
            Some(Token::Num(v)) => Node::Num(v),
            Some(Token::Minus) => {
                let inner = self.parse_expr(3)?;
                Node::Neg(Box::new(inner))
            }
            Some(Token::Plus) => self.parse_expr(3)?,
            Some(Token::LParen) => {
                let inner = self.parse_expr(0)?;
                match self.bump() {
                    Some(Token::RParen) => inner,
                    _ => return Err(self.error("missing closing parenthesis")),
                }
            }
            Some(Token::Ident(name)) => self.parse_ident(&name)?,
            _ => return Err(self.error("expected a value")),
        };

        loop {
            let (op_bp, right_bp) = match self.peek() {
                Some(Token::Plus | Token::Minus) => (1, 2),
                Some(Token::Star | Token::Slash) => (2, 3),
                Some(Token::Caret) => (4, 4), // right-assoc: recurse at same bp
                _ => break,
            };
            if op_bp < min_bp {
                break;
            }
            let op = self.bump();
            let rhs = self.parse_expr(right_bp)?;
            lhs = match op {
                Some(Token::Plus) => Node::Add(Box::new(lhs), Box::new(rhs)),
                Some(Token::Minus) => Node::Sub(Box::new(lhs), Box::new(rhs)),
                Some(Token::Star) => Node::Mul(Box::new(lhs), Box::new(rhs)),
                Some(Token::Slash) => Node::Div(Box::new(lhs), Box::new(rhs)),
                Some(Token::Caret) => Node::Pow(Box::new(lhs), Box::new(rhs)),
                _ => unreachable!("operator token checked above"),
            };
        }

        Ok(lhs)
    }

    fn parse_ident(&mut self, name: &str) -> Result<Node, ExprError> {
        // Function application: `name(` with a known function name.
        if self.peek() == Some(&Token::LParen) {
            let Some(func) = Func::from_name(name) else {
                return Err(self.error(&format!("unknown function '{name}'")));
            };
            self.bump(); // consume '('
            let arg = self.parse_expr(0)?;
            match self.bump() {
                Some(Token::RParen) => return Ok(Node::Call(func, Box::new(arg))),
                _ => return Err(self.error("missing closing parenthesis")),
            }
        }

        if let Some(slot) = self.vars.iter().position(|v| v == name) {
            return Ok(Node::Var(slot));
        }

        match name {
            "pi" => Ok(Node::Num(std::f64::consts::PI)),
            "e" => Ok(Node::Num(std::f64::consts::E)),
            "inf" => Ok(Node::Num(f64::INFINITY)),
            _ => Err(self.error(&format!("unknown identifier '{name}'"))),
        }
    }
}
