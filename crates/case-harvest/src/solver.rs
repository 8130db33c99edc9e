//! CAPTCHA solver adapter.
//!
//! Any solver (a remote HTTP service, a person at the terminal) implements
//! [`CaptchaSolver`]. [`SolverAdapter`] adds the attempt budget and turns
//! arithmetic challenges such as `4+4` into their result.

use crate::error::{HarvestError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default attempt budget.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Raw answer from a solver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveResponse {
    #[serde(default)]
    pub code: String,
}

/// Something that reads a CAPTCHA image and returns its text.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, image: &[u8]) -> Result<SolveResponse>;
}

/// Bounded retries plus expression evaluation around a solver.
#[derive(Clone)]
pub struct SolverAdapter {
    solver: Arc<dyn CaptchaSolver>,
    max_attempts: u32,
}

impl SolverAdapter {
    pub fn new(solver: Arc<dyn CaptchaSolver>) -> Self {
        Self {
            solver,
            max_attempts: DEFAULT_ATTEMPTS,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Solve `image`, retrying on errors and empty codes.
    pub async fn solve(&self, image: &[u8]) -> Result<String> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.solver.solve(image).await {
                Ok(resp) if !resp.code.trim().is_empty() => {
                    let raw = resp.code.trim();
                    let token = match evaluate(raw) {
                        Some(value) => {
                            debug!(raw, value = %value, "captcha expression evaluated");
                            value
                        }
                        None => raw.to_string(),
                    };
                    info!(attempt, "captcha solved");
                    return Ok(token);
                }
                Ok(_) => {
                    warn!(attempt, "solver returned an empty code");
                    last_error = Some("empty code".to_string());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "solver attempt failed");
                    last_error = Some(e.to_string());
                }
            }
        }
        Err(HarvestError::SolveExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

/// Evaluate a literal arithmetic expression.
///
/// Supports `+ - * /`, parentheses and unary minus over decimal numbers. A
/// token without any operator, or one that does not parse or divides by
/// zero, yields `None` and is used verbatim by the caller.
pub fn evaluate(expr: &str) -> Option<String> {
    let tokens = tokenize(expr)?;
    let has_operator = tokens
        .iter()
        .any(|t| matches!(t, Token::Op(_)));
    if !has_operator {
        return None;
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() || !value.is_finite() {
        return None;
    }
    Some(if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(s: &str) -> Option<Vec<Token>> {
    let mut out = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' | '-' | '*' | '/' => {
                out.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                out.push(Token::Open);
                i += 1;
            }
            ')' => {
                out.push(Token::Close);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                out.push(Token::Num(text.parse().ok()?));
            }
            _ => return None,
        }
    }
    Some(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Option<f64> {
        let mut acc = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Some(acc)
    }

    fn term(&mut self) -> Option<f64> {
        let mut acc = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                acc *= rhs;
            } else {
                if rhs == 0.0 {
                    return None;
                }
                acc /= rhs;
            }
        }
        Some(acc)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            Token::Num(n) => {
                self.pos += 1;
                Some(n)
            }
            Token::Op('-') => {
                self.pos += 1;
                Some(-self.factor()?)
            }
            Token::Op('+') => {
                self.pos += 1;
                self.factor()
            }
            Token::Open => {
                self.pos += 1;
                let v = self.expr()?;
                match self.peek()? {
                    Token::Close => {
                        self.pos += 1;
                        Some(v)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// HTTP solving service: POST `{"image": base64}` → `{"code": "..."}`.
pub struct RemoteSolver {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl RemoteSolver {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("case-harvest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: url::Url::parse(endpoint)?,
        })
    }
}

#[async_trait]
impl CaptchaSolver for RemoteSolver {
    async fn solve(&self, image: &[u8]) -> Result<SolveResponse> {
        let body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
        });
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HarvestError::Solver(format!("solver returned HTTP {status}")));
        }
        Ok(resp.json::<SolveResponse>().await?)
    }
}
