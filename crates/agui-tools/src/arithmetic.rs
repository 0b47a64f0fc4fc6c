//! Recursive-descent evaluator for `+ - * / **`, unary signs, and parentheses.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('**' unary)?
//! primary := number | '(' expr ')'
//! ```

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected '{found}' at position {position}")]
    Unexpected { found: char, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy)]
struct Spanned {
    token: Token,
    position: usize,
    symbol: char,
}

/// Evaluates `expression` without any dynamic code execution.
pub fn evaluate(expression: &str) -> Result<f64, ArithmeticError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(ArithmeticError::Empty);
    }
    let mut parser = Parser { tokens, cursor: 0 };
    let value = parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ArithmeticError::Unexpected {
            found: extra.symbol,
            position: extra.position,
        });
    }
    if !value.is_finite() {
        return Err(ArithmeticError::NonFinite);
    }
    // `-0` prints as "-0"; arithmetic results report plain zero.
    Ok(if value == 0.0 { 0.0 } else { value })
}

fn tokenize(expression: &str) -> Result<Vec<Spanned>, ArithmeticError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        let symbol = chars[index];
        let position = index;
        let token = match symbol {
            ' ' | '\t' => {
                index += 1;
                continue;
            }
            '0'..='9' | '.' => {
                let start = index;
                while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.')
                {
                    index += 1;
                }
                let literal: String = chars[start..index].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ArithmeticError::InvalidNumber(literal.clone()))?;
                tokens.push(Spanned {
                    token: Token::Number(value),
                    position,
                    symbol,
                });
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if chars.get(index + 1) == Some(&'*') => {
                index += 1;
                Token::DoubleStar
            }
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::Open,
            ')' => Token::Close,
            other => {
                return Err(ArithmeticError::Unexpected {
                    found: other,
                    position,
                })
            }
        };
        tokens.push(Spanned {
            token,
            position,
            symbol,
        });
        index += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
}

impl Parser {
    fn peek(&self) -> Option<Spanned> {
        self.tokens.get(self.cursor).copied()
    }

    fn advance_if(&mut self, token: Token) -> bool {
        if self.peek().is_some_and(|next| next.token == token) {
            self.cursor += 1;
            return true;
        }
        false
    }

    fn expr(&mut self) -> Result<f64, ArithmeticError> {
        let mut value = self.term()?;
        loop {
            if self.advance_if(Token::Plus) {
                value += self.term()?;
            } else if self.advance_if(Token::Minus) {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, ArithmeticError> {
        let mut value = self.unary()?;
        loop {
            if self.advance_if(Token::Star) {
                value *= self.unary()?;
            } else if self.advance_if(Token::Slash) {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(ArithmeticError::DivisionByZero);
                }
                value /= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ArithmeticError> {
        if self.advance_if(Token::Minus) {
            return Ok(-self.unary()?);
        }
        if self.advance_if(Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<f64, ArithmeticError> {
        let base = self.primary()?;
        if self.advance_if(Token::DoubleStar) {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, ArithmeticError> {
        let Some(next) = self.peek() else {
            return Err(ArithmeticError::UnexpectedEnd);
        };
        self.cursor += 1;
        match next.token {
            Token::Number(value) => Ok(value),
            Token::Open => {
                let value = self.expr()?;
                if !self.advance_if(Token::Close) {
                    return match self.peek() {
                        Some(found) => Err(ArithmeticError::Unexpected {
                            found: found.symbol,
                            position: found.position,
                        }),
                        None => Err(ArithmeticError::UnexpectedEnd),
                    };
                }
                Ok(value)
            }
            _ => Err(ArithmeticError::Unexpected {
                found: next.symbol,
                position: next.position,
            }),
        }
    }
}
