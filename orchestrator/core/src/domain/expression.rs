// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Arithmetic over exact rationals for computation-step expressions such as
//! `initial_velocity + acceleration * time`.
//!
//! Supports `+ - * / ^` (also `**`, `×`, `·`, `÷`), parentheses, unary minus
//! and integer exponents. A leading `target =` is ignored. Anything else
//! (functions, irrational results) is an error and the caller hands the step
//! to the answer-computation model instead.

use std::collections::BTreeMap;

use super::plan::normalize_variable;
use super::rational::{Rational, RationalError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("cannot parse expression: {0}")]
    Parse(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("exponent must be an integer")]
    NonIntegerExponent,

    #[error(transparent)]
    Arithmetic(#[from] RationalError),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Rational),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // scientific suffix: 2.5e3, 1E-4
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
                tokens.push(Token::Number(Rational::parse(&text)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '\u{2212}' => {
                tokens.push(Token::Op('-'));
                i += 1;
            }
            '\u{00d7}' | '\u{00b7}' => {
                tokens.push(Token::Op('*'));
                i += 1;
            }
            '\u{00f7}' => {
                tokens.push(Token::Op('/'));
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
            other => return Err(ExpressionError::Parse(format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    env: &'a BTreeMap<String, Rational>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Rational, ExpressionError> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' {
                value.checked_add(&rhs)?
            } else {
                value.checked_sub(&rhs)?
            };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Rational, ExpressionError> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = if op == '*' {
                value.checked_mul(&rhs)?
            } else {
                value.checked_div(&rhs)?
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<Rational, ExpressionError> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(self.unary()?.checked_neg()?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Rational, ExpressionError> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            if !exponent.is_integer() {
                return Err(ExpressionError::NonIntegerExponent);
            }
            let exponent = i32::try_from(exponent.numer()).map_err(|_| RationalError::Overflow)?;
            return Ok(base.checked_pow(exponent)?);
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Rational, ExpressionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(ExpressionError::Parse(format!("function '{}' is not supported", name)));
                }
                let key = normalize_variable(&name);
                self.env
                    .get(&key)
                    .copied()
                    .ok_or(ExpressionError::UnknownVariable(key))
            }
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(ExpressionError::Parse("missing ')'".to_string())),
                }
            }
            Some(other) => Err(ExpressionError::Parse(format!("unexpected token {:?}", other))),
            None => Err(ExpressionError::Parse("unexpected end of expression".to_string())),
        }
    }
}

/// Drop a leading `name =` so `v = v0 + a*t` evaluates its right-hand side.
fn right_hand_side(expression: &str) -> &str {
    match expression.rsplit_once('=') {
        Some((_, rhs)) => rhs,
        None => expression,
    }
}

/// Evaluate `expression` with variables bound from `env` (keys normalized).
pub fn evaluate(expression: &str, env: &BTreeMap<String, Rational>) -> Result<Rational, ExpressionError> {
    let tokens = tokenize(right_hand_side(expression))?;
    if tokens.is_empty() {
        return Err(ExpressionError::Parse("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0, env };
    let value = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(ExpressionError::Parse("trailing input".to_string()));
    }
    Ok(value)
}

/// Normalized variable names referenced by `expression`.
pub fn variables(expression: &str) -> Result<Vec<String>, ExpressionError> {
    let tokens = tokenize(right_hand_side(expression))?;
    let mut names: Vec<String> = tokens
        .into_iter()
        .filter_map(|t| match t {
            Token::Ident(name) => Some(normalize_variable(&name)),
            _ => None,
        })
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, Rational> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Rational::parse(v).unwrap()))
            .collect()
    }

    #[test]
    fn test_kinematics_chain() {
        let vars = env(&[("force", "50"), ("mass", "10")]);
        let acceleration = evaluate("force / mass", &vars).unwrap();
        assert_eq!(acceleration, Rational::from_integer(5));

        let vars = env(&[("initial_velocity", "0"), ("acceleration", "5"), ("time", "5")]);
        let velocity = evaluate("final_velocity = initial_velocity + acceleration * time", &vars).unwrap();
        assert_eq!(velocity, Rational::from_integer(25));
    }

    #[test]
    fn test_precedence_and_powers() {
        let vars = env(&[("x", "2")]);
        assert_eq!(evaluate("1 + 2 * 3", &vars).unwrap(), Rational::from_integer(7));
        assert_eq!(evaluate("(1 + 2) * 3", &vars).unwrap(), Rational::from_integer(9));
        assert_eq!(evaluate("-x^2", &vars).unwrap(), Rational::from_integer(-4));
        assert_eq!(evaluate("x ** 3 / 4", &vars).unwrap(), Rational::from_integer(2));
        assert_eq!(evaluate("1/3 + 1/6", &vars).unwrap(), Rational::new(1, 2).unwrap());
        assert_eq!(evaluate("2.5e3 × 2", &vars).unwrap(), Rational::from_integer(5000));
    }

    #[test]
    fn test_errors() {
        let vars = env(&[("x", "2")]);
        assert_eq!(evaluate("y + 1", &vars), Err(ExpressionError::UnknownVariable("y".to_string())));
        assert!(matches!(evaluate("sqrt(x)", &vars), Err(ExpressionError::Parse(_))));
        assert_eq!(evaluate("x ^ 0.5", &vars), Err(ExpressionError::NonIntegerExponent));
        assert!(matches!(evaluate("x / 0", &vars), Err(ExpressionError::Arithmetic(_))));
        assert!(evaluate("(x + 1", &vars).is_err());
    }

    #[test]
    fn test_degenerate_and_huge_exponents() {
        let vars = env(&[("x", "1"), ("y", "-1"), ("z", "0"), ("big", "2")]);
        assert_eq!(evaluate("x ^ 2000000000", &vars), Ok(Rational::ONE));
        assert_eq!(evaluate("y ^ 2000000001", &vars), Ok(Rational::from_integer(-1)));
        assert_eq!(evaluate("z ^ 2147483647", &vars), Ok(Rational::ZERO));
        assert_eq!(
            evaluate("big ^ 2000000000", &vars),
            Err(ExpressionError::Arithmetic(RationalError::Overflow))
        );
        assert_eq!(
            evaluate("x ^ 99999999999", &vars),
            Err(ExpressionError::Arithmetic(RationalError::Overflow))
        );
        assert_eq!(
            evaluate("z ^ -1", &vars),
            Err(ExpressionError::Arithmetic(RationalError::ZeroDenominator))
        );
    }

    #[test]
    fn test_exponent_notation_overflow() {
        let vars = env(&[]);
        assert_eq!(
            evaluate("1.5e-2147483648 * 2", &vars),
            Err(ExpressionError::Arithmetic(RationalError::Overflow))
        );
        assert!(evaluate("1e400 + 1", &vars).is_err());
        assert_eq!(evaluate("0e2147483647 + 1", &vars), Ok(Rational::ONE));
    }

    #[test]
    fn test_negative_zero_renders_plainly() {
        let vars = env(&[("tiny", "1/100000000000000000000")]);
        let value = evaluate("0 - tiny", &vars).unwrap();
        assert!(value < Rational::ZERO);
        assert_eq!(value.to_decimal_string(), "0");
        assert_eq!(evaluate("-0 * 5", &vars).unwrap().to_decimal_string(), "0");
    }

    #[test]
    fn test_variables_are_normalized() {
        assert_eq!(
            variables("Initial_Velocity + acceleration*time").unwrap(),
            vec!["acceleration", "initial_velocity", "time"]
        );
    }
}
