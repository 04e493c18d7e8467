//! Widget value templates: `${...}` extraction and arithmetic over metric data.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use regex::Regex;
use serde_json::Value;
use crate::errors::ExpressionError;

/// Shown instead of a value which can't be computed.
pub const NOT_AVAILABLE: &str = "n/a";

fn expression_regex() -> &'static Regex {
    static EXPRESSION_REGEX: OnceLock<Regex> = OnceLock::new();
    EXPRESSION_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([\w\s.,+\-*/():=\[\]]*)\}").expect("expression regex is valid")
    })
}

/// Returns the bodies of all `${...}` occurrences in template order, repeats included.
pub fn extract_expressions(template: &str) -> Vec<String> {
    expression_regex()
        .captures_iter(template)
        .map(|captures| captures[1].to_string())
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => { i += 1; }
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal.parse::<f64>().map_err(|_| ExpressionError::UnexpectedCharacter(c))?;
                tokens.push(Token::Number(number));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(ExpressionError::UnexpectedCharacter(c)),
        }
    }
    Ok(tokens)
}

/// Metric names referenced by the expression, in order of appearance.
pub fn referenced_metrics(expression: &str) -> Result<Vec<String>, ExpressionError> {
    let mut names = Vec::<String>::new();
    for token in tokenize(expression)? {
        if let Token::Ident(name) = token {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

struct Parser<'a, F: Fn(&str) -> Result<f64, ExpressionError>> {
    tokens: &'a [Token],
    pos: usize,
    lookup: F,
}

impl<'a, F: Fn(&str) -> Result<f64, ExpressionError>> Parser<'a, F> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<f64, ExpressionError> {
        let mut value = self.term()?;
        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Plus => { self.pos += 1; value += self.term()?; }
                Token::Minus => { self.pos += 1; value -= self.term()?; }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ExpressionError> {
        let mut value = self.factor()?;
        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Star => { self.pos += 1; value *= self.factor()?; }
                Token::Slash => { self.pos += 1; value /= self.factor()?; }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, ExpressionError> {
        match self.next().cloned() {
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::Plus) => self.factor(),
            Some(Token::Number(number)) => Ok(number),
            Some(Token::Ident(name)) => (self.lookup)(&name),
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    Some(_) => Err(ExpressionError::UnexpectedCharacter('(')),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Some(Token::RParen) => Err(ExpressionError::UnexpectedCharacter(')')),
            Some(Token::Star) => Err(ExpressionError::UnexpectedCharacter('*')),
            Some(Token::Slash) => Err(ExpressionError::UnexpectedCharacter('/')),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

/// Evaluates an arithmetic expression, resolving names through `lookup`.
pub fn evaluate<F>(expression: &str, lookup: F) -> Result<f64, ExpressionError>
where
    F: Fn(&str) -> Result<f64, ExpressionError>,
{
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens: &tokens, pos: 0, lookup };
    let value = parser.expression()?;
    if parser.pos < tokens.len() {
        return Err(ExpressionError::TrailingInput);
    }
    if !value.is_finite() {
        return Err(ExpressionError::NotFinite);
    }
    Ok(value)
}

fn number_of(name: &str, data: &Value) -> Result<f64, ExpressionError> {
    match data {
        Value::Number(number) => number.as_f64().ok_or_else(|| ExpressionError::NotANumber(name.to_string())),
        Value::String(text) => text.trim().parse::<f64>().map_err(|_| ExpressionError::NotANumber(name.to_string())),
        Value::Null => Err(ExpressionError::MissingMetric(name.to_string())),
        _ => Err(ExpressionError::NotANumber(name.to_string())),
    }
}

fn point_lookup<'a>(metrics: &'a BTreeMap<String, Value>) -> impl Fn(&str) -> Result<f64, ExpressionError> + 'a {
    move |name: &str| match metrics.get(name) {
        Some(data) => number_of(name, data),
        None => Err(ExpressionError::MissingMetric(name.to_string())),
    }
}

/// Maps every `${expression}` to its computed value, or to an empty string when it can't be computed.
pub fn compute_expression(expressions: &[String], metrics: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for expression in expressions {
        let value = evaluate(expression, point_lookup(metrics))
            .map(|value| value.to_string())
            .unwrap_or_default();
        result.insert(format!("${{{}}}", expression), value);
    }
    result
}

fn display_value(computed: Option<&String>) -> String {
    match computed {
        Some(text) => match text.parse::<f64>() {
            Ok(value) if value.fract() != 0.0 => format!("{:.2}", value),
            Ok(value) => format!("{}", value),
            Err(_) if !text.is_empty() => text.clone(),
            Err(_) => NOT_AVAILABLE.to_string(),
        },
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Replaces every `${...}` of the template with its computed value.
pub fn calculate_value(template: &str, metrics: &BTreeMap<String, Value>) -> String {
    let computed = compute_expression(&extract_expressions(template), metrics);
    expression_regex()
        .replace_all(template, |captures: &regex::Captures| display_value(computed.get(&captures[0])))
        .into_owned()
}

fn series_point(name: &str, data: &Value, index: usize) -> Result<f64, ExpressionError> {
    match data {
        Value::Array(points) => match points.get(index) {
            Some(Value::Array(point)) => number_of(name, point.first().unwrap_or(&Value::Null)),
            _ => Err(ExpressionError::MissingMetric(name.to_string())),
        },
        other => number_of(name, other),
    }
}

/// Evaluates the expression at every timestamp of the first referenced series.
/// Points which can't be computed are left out.
pub fn evaluate_series(expression: &str, metrics: &BTreeMap<String, Value>) -> Vec<[f64; 2]> {
    let Ok(names) = referenced_metrics(expression) else {
        return Vec::new();
    };
    let timestamps: Vec<f64> = names
        .iter()
        .filter_map(|name| metrics.get(name).and_then(Value::as_array))
        .next()
        .map(|points| {
            points
                .iter()
                .filter_map(|point| point.as_array().and_then(|p| p.get(1)).and_then(Value::as_f64))
                .collect()
        })
        .unwrap_or_default();

    let mut series = Vec::with_capacity(timestamps.len());
    for (index, timestamp) in timestamps.into_iter().enumerate() {
        let lookup = |name: &str| match metrics.get(name) {
            Some(data) => series_point(name, data, index),
            None => Err(ExpressionError::MissingMetric(name.to_string())),
        };
        if let Ok(value) = evaluate(expression, lookup) {
            series.push([value, timestamp]);
        }
    }
    series
}
