//! Agent item-key parsing.
//!
//! Keys look like `pg.checkpoint_time_ratio` or
//! `pg.checkpoint_time_ratio[<connection>,<database>,<action>]`.
//! Parameters are comma-separated; a parameter may be double-quoted to carry
//! commas or brackets, with `\"` escaping a quote inside it.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::MetricError;

/// Parameter index of the connection string.
pub const PARAM_CONNECTION: usize = 0;
/// Parameter index of the database name.
pub const PARAM_DATABASE: usize = 1;
/// First metric-specific parameter (e.g. time-ratio action).
pub const PARAM_FIRST: usize = 2;

/// A parsed agent request: item key name plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub key: String,
    pub params: Vec<String>,
}

impl AgentRequest {
    /// Parses `name` or `name[p0,p1,...]`.
    pub fn parse(input: &str) -> Result<Self, MetricError> {
        let input = input.trim();

        let (key, params) = match input.find('[') {
            None => (input, Vec::new()),
            Some(open) => {
                let Some(inner) = input[open + 1..].strip_suffix(']') else {
                    return Err(MetricError::InvalidKey(format!(
                        "'{}': missing closing ']'",
                        input
                    )));
                };
                (&input[..open], parse_params(inner).map_err(|msg| {
                    MetricError::InvalidKey(format!("'{}': {}", input, msg))
                })?)
            }
        };

        if key.is_empty() {
            return Err(MetricError::InvalidKey(format!("'{}': empty key name", input)));
        }
        if let Some(c) = key
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(MetricError::InvalidKey(format!(
                "'{}': unexpected character '{}' in key name",
                input, c
            )));
        }

        Ok(Self {
            key: key.to_string(),
            params,
        })
    }

    /// Returns parameter `index`, treating missing and empty values as absent.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params
            .get(index)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

fn parse_params(inner: &str) -> Result<Vec<String>, String> {
    let mut params = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        skip_spaces(&mut chars);

        let param = if chars.peek() == Some(&'"') {
            chars.next();
            let quoted = parse_quoted(&mut chars)?;
            skip_spaces(&mut chars);
            match chars.peek() {
                None | Some(',') => {}
                Some(c) => return Err(format!("unexpected '{}' after quoted parameter", c)),
            }
            quoted
        } else {
            let mut raw = String::new();
            while let Some(&c) = chars.peek() {
                match c {
                    ',' => break,
                    ']' | '[' => return Err(format!("unexpected '{}' in parameter", c)),
                    _ => {
                        raw.push(c);
                        chars.next();
                    }
                }
            }
            raw.trim_end().to_string()
        };

        params.push(param);

        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(c) => return Err(format!("unexpected '{}'", c)),
        }
    }

    Ok(params)
}

fn parse_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String, String> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'"') => {
                chars.next();
                out.push('"');
            }
            '"' => return Ok(out),
            _ => out.push(c),
        }
    }
    Err("unterminated quoted parameter".to_string())
}

fn skip_spaces(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek() == Some(&' ') {
        chars.next();
    }
}
