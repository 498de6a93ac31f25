//! Turns raw argument text into dynamically typed [`Value`]s.
//!
//! Precedence, first match wins:
//!
//! 1. `_` is the last result;
//! 2. `$name` reads a variable (absent variables resolve to [`Value::None`]);
//! 3. a quoted literal is its content, quotes stripped and escapes undone;
//! 4. `^...` parses the rest as JSON; a quote wrapper is dropped but its
//!    content goes to the JSON parser untouched, escapes included;
//! 5. the empty string, `False` and `false` are `false`;
//! 6. a run of ASCII digits is an integer;
//! 7. anything else is the literal string.

use crate::env::Environment;
use crate::error::ShellError;
use crate::lexer::is_quote;
use crate::value::Value;
use serde_json::Value as JsonValue;
use std::fmt;

/// The words that read as boolean `false`.
pub fn is_falsey_str(s: &str) -> bool {
    s.is_empty() || s == "False" || s == "false"
}

/// Strips the quote that opens `raw` and its matching closing quote,
/// undoing `\<quote>` and `\\` escapes. Text after the closing quote is kept
/// as is; without a closing quote the literal runs to the end.
pub fn unquote(raw: &str) -> String {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        Some(q) if is_quote(q) => q,
        _ => return raw.to_string(),
    };

    let mut out = String::with_capacity(raw.len());
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.clone().next() {
                Some(next) if next == quote || next == '\\' => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push(ch),
            },
            c if c == quote => {
                out.extend(chars.by_ref());
                break;
            }
            c => out.push(c),
        }
    }
    out
}

/// Drops the quote that opens `raw` and its closing quote, leaving every
/// escape in place. A backslash still hides the quote after it, as in the
/// lexer.
fn strip_quotes(raw: &str) -> String {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        Some(q) if is_quote(q) => q,
        _ => return raw.to_string(),
    };

    let mut out = String::with_capacity(raw.len());
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                out.push(ch);
                out.extend(chars.next());
            }
            c if c == quote => {
                out.extend(chars.by_ref());
                break;
            }
            c => out.push(c),
        }
    }
    out
}

/// Non-fatal findings of a resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveWarning {
    UndefinedVariable(String),
}

impl fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveWarning::UndefinedVariable(name) => {
                write!(f, "undefined variable '${}'", name)
            }
        }
    }
}

/// Resolves the arguments of one stage against the environment as it is at
/// the time the stage runs.
pub struct Resolver<'a> {
    env: &'a Environment,
    last_result: &'a Value,
    used_last_result: bool,
    warnings: Vec<ResolveWarning>,
}

impl<'a> Resolver<'a> {
    pub fn new(env: &'a Environment, last_result: &'a Value) -> Self {
        Self {
            env,
            last_result,
            used_last_result: false,
            warnings: Vec::new(),
        }
    }

    /// Whether any resolved argument was `_`.
    pub fn used_last_result(&self) -> bool {
        self.used_last_result
    }

    pub fn take_warnings(&mut self) -> Vec<ResolveWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn resolve(&mut self, raw: &str) -> Result<Value, ShellError> {
        if raw == "_" {
            self.used_last_result = true;
            return Ok(self.last_result.clone());
        }

        if let Some(name) = raw.strip_prefix('$') {
            return Ok(self.lookup(name));
        }

        if raw.starts_with(is_quote) {
            return Ok(Value::Str(unquote(raw)));
        }

        if let Some(literal) = raw.strip_prefix('^') {
            let literal = strip_quotes(literal);
            let json: JsonValue =
                serde_json::from_str(&literal).map_err(|e| ShellError::InvalidJson {
                    literal,
                    source: e,
                })?;
            return Ok(Value::from_json(json));
        }

        if is_falsey_str(raw) {
            return Ok(Value::Bool(false));
        }

        if raw.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(i) = raw.parse::<i64>() {
                return Ok(Value::Int(i));
            }
        }

        Ok(Value::Str(raw.to_string()))
    }

    /// Keyword names may be taken from a variable (`$field=value`); any other
    /// key is used verbatim.
    pub fn resolve_key(&mut self, raw: &str) -> String {
        match raw.strip_prefix('$') {
            Some(name) => match self.lookup(name) {
                Value::None => raw.to_string(),
                value => value.to_string(),
            },
            None => raw.to_string(),
        }
    }

    fn lookup(&mut self, name: &str) -> Value {
        match self.env.get_var(name) {
            Some(value) => value.clone(),
            None => {
                if !self.env.is_silent() {
                    self.warnings
                        .push(ResolveWarning::UndefinedVariable(name.to_string()));
                }
                Value::None
            }
        }
    }
}
