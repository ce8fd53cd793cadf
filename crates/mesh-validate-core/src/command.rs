//! Command line surface: `NAME KEY=VALUE ...` parsing, typed parameter
//! access and the console responder.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{Result, ValidateError};

/// Single-point check at an explicit location.
pub const VALIDATE_BED_MESH_AT: &str = "VALIDATE_BED_MESH_AT";
/// Five-point validation with optional remesh.
pub const VALIDATE_BED_MESH: &str = "VALIDATE_BED_MESH";

/// A parsed command invocation.
///
/// Parameter names are case-insensitive and stored upper-case; values are
/// kept verbatim and only interpreted by the typed getters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GcodeCommand {
    name: String,
    params: BTreeMap<String, String>,
}

impl GcodeCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insertion.
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_ascii_uppercase(), value.into());
        self
    }

    /// Parse a command line. Text after `;` is a comment.
    ///
    /// Returns `Ok(None)` for blank or comment-only lines.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = match line.split_once(';') {
            Some((code, _comment)) => code,
            None => line,
        };
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            return Ok(None);
        };

        let mut cmd = GcodeCommand::new(name);
        for token in tokens {
            let (key, value) = token.split_once('=').ok_or_else(|| {
                ValidateError::invalid_parameter(token, "expected KEY=VALUE")
            })?;
            if key.is_empty() {
                return Err(ValidateError::invalid_parameter(
                    token,
                    "parameter name is empty",
                ));
            }
            cmd.params
                .insert(key.to_ascii_uppercase(), value.to_string());
        }
        Ok(Some(cmd))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the invocation explicitly carries `key`.
    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(&key.to_ascii_uppercase())
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.params
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Required float parameter.
    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.get_float_opt(key)?.ok_or_else(|| {
            ValidateError::invalid_parameter(key, "missing required parameter")
        })
    }

    pub fn get_float_opt(&self, key: &str) -> Result<Option<f64>> {
        match self.get_str_opt(key) {
            None => Ok(None),
            Some(raw) => parse_finite(raw).map(Some).ok_or_else(|| {
                ValidateError::invalid_parameter(key, format!("'{raw}' is not a number"))
            }),
        }
    }

    /// Boolean parameter accepting `TRUE`, `FALSE`, `1` or `0`.
    pub fn get_bool_opt(&self, key: &str) -> Result<Option<bool>> {
        match self.get_str_opt(key) {
            None => Ok(None),
            Some(raw) => match raw.to_ascii_uppercase().as_str() {
                "TRUE" | "1" => Ok(Some(true)),
                "FALSE" | "0" => Ok(Some(false)),
                _ => Err(ValidateError::invalid_parameter(
                    key,
                    format!("'{raw}' is not TRUE or FALSE"),
                )),
            },
        }
    }
}

impl std::fmt::Display for GcodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.params {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

pub(crate) fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// Console the invoking command reports to.
pub trait Responder: Send + Sync {
    fn respond_info(&self, msg: &str);
}

/// Responder that keeps every line, in order.
#[derive(Debug, Default)]
pub struct CollectingResponder {
    lines: Mutex<Vec<String>>,
}

impl CollectingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Responder for CollectingResponder {
    fn respond_info(&self, msg: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(msg.to_string());
    }
}
