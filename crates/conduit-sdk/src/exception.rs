//! Exception records forwarded from script to exception delegates

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::BridgeValue;

/// Severity of an uncaught script error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recoverable; execution continues
    Soft,
    /// Unrecoverable; the host decides whether to reload
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Soft => f.write_str("soft"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

/// One script stack frame
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source file or bundle URL
    pub file: String,
    /// 1-based line, when known
    pub line: Option<u32>,
    /// 1-based column, when known
    pub column: Option<u32>,
    /// Function name, when known
    pub function: Option<String>,
}

impl StackFrame {
    /// Create a frame with a known position
    pub fn new(file: impl Into<String>, line: u32, column: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
            column: Some(column),
            function: Some(function.into()),
        }
    }

    /// Parse a frame from the map shape script sends:
    /// `{file, lineNumber, column, methodName}`. Missing keys stay `None`.
    pub fn from_script_value(value: &BridgeValue) -> Self {
        let position = |key: &str| {
            value
                .get(key)
                .and_then(BridgeValue::as_i64)
                .and_then(|n| u32::try_from(n).ok())
        };
        Self {
            file: value
                .get("file")
                .and_then(BridgeValue::as_str)
                .unwrap_or_default()
                .to_string(),
            line: position("lineNumber"),
            column: position("column"),
            function: value
                .get("methodName")
                .and_then(BridgeValue::as_str)
                .map(str::to_string),
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.function.as_deref().unwrap_or("<anonymous>"), self.file)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(column) = self.column {
                write!(f, ":{}", column)?;
            }
        }
        Ok(())
    }
}

/// An uncaught script error as seen by exception delegates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    /// Error message
    pub message: String,
    /// Innermost frame first
    pub stack: Vec<StackFrame>,
    /// Soft or fatal
    pub severity: Severity,
    /// Script-assigned id, used to amend a record in place
    pub exception_id: u64,
}

impl fmt::Display for ExceptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} #{}] {}", self.severity, self.exception_id, self.message)?;
        for frame in &self.stack {
            write!(f, "\n    at {}", frame)?;
        }
        Ok(())
    }
}
