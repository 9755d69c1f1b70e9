use hyperdbg_lexer::SourcePos;
use thiserror::Error;

/// Compiler errors. Every variant carries a source position where one is
/// meaningful; the parser never leaves a partial symbol stream visible to
/// the caller on error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: u32, message: String },

    #[error("undefined identifier '{name}' at line {line}")]
    UndefinedIdentifier { name: String, line: u32 },

    #[error("temp slot list exhausted")]
    TempListFull,

    #[error("{kind} variable limit exceeded (max {limit})")]
    VariableLimitExceeded { kind: &'static str, limit: u32 },

    #[error("unknown operator or function '{name}' at line {line}")]
    UnknownOperator { name: String, line: u32 },

    #[error("script exceeds debuggee capability: {0}")]
    CapabilityExceeded(String),
}

impl ParseError {
    pub fn syntax(pos: SourcePos, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line: pos.line,
            message: message.into(),
        }
    }
}
