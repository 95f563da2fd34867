use cmdtree_shape::{GrammarError, ShapeError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Flag,
    Subcommand,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => f.write_str("flag"),
            Self::Subcommand => f.write_str("subcommand"),
        }
    }
}

/// A mistake in how a command was declared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("invalid {kind} name {name:?}: {reason}")]
    BadName {
        kind: NameKind,
        name: String,
        reason: &'static str,
    },
    #[error("{kind} name {name} is declared more than once")]
    Duplicate { kind: NameKind, name: String },
    #[error("{kind} name {name} is reserved")]
    Reserved { kind: NameKind, name: String },
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

/// A problem with the command line the user typed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown flag {0}")]
    UnknownFlag(String),
    #[error("unknown subcommand {0}")]
    UnknownSubcommand(String),
    #[error("{kind} {prefix} is an ambiguous prefix: {}", .candidates.join(", "))]
    AmbiguousPrefix {
        kind: NameKind,
        prefix: String,
        candidates: Vec<String>,
    },
    #[error("missing required flag: {0}")]
    MissingRequiredFlag(String),
    #[error("missing argument for flag {0}")]
    MissingFlagArgument(String),
    #[error("missing anonymous argument: {0}")]
    MissingAnon(String),
    #[error("too many anonymous arguments")]
    TooManyAnons,
    #[error("flag {0} passed more than once")]
    PassedMoreThanOnce(String),
    #[error("failed to parse {name} value {value:?}: {message}")]
    InvalidValue {
        name: String,
        value: String,
        message: String,
    },
    #[error("missing subcommand for command {0}")]
    MissingSubcommand(String),
    #[error("must pass one of these: {0}")]
    NothingChosen(String),
    #[error("cannot pass more than one of these: {0}")]
    MoreThanOneChosen(String),
    #[error("{0}")]
    Custom(String),
}

/// Invalid values in the environment variables that select the dispatch mode.
#[derive(Debug, Error)]
pub enum ModeError {
    #[error("invalid completion cursor {0:?}")]
    BadCursor(String),
    #[error("invalid shape version set: {0}")]
    BadVersions(#[source] ShapeError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{error}")]
    Parse {
        error: ParseError,
        path: String,
        help: String,
    },
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("shape query of {} failed: {reason}", .program.display())]
    ShapeQuery { program: PathBuf, reason: String },
    #[error("{0:#}")]
    Host(anyhow::Error),
    #[error("{0:#}")]
    Body(anyhow::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_the_documented_wording() {
        assert_eq!(
            ParseError::MissingRequiredFlag("-name".into()).to_string(),
            "missing required flag: -name"
        );
        assert_eq!(
            ParseError::TooManyAnons.to_string(),
            "too many anonymous arguments"
        );
        let ambiguous = ParseError::AmbiguousPrefix {
            kind: NameKind::Subcommand,
            prefix: "st".into(),
            candidates: vec!["start".into(), "stop".into()],
        };
        assert_eq!(
            ambiguous.to_string(),
            "subcommand st is an ambiguous prefix: start, stop"
        );
    }
}
