//! The algebra of anonymous (positional) argument shapes.
//!
//! Grammars are only built through the smart constructors below so that
//! every value satisfies the arity rules the dispatcher relies on: a
//! variable-arity shape (`Many`, `Maybe`, `AdHoc`) can only ever be the last
//! element of a `Concat`, and only fixed-arity shapes can be repeated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Grammar {
    #[default]
    Zero,
    One(String),
    Many(Box<Grammar>),
    Maybe(Box<Grammar>),
    Concat(Vec<Grammar>),
    /// Free-form usage text for shapes that predate structured grammars.
    AdHoc(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("anonymous argument name must not be empty")]
    EmptyName,
    #[error("anonymous argument name {0:?} has leading or trailing whitespace")]
    PaddedName(String),
    #[error(
        "the grammar {usage} for anonymous arguments is not supported because it has \
         variable arity and cannot be repeated"
    )]
    RepeatedVariableArity { usage: String },
    #[error(
        "the grammar {following} for anonymous arguments is not supported because it \
         follows the variable number of arguments {variable}"
    )]
    VariableArityNotLast { variable: String, following: String },
}

impl Grammar {
    /// A single named slot.
    pub fn one(name: impl Into<String>) -> Result<Self, GrammarError> {
        let name = name.into();
        if name.is_empty() {
            return Err(GrammarError::EmptyName);
        }
        if name.trim() != name {
            return Err(GrammarError::PaddedName(name));
        }
        Ok(Self::One(name))
    }

    pub fn ad_hoc(usage: impl Into<String>) -> Self {
        Self::AdHoc(usage.into())
    }

    /// Zero or more repetitions of a fixed-arity grammar.
    pub fn many(inner: Grammar) -> Result<Self, GrammarError> {
        match inner {
            Self::Zero => Ok(Self::Zero),
            inner if inner.is_fixed_arity() => Ok(Self::Many(Box::new(inner))),
            inner => Err(GrammarError::RepeatedVariableArity {
                usage: inner.usage(),
            }),
        }
    }

    pub fn maybe(inner: Grammar) -> Self {
        match inner {
            Self::Zero => Self::Zero,
            inner => Self::Maybe(Box::new(inner)),
        }
    }

    /// Sequence grammars left to right.
    ///
    /// Nested concatenations are flattened and `Zero` elements dropped.
    pub fn concat(parts: impl IntoIterator<Item = Grammar>) -> Result<Self, GrammarError> {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Self::Zero => {}
                Self::Concat(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        if let Some(pos) = flat
            .iter()
            .take(flat.len().saturating_sub(1))
            .position(|g| !g.is_fixed_arity())
        {
            let following = flat[pos + 1..]
                .iter()
                .map(Grammar::usage)
                .collect::<Vec<_>>()
                .join(" ");
            return Err(GrammarError::VariableArityNotLast {
                variable: flat[pos].usage(),
                following,
            });
        }

        Ok(match flat.len() {
            0 => Self::Zero,
            1 => flat.remove(0),
            _ => Self::Concat(flat),
        })
    }

    pub fn is_fixed_arity(&self) -> bool {
        match self {
            Self::Zero | Self::One(_) => true,
            Self::Concat(parts) => parts.iter().all(Grammar::is_fixed_arity),
            Self::Many(_) | Self::Maybe(_) | Self::AdHoc(_) => false,
        }
    }

    fn is_atomic(&self) -> bool {
        matches!(self, Self::Zero | Self::One(_))
    }

    /// Render the usage string shown in help text.
    pub fn usage(&self) -> String {
        match self {
            Self::Zero => String::new(),
            Self::One(name) => name.clone(),
            Self::Many(inner) if inner.is_atomic() => format!("[{} ...]", inner.usage()),
            Self::Many(inner) => format!("[({}) ...]", inner.usage()),
            Self::Maybe(inner) => format!("[{}]", inner.usage()),
            Self::Concat(parts) => parts
                .iter()
                .map(Grammar::usage)
                .filter(|u| !u.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            Self::AdHoc(usage) => usage.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(name: &str) -> Grammar {
        Grammar::one(name).unwrap()
    }

    #[test]
    fn many_parenthesizes_only_compound_grammars() {
        assert_eq!(Grammar::many(one("FILE")).unwrap().usage(), "[FILE ...]");
        let pair = Grammar::concat([one("A"), one("B")]).unwrap();
        assert_eq!(Grammar::many(pair).unwrap().usage(), "[(A B) ...]");
    }

    #[test]
    fn zero_collapses() {
        assert_eq!(Grammar::many(Grammar::Zero).unwrap(), Grammar::Zero);
        assert_eq!(Grammar::maybe(Grammar::Zero), Grammar::Zero);
        assert_eq!(
            Grammar::concat([Grammar::Zero, one("A"), Grammar::Zero]).unwrap(),
            one("A")
        );
        assert_eq!(Grammar::concat([]).unwrap(), Grammar::Zero);
    }

    #[test]
    fn variable_arity_must_come_last() {
        let err = Grammar::concat([Grammar::maybe(one("A")), one("B")]).unwrap_err();
        assert_eq!(
            err,
            GrammarError::VariableArityNotLast {
                variable: "[A]".to_string(),
                following: "B".to_string(),
            }
        );

        let ok = Grammar::concat([one("A"), Grammar::maybe(one("B"))]).unwrap();
        assert_eq!(ok.usage(), "A [B]");
    }

    #[test]
    fn concat_flattens_nested_sequences() {
        let inner = Grammar::concat([one("A"), one("B")]).unwrap();
        let outer = Grammar::concat([inner, one("C")]).unwrap();
        assert_eq!(outer, Grammar::Concat(vec![one("A"), one("B"), one("C")]));
    }

    #[test]
    fn many_rejects_variable_arity() {
        let err = Grammar::many(Grammar::maybe(one("X"))).unwrap_err();
        assert!(err.to_string().contains("[X]"), "{err}");
        assert!(Grammar::many(Grammar::ad_hoc("whatever")).is_err());
    }

    #[test]
    fn one_rejects_bad_names() {
        assert_eq!(Grammar::one("").unwrap_err(), GrammarError::EmptyName);
        assert!(matches!(
            Grammar::one(" NAME"),
            Err(GrammarError::PaddedName(_))
        ));
    }

    #[test]
    fn ad_hoc_usage_is_verbatim() {
        let g = Grammar::concat([one("CMD"), Grammar::ad_hoc("[ARGS ...] -- FILES")]).unwrap();
        assert_eq!(g.usage(), "CMD [ARGS ...] -- FILES");
    }
}
