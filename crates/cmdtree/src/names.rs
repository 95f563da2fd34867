//! Name validation and prefix lookup for flags and subcommands.

use crate::error::{NameKind, ParseError, SpecError};

fn check(kind: NameKind, name: &str, bare: &str) -> Result<(), SpecError> {
    let reason = if bare.is_empty() {
        Some("must not be empty")
    } else if bare.contains('_') {
        Some("underscores are not allowed")
    } else if bare.chars().any(char::is_whitespace) {
        Some("whitespace is not allowed")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SpecError::BadName {
            kind,
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Canonical flag name: always starts with `-`.
///
/// `--` on its own is accepted, as the conventional escape flag.
pub(crate) fn flag_name(raw: &str) -> Result<String, SpecError> {
    if raw == "--" {
        return Ok(raw.to_string());
    }
    let name = if raw.starts_with('-') {
        raw.to_string()
    } else {
        format!("-{raw}")
    };
    check(NameKind::Flag, raw, name.trim_start_matches('-'))?;
    Ok(name)
}

/// Canonical subcommand name: lowercase, never starting with `-`.
pub(crate) fn subcommand_name(raw: &str) -> Result<String, SpecError> {
    if raw.starts_with('-') {
        return Err(SpecError::BadName {
            kind: NameKind::Subcommand,
            name: raw.to_string(),
            reason: "must not start with -",
        });
    }
    check(NameKind::Subcommand, raw, raw)?;
    Ok(raw.to_lowercase())
}

pub(crate) struct Candidate<V> {
    pub(crate) key: String,
    pub(crate) value: V,
    pub(crate) full_match_required: bool,
}

/// Resolve `input` against `candidates`.
///
/// An exact key always wins. Otherwise every key `input` is a prefix of is a
/// match, unless that key requires a full match; keys leading to the same
/// value count once.
pub(crate) fn lookup<V: Copy + PartialEq>(
    kind: NameKind,
    candidates: &[Candidate<V>],
    input: &str,
) -> Result<V, ParseError> {
    if let Some(exact) = candidates.iter().find(|c| c.key == input) {
        return Ok(exact.value);
    }

    let mut matches: Vec<&Candidate<V>> = Vec::new();
    for candidate in candidates {
        if !candidate.full_match_required
            && candidate.key.starts_with(input)
            && !matches.iter().any(|m| m.value == candidate.value)
        {
            matches.push(candidate);
        }
    }

    match matches.as_slice() {
        [] => Err(match kind {
            NameKind::Flag => ParseError::UnknownFlag(input.to_string()),
            NameKind::Subcommand => ParseError::UnknownSubcommand(input.to_string()),
        }),
        [only] => Ok(only.value),
        several => {
            let mut names: Vec<String> = several.iter().map(|c| c.key.clone()).collect();
            names.sort();
            Err(ParseError::AmbiguousPrefix {
                kind,
                prefix: input.to_string(),
                candidates: names,
            })
        }
    }
}

/// Position of the subcommand `word` selects among `names`.
///
/// Matching is case-insensitive; an exact name wins over a unique prefix.
pub fn find_subcommand<'a>(
    names: impl IntoIterator<Item = &'a str>,
    word: &str,
) -> Result<usize, ParseError> {
    let candidates: Vec<Candidate<usize>> = names
        .into_iter()
        .enumerate()
        .map(|(value, key)| Candidate {
            key: key.to_string(),
            value,
            full_match_required: false,
        })
        .collect();
    lookup(NameKind::Subcommand, &candidates, &word.to_lowercase())
}
