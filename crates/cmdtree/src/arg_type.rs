//! Value parsers: how a single token becomes a typed value.

use crate::env::{Env, EnvKey};
use crate::error::ParseError;
use anyhow::{anyhow, bail};
use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;

/// Produces completion candidates for a partially typed token.
pub type Completer = Rc<dyn Fn(&Env, &str) -> Vec<String>>;

type Convert<T> = Rc<dyn Fn(&mut Env, &str) -> anyhow::Result<T>>;

/// Conversion of a token into `T`, with optional completion.
pub struct ArgType<T> {
    convert: Convert<T>,
    complete: Option<Completer>,
}

impl<T> Clone for ArgType<T> {
    fn clone(&self) -> Self {
        Self {
            convert: Rc::clone(&self.convert),
            complete: self.complete.clone(),
        }
    }
}

impl<T: 'static> ArgType<T> {
    pub fn new(parse: impl Fn(&str) -> anyhow::Result<T> + 'static) -> Self {
        Self {
            convert: Rc::new(move |_: &mut Env, token: &str| parse(token)),
            complete: None,
        }
    }

    pub fn with_completer(
        mut self,
        complete: impl Fn(&Env, &str) -> Vec<String> + 'static,
    ) -> Self {
        self.complete = Some(Rc::new(complete));
        self
    }

    /// Publish every parsed value into the [`Env`] under `key`.
    pub fn with_key(self, key: EnvKey<T>) -> Self
    where
        T: Clone,
    {
        let inner = self.convert;
        Self {
            convert: Rc::new(move |env: &mut Env, token: &str| {
                let value = inner(env, token)?;
                env.set(&key, value.clone());
                Ok(value)
            }),
            complete: self.complete,
        }
    }

    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> ArgType<U> {
        let inner = self.convert;
        ArgType {
            convert: Rc::new(move |env: &mut Env, token: &str| inner(env, token).map(&f)),
            complete: self.complete,
        }
    }

    pub fn completer(&self) -> Option<Completer> {
        self.complete.clone()
    }

    pub fn complete(&self, env: &Env, partial: &str) -> Vec<String> {
        match &self.complete {
            Some(complete) => complete(env, partial),
            None => Vec::new(),
        }
    }

    /// Convert `token` for the slot or flag called `name`.
    ///
    /// A conversion that panics is reported like one that returned an error.
    pub(crate) fn parse_value(
        &self,
        name: &str,
        token: &str,
        env: &mut Env,
    ) -> Result<T, ParseError> {
        let converted = panic::catch_unwind(AssertUnwindSafe(|| (self.convert)(env, token)))
            .unwrap_or_else(|payload| {
                Err(anyhow!("conversion panicked: {}", panic_message(&*payload)))
            });
        converted.map_err(|err| ParseError::InvalidValue {
            name: name.to_string(),
            value: token.to_string(),
            message: format!("{err:#}"),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&str>() {
        Some(message) => *message,
        None => payload.downcast_ref::<String>().map_or("unknown cause", String::as_str),
    }
}

pub fn string() -> ArgType<String> {
    ArgType::new(|token| Ok(token.to_string()))
}

pub fn int() -> ArgType<i64> {
    from_str()
}

pub fn float() -> ArgType<f64> {
    from_str()
}

pub fn bool() -> ArgType<bool> {
    ArgType::new(|token| match token.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("expected true or false"),
    })
    .with_completer(|_, partial| prefixed(["false", "true"], partial))
}

/// Any type with a [`FromStr`] implementation.
pub fn from_str<T>() -> ArgType<T>
where
    T: FromStr + 'static,
    T::Err: Display,
{
    ArgType::new(|token| token.parse::<T>().map_err(|err| anyhow!("{err}")))
}

/// A filesystem path, completed from the directory it points into.
pub fn file() -> ArgType<PathBuf> {
    ArgType::new(|token| Ok(PathBuf::from(token)))
        .with_completer(|_, partial| complete_path(partial))
}

/// One of a fixed set of names.
pub fn of_alist<S, T>(pairs: impl IntoIterator<Item = (S, T)>) -> ArgType<T>
where
    S: Into<String>,
    T: Clone + 'static,
{
    let pairs: Rc<Vec<(String, T)>> =
        Rc::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect());
    let names = Rc::clone(&pairs);
    ArgType::new(move |token| {
        pairs
            .iter()
            .find(|(name, _)| name == token)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| {
                let valid: Vec<&str> = pairs.iter().map(|(name, _)| name.as_str()).collect();
                anyhow!("valid arguments: {}", valid.join(", "))
            })
    })
    .with_completer(move |_, partial| {
        prefixed(names.iter().map(|(name, _)| name.as_str()), partial)
    })
}

/// A comma separated list where every element uses `inner`.
///
/// The empty string parses to an empty list.
pub fn comma_separated<T: 'static>(inner: ArgType<T>) -> ArgType<Vec<T>> {
    let convert = Rc::clone(&inner.convert);
    let complete = inner.complete;
    ArgType {
        convert: Rc::new(move |env: &mut Env, token: &str| {
            if token.is_empty() {
                return Ok(Vec::new());
            }
            token.split(',').map(|piece| convert(env, piece)).collect()
        }),
        complete: complete.map(|complete| -> Completer {
            Rc::new(move |env: &Env, partial: &str| {
                let (done, last) = match partial.rfind(',') {
                    Some(idx) => partial.split_at(idx + 1),
                    None => ("", partial),
                };
                complete(env, last)
                    .into_iter()
                    .map(|candidate| format!("{done}{candidate}"))
                    .collect()
            })
        }),
    }
}

fn prefixed<'a>(names: impl IntoIterator<Item = &'a str>, partial: &str) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| name.starts_with(partial))
        .map(str::to_string)
        .collect()
}

fn complete_path(partial: &str) -> Vec<String> {
    let (dir, base) = match partial.rfind('/') {
        Some(idx) => partial.split_at(idx + 1),
        None => ("", partial),
    };
    let search = if dir.is_empty() { Path::new(".") } else { Path::new(dir) };
    let Ok(entries) = std::fs::read_dir(search) else {
        return Vec::new();
    };

    let mut out: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.starts_with(base) || (name.starts_with('.') && !base.starts_with('.')) {
                return None;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            Some(if is_dir {
                format!("{dir}{name}/")
            } else {
                format!("{dir}{name}")
            })
        })
        .collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn parse<T: 'static>(arg: &ArgType<T>, token: &str) -> Result<T, ParseError> {
        arg.parse_value("-x", token, &mut Env::new())
    }

    #[test]
    fn conversion_failures_name_the_slot_and_token() {
        let err = parse(&int(), "seven").unwrap_err();
        match err {
            ParseError::InvalidValue { name, value, message } => {
                assert_eq!(name, "-x");
                assert_eq!(value, "seven");
                assert!(message.contains("invalid digit"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(parse(&int(), "-12").unwrap(), -12);
        assert_eq!(parse(&float(), "2.5").unwrap(), 2.5);
    }

    #[test]
    fn bool_is_case_insensitive_and_completes() {
        assert!(parse(&bool(), "TRUE").unwrap());
        assert!(!parse(&bool(), "False").unwrap());
        assert!(parse(&bool(), "yes").is_err());
        assert_eq!(bool().complete(&Env::new(), "t"), vec!["true"]);
        assert_eq!(bool().complete(&Env::new(), ""), vec!["false", "true"]);
    }

    #[test]
    fn of_alist_accepts_exact_names_only() {
        let level = of_alist([("debug", 0), ("info", 1), ("warn", 2)]);
        assert_eq!(parse(&level, "info").unwrap(), 1);
        let err = parse(&level, "inf").unwrap_err().to_string();
        assert!(err.contains("valid arguments: debug, info, warn"), "{err}");
        assert_eq!(level.complete(&Env::new(), "d"), vec!["debug"]);
    }

    #[test]
    fn comma_separated_parses_and_completes_last_piece() {
        let list = comma_separated(of_alist([("red", 'r'), ("green", 'g'), ("grey", 'y')]));
        assert_eq!(parse(&list, "red,grey").unwrap(), vec!['r', 'y']);
        assert_eq!(parse(&list, "").unwrap(), Vec::<char>::new());
        assert!(parse(&list, "red,blue").is_err());
        assert_eq!(
            list.complete(&Env::new(), "red,g"),
            vec!["red,green", "red,grey"]
        );
    }

    #[test]
    fn panicking_conversions_become_invalid_values() {
        let byte = ArgType::new(|token: &str| Ok(token.parse::<u8>().unwrap()));
        assert_eq!(byte.parse_value("N", "200", &mut Env::new()).unwrap(), 200);
        match byte.parse_value("N", "300", &mut Env::new()) {
            Err(ParseError::InvalidValue { name, value, message }) => {
                assert_eq!((name.as_str(), value.as_str()), ("N", "300"));
                assert!(message.starts_with("conversion panicked: "), "{message}");
            }
            other => panic!("expected an invalid value, got {other:?}"),
        }
    }

    #[test]
    fn keyed_values_are_published() {
        let key = EnvKey::new("repo");
        let arg = string().with_key(key).map(|s| s.len());
        let mut env = Env::new();
        assert_eq!(arg.parse_value("REPO", "cmdtree", &mut env).unwrap(), 7);
        assert_eq!(env.get(&key).map(String::as_str), Some("cmdtree"));
    }

    #[test]
    fn completers_see_published_values() {
        let key = EnvKey::new("prefix");
        let arg = string().with_completer(move |env: &Env, partial: &str| {
            let prefix = env.get(&key).cloned().unwrap_or_default();
            vec![format!("{prefix}{partial}")]
        });
        let mut env = Env::new();
        env.set(&key, "x-".to_string());
        assert_eq!(arg.complete(&env, "y"), vec!["x-y"]);
        assert!(string().complete(&env, "y").is_empty());
    }

    #[test]
    fn file_completion_lists_directory_entries() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before UNIX_EPOCH")
            .as_nanos();
        let pid = std::process::id();
        let dir = std::env::temp_dir().join(format!("cmdtree-files-{pid}-{nanos}"));
        fs::create_dir_all(dir.join("subdir")).unwrap();
        fs::write(dir.join("notes.txt"), "").unwrap();
        fs::write(dir.join(".hidden"), "").unwrap();

        let root = format!("{}/", dir.display());
        let all = file().complete(&Env::new(), &root);
        assert_eq!(all, vec![format!("{root}notes.txt"), format!("{root}subdir/")]);

        let hidden = file().complete(&Env::new(), &format!("{root}."));
        assert_eq!(hidden, vec![format!("{root}.hidden")]);

        fs::remove_dir_all(&dir).unwrap();
    }
}
