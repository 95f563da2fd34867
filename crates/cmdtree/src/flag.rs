//! Flag combinators.
//!
//! A [`Flag<T>`] is a recipe: every dispatch instantiates it into fresh
//! accumulator state, an action run when the flag appears on the command
//! line, and a reader that produces the final `T` once parsing is over.

use crate::arg_type::{ArgType, Completer};
use crate::env::Env;
use crate::error::{ParseError, SpecError};
use crate::names;
use cmdtree_shape::{FlagShape, Occurrences};
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

pub(crate) type Reader<T> = Box<dyn FnOnce(&mut Env) -> Result<T, ParseError>>;

/// Request to stop dispatching, print `stdout`, and exit with `code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit {
    pub code: i32,
    pub stdout: String,
}

impl Exit {
    pub fn new(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
        }
    }
}

/// Why a flag action stopped the parse.
pub(crate) enum Interrupt {
    Failed(ParseError),
    Exit(Exit),
    Help,
}

impl From<ParseError> for Interrupt {
    fn from(err: ParseError) -> Self {
        Self::Failed(err)
    }
}

pub(crate) enum Action {
    NoArg(Box<dyn FnMut(&mut Env) -> Result<(), Interrupt>>),
    Arg {
        run: Box<dyn FnMut(&mut Env, &str) -> Result<(), Interrupt>>,
        complete: Option<Completer>,
    },
    Rest(Box<dyn FnMut(&mut Env, Vec<String>) -> Result<(), Interrupt>>),
}

pub(crate) struct FlagSlot<T> {
    pub(crate) action: Action,
    pub(crate) supplied: Rc<dyn Fn() -> bool>,
    pub(crate) read: Reader<T>,
}

pub struct Flag<T> {
    pub(crate) occurrences: Occurrences,
    pub(crate) takes_arg: bool,
    instantiate: Rc<dyn Fn(&str) -> FlagSlot<T>>,
}

impl<T> Clone for Flag<T> {
    fn clone(&self) -> Self {
        Self {
            occurrences: self.occurrences,
            takes_arg: self.takes_arg,
            instantiate: Rc::clone(&self.instantiate),
        }
    }
}

enum Slot<T> {
    Unset,
    Set(T),
    Taken,
}

/// Write-once cell backing every single-valued flag.
struct WriteOnce<T> {
    name: String,
    slot: RefCell<Slot<T>>,
}

impl<T> WriteOnce<T> {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slot: RefCell::new(Slot::Unset),
        }
    }

    fn write(&self, value: T) -> Result<(), ParseError> {
        let mut slot = self.slot.borrow_mut();
        match *slot {
            Slot::Unset => {
                *slot = Slot::Set(value);
                Ok(())
            }
            Slot::Set(_) | Slot::Taken => Err(ParseError::PassedMoreThanOnce(self.name.clone())),
        }
    }

    fn is_set(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Set(_))
    }

    fn take(&self) -> Option<T> {
        match mem::replace(&mut *self.slot.borrow_mut(), Slot::Taken) {
            Slot::Set(value) => Some(value),
            Slot::Unset | Slot::Taken => None,
        }
    }
}

type Finish<T, U> = Rc<dyn Fn(&str, Option<T>) -> Result<U, ParseError>>;
type FinishMany<T, U> = Rc<dyn Fn(&str, Vec<T>) -> Result<U, ParseError>>;

impl<T: 'static> Flag<T> {
    pub(crate) fn instantiate(&self, name: &str) -> FlagSlot<T> {
        (self.instantiate)(name)
    }

    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Flag<U> {
        let inner = self.instantiate;
        let f = Rc::new(f);
        Flag {
            occurrences: self.occurrences,
            takes_arg: self.takes_arg,
            instantiate: Rc::new(move |name: &str| {
                let slot = inner(name);
                let f = Rc::clone(&f);
                let read = slot.read;
                FlagSlot {
                    action: slot.action,
                    supplied: slot.supplied,
                    read: Box::new(move |env: &mut Env| read(env).map(|value| f(value))),
                }
            }),
        }
    }
}

fn single<T: 'static, U: 'static>(
    occurrences: Occurrences,
    arg: ArgType<T>,
    finish: Finish<T, U>,
) -> Flag<U> {
    Flag {
        occurrences,
        takes_arg: true,
        instantiate: Rc::new(move |name: &str| {
            let cell = Rc::new(WriteOnce::new(name));
            let arg = arg.clone();
            let complete = arg.completer();
            let write = Rc::clone(&cell);
            let seen = Rc::clone(&cell);
            let finish = Rc::clone(&finish);
            let owned = name.to_string();
            FlagSlot {
                action: Action::Arg {
                    run: Box::new(move |env: &mut Env, token: &str| {
                        let value = arg.parse_value(&write.name, token, env)?;
                        write.write(value)?;
                        Ok(())
                    }),
                    complete,
                },
                supplied: Rc::new(move || seen.is_set()),
                read: Box::new(move |_: &mut Env| finish(&owned, cell.take())),
            }
        }),
    }
}

fn many<T: 'static, U: 'static>(
    occurrences: Occurrences,
    arg: ArgType<T>,
    finish: FinishMany<T, U>,
) -> Flag<U> {
    Flag {
        occurrences,
        takes_arg: true,
        instantiate: Rc::new(move |name: &str| {
            let values: Rc<RefCell<Vec<T>>> = Rc::new(RefCell::new(Vec::new()));
            let arg = arg.clone();
            let complete = arg.completer();
            let push = Rc::clone(&values);
            let seen = Rc::clone(&values);
            let finish = Rc::clone(&finish);
            let owned = name.to_string();
            let action_name = owned.clone();
            FlagSlot {
                action: Action::Arg {
                    run: Box::new(move |env: &mut Env, token: &str| {
                        let value = arg.parse_value(&action_name, token, env)?;
                        push.borrow_mut().push(value);
                        Ok(())
                    }),
                    complete,
                },
                supplied: Rc::new(move || !seen.borrow().is_empty()),
                read: Box::new(move |_: &mut Env| {
                    finish(&owned, mem::take(&mut *values.borrow_mut()))
                }),
            }
        }),
    }
}

/// Must be passed exactly once.
pub fn required<T: 'static>(arg: ArgType<T>) -> Flag<T> {
    single(
        Occurrences::Required,
        arg,
        Rc::new(|name: &str, value: Option<T>| {
            value.ok_or_else(|| ParseError::MissingRequiredFlag(name.to_string()))
        }),
    )
}

pub fn optional<T: 'static>(arg: ArgType<T>) -> Flag<Option<T>> {
    single(
        Occurrences::Optional,
        arg,
        Rc::new(|_: &str, value: Option<T>| Ok(value)),
    )
}

pub fn optional_with_default<T: Clone + 'static>(default: T, arg: ArgType<T>) -> Flag<T> {
    single(
        Occurrences::Optional,
        arg,
        Rc::new(move |_: &str, value: Option<T>| Ok(value.unwrap_or_else(|| default.clone()))),
    )
}

/// May be passed any number of times; values come back in command line order.
pub fn listed<T: 'static>(arg: ArgType<T>) -> Flag<Vec<T>> {
    many(
        Occurrences::Listed,
        arg,
        Rc::new(|_: &str, values: Vec<T>| Ok(values)),
    )
}

pub fn one_or_more<T: 'static>(arg: ArgType<T>) -> Flag<(T, Vec<T>)> {
    many(
        Occurrences::OneOrMore,
        arg,
        Rc::new(|name: &str, values: Vec<T>| {
            let mut values = values.into_iter();
            match values.next() {
                Some(first) => Ok((first, values.collect())),
                None => Err(ParseError::MissingRequiredFlag(name.to_string())),
            }
        }),
    )
}

/// Presence flag.
pub fn no_arg() -> Flag<bool> {
    Flag {
        occurrences: Occurrences::Optional,
        takes_arg: false,
        instantiate: Rc::new(|name: &str| {
            let cell = Rc::new(WriteOnce::new(name));
            let write = Rc::clone(&cell);
            let seen = Rc::clone(&cell);
            FlagSlot {
                action: Action::NoArg(Box::new(move |_: &mut Env| Ok(write.write(())?))),
                supplied: Rc::new(move || seen.is_set()),
                read: Box::new(move |_: &mut Env| Ok(cell.take().is_some())),
            }
        }),
    }
}

/// `Some(value)` when passed.
pub fn no_arg_some<V: Clone + 'static>(value: V) -> Flag<Option<V>> {
    no_arg().map(move |passed| passed.then(|| value.clone()))
}

/// Stops the dispatch as soon as the flag is seen.
pub fn no_arg_abort(exit: Exit) -> Flag<()> {
    Flag {
        occurrences: Occurrences::Optional,
        takes_arg: false,
        instantiate: Rc::new(move |_: &str| {
            let exit = exit.clone();
            FlagSlot {
                action: Action::NoArg(Box::new(move |_: &mut Env| {
                    Err(Interrupt::Exit(exit.clone()))
                })),
                supplied: Rc::new(|| false),
                read: Box::new(|_: &mut Env| Ok(())),
            }
        }),
    }
}

/// Takes every remaining token verbatim.
pub fn escape() -> Flag<Option<Vec<String>>> {
    Flag {
        occurrences: Occurrences::Escape,
        takes_arg: false,
        instantiate: Rc::new(|name: &str| {
            let cell = Rc::new(WriteOnce::new(name));
            let write = Rc::clone(&cell);
            let seen = Rc::clone(&cell);
            FlagSlot {
                action: Action::Rest(Box::new(move |_: &mut Env, rest: Vec<String>| {
                    Ok(write.write(rest)?)
                })),
                supplied: Rc::new(move || seen.is_set()),
                read: Box::new(move |_: &mut Env| Ok(cell.take())),
            }
        }),
    }
}

/// Declaration of a flag name beyond the bare `(name, doc)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagDecl {
    name: String,
    doc: String,
    aliases: Vec<String>,
    full_match_required: bool,
}

impl FlagDecl {
    pub fn new(name: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: doc.into(),
            aliases: Vec::new(),
            full_match_required: false,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Only match the name when typed in full, never by prefix.
    pub fn full_match_required(mut self) -> Self {
        self.full_match_required = true;
        self
    }

    pub(crate) fn into_info<T>(self, flag: &Flag<T>) -> Result<FlagInfo, SpecError> {
        Ok(FlagInfo {
            name: names::flag_name(&self.name)?,
            aliases: self
                .aliases
                .iter()
                .map(|alias| names::flag_name(alias))
                .collect::<Result<_, _>>()?,
            doc: self.doc,
            occurrences: flag.occurrences,
            takes_arg: flag.takes_arg,
            full_match_required: self.full_match_required,
        })
    }
}

/// A validated flag as it appears in a leaf command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FlagInfo {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) doc: String,
    pub(crate) occurrences: Occurrences,
    pub(crate) takes_arg: bool,
    pub(crate) full_match_required: bool,
}

impl FlagInfo {
    fn builtin(name: &str, aliases: &[&str], doc: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            doc: doc.to_string(),
            occurrences: Occurrences::Optional,
            takes_arg: false,
            full_match_required: true,
        }
    }

    pub(crate) fn help() -> Self {
        Self::builtin("-help", &["-?"], "print this help text and exit")
    }

    pub(crate) fn version() -> Self {
        Self::builtin("-version", &[], "print the version of this build and exit")
    }

    pub(crate) fn build_info() -> Self {
        Self::builtin("-build-info", &[], "print info about this build and exit")
    }

    pub(crate) fn is_required(&self) -> bool {
        matches!(self.occurrences, Occurrences::Required | Occurrences::OneOrMore)
    }

    /// Canonical name followed by aliases.
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub(crate) fn to_shape(&self) -> FlagShape {
        FlagShape {
            name: self.name.clone(),
            doc: self.doc.clone(),
            aliases: self.aliases.clone(),
            occurrences: self.occurrences,
            takes_arg: self.takes_arg,
        }
    }
}
