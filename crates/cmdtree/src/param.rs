//! Applicative composition of flags and anonymous arguments.
//!
//! A [`Param<T>`] knows which flags it declares and which grammar its
//! anonymous arguments follow. At dispatch time it registers fresh flag
//! actions and positional consumers into a [`Registry`] and hands back a
//! reader that computes `T` once the whole command line has been consumed.

use crate::anons::{AnonStep, Anons};
use crate::env::{Env, EnvKey};
use crate::error::{ParseError, SpecError};
use crate::flag::{Action, Flag, FlagDecl, FlagInfo, Reader};
use cmdtree_shape::Grammar;
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

pub(crate) struct RegisteredFlag {
    pub(crate) info: FlagInfo,
    pub(crate) action: Action,
    pub(crate) supplied: Rc<dyn Fn() -> bool>,
}

/// Per-dispatch state a [`Param`] registers into.
pub(crate) struct Registry {
    pub(crate) flags: Vec<RegisteredFlag>,
    pub(crate) anons: AnonStep<()>,
    path: Vec<String>,
    args: Vec<String>,
}

impl Registry {
    pub(crate) fn new(path: Vec<String>, args: Vec<String>) -> Self {
        Self {
            flags: Vec::new(),
            anons: AnonStep::Done(Ok(())),
            path,
            args,
        }
    }
}

type Build<T> = Rc<dyn Fn(&mut Registry) -> Reader<T>>;

pub struct Param<T> {
    pub(crate) flags: Result<Vec<FlagInfo>, SpecError>,
    pub(crate) grammar: Result<Grammar, SpecError>,
    pub(crate) build: Build<T>,
}

impl<T> Clone for Param<T> {
    fn clone(&self) -> Self {
        Self {
            flags: self.flags.clone(),
            grammar: self.grammar.clone(),
            build: Rc::clone(&self.build),
        }
    }
}

fn merge_flags(
    parts: impl IntoIterator<Item = Result<Vec<FlagInfo>, SpecError>>,
) -> Result<Vec<FlagInfo>, SpecError> {
    let mut all = Vec::new();
    for part in parts {
        all.extend(part?);
    }
    Ok(all)
}

fn merge_grammars(
    parts: impl IntoIterator<Item = Result<Grammar, SpecError>>,
) -> Result<Grammar, SpecError> {
    let parts = parts.into_iter().collect::<Result<Vec<_>, _>>()?;
    Ok(Grammar::concat(parts)?)
}

impl<T: 'static> Param<T> {
    fn from_reader(build: impl Fn(&mut Registry) -> Reader<T> + 'static) -> Self {
        Self {
            flags: Ok(Vec::new()),
            grammar: Ok(Grammar::Zero),
            build: Rc::new(build),
        }
    }

    pub fn pure(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_reader(move |_| {
            let value = value.clone();
            Box::new(move |_: &mut Env| Ok(value))
        })
    }

    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Param<U> {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Like [`Param::map`], but the conversion may reject the value.
    pub fn try_map<U: 'static>(self, f: impl Fn(T) -> Result<U, ParseError> + 'static) -> Param<U> {
        let build = self.build;
        let f = Rc::new(f);
        Param {
            flags: self.flags,
            grammar: self.grammar,
            build: Rc::new(move |reg: &mut Registry| -> Reader<U> {
                let read = build(reg);
                let f = Rc::clone(&f);
                Box::new(move |env: &mut Env| read(env).and_then(|value| f(value)))
            }),
        }
    }

    pub fn both<U: 'static>(self, other: Param<U>) -> Param<(T, U)> {
        let (left, right) = (self.build, other.build);
        Param {
            flags: merge_flags([self.flags, other.flags]),
            grammar: merge_grammars([self.grammar, other.grammar]),
            build: Rc::new(move |reg: &mut Registry| -> Reader<(T, U)> {
                let read_left = left(reg);
                let read_right = right(reg);
                Box::new(move |env: &mut Env| Ok((read_left(env)?, read_right(env)?)))
            }),
        }
    }

    pub fn map2<A: 'static, B: 'static>(
        a: Param<A>,
        b: Param<B>,
        f: impl Fn(A, B) -> T + 'static,
    ) -> Self {
        a.both(b).map(move |(a, b)| f(a, b))
    }

    pub fn map3<A: 'static, B: 'static, C: 'static>(
        a: Param<A>,
        b: Param<B>,
        c: Param<C>,
        f: impl Fn(A, B, C) -> T + 'static,
    ) -> Self {
        a.both(b).both(c).map(move |((a, b), c)| f(a, b, c))
    }

    /// Apply a parsed function to a parsed argument.
    pub fn apply<A: 'static, U: 'static>(self, arg: Param<A>) -> Param<U>
    where
        T: FnOnce(A) -> U,
    {
        self.both(arg).map(|(f, a)| f(a))
    }

    pub fn flag(name: impl Into<String>, flag: Flag<T>, doc: impl Into<String>) -> Self {
        Self::flag_with(FlagDecl::new(name, doc), flag)
    }

    pub fn flag_with(decl: FlagDecl, flag: Flag<T>) -> Self {
        let info = decl.into_info(&flag);
        let registered = info.clone();
        Self {
            flags: info.map(|info| vec![info]),
            grammar: Ok(Grammar::Zero),
            build: Rc::new(move |reg: &mut Registry| -> Reader<T> {
                let info = match &registered {
                    Ok(info) => info.clone(),
                    Err(err) => {
                        let err = err.clone();
                        return Box::new(move |_: &mut Env| {
                            Err(ParseError::Custom(err.to_string()))
                        });
                    }
                };
                let slot = flag.instantiate(&info.name);
                reg.flags.push(RegisteredFlag {
                    info,
                    action: slot.action,
                    supplied: slot.supplied,
                });
                slot.read
            }),
        }
    }

    /// Anonymous arguments, consumed after those of earlier params.
    pub fn anon(anons: Anons<T>) -> Self {
        let start = anons.start;
        Self {
            flags: Ok(Vec::new()),
            grammar: anons.grammar.map_err(SpecError::from),
            build: Rc::new(move |reg: &mut Registry| -> Reader<T> {
                let cell: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
                let sink = Rc::clone(&cell);
                let start = Rc::clone(&start);
                let before = mem::replace(&mut reg.anons, AnonStep::Done(Ok(())));
                reg.anons = before.and_then(move |earlier| {
                    start().and_then(move |parsed| {
                        AnonStep::Done(earlier.and_then(|()| {
                            *sink.borrow_mut() = Some(parsed?);
                            Ok(())
                        }))
                    })
                });
                Box::new(move |_: &mut Env| {
                    cell.borrow_mut().take().ok_or_else(|| {
                        ParseError::Custom("anonymous arguments were not parsed".to_string())
                    })
                })
            }),
        }
    }
}

impl Param<Vec<String>> {
    /// Path of the running command, program name first.
    pub fn path() -> Self {
        Self::from_reader(|reg| {
            let path = reg.path.clone();
            Box::new(move |_: &mut Env| Ok(path))
        })
    }

    /// Every token handed to the running command, unparsed.
    pub fn args() -> Self {
        Self::from_reader(|reg| {
            let args = reg.args.clone();
            Box::new(move |_: &mut Env| Ok(args))
        })
    }
}

impl<T: Clone + 'static> Param<Option<T>> {
    /// The last value published under `key` during this dispatch.
    pub fn env_value(key: EnvKey<T>) -> Self {
        Self::from_reader(move |_| Box::new(move |env: &mut Env| Ok(env.get(&key).cloned())))
    }
}

fn describe<T>(params: &[Param<Option<T>>]) -> String {
    params
        .iter()
        .map(|param| match &param.flags {
            Ok(flags) if !flags.is_empty() => flags
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(","),
            _ => "(anonymous)".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// At most one of `params` may produce a value.
pub fn choose_one_optional<T: 'static>(params: Vec<Param<Option<T>>>) -> Param<Option<T>> {
    let names = Rc::new(describe(&params));
    let builds: Vec<Build<Option<T>>> = params.iter().map(|p| Rc::clone(&p.build)).collect();
    Param {
        flags: merge_flags(params.iter().map(|p| p.flags.clone())),
        grammar: merge_grammars(params.iter().map(|p| p.grammar.clone())),
        build: Rc::new(move |reg: &mut Registry| -> Reader<Option<T>> {
            let readers: Vec<Reader<Option<T>>> = builds.iter().map(|build| build(reg)).collect();
            let names = Rc::clone(&names);
            Box::new(move |env: &mut Env| {
                let mut chosen = Vec::new();
                for read in readers {
                    if let Some(value) = read(env)? {
                        chosen.push(value);
                    }
                }
                if chosen.len() > 1 {
                    return Err(ParseError::MoreThanOneChosen(names.to_string()));
                }
                Ok(chosen.pop())
            })
        }),
    }
}

/// Exactly one of `params` must produce a value.
pub fn choose_one<T: 'static>(params: Vec<Param<Option<T>>>) -> Param<T> {
    let names = describe(&params);
    choose_one_optional(params)
        .try_map(move |chosen| chosen.ok_or_else(|| ParseError::NothingChosen(names.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anons;
    use crate::arg_type;
    use crate::flag;

    /// Drive a param by hand: flags are matched by exact name only.
    fn parse<T: 'static>(param: &Param<T>, tokens: &[&str]) -> Result<T, ParseError> {
        let mut env = Env::new();
        let words = tokens.iter().map(|t| t.to_string()).collect();
        let mut reg = Registry::new(vec!["prog".into()], words);
        let read = (param.build)(&mut reg);
        let Registry { mut flags, mut anons, .. } = reg;
        let mut tokens = tokens.iter();
        while let Some(token) = tokens.next() {
            if let Some(flag) = flags.iter_mut().find(|f| f.info.names().any(|n| n == *token)) {
                let result = match &mut flag.action {
                    Action::NoArg(run) => run(&mut env),
                    Action::Arg { run, .. } => {
                        let value = tokens.next().expect("flag value");
                        run(&mut env, value)
                    }
                    Action::Rest(run) => {
                        run(&mut env, tokens.by_ref().map(|t| t.to_string()).collect())
                    }
                };
                match result {
                    Ok(()) => {}
                    Err(crate::flag::Interrupt::Failed(err)) => return Err(err),
                    Err(_) => panic!("unexpected interrupt"),
                }
            } else {
                anons = anons.feed(&mut env, token)?;
            }
        }
        anons.finish()?;
        read(&mut env)
    }

    #[test]
    fn pure_then_map_is_map_then_pure() {
        let left = Param::pure(20).map(|x| x + 1);
        let right = Param::pure(21);
        assert_eq!(parse(&left, &[]).unwrap(), parse(&right, &[]).unwrap());
    }

    #[test]
    fn flag_declaration_order_does_not_matter() {
        let f1 = || Param::flag("-flag1", flag::required(arg_type::string()), "");
        let f2 = || Param::flag("-flag2", flag::required(arg_type::string()), "");
        let forward = Param::map2(f1(), f2(), |a, b| (a, b));
        let backward = Param::map2(f2(), f1(), |b, a| (a, b));
        let tokens = ["-flag1", "x", "-flag2", "y"];
        assert_eq!(parse(&forward, &tokens).unwrap(), parse(&backward, &tokens).unwrap());
        assert_eq!(
            parse(&forward, &tokens).unwrap(),
            ("x".to_string(), "y".to_string())
        );
    }

    #[test]
    fn anons_consume_in_declaration_order() {
        let src = Param::anon(anons::one("SRC", arg_type::string()));
        let dst = Param::anon(anons::one("DST", arg_type::string()));
        let copy = src.both(dst);
        assert_eq!(copy.grammar.clone().unwrap().usage(), "SRC DST");
        assert_eq!(
            parse(&copy, &["a", "b"]).unwrap(),
            ("a".to_string(), "b".to_string())
        );
    }

    #[test]
    fn variable_arity_must_be_declared_last() {
        let rest = Param::anon(anons::sequence(anons::one("FILE", arg_type::string())));
        let last = Param::anon(anons::one("DEST", arg_type::string()));
        let bad = rest.both(last);
        assert!(matches!(bad.grammar, Err(SpecError::Grammar(_))));
    }

    #[test]
    fn apply_feeds_a_parsed_function() {
        let add = Param::flag("-by", flag::optional_with_default(1, arg_type::int()), "")
            .map(|by| move |x: i64| x + by);
        let sum = add.apply(Param::anon(anons::one("X", arg_type::int())));
        assert_eq!(parse(&sum, &["-by", "5", "10"]).unwrap(), 15);
        assert_eq!(parse(&sum, &["10"]).unwrap(), 11);
    }

    #[test]
    fn choose_one_rejects_none_and_many() {
        let pick = || {
            choose_one(vec![
                Param::flag("-red", flag::no_arg_some("red"), ""),
                Param::flag("-blue", flag::no_arg_some("blue"), ""),
            ])
        };
        assert_eq!(parse(&pick(), &["-blue"]).unwrap(), "blue");
        assert_eq!(
            parse(&pick(), &[]).unwrap_err(),
            ParseError::NothingChosen("-red, -blue".into())
        );
        assert_eq!(
            parse(&pick(), &["-red", "-blue"]).unwrap_err(),
            ParseError::MoreThanOneChosen("-red, -blue".into())
        );
    }

    #[test]
    fn path_args_and_env_values() {
        let key = EnvKey::new("region");
        let param = Param::map3(
            Param::path(),
            Param::flag("-region", flag::optional(arg_type::string().with_key(key)), ""),
            Param::env_value(key),
            |path, _, published| (path, published),
        )
        .both(Param::args());
        let ((path, published), args) = parse(&param, &["-region", "eu"]).unwrap();
        assert_eq!(path, vec!["prog"]);
        assert_eq!(published.as_deref(), Some("eu"));
        assert_eq!(args, vec!["-region", "eu"]);
    }

    #[test]
    fn bad_flag_names_surface_as_spec_errors() {
        let param = Param::flag("no_underscores", flag::no_arg(), "");
        assert!(matches!(param.flags, Err(SpecError::BadName { .. })));
    }
}
