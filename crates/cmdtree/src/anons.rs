//! Typed anonymous (positional) arguments.
//!
//! An [`Anons<T>`] pairs a [`Grammar`] describing its usage with an
//! incremental parser that is fed one token at a time.

use crate::arg_type::{ArgType, Completer};
use crate::env::Env;
use crate::error::ParseError;
use cmdtree_shape::{Grammar, GrammarError};
use std::rc::Rc;

type Next<T> = Box<dyn FnOnce(&mut Env, &str) -> Result<AnonStep<T>, ParseError>>;

/// State of an incremental positional parse.
pub(crate) enum AnonStep<T> {
    /// Nothing more to consume. An `Err` here is a deferred failure kept so
    /// that a completion run can continue past a slot that did not convert.
    Done(Result<T, ParseError>),
    /// Waiting for the token of slot `name`.
    More {
        name: String,
        complete: Option<Completer>,
        next: Next<T>,
    },
    /// Branches on whether another token is available.
    Test(Box<dyn FnOnce(bool) -> AnonStep<T>>),
}

impl<T: 'static> AnonStep<T> {
    pub(crate) fn and_then<U: 'static>(
        self,
        f: impl FnOnce(Result<T, ParseError>) -> AnonStep<U> + 'static,
    ) -> AnonStep<U> {
        match self {
            Self::Done(result) => f(result),
            Self::More { name, complete, next } => AnonStep::More {
                name,
                complete,
                next: Box::new(move |env: &mut Env, token: &str| Ok(next(env, token)?.and_then(f))),
            },
            Self::Test(branch) => AnonStep::Test(Box::new(move |more| branch(more).and_then(f))),
        }
    }

    pub(crate) fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> AnonStep<U> {
        self.and_then(move |result| AnonStep::Done(result.map(f)))
    }

    pub(crate) fn feed(self, env: &mut Env, token: &str) -> Result<AnonStep<T>, ParseError> {
        match self {
            Self::Done(_) => Err(ParseError::TooManyAnons),
            Self::More { next, .. } => next(env, token),
            Self::Test(branch) => branch(true).feed(env, token),
        }
    }

    pub(crate) fn finish(self) -> Result<T, ParseError> {
        match self {
            Self::Done(result) => result,
            Self::More { name, .. } => Err(ParseError::MissingAnon(name)),
            Self::Test(branch) => branch(false).finish(),
        }
    }

    /// Candidates for the slot the next token would fill.
    pub(crate) fn complete(self, env: &Env, partial: &str) -> Vec<String> {
        match self {
            Self::Done(_) => Vec::new(),
            Self::More { complete, .. } => complete.map(|c| c(env, partial)).unwrap_or_default(),
            Self::Test(branch) => branch(true).complete(env, partial),
        }
    }
}

pub struct Anons<T> {
    pub(crate) grammar: Result<Grammar, GrammarError>,
    pub(crate) start: Rc<dyn Fn() -> AnonStep<T>>,
}

impl<T> Clone for Anons<T> {
    fn clone(&self) -> Self {
        Self {
            grammar: self.grammar.clone(),
            start: Rc::clone(&self.start),
        }
    }
}

impl<T: 'static> Anons<T> {
    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Anons<U> {
        let start = self.start;
        let f = Rc::new(f);
        Anons {
            grammar: self.grammar,
            start: Rc::new(move || {
                let f = Rc::clone(&f);
                start().map(move |value| f(value))
            }),
        }
    }

    pub fn grammar(&self) -> Result<Grammar, GrammarError> {
        self.grammar.clone()
    }
}

fn concat(parts: &[&Result<Grammar, GrammarError>]) -> Result<Grammar, GrammarError> {
    let parts = parts
        .iter()
        .map(|part| (*part).clone())
        .collect::<Result<Vec<_>, _>>()?;
    Grammar::concat(parts)
}

/// Exactly one token.
pub fn one<T: 'static>(name: impl Into<String>, arg: ArgType<T>) -> Anons<T> {
    let name = name.into();
    Anons {
        grammar: Grammar::one(name.clone()),
        start: Rc::new(move || {
            let arg = arg.clone();
            let slot = name.clone();
            AnonStep::More {
                name: name.clone(),
                complete: arg.completer(),
                next: Box::new(move |env: &mut Env, token: &str| {
                    match arg.parse_value(&slot, token, env) {
                        Ok(value) => Ok(AnonStep::Done(Ok(value))),
                        Err(err) if env.is_completing() => Ok(AnonStep::Done(Err(err))),
                        Err(err) => Err(err),
                    }
                }),
            }
        }),
    }
}

/// `inner` if any tokens are left, `None` otherwise.
pub fn maybe<T: 'static>(inner: Anons<T>) -> Anons<Option<T>> {
    let start = inner.start;
    Anons {
        grammar: inner.grammar.map(Grammar::maybe),
        start: Rc::new(move || {
            let start = Rc::clone(&start);
            AnonStep::Test(Box::new(move |more| {
                if more {
                    start().map(Some)
                } else {
                    AnonStep::Done(Ok(None))
                }
            }))
        }),
    }
}

pub fn maybe_with_default<T: Clone + 'static>(default: T, inner: Anons<T>) -> Anons<T> {
    maybe(inner).map(move |value| value.unwrap_or_else(|| default.clone()))
}

fn repeat<T: 'static>(
    start: Rc<dyn Fn() -> AnonStep<T>>,
    acc: Result<Vec<T>, ParseError>,
) -> AnonStep<Vec<T>> {
    AnonStep::Test(Box::new(move |more| {
        if !more {
            return AnonStep::Done(acc);
        }
        let again = Rc::clone(&start);
        start().and_then(move |item| {
            let acc = match (acc, item) {
                (Ok(mut values), Ok(value)) => {
                    values.push(value);
                    Ok(values)
                }
                (Err(err), _) | (_, Err(err)) => Err(err),
            };
            repeat(again, acc)
        })
    }))
}

/// Zero or more repetitions of `inner`, which must have fixed arity.
pub fn sequence<T: 'static>(inner: Anons<T>) -> Anons<Vec<T>> {
    let start = inner.start;
    Anons {
        grammar: inner.grammar.and_then(Grammar::many),
        start: Rc::new(move || repeat(Rc::clone(&start), Ok(Vec::new()))),
    }
}

pub fn non_empty_sequence<T: 'static>(inner: Anons<T>) -> Anons<(T, Vec<T>)> {
    let repeated = inner.grammar.clone().and_then(Grammar::many);
    let start = inner.start;
    Anons {
        grammar: concat(&[&inner.grammar, &repeated]),
        start: Rc::new(move || {
            let rest = Rc::clone(&start);
            start().and_then(move |first| {
                repeat(rest, Ok(Vec::new())).and_then(move |others| {
                    AnonStep::Done(first.and_then(|first| others.map(|others| (first, others))))
                })
            })
        }),
    }
}

pub fn t2<A: 'static, B: 'static>(a: Anons<A>, b: Anons<B>) -> Anons<(A, B)> {
    let (first, second) = (a.start, b.start);
    Anons {
        grammar: concat(&[&a.grammar, &b.grammar]),
        start: Rc::new(move || {
            let second = Rc::clone(&second);
            first().and_then(move |x| {
                second().and_then(move |y| AnonStep::Done(x.and_then(|x| y.map(|y| (x, y)))))
            })
        }),
    }
}

pub fn t3<A: 'static, B: 'static, C: 'static>(
    a: Anons<A>,
    b: Anons<B>,
    c: Anons<C>,
) -> Anons<(A, B, C)> {
    let grammar = concat(&[&a.grammar, &b.grammar, &c.grammar]);
    let pairs = t2(t2(a, b), c).map(|((a, b), c)| (a, b, c));
    Anons {
        grammar,
        start: pairs.start,
    }
}

/// Parse with `inner` but advertise a hand written usage string.
pub fn ad_hoc<T: 'static>(usage: impl Into<String>, inner: Anons<T>) -> Anons<T> {
    let usage = usage.into();
    Anons {
        grammar: inner.grammar.map(|_| Grammar::ad_hoc(usage)),
        start: inner.start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg_type;

    fn parse<T: 'static>(anons: &Anons<T>, tokens: &[&str]) -> Result<T, ParseError> {
        let mut env = Env::new();
        let mut step = (anons.start)();
        for token in tokens {
            step = step.feed(&mut env, token)?;
        }
        step.finish()
    }

    fn name(n: &str) -> Anons<String> {
        one(n, arg_type::string())
    }

    #[test]
    fn one_requires_its_token() {
        let a = name("NAME");
        assert_eq!(parse(&a, &["x"]).unwrap(), "x");
        assert_eq!(
            parse(&a, &[]).unwrap_err(),
            ParseError::MissingAnon("NAME".into())
        );
        assert_eq!(parse(&a, &["x", "y"]).unwrap_err(), ParseError::TooManyAnons);
    }

    #[test]
    fn maybe_and_default() {
        let id = maybe(one("ID", arg_type::int()));
        assert_eq!(id.grammar().unwrap().usage(), "[ID]");
        assert_eq!(parse(&id, &[]).unwrap(), None);
        assert_eq!(parse(&id, &["4"]).unwrap(), Some(4));

        let port = maybe_with_default(80, one("PORT", arg_type::int()));
        assert_eq!(parse(&port, &[]).unwrap(), 80);
    }

    #[test]
    fn sequences_collect_in_order() {
        let files = sequence(name("FILE"));
        assert_eq!(files.grammar().unwrap().usage(), "[FILE ...]");
        assert_eq!(parse(&files, &[]).unwrap(), Vec::<String>::new());
        assert_eq!(parse(&files, &["b", "a", "c"]).unwrap(), vec!["b", "a", "c"]);

        let pairs = sequence(t2(name("KEY"), one("VALUE", arg_type::int())));
        assert_eq!(pairs.grammar().unwrap().usage(), "[(KEY VALUE) ...]");
        assert_eq!(
            parse(&pairs, &["a", "1", "b", "2"]).unwrap(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
        assert_eq!(
            parse(&pairs, &["a", "1", "b"]).unwrap_err(),
            ParseError::MissingAnon("VALUE".into())
        );
    }

    #[test]
    fn non_empty_sequence_needs_one() {
        let hosts = non_empty_sequence(name("HOST"));
        assert_eq!(hosts.grammar().unwrap().usage(), "HOST [HOST ...]");
        assert_eq!(
            parse(&hosts, &[]).unwrap_err(),
            ParseError::MissingAnon("HOST".into())
        );
        assert_eq!(
            parse(&hosts, &["a", "b"]).unwrap(),
            ("a".to_string(), vec!["b".to_string()])
        );
    }

    #[test]
    fn tuples_consume_left_to_right() {
        let triple = t3(name("A"), name("B"), maybe(name("C")));
        assert_eq!(triple.grammar().unwrap().usage(), "A B [C]");
        assert_eq!(
            parse(&triple, &["1", "2"]).unwrap(),
            ("1".to_string(), "2".to_string(), None)
        );
    }

    #[test]
    fn variable_arity_in_the_middle_is_rejected() {
        let bad = t2(maybe(name("A")), name("B"));
        assert!(matches!(
            bad.grammar(),
            Err(GrammarError::VariableArityNotLast { .. })
        ));
        assert!(sequence(maybe(name("X"))).grammar().is_err());
    }

    #[test]
    fn ad_hoc_replaces_usage_only() {
        let custom = ad_hoc("[WORDS ...]", sequence(name("WORD")));
        assert_eq!(custom.grammar().unwrap(), Grammar::AdHoc("[WORDS ...]".into()));
        assert_eq!(parse(&custom, &["x"]).unwrap(), vec!["x"]);
    }

    #[test]
    fn completion_runs_past_a_bad_slot() {
        let pair = t2(
            one("COUNT", arg_type::int()),
            one("COLOR", arg_type::of_alist([("red", 1), ("green", 2)])),
        );
        let mut env = Env::completing();
        let step = (pair.start)().feed(&mut env, "not-a-number").unwrap();
        assert_eq!(step.complete(&env, "g"), vec!["green"]);

        let mut strict = Env::new();
        assert!((pair.start)().feed(&mut strict, "not-a-number").is_err());
    }
}
