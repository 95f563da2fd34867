//! Declarative command trees for command-line programs.
//!
//! A program is described as a tree of [`Command`]s:
//! - leaves, whose typed flags and anonymous arguments are composed with
//!   [`Param`] and whose body runs once the command line parsed
//! - groups, which select a subcommand by name or unambiguous prefix
//! - delegates, which hand the rest of the command line to another program
//!   built with this crate
//!
//! Every tree gets `-help`, `-version`, `-build-info` and a `help`
//! subcommand for free, along with bash completion and a shape export that
//! lets a parent program render help and completions for delegated
//! subcommands without running them.
//!
//! ```no_run
//! use cmdtree::{Command, Param, RunConfig, anons, arg_type, body, flag};
//!
//! fn main() -> std::process::ExitCode {
//!     let start = Param::map2(
//!         Param::flag("-name", flag::required(arg_type::string()), "STRING service name"),
//!         Param::anon(anons::maybe(anons::one("ID", arg_type::int()))),
//!         |name, id| body(move || {
//!             println!("starting {name} {id:?}");
//!             Ok(())
//!         }),
//!     );
//!     let root = Command::group("manage services", [
//!         ("start", Command::basic("start a service", start).expect("valid command")),
//!     ])
//!     .expect("valid tree");
//!     cmdtree::run(root, RunConfig::new(env!("CARGO_PKG_VERSION")))
//! }
//! ```

pub mod anons;
pub mod arg_type;
pub mod command;
pub mod completion;
pub mod delegate;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod flag;
pub mod help;
mod names;
mod param;
mod tokens;

pub use anons::Anons;
pub use arg_type::ArgType;
pub use command::{Command, GroupBody, Main, body};
pub use completion::DispatchMode;
pub use dispatch::{Outcome, RunConfig, dispatch, run, run_with};
pub use env::{Env, EnvKey};
pub use error::{DispatchError, ModeError, NameKind, ParseError, SpecError};
pub use flag::{Exit, Flag, FlagDecl};
pub use names::find_subcommand;
pub use param::{Param, choose_one, choose_one_optional};

pub use cmdtree_shape::{self as shape, Grammar, Shape, Versioned};
pub use process_host::{ProcessHost, SystemHost};
