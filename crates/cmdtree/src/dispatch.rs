//! Walking a command tree over a command line.
//!
//! A single walk serves every mode: a normal run ends in a leaf body to
//! execute, a completion run ends as soon as the partial word under the
//! cursor has been answered, and delegates are either executed or asked for
//! their shape.

use crate::anons::AnonStep;
use crate::command::{Command, Group, Main};
use crate::completion::{DispatchMode, bash_installer, split_for_completion};
use crate::delegate::query_shape;
use crate::env::Env;
use crate::error::{DispatchError, NameKind, ParseError};
use crate::flag::{Action, Exit, FlagInfo, Interrupt};
use crate::help::{self, HelpRequest, RecursiveOptions};
use crate::names::{self, Candidate};
use crate::param::{Param, RegisteredFlag, Registry};
use crate::tokens::{Next, Tokens};
use cmdtree_shape::{ExecShape, Shape, negotiate};
use process_host::{Invocation, ProcessHost, SystemHost};
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::debug;

/// Extra arguments appended when delegating, computed from the path of the
/// delegating subcommand.
pub type Extend = Rc<dyn Fn(&[String]) -> Vec<String>>;

#[derive(Clone, Default)]
pub struct RunConfig {
    pub version: String,
    pub build_info: String,
    pub extend: Option<Extend>,
}

impl RunConfig {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn build_info(mut self, info: impl Into<String>) -> Self {
        self.build_info = info.into();
        self
    }

    pub fn extend(mut self, f: impl Fn(&[String]) -> Vec<String> + 'static) -> Self {
        self.extend = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("version", &self.version)
            .field("build_info", &self.build_info)
            .field("extend", &self.extend.is_some())
            .finish()
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A leaf or default group body ran to completion.
    Ran,
    /// Help, completions, a shape or an installer script was printed.
    Printed,
    /// A flag asked to stop with this exit code.
    Exited(i32),
    /// A delegated program ran and exited with this code.
    Delegated(i32),
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Ran | Self::Printed => ExitCode::SUCCESS,
            Self::Exited(code) | Self::Delegated(code) => {
                ExitCode::from(u8::try_from(code).unwrap_or(1))
            }
        }
    }
}

enum Step {
    Run(Main),
    Done(Outcome),
}

enum Parsed<T> {
    Value(T),
    Done(Outcome),
}

fn parse_error(error: ParseError, path: &[String], shape: &dyn Fn() -> Shape) -> DispatchError {
    DispatchError::Parse {
        error,
        path: path.join(" "),
        help: help::render(&shape(), path),
    }
}

fn matching(names: impl Iterator<Item = impl AsRef<str>>, partial: &str) -> Vec<String> {
    let mut found: Vec<String> = names
        .filter(|name| name.as_ref().starts_with(partial))
        .map(|name| name.as_ref().to_string())
        .collect();
    found.sort_by(|a, b| help::pinned_last_order(a, b));
    found.dedup();
    found
}

fn program_name(argv: &[String]) -> String {
    argv.first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("cmd")
        .to_string()
}

struct Walk<'a> {
    config: &'a RunConfig,
    host: &'a dyn ProcessHost,
    completing: bool,
    env: Env,
    out: &'a mut dyn Write,
}

impl Walk<'_> {
    fn print_candidates(&mut self, candidates: &[String]) -> Result<Outcome, DispatchError> {
        for candidate in candidates {
            writeln!(self.out, "{candidate}")?;
        }
        Ok(Outcome::Printed)
    }

    fn print(&mut self, text: &str) -> Result<Outcome, DispatchError> {
        self.out.write_all(text.as_bytes())?;
        Ok(Outcome::Printed)
    }

    fn walk(
        &mut self,
        command: &Command,
        tokens: &mut Tokens,
        path: &mut Vec<String>,
    ) -> Result<Step, DispatchError> {
        match command {
            Command::Leaf(leaf) => {
                let root = path.len() == 1;
                let shape = || command.shape_at(root);
                match self.parse_leaf(&leaf.param, &leaf.flags, root, tokens, path, &shape)? {
                    Parsed::Value(main) => Ok(Step::Run(main)),
                    Parsed::Done(outcome) => Ok(Step::Done(outcome)),
                }
            }
            Command::Group(group) => self.walk_group(command, group, tokens, path),
            Command::Exec(exec) => self.walk_exec(exec, None, tokens, path),
            Command::ResolvedExec { exec, shape } => {
                self.walk_exec(exec, Some(shape), tokens, path)
            }
        }
    }

    fn walk_group(
        &mut self,
        command: &Command,
        group: &Group,
        tokens: &mut Tokens,
        path: &mut Vec<String>,
    ) -> Result<Step, DispatchError> {
        let root = path.len() == 1;
        let shape = || command.shape_at(root);

        let word = match tokens.next() {
            Next::End => {
                if let Some(body) = &group.body {
                    debug!(group = %path.join(" "), "running default body");
                    let body = Rc::clone(body);
                    let path = path.clone();
                    return Ok(Step::Run(Box::new(move || body(&path))));
                }
                let missing = ParseError::MissingSubcommand(path.join(" "));
                return Err(parse_error(missing, path, &shape));
            }
            Next::Complete(partial) => {
                let found = matching(group.names(), &partial.to_lowercase());
                return Ok(Step::Done(self.print_candidates(&found)?));
            }
            Next::Word(word) => word,
        };

        if word == "-help" || word == "-?" {
            return match tokens.next() {
                // `group -help sub` reads as `group sub -help`
                Next::Word(next) if !next.starts_with('-') => {
                    tokens.push_front("-help".to_string());
                    tokens.push_front(next);
                    self.walk_group(command, group, tokens, path)
                }
                Next::Complete(partial) => {
                    let found = matching(group.names(), &partial.to_lowercase());
                    Ok(Step::Done(self.print_candidates(&found)?))
                }
                Next::Word(_) | Next::End => {
                    Ok(Step::Done(self.print(&help::render(&shape(), path))?))
                }
            };
        }
        if root && word == "-version" {
            let text = format!("{}\n", self.config.version);
            return Ok(Step::Done(self.print(&text)?));
        }
        if root && word == "-build-info" {
            let text = format!("{}\n", self.config.build_info);
            return Ok(Step::Done(self.print(&text)?));
        }

        let index = names::find_subcommand(group.names(), &word)
            .map_err(|err| parse_error(err, path, &shape))?;

        match group.subcommands.get_index(index) {
            Some((name, child)) => {
                debug!(subcommand = %name, "selected subcommand");
                path.push(name.clone());
                self.walk(child, tokens, path)
            }
            None => self.walk_help(command, group, tokens, path),
        }
    }

    fn walk_help(
        &mut self,
        command: &Command,
        group: &Group,
        tokens: &mut Tokens,
        path: &mut Vec<String>,
    ) -> Result<Step, DispatchError> {
        let group_path = path.clone();
        path.push("help".to_string());
        let param = help::help_param(group.subcommands.keys().cloned().collect());
        let declared = param.flags.clone()?;
        let parsed = self.parse_leaf(&param, &declared, false, tokens, path, &help::help_shape)?;
        let request = match parsed {
            Parsed::Value(request) => request,
            Parsed::Done(outcome) => return Ok(Step::Done(outcome)),
        };
        let text = self.help_text(command, group, &group_path, request)?;
        Ok(Step::Done(self.print(&text)?))
    }

    fn help_text(
        &self,
        command: &Command,
        group: &Group,
        group_path: &[String],
        request: HelpRequest,
    ) -> Result<String, DispatchError> {
        let mut path = group_path.to_vec();
        let target = match &request.subcommand {
            None => command.shape_at(group_path.len() == 1),
            Some(word) => {
                let shape = || command.shape_at(group_path.len() == 1);
                let index = names::find_subcommand(group.names(), word)
                    .map_err(|err| parse_error(err, group_path, &shape))?;
                match group.subcommands.get_index(index) {
                    Some((name, child)) => {
                        path.push(name.clone());
                        child.shape_at(false)
                    }
                    None => {
                        path.push("help".to_string());
                        help::help_shape()
                    }
                }
            }
        };

        let target = match target {
            Shape::Exec(exec) => query_shape(self.host, &exec)?,
            other => other,
        };
        if request.recursive {
            let host = self.host;
            let options = RecursiveOptions {
                flags: request.flags,
                expand_dots: request.expand_dots,
            };
            help::render_recursive(&target, &path, options, &mut |exec: &ExecShape| {
                query_shape(host, exec)
            })
        } else {
            Ok(help::render(&target, &path))
        }
    }

    fn walk_exec(
        &mut self,
        exec: &ExecShape,
        resolved: Option<&Shape>,
        tokens: &mut Tokens,
        path: &[String],
    ) -> Result<Step, DispatchError> {
        if self.completing {
            let shape = match resolved {
                Some(shape) => shape.clone(),
                None => query_shape(self.host, exec)?,
            };
            return Ok(Step::Done(self.complete_in_shape(shape, tokens)?));
        }

        let mut args = tokens.drain_words();
        if let Some(extend) = &self.config.extend {
            args.extend(extend(path));
        }
        let program = exec.resolved_path();
        debug!(program = %program.display(), args = args.len(), "delegating");
        let code = self
            .host
            .exec(&Invocation::new(program).args(args))
            .map_err(DispatchError::Host)?;
        Ok(Step::Done(Outcome::Delegated(code)))
    }

    /// Completion inside a delegated program, answered from its shape.
    fn complete_in_shape(
        &mut self,
        shape: Shape,
        tokens: &mut Tokens,
    ) -> Result<Outcome, DispatchError> {
        let mut current = shape;
        loop {
            current = match current {
                Shape::Exec(exec) => query_shape(self.host, &exec)?,
                Shape::Group(mut group) => match tokens.next() {
                    Next::Word(word) => {
                        let keys = group.subcommands.keys().map(String::as_str);
                        let found = names::find_subcommand(keys, &word)
                            .ok()
                            .and_then(|index| group.subcommands.swap_remove_index(index));
                        match found {
                            Some((_, sub)) => sub,
                            None => return self.print_candidates(&[]),
                        }
                    }
                    Next::Complete(partial) => {
                        let found = matching(group.subcommands.keys(), &partial.to_lowercase());
                        return self.print_candidates(&found);
                    }
                    Next::End => return self.print_candidates(&[]),
                },
                Shape::Basic(basic) => loop {
                    match tokens.next() {
                        Next::Word(_) => continue,
                        Next::Complete(partial) if partial.starts_with('-') => {
                            let names = basic.flags.iter().flat_map(|flag| {
                                std::iter::once(flag.name.as_str())
                                    .chain(flag.aliases.iter().map(String::as_str))
                            });
                            let found = matching(names, &partial);
                            return self.print_candidates(&found);
                        }
                        Next::Complete(_) | Next::End => return self.print_candidates(&[]),
                    }
                },
            };
        }
    }

    /// Flags injected into every leaf: `-help`, and at the root `-version`
    /// and `-build-info` unless the leaf declares those names itself.
    fn builtin_flags(&self, declared: &[FlagInfo], root: bool) -> Vec<RegisteredFlag> {
        let mut builtins = vec![RegisteredFlag {
            info: FlagInfo::help(),
            action: Action::NoArg(Box::new(|_: &mut Env| Err(Interrupt::Help))),
            supplied: Rc::new(|| false),
        }];
        if !root {
            return builtins;
        }
        let texts = [
            (FlagInfo::version(), &self.config.version),
            (FlagInfo::build_info(), &self.config.build_info),
        ];
        for (info, text) in texts {
            if declared.iter().any(|flag| flag.names().any(|name| name == info.name)) {
                continue;
            }
            let exit = Exit::new(0, format!("{text}\n"));
            builtins.push(RegisteredFlag {
                info,
                action: Action::NoArg(Box::new(move |_: &mut Env| {
                    Err(Interrupt::Exit(exit.clone()))
                })),
                supplied: Rc::new(|| false),
            });
        }
        builtins
    }

    fn parse_leaf<T: 'static>(
        &mut self,
        param: &Param<T>,
        declared: &[FlagInfo],
        root: bool,
        tokens: &mut Tokens,
        path: &[String],
        shape: &dyn Fn() -> Shape,
    ) -> Result<Parsed<T>, DispatchError> {
        let mut registry = Registry::new(path.to_vec(), tokens.words());
        let read = (param.build)(&mut registry);
        let Registry {
            flags: mut entries,
            anons: mut positional,
            ..
        } = registry;
        entries.extend(self.builtin_flags(declared, root));

        let candidates: Vec<Candidate<usize>> = entries
            .iter()
            .enumerate()
            .flat_map(|(index, entry)| {
                entry.info.names().map(move |name| Candidate {
                    key: name.to_string(),
                    value: index,
                    full_match_required: entry.info.full_match_required,
                })
            })
            .collect();

        loop {
            let word = match tokens.next() {
                Next::End => break,
                Next::Complete(partial) => {
                    let found = if partial.starts_with('-') {
                        matching(candidates.iter().map(|c| c.key.as_str()), &partial)
                    } else {
                        positional.complete(&self.env, &partial)
                    };
                    return Ok(Parsed::Done(self.print_candidates(&found)?));
                }
                Next::Word(word) => word,
            };

            if !word.starts_with('-') || word == "-" {
                positional = match positional.feed(&mut self.env, &word) {
                    Ok(next) => next,
                    Err(_) if self.completing => AnonStep::Done(Ok(())),
                    Err(err) => return Err(parse_error(err, path, shape)),
                };
                continue;
            }

            let index = match names::lookup(NameKind::Flag, &candidates, &word) {
                Ok(index) => index,
                Err(_) if self.completing => continue,
                Err(err) => return Err(parse_error(err, path, shape)),
            };
            let entry = &mut entries[index];
            let result = match &mut entry.action {
                Action::NoArg(run) => run(&mut self.env),
                Action::Arg { run, complete } => match tokens.next() {
                    Next::Word(value) => run(&mut self.env, &value),
                    Next::Complete(partial) => {
                        let found = complete
                            .as_ref()
                            .map(|c| c(&self.env, &partial))
                            .unwrap_or_default();
                        return Ok(Parsed::Done(self.print_candidates(&found)?));
                    }
                    Next::End => Err(Interrupt::Failed(ParseError::MissingFlagArgument(
                        entry.info.name.clone(),
                    ))),
                },
                Action::Rest(run) => {
                    let rest = tokens.drain_words();
                    let result = run(&mut self.env, rest);
                    if self.completing {
                        return Ok(Parsed::Done(self.print_candidates(&[])?));
                    }
                    result
                }
            };

            match result {
                Ok(()) => {}
                Err(_) if self.completing => {}
                Err(Interrupt::Help) => {
                    return Ok(Parsed::Done(self.print(&help::render(&shape(), path))?));
                }
                Err(Interrupt::Exit(exit)) => {
                    self.out.write_all(exit.stdout.as_bytes())?;
                    return Ok(Parsed::Done(Outcome::Exited(exit.code)));
                }
                Err(Interrupt::Failed(err)) => return Err(parse_error(err, path, shape)),
            }
        }

        if self.completing {
            return Ok(Parsed::Done(self.print_candidates(&[])?));
        }

        let mut missing: Vec<&str> = entries
            .iter()
            .filter(|entry| entry.info.is_required() && !(entry.supplied)())
            .map(|entry| entry.info.name.as_str())
            .collect();
        missing.sort_unstable();
        if let Some(name) = missing.first() {
            return Err(parse_error(ParseError::MissingRequiredFlag(name.to_string()), path, shape));
        }

        positional.finish().map_err(|err| parse_error(err, path, shape))?;
        let value = read(&mut self.env).map_err(|err| parse_error(err, path, shape))?;
        Ok(Parsed::Value(value))
    }
}

/// Dispatch `argv` against `root` in the given mode, writing anything the
/// framework prints (help, completions, shapes) to `out`.
///
/// Leaf bodies run before this returns; delegated programs run through `host`.
pub fn dispatch(
    root: &Command,
    config: &RunConfig,
    host: &dyn ProcessHost,
    mode: &DispatchMode,
    argv: &[String],
    out: &mut dyn Write,
) -> Result<Outcome, DispatchError> {
    let program = program_name(argv);
    match mode {
        DispatchMode::InstallingCompletion => {
            let invocation = argv.first().map(String::as_str).unwrap_or(program.as_str());
            out.write_all(bash_installer(invocation, &program).as_bytes())?;
            Ok(Outcome::Printed)
        }
        DispatchMode::ExportingShape { versions } => {
            let version = negotiate(versions)?;
            debug!(version, "exporting shape");
            let json = root.shape().downgrade(version)?.to_json()?;
            writeln!(out, "{json}")?;
            Ok(Outcome::Printed)
        }
        DispatchMode::Completing { cursor } => {
            let (words, partial) = split_for_completion(argv, *cursor);
            debug!(cursor, words = words.len(), "completing");
            let mut walk = Walk {
                config,
                host,
                completing: true,
                env: Env::completing(),
                out,
            };
            let step = walk.walk(root, &mut Tokens::new(words, Some(partial)), &mut vec![program])?;
            Ok(match step {
                Step::Run(_) => Outcome::Printed,
                Step::Done(outcome) => outcome,
            })
        }
        DispatchMode::Normal => {
            let words = argv.get(1..).map(<[String]>::to_vec).unwrap_or_default();
            let mut walk = Walk {
                config,
                host,
                completing: false,
                env: Env::new(),
                out,
            };
            match walk.walk(root, &mut Tokens::new(words, None), &mut vec![program])? {
                Step::Run(main) => {
                    main().map_err(DispatchError::Body)?;
                    Ok(Outcome::Ran)
                }
                Step::Done(outcome) => Ok(outcome),
            }
        }
    }
}

/// Run `root` as the program's entry point: reads the mode from the
/// environment and arguments from the process, and reports errors on stderr.
pub fn run(root: Command, config: RunConfig) -> ExitCode {
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let mode = match DispatchMode::from_env() {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    run_with(&root, &config, &SystemHost, &mode, &argv)
}

pub fn run_with(
    root: &Command,
    config: &RunConfig,
    host: &dyn ProcessHost,
    mode: &DispatchMode,
    argv: &[String],
) -> ExitCode {
    let result = {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let result = dispatch(root, config, host, mode, argv, &mut out);
        if let Err(err) = out.flush() {
            debug!(error = %err, "failed to flush stdout");
        }
        result
    };

    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(err) if mode.is_completing() => {
            debug!(error = %err, "suppressed error while completing");
            ExitCode::SUCCESS
        }
        Err(DispatchError::Parse { error, path, help }) => {
            print!("{help}");
            eprintln!(
                "Error parsing command line:\n\n  {error}\n\nFor usage information, run\n\n  {path} -help\n"
            );
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {:#}", anyhow::Error::from(err));
            ExitCode::FAILURE
        }
    }
}
