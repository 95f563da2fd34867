use crate::delegate;
use crate::error::{DispatchError, NameKind, SpecError};
use crate::flag::FlagInfo;
use crate::help;
use crate::names;
use crate::param::Param;
use cmdtree_shape::{BasicShape, ExecShape, Grammar, GroupShape, Shape};
use indexmap::IndexMap;
use process_host::ProcessHost;
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

/// Deferred body of a leaf command, run once the whole command line parsed.
pub type Main = Box<dyn FnOnce() -> anyhow::Result<()>>;

/// Body of a group invoked without a subcommand. Receives the group's path.
pub type GroupBody = Rc<dyn Fn(&[String]) -> anyhow::Result<()>>;

pub fn body(f: impl FnOnce() -> anyhow::Result<()> + 'static) -> Main {
    Box::new(f)
}

pub struct Leaf {
    pub(crate) summary: String,
    pub(crate) readme: Option<String>,
    pub(crate) flags: Vec<FlagInfo>,
    pub(crate) grammar: Grammar,
    pub(crate) param: Param<Main>,
}

impl Leaf {
    pub(crate) fn declares(&self, name: &str) -> bool {
        self.flags.iter().any(|flag| flag.names().any(|n| n == name))
    }

    /// Declared flags plus the builtins injected at this position.
    pub(crate) fn flags_at(&self, root: bool) -> Vec<FlagInfo> {
        let mut flags = self.flags.clone();
        flags.push(FlagInfo::help());
        if root {
            for builtin in [FlagInfo::version(), FlagInfo::build_info()] {
                if !self.declares(&builtin.name) {
                    flags.push(builtin);
                }
            }
        }
        flags
    }
}

pub struct Group {
    pub(crate) summary: String,
    pub(crate) readme: Option<String>,
    pub(crate) subcommands: IndexMap<String, Command>,
    pub(crate) body: Option<GroupBody>,
}

impl Group {
    /// Subcommand names in declaration order, then the builtin `help`.
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.subcommands
            .keys()
            .map(String::as_str)
            .chain(std::iter::once("help"))
    }
}

/// A node of a command tree.
pub enum Command {
    Leaf(Leaf),
    Group(Group),
    /// Delegates to another program built with this library.
    Exec(ExecShape),
    /// A delegate whose shape has already been fetched.
    ResolvedExec { exec: ExecShape, shape: Shape },
}

impl Command {
    /// A leaf command. Fails if flag names clash or the anonymous argument
    /// grammar is malformed.
    pub fn basic(summary: impl Into<String>, param: Param<Main>) -> Result<Self, SpecError> {
        let flags = param.flags.clone()?;
        let grammar = param.grammar.clone()?;

        let mut seen = HashSet::new();
        for name in flags.iter().flat_map(FlagInfo::names) {
            if name == "-help" || name == "-?" {
                return Err(SpecError::Reserved {
                    kind: NameKind::Flag,
                    name: name.to_string(),
                });
            }
            if !seen.insert(name) {
                return Err(SpecError::Duplicate {
                    kind: NameKind::Flag,
                    name: name.to_string(),
                });
            }
        }

        Ok(Self::Leaf(Leaf {
            summary: summary.into(),
            readme: None,
            flags,
            grammar,
            param,
        }))
    }

    pub fn group<S: AsRef<str>>(
        summary: impl Into<String>,
        subcommands: impl IntoIterator<Item = (S, Command)>,
    ) -> Result<Self, SpecError> {
        let mut map = IndexMap::new();
        for (raw, command) in subcommands {
            let name = names::subcommand_name(raw.as_ref())?;
            if name == "help" {
                return Err(SpecError::Reserved {
                    kind: NameKind::Subcommand,
                    name,
                });
            }
            if map.contains_key(&name) {
                return Err(SpecError::Duplicate {
                    kind: NameKind::Subcommand,
                    name,
                });
            }
            map.insert(name, command);
        }
        Ok(Self::Group(Group {
            summary: summary.into(),
            readme: None,
            subcommands: map,
            body: None,
        }))
    }

    /// A group that runs `body` when no subcommand is given.
    pub fn group_with_default<S: AsRef<str>>(
        summary: impl Into<String>,
        subcommands: impl IntoIterator<Item = (S, Command)>,
        body: impl Fn(&[String]) -> anyhow::Result<()> + 'static,
    ) -> Result<Self, SpecError> {
        let mut command = Self::group(summary, subcommands)?;
        if let Self::Group(group) = &mut command {
            group.body = Some(Rc::new(body));
        }
        Ok(command)
    }

    /// Delegate to `path_to_exe`, resolved against `working_dir` when relative.
    pub fn exec(
        summary: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        path_to_exe: impl Into<PathBuf>,
    ) -> Self {
        Self::Exec(ExecShape {
            summary: summary.into(),
            readme: None,
            working_dir: working_dir.into(),
            path_to_exe: path_to_exe.into(),
        })
    }

    pub fn with_readme(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match &mut self {
            Self::Leaf(leaf) => leaf.readme = text,
            Self::Group(group) => group.readme = text,
            Self::Exec(exec) | Self::ResolvedExec { exec, .. } => exec.readme = text,
        }
        self
    }

    pub fn summary(&self) -> &str {
        match self {
            Self::Leaf(leaf) => &leaf.summary,
            Self::Group(group) => &group.summary,
            Self::Exec(exec) | Self::ResolvedExec { exec, .. } => &exec.summary,
        }
    }

    /// Shape of the tree rooted here, as exported to a parent program.
    pub fn shape(&self) -> Shape {
        self.shape_at(true)
    }

    pub(crate) fn shape_at(&self, root: bool) -> Shape {
        match self {
            Self::Leaf(leaf) => Shape::Basic(BasicShape {
                summary: leaf.summary.clone(),
                readme: leaf.readme.clone(),
                anons: leaf.grammar.clone(),
                flags: leaf.flags_at(root).iter().map(FlagInfo::to_shape).collect(),
            }),
            Self::Group(group) => {
                let mut subcommands: IndexMap<String, Shape> = group
                    .subcommands
                    .iter()
                    .map(|(name, sub)| (name.clone(), sub.shape_at(false)))
                    .collect();
                subcommands.insert("help".to_string(), help::help_shape());
                Shape::Group(GroupShape {
                    summary: group.summary.clone(),
                    readme: group.readme.clone(),
                    subcommands,
                    has_default_body: group.body.is_some(),
                })
            }
            Self::Exec(exec) => Shape::Exec(exec.clone()),
            Self::ResolvedExec { shape, .. } => shape.clone(),
        }
    }

    /// Fetch the shape of a delegate so later help and completion need not
    /// run it again. Other nodes are returned unchanged.
    pub fn resolve(self, host: &dyn ProcessHost) -> Result<Self, DispatchError> {
        match self {
            Self::Exec(exec) => {
                let shape = delegate::query_shape(host, &exec)?;
                Ok(Self::ResolvedExec { exec, shape })
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anons;
    use crate::arg_type;
    use crate::flag::{self, FlagDecl};
    use cmdtree_shape::Occurrences;

    fn noop() -> Param<Main> {
        Param::pure(()).map(|()| body(|| Ok(())))
    }

    fn leaf() -> Command {
        Command::basic("a leaf", noop()).unwrap()
    }

    #[test]
    fn duplicate_and_reserved_flags_are_rejected() {
        let dup = Param::flag("-name", flag::no_arg(), "")
            .both(Param::flag_with(FlagDecl::new("-other", "").alias("name"), flag::no_arg()))
            .map(|_| body(|| Ok(())));
        assert!(matches!(
            Command::basic("dup", dup),
            Err(SpecError::Duplicate { kind: NameKind::Flag, name }) if name == "-name"
        ));

        let reserved = Param::flag("help", flag::no_arg(), "").map(|_| body(|| Ok(())));
        assert!(matches!(
            Command::basic("reserved", reserved),
            Err(SpecError::Reserved { .. })
        ));
    }

    #[test]
    fn malformed_grammar_is_a_construction_error() {
        let param = Param::anon(anons::maybe(anons::one("A", arg_type::string())))
            .both(Param::anon(anons::one("B", arg_type::string())))
            .map(|_| body(|| Ok(())));
        assert!(matches!(
            Command::basic("bad", param),
            Err(SpecError::Grammar(_))
        ));
    }

    #[test]
    fn group_names_are_normalized_and_unique() {
        let group = Command::group("g", [("Start", leaf()), ("stop", leaf())]).unwrap();
        let Command::Group(group) = group else {
            panic!("expected group");
        };
        assert_eq!(group.names().collect::<Vec<_>>(), vec!["start", "stop", "help"]);

        assert!(matches!(
            Command::group("g", [("start", leaf()), ("START", leaf())]),
            Err(SpecError::Duplicate { kind: NameKind::Subcommand, .. })
        ));
        assert!(matches!(
            Command::group("g", [("help", leaf())]),
            Err(SpecError::Reserved { .. })
        ));
        assert!(matches!(
            Command::group("g", [("snake_case", leaf())]),
            Err(SpecError::BadName { .. })
        ));
    }

    #[test]
    fn shapes_include_builtins_where_injected() {
        let param = Param::flag("-name", flag::required(arg_type::string()), "STRING who")
            .map(|_| body(|| Ok(())));
        let root = Command::basic("root leaf", param).unwrap().with_readme("More text.");

        let Shape::Basic(basic) = root.shape() else {
            panic!("expected basic shape");
        };
        let names: Vec<&str> = basic.flags.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["-name", "-help", "-version", "-build-info"]);
        assert_eq!(basic.flags[0].occurrences, Occurrences::Required);
        assert_eq!(basic.readme.as_deref(), Some("More text."));

        let Command::Leaf(inner) = &root else { unreachable!() };
        let nested: Vec<String> = inner.flags_at(false).into_iter().map(|f| f.name).collect();
        assert_eq!(nested, vec!["-name", "-help"]);
    }

    #[test]
    fn group_shape_lists_help_subcommand() {
        let group = Command::group_with_default("g", [("run", leaf())], |_| Ok(())).unwrap();
        let Shape::Group(shape) = group.shape() else {
            panic!("expected group shape");
        };
        assert!(shape.has_default_body);
        assert_eq!(shape.subcommands.keys().collect::<Vec<_>>(), vec!["run", "help"]);
        assert_eq!(shape.subcommands["help"].summary(), help::HELP_SUMMARY);
    }
}
