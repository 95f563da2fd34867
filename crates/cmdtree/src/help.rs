//! Help text rendered from shapes.

use crate::anons;
use crate::arg_type;
use crate::error::DispatchError;
use crate::flag::{self, FlagInfo};
use crate::param::Param;
use cmdtree_shape::{BasicShape, ExecShape, FlagShape, Occurrences, Shape};
use std::cmp::Ordering;
use std::fmt::Write as _;

const PINNED_LAST: [&str; 5] = ["-help", "-version", "-build-info", "help", "version"];

pub(crate) const HELP_SUMMARY: &str = "explain a given subcommand (perhaps recursively)";

/// Alphabetical, except that builtin entries always come last.
pub fn pinned_last_order(a: &str, b: &str) -> Ordering {
    let rank = |name: &str| PINNED_LAST.iter().position(|pinned| *pinned == name);
    match (rank(a), rank(b)) {
        (None, None) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

/// Placeholder for a flag's argument: the first word of its doc when that
/// word is written in capitals, `VAL` otherwise.
fn split_doc(doc: &str) -> (&str, &str) {
    let doc = doc.trim();
    let (first, rest) = doc.split_once(' ').unwrap_or((doc, ""));
    let is_placeholder = !first.is_empty()
        && first.chars().any(|c| c.is_ascii_uppercase())
        && first.chars().all(|c| {
            c.is_ascii_uppercase()
                || c.is_ascii_digit()
                || matches!(c, '_' | '-' | '.' | ',' | '=' | ':')
        });
    if is_placeholder {
        (first, rest.trim_start())
    } else {
        ("VAL", doc)
    }
}

/// `[-name VAL] ...` style rendering of a flag and its aliases.
pub fn flag_usage(flag: &FlagShape) -> String {
    let (arg, _) = split_doc(&flag.doc);
    let with_arg = if flag.takes_arg {
        format!("{} {arg}", flag.name)
    } else {
        flag.name.clone()
    };
    let mut usage = match flag.occurrences {
        Occurrences::Required => with_arg,
        Occurrences::Optional => format!("[{with_arg}]"),
        Occurrences::Listed => format!("[{with_arg}] ..."),
        Occurrences::OneOrMore => format!("{with_arg} ..."),
        Occurrences::Escape => format!("[{} ...]", flag.name),
    };
    for alias in &flag.aliases {
        usage.push_str(", ");
        usage.push_str(alias);
    }
    usage
}

fn flag_doc(flag: &FlagShape) -> &str {
    if flag.takes_arg {
        split_doc(&flag.doc).1
    } else {
        flag.doc.trim()
    }
}

fn sorted_flags(flags: &[FlagShape]) -> Vec<&FlagShape> {
    let mut flags: Vec<&FlagShape> = flags.iter().collect();
    flags.sort_by(|a, b| pinned_last_order(&a.name, &b.name));
    flags
}

fn sorted_subcommands(subcommands: &indexmap::IndexMap<String, Shape>) -> Vec<(&String, &Shape)> {
    let mut subs: Vec<(&String, &Shape)> = subcommands.iter().collect();
    subs.sort_by(|a, b| pinned_last_order(a.0, b.0));
    subs
}

fn table(out: &mut String, rows: &[(String, String)]) {
    let width = rows.iter().map(|(left, _)| left.len()).max().unwrap_or(0);
    for (left, right) in rows {
        let line = format!("  {left:width$}  {right}");
        let _ = writeln!(out, "{}", line.trim_end());
    }
}

fn usage_line(shape: &Shape, path: &[String]) -> String {
    let path = path.join(" ");
    match shape {
        Shape::Basic(basic) => {
            let usage = basic.anons.usage();
            if usage.is_empty() {
                path
            } else {
                format!("{path} {usage}")
            }
        }
        Shape::Group(group) if group.has_default_body => format!("{path} [SUBCOMMAND]"),
        Shape::Group(_) => format!("{path} SUBCOMMAND"),
        Shape::Exec(_) => format!("{path} ..."),
    }
}

fn header(out: &mut String, shape: &Shape, path: &[String]) {
    if !shape.summary().is_empty() {
        let _ = writeln!(out, "{}\n", shape.summary());
    }
    let _ = writeln!(out, "  {}\n", usage_line(shape, path));
    if let Some(readme) = shape.readme() {
        let _ = writeln!(out, "{}\n", readme.trim_end());
    }
}

/// Help for a single node.
pub fn render(shape: &Shape, path: &[String]) -> String {
    let mut out = String::new();
    header(&mut out, shape, path);
    match shape {
        Shape::Basic(basic) => {
            let rows: Vec<(String, String)> = sorted_flags(&basic.flags)
                .into_iter()
                .map(|flag| (flag_usage(flag), flag_doc(flag).to_string()))
                .collect();
            if !rows.is_empty() {
                out.push_str("=== flags ===\n\n");
                table(&mut out, &rows);
                out.push('\n');
            }
        }
        Shape::Group(group) => {
            let rows: Vec<(String, String)> = sorted_subcommands(&group.subcommands)
                .into_iter()
                .map(|(name, sub)| (name.clone(), sub.summary().to_string()))
                .collect();
            out.push_str("=== subcommands ===\n\n");
            table(&mut out, &rows);
            out.push('\n');
        }
        Shape::Exec(exec) => {
            let _ = writeln!(out, "runs {}\n", exec.resolved_path().display());
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecursiveOptions {
    pub flags: bool,
    pub expand_dots: bool,
}

/// Help for a node and everything below it.
///
/// Delegated programs found on the way are turned into shapes with `resolve`.
pub fn render_recursive(
    shape: &Shape,
    path: &[String],
    options: RecursiveOptions,
    resolve: &mut dyn FnMut(&ExecShape) -> Result<Shape, DispatchError>,
) -> Result<String, DispatchError> {
    let Shape::Group(group) = shape else {
        return Ok(render(shape, path));
    };

    let mut out = String::new();
    header(&mut out, shape, path);
    let mut rows = Vec::new();
    walk(group, &[], 0, options, resolve, &mut rows)?;
    out.push_str(if options.flags {
        "=== subcommands and flags ===\n\n"
    } else {
        "=== subcommands ===\n\n"
    });
    table(&mut out, &rows);
    out.push('\n');
    Ok(out)
}

fn walk(
    group: &cmdtree_shape::GroupShape,
    prefix: &[String],
    depth: usize,
    options: RecursiveOptions,
    resolve: &mut dyn FnMut(&ExecShape) -> Result<Shape, DispatchError>,
    rows: &mut Vec<(String, String)>,
) -> Result<(), DispatchError> {
    for (name, sub) in sorted_subcommands(&group.subcommands) {
        let mut sub_path = prefix.to_vec();
        sub_path.push(name.clone());
        let label = if options.expand_dots {
            sub_path.join(" ")
        } else {
            format!("{}{name}", ". ".repeat(depth))
        };
        rows.push((label.clone(), sub.summary().to_string()));

        let resolved;
        let sub = match sub {
            Shape::Exec(exec) => {
                resolved = resolve(exec)?;
                &resolved
            }
            other => other,
        };
        match sub {
            Shape::Group(inner) => walk(inner, &sub_path, depth + 1, options, resolve, rows)?,
            Shape::Basic(basic) if options.flags => {
                let indent = if options.expand_dots {
                    String::new()
                } else {
                    ". ".repeat(depth + 1)
                };
                for flag in sorted_flags(&basic.flags) {
                    rows.push((
                        format!("{indent}{}", flag_usage(flag)),
                        flag_doc(flag).to_string(),
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// What the builtin `help` subcommand was asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HelpRequest {
    pub(crate) recursive: bool,
    pub(crate) flags: bool,
    pub(crate) expand_dots: bool,
    pub(crate) subcommand: Option<String>,
}

/// Parameters of the builtin `help` subcommand of a group.
pub(crate) fn help_param(subcommands: Vec<String>) -> Param<HelpRequest> {
    let target = arg_type::string().with_completer(move |_, partial| {
        subcommands
            .iter()
            .filter(|name| name.starts_with(partial))
            .cloned()
            .collect()
    });
    Param::map3(
        Param::flag("-recursive", flag::no_arg(), "show subcommands of subcommands, etc."),
        Param::flag("-flags", flag::no_arg(), "show flags as well in recursive help"),
        Param::flag("-expand-dots", flag::no_arg(), "expand subcommands in recursive help"),
        |recursive, flags, expand_dots| (recursive, flags, expand_dots),
    )
    .both(Param::anon(anons::maybe(anons::one("SUBCOMMAND", target))))
    .map(|((recursive, flags, expand_dots), subcommand)| HelpRequest {
        recursive,
        flags,
        expand_dots,
        subcommand,
    })
}

pub(crate) fn help_flags() -> Vec<FlagInfo> {
    let mut flags = help_param(Vec::new()).flags.unwrap_or_default();
    flags.push(FlagInfo::help());
    flags
}

pub(crate) fn help_shape() -> Shape {
    Shape::Basic(BasicShape {
        summary: HELP_SUMMARY.to_string(),
        readme: None,
        anons: help_param(Vec::new()).grammar.unwrap_or_default(),
        flags: help_flags().iter().map(FlagInfo::to_shape).collect(),
    })
}
