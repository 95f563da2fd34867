use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmdtree::completion::bash_installer;
use cmdtree::delegate::query_shape;
use cmdtree::find_subcommand;
use cmdtree::help::{self, RecursiveOptions};
use cmdtree_shape::{ExecShape, LATEST_VERSION, Shape, Versioned};
use process_host::SystemHost;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "cmdtree", disable_help_subcommand = true)]
#[command(version, about = "Inspect programs built with cmdtree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a program for its shape and print it
    Shape(ShapeArgs),

    /// Render help for a program from its shape, without running any command
    Help(HelpArgs),

    /// Print a bash completion script for a program
    CompletionScript(CompletionScriptArgs),

    /// Convert a saved shape between format versions
    Convert(ConvertArgs),
}

#[derive(Parser)]
struct ShapeArgs {
    /// The program to query
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,

    /// Format version to print (default: latest)
    #[arg(long, value_name = "N", default_value_t = LATEST_VERSION)]
    format_version: u32,

    /// Pretty-print the JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Parser)]
struct HelpArgs {
    /// The program to describe
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,

    /// Subcommand path to describe instead of the whole program
    #[arg(value_name = "SUBCOMMAND")]
    subcommand: Vec<String>,

    /// Show subcommands of subcommands, etc.
    #[arg(short, long)]
    recursive: bool,

    /// Show flags as well in recursive help
    #[arg(long)]
    flags: bool,

    /// Expand subcommands in recursive help
    #[arg(long)]
    expand_dots: bool,
}

#[derive(Parser)]
struct CompletionScriptArgs {
    /// The program to complete
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,

    /// Command name to register (default: the program's file name)
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
}

#[derive(Parser)]
struct ConvertArgs {
    /// A shape envelope, as printed by `cmdtree shape`
    #[arg(value_name = "FILE")]
    path: PathBuf,

    /// Target format version
    #[arg(long, value_name = "N")]
    to: u32,

    /// Pretty-print the JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Shape(args) => shape(args),
        Commands::Help(args) => help(args),
        Commands::CompletionScript(args) => completion_script(args),
        Commands::Convert(args) => convert(args),
    }
}

fn exec_shape(program: &Path) -> Result<ExecShape> {
    let working_dir = std::env::current_dir().context("failed to read current directory")?;
    Ok(ExecShape {
        summary: String::new(),
        readme: None,
        working_dir,
        path_to_exe: program.to_path_buf(),
    })
}

fn fetch(program: &Path) -> Result<Shape> {
    let exec = exec_shape(program)?;
    query_shape(&SystemHost, &exec)
        .with_context(|| format!("failed to get the shape of {}", program.display()))
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

fn print_versioned(versioned: &Versioned, pretty: bool) -> Result<()> {
    let json = versioned.to_json()?;
    if pretty {
        let value: serde_json::Value = serde_json::from_str(&json)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{json}");
    }
    Ok(())
}

fn shape(args: ShapeArgs) -> Result<()> {
    let shape = fetch(&args.program)?;
    let version = args.format_version;
    let versioned = shape
        .downgrade(version)
        .with_context(|| format!("cannot express the shape in format-version {version}"))?;
    print_versioned(&versioned, args.pretty)
}

/// Follow `words` down the tree, fetching delegated programs on the way.
fn descend(mut shape: Shape, words: &[String], path: &mut Vec<String>) -> Result<Shape> {
    for word in words {
        if let Shape::Exec(exec) = shape {
            shape = query_shape(&SystemHost, &exec)?;
        }
        let Shape::Group(mut group) = shape else {
            anyhow::bail!("{} has no subcommands", path.join(" "));
        };
        let index = find_subcommand(group.subcommands.keys().map(String::as_str), word)
            .with_context(|| format!("cannot describe {}", path.join(" ")))?;
        let (key, sub) = group
            .subcommands
            .swap_remove_index(index)
            .context("subcommand index out of range")?;
        shape = sub;
        path.push(key);
    }
    match shape {
        Shape::Exec(exec) => Ok(query_shape(&SystemHost, &exec)?),
        other => Ok(other),
    }
}

fn help(args: HelpArgs) -> Result<()> {
    let mut path = vec![program_name(&args.program)];
    let shape = descend(fetch(&args.program)?, &args.subcommand, &mut path)?;
    let text = if args.recursive {
        let options = RecursiveOptions {
            flags: args.flags,
            expand_dots: args.expand_dots,
        };
        help::render_recursive(&shape, &path, options, &mut |exec: &ExecShape| {
            query_shape(&SystemHost, exec)
        })?
    } else {
        help::render(&shape, &path)
    };
    print!("{text}");
    Ok(())
}

fn completion_script(args: CompletionScriptArgs) -> Result<()> {
    let name = args.name.unwrap_or_else(|| program_name(&args.program));
    print!("{}", bash_installer(&args.program.display().to_string(), &name));
    Ok(())
}

fn convert(args: ConvertArgs) -> Result<()> {
    let payload = fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read shape file: {}", args.path.display()))?;
    let shape = Versioned::from_json(payload.trim())
        .with_context(|| format!("failed to parse shape file: {}", args.path.display()))?
        .upgrade();
    let versioned = shape
        .downgrade(args.to)
        .with_context(|| format!("cannot express the shape in format-version {}", args.to))?;
    print_versioned(&versioned, args.pretty)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
