//! A small service manager built with cmdtree, used to exercise the
//! framework end to end.

use anyhow::{Result, bail};
use cmdtree::{
    Command, Exit, FlagDecl, Param, RunConfig, anons, arg_type, body, choose_one_optional, flag,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

/// Path of a program the `tool` subcommand delegates to, when set.
const DELEGATE_ENV_VAR: &str = "CMDTREE_DEMO_DELEGATE";

fn start() -> Result<Command> {
    let param = Param::map3(
        Param::flag("-name", flag::required(arg_type::string()), "STRING service name"),
        Param::flag_with(
            FlagDecl::new("-verbose", "log every step").alias("-v"),
            flag::no_arg(),
        )
        .both(Param::flag(
            "-color",
            flag::optional(arg_type::of_alist([("red", "31"), ("green", "32"), ("blue", "34")])),
            "COLOR tint the status line",
        )),
        Param::anon(anons::maybe(anons::one("ID", arg_type::int()))),
        |name, (verbose, color), id| {
            body(move || {
                if verbose {
                    eprintln!("starting {name}");
                }
                let line = match id {
                    Some(id) => format!("started {name} as {id}"),
                    None => format!("started {name}"),
                };
                match color {
                    Some(code) => println!("\x1b[{code}m{line}\x1b[0m"),
                    None => println!("{line}"),
                }
                Ok(())
            })
        },
    );
    Ok(Command::basic("start a service", param)?
        .with_readme("Without ID the service gets the next free slot."))
}

fn stop() -> Result<Command> {
    let param = Param::map2(
        Param::flag("-force", flag::no_arg(), "do not wait for a clean shutdown"),
        Param::anon(anons::non_empty_sequence(anons::one("ID", arg_type::int()))),
        |force, (first, rest)| {
            body(move || {
                let how = if force { "killed" } else { "stopped" };
                for id in std::iter::once(first).chain(rest) {
                    println!("{how} {id}");
                }
                Ok(())
            })
        },
    );
    Ok(Command::basic("stop services", param)?)
}

fn list() -> Result<Command> {
    let param = Param::map3(
        Param::flag("-tag", flag::listed(arg_type::string()), "TAG only services with this tag"),
        choose_one_optional(vec![
            Param::flag("-running", flag::no_arg_some("running"), "only running services"),
            Param::flag("-stopped", flag::no_arg_some("stopped"), "only stopped services"),
        ]),
        Param::flag(
            "-fields",
            flag::optional_with_default(
                vec!["name".to_string()],
                arg_type::comma_separated(arg_type::string()),
            ),
            "FIELDS comma separated columns",
        ),
        |tags, state, fields| {
            body(move || {
                println!("fields: {}", fields.join(","));
                println!("state: {}", state.unwrap_or("any"));
                println!("tags: {}", tags.join(","));
                Ok(())
            })
        },
    );
    Ok(Command::basic("list services", param)?)
}

fn config() -> Result<Command> {
    let set = Param::anon(anons::t2(
        anons::one("KEY", arg_type::string()),
        anons::one("VALUE", arg_type::string()),
    ))
    .map(|(key, value)| {
        body(move || {
            if key.starts_with('.') {
                bail!("config key {key} is hidden");
            }
            println!("{key} = {value}");
            Ok(())
        })
    });
    let get = Param::map2(
        Param::flag(
            "-format",
            flag::optional_with_default(
                "plain",
                arg_type::of_alist([("plain", "plain"), ("json", "json")]),
            ),
            "FORMAT output format",
        ),
        Param::anon(anons::one("KEY", arg_type::string())),
        |format, key| {
            body(move || {
                match format {
                    "json" => println!("{}", serde_json::json!({ "key": key, "value": null })),
                    _ => println!("{key} is unset"),
                }
                Ok(())
            })
        },
    );
    Ok(Command::group(
        "read and write configuration",
        [
            ("set", Command::basic("set a key", set)?),
            ("get", Command::basic("print a key", get)?),
        ],
    )?)
}

fn exec() -> Result<Command> {
    let param = Param::map3(
        Param::flag("-dry-run", flag::no_arg(), "print the command instead of running it"),
        Param::flag("-in", flag::optional(arg_type::file()), "DIR working directory"),
        Param::flag("--", flag::escape(), "the command to run"),
        |dry_run, dir, command| {
            body(move || {
                let Some(command) = command.filter(|words| !words.is_empty()) else {
                    bail!("nothing to run, pass the command after --");
                };
                let dir = dir.unwrap_or_else(|| PathBuf::from("."));
                let verb = if dry_run { "would run" } else { "running" };
                println!("{verb} in {}: {}", dir.display(), command.join(" "));
                Ok(())
            })
        },
    );
    Ok(Command::basic("run a command next to the services", param)?)
}

fn tree() -> Result<Command> {
    let mut subcommands = vec![
        ("start", start()?),
        ("stop", stop()?),
        ("list", list()?),
        ("config", config()?),
        ("exec", exec()?),
        (
            "license",
            Command::basic(
                "print the license and exit",
                Param::flag(
                    "-short",
                    flag::no_arg_abort(Exit::new(0, "Apache-2.0\n")),
                    "print the SPDX identifier only",
                )
                .map(|()| {
                    body(|| {
                        println!("Licensed under the Apache License, Version 2.0.");
                        Ok(())
                    })
                }),
            )?,
        ),
    ];
    if let Some(program) = std::env::var_os(DELEGATE_ENV_VAR) {
        let working_dir = std::env::current_dir()?;
        subcommands.push(("tool", Command::exec("run the configured tool", working_dir, program)));
    }
    Ok(Command::group("manage demo services", subcommands)?)
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

fn main() -> ExitCode {
    init_tracing();
    let root = match tree() {
        Ok(root) => root,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let version = env!("CARGO_PKG_VERSION");
    let config = RunConfig::new(version)
        .build_info(format!("cmdtree-demo {version} ({})", std::env::consts::ARCH))
        .extend(|path: &[String]| vec![format!("--invoked-as={}", path.join(" "))]);
    cmdtree::run(root, config)
}
