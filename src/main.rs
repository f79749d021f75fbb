//! Punto de entrada ("driver").
//!
//! Este módulo expone una CLI sobre [`boardcheck::check`].

use anyhow::{bail, Context};
use boardcheck::{CheckFlags, Options};
use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::{path::PathBuf, process};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("boardcheck")
        .version(crate_version!())
        .about("Validates SDK board-definition headers")
        .arg(
            Arg::new("header")
                .value_name("HEADER")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Board header to validate"),
        )
        .arg(
            Arg::new("sdk")
                .long("sdk")
                .value_name("DIR")
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("SDK root holding src/<chip>/*_interface_pins.json"),
        )
        .arg(
            Arg::new("warnings")
                .short('W')
                .long("warnings")
                .action(ArgAction::SetTrue)
                .help("Also print warnings"),
        )
        .arg(
            Arg::new("deny-warnings")
                .long("deny-warnings")
                .action(ArgAction::SetTrue)
                .help("Treat warnings as errors"),
        )
        .arg(
            Arg::new("require-include-suggestion")
                .long("require-include-suggestion")
                .action(ArgAction::SetTrue)
                .help("Require a comment suggesting how to include the header"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Log progress to stderr (repeat for more detail)"),
        )
        .get_matches();

    // El nivel de logging depende únicamente de -v
    let level = match args.get_count("verbose") {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::new(level))
        .init();

    // Se extraen argumentos necesarios
    let header = args
        .get_one::<PathBuf>("header")
        .context("Missing header argument")?;

    let sdk = args
        .get_one::<PathBuf>("sdk")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    if !header.is_file() {
        bail!("{} doesn't exist", header.display());
    }

    let mut flags = CheckFlags::empty();
    if args.get_flag("deny-warnings") {
        flags |= CheckFlags::DENY_WARNINGS;
    }

    if args.get_flag("require-include-suggestion") {
        flags |= CheckFlags::REQUIRE_INCLUDE_SUGGESTION;
    }

    let show_warnings = args.get_flag("warnings");
    let options = Options { sdk, flags };

    match boardcheck::check(header, &options) {
        Ok(report) => {
            if show_warnings && !report.warnings().is_empty() {
                eprint!("{}", report.warnings());
            }

            Ok(())
        }

        Err(failure) => {
            if show_warnings && !failure.warnings().is_empty() {
                eprint!("{}", failure.warnings());
            }

            eprintln!("{}", failure);
            process::exit(1);
        }
    }
}
