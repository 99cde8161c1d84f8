use std::path::PathBuf;
use std::process::ExitCode;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use image::Limits;
use log::{debug, Level};

#[rustfmt::skip]
fn create_cmd_args() -> Command {
    Command::new("ppm2png")
        .about("Convert plain text PPM (P3) images into other image formats")
        .arg(Arg::new("source")
            .help("PPM file to read")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("dest")
            .help("Image file to write, the format follows from its extension")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("max-width")
            .long("max-width")
            .help_heading("LIMITS")
            .help("Reject images wider than this many pixels")
            .value_parser(value_parser!(u32)))
        .arg(Arg::new("max-height")
            .long("max-height")
            .help_heading("LIMITS")
            .help("Reject images taller than this many pixels")
            .value_parser(value_parser!(u32)))
        .arg(Arg::new("max-alloc")
            .long("max-alloc")
            .help_heading("LIMITS")
            .help("Reject images whose pixel buffer needs more than this many bytes")
            .long_help("Reject images whose pixel buffer needs more than this many bytes.\nDefaults to 512 MiB.")
            .value_parser(value_parser!(u64)))
        .arg(Arg::new("debug")
            .long("debug")
            .action(ArgAction::SetTrue)
            .help_heading("LOGGING")
            .help("Display debug information and higher"))
        .arg(Arg::new("trace")
            .long("trace")
            .action(ArgAction::SetTrue)
            .help_heading("LOGGING")
            .help("Display very verbose information"))
        .arg(Arg::new("warn")
            .long("warn")
            .action(ArgAction::SetTrue)
            .help_heading("LOGGING")
            .help("Display warnings and errors"))
        .arg(Arg::new("info")
            .long("info")
            .action(ArgAction::SetTrue)
            .help_heading("LOGGING")
            .help("Display information about the conversion steps"))
}

fn setup_logger(options: &ArgMatches) {
    let log_level = if options.get_flag("trace") {
        Level::Trace
    } else if options.get_flag("debug") {
        Level::Debug
    } else if options.get_flag("info") {
        Level::Info
    } else {
        Level::Warn
    };

    if let Err(e) = simple_logger::init_with_level(log_level) {
        eprintln!("Could not initialize logger: {e}");
    }
    debug!("Log level: {}", log_level);
}

fn limits_from_options(options: &ArgMatches) -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = options.get_one::<u32>("max-width").copied();
    limits.max_image_height = options.get_one::<u32>("max-height").copied();
    if let Some(&max_alloc) = options.get_one::<u64>("max-alloc") {
        limits.max_alloc = Some(max_alloc);
    }
    limits
}

fn main() -> ExitCode {
    let mut cmd = create_cmd_args();
    let options = cmd.clone().get_matches();

    setup_logger(&options);

    let (Some(source), Some(dest)) = (
        options.get_one::<PathBuf>("source"),
        options.get_one::<PathBuf>("dest"),
    ) else {
        println!("Missing arguments:\n\n{}", cmd.render_usage());
        return ExitCode::FAILURE;
    };

    let limits = limits_from_options(&options);
    match ppm2png::convert(source, dest, &limits) {
        Ok(_) => {
            println!("Processed {} into {}", source.display(), dest.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
