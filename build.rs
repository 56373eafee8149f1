// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("layerscan")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Layerscan Contributors")
        .about("Detect installed packages in container image layers")
        .subcommand_required(false)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("scan")
                .about("Scan layers (tarballs or directories, base layer first)")
                .arg(
                    Arg::new("layers")
                        .required(true)
                        .num_args(1..)
                        .help("Layer paths"),
                )
                .arg(
                    Arg::new("detector")
                        .short('d')
                        .long("detector")
                        .action(ArgAction::Append)
                        .help("Only run the named detector (repeatable)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                )
                .arg(
                    Arg::new("max_file_size")
                        .long("max-file-size")
                        .value_name("BYTES")
                        .default_value("536870912")
                        .help("Largest file to read from a layer, in bytes"),
                )
                .arg(
                    Arg::new("sequential")
                        .long("sequential")
                        .action(ArgAction::SetTrue)
                        .help("Scan layers one at a time"),
                ),
        )
        .subcommand(
            Command::new("detectors").about("List registered detectors and the files they read"),
        )
        .subcommand(
            Command::new("compare")
                .about("Compare two Debian versions")
                .arg(Arg::new("a").required(true).help("First version"))
                .arg(Arg::new("b").required(true).help("Second version")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("layerscan.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
