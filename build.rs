// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn db_path_arg() -> Arg {
    Arg::new("db_path")
        .short('d')
        .long("db-path")
        .value_name("PATH")
        .default_value("/var/lib/quarry/quarry.db")
        .help("Database path")
}

fn build_cli() -> Command {
    Command::new("quarry")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Quarry Contributors")
        .about("Package manager with transactional installs")
        .subcommand_required(false)
        .subcommand(
            Command::new("init")
                .about("Initialize the Quarry database")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages from files, URLs, or repositories")
                .arg(
                    Arg::new("specs")
                        .required(true)
                        .num_args(1..)
                        .help("Package names, file paths, file:// or http(s):// URLs"),
                )
                .arg(
                    Arg::new("assumeyes")
                        .short('y')
                        .long("assumeyes")
                        .action(clap::ArgAction::SetTrue)
                        .help("Answer yes to all prompts"),
                )
                .arg(
                    Arg::new("nogpgcheck")
                        .long("nogpgcheck")
                        .action(clap::ArgAction::SetTrue)
                        .help("Accept repository packages without a published checksum"),
                )
                .arg(
                    Arg::new("all_or_nothing")
                        .long("all-or-nothing")
                        .action(clap::ArgAction::SetTrue)
                        .help("Roll back the entire transaction if any entry fails"),
                )
                .arg(db_path_arg())
                .arg(
                    Arg::new("cache_dir")
                        .long("cache-dir")
                        .default_value("/var/cache/quarry/packages")
                        .help("Package download cache directory"),
                ),
        )
        .subcommand(
            Command::new("reinstall")
                .about("Reinstall packages, even when the same version is already installed")
                .arg(
                    Arg::new("specs")
                        .required(true)
                        .num_args(1..)
                        .help("Package names, file paths, file:// or http(s):// URLs"),
                )
                .arg(
                    Arg::new("assumeyes")
                        .short('y')
                        .long("assumeyes")
                        .action(clap::ArgAction::SetTrue)
                        .help("Answer yes to all prompts"),
                )
                .arg(
                    Arg::new("nogpgcheck")
                        .long("nogpgcheck")
                        .action(clap::ArgAction::SetTrue)
                        .help("Accept repository packages without a published checksum"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("erase")
                .about("Remove installed packages")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Package names to remove"),
                )
                .arg(
                    Arg::new("assumeyes")
                        .short('y')
                        .long("assumeyes")
                        .action(clap::ArgAction::SetTrue)
                        .help("Answer yes to all prompts"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List installed packages")
                .arg(Arg::new("pattern").help("Package name pattern (optional)"))
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("Show transaction history")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("makecache")
                .about("Refresh metadata for all enabled repositories")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("repo")
                .about("Manage package repositories")
                .subcommand(
                    Command::new("add")
                        .about("Add a repository")
                        .arg(Arg::new("name").required(true).help("Repository name"))
                        .arg(Arg::new("url").required(true).help("Base URL"))
                        .arg(db_path_arg()),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Remove a repository")
                        .arg(Arg::new("name").required(true).help("Repository name"))
                        .arg(db_path_arg()),
                )
                .subcommand(
                    Command::new("list")
                        .about("List configured repositories")
                        .arg(db_path_arg()),
                )
                .subcommand(
                    Command::new("enable")
                        .about("Enable a repository")
                        .arg(Arg::new("name").required(true).help("Repository name"))
                        .arg(db_path_arg()),
                )
                .subcommand(
                    Command::new("disable")
                        .about("Disable a repository")
                        .arg(Arg::new("name").required(true).help("Repository name"))
                        .arg(db_path_arg()),
                ),
        )
        .subcommand(
            Command::new("completion")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("Shell name")),
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
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("quarry.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
