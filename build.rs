// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: install root directory
fn root_arg() -> Arg {
    Arg::new("root")
        .short('r')
        .long("root")
        .value_name("DIR")
        .help("Install root directory")
}

fn build_cli() -> Command {
    Command::new("cabman")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Cabman Contributors")
        .about("Transactional package manager for cabinet archives")
        .arg(root_arg())
        .subcommand(
            Command::new("install")
                .about("Install packages from files, URLs, or remote names")
                .arg(Arg::new("packages").required(true).num_args(1..))
                .arg(Arg::new("version").long("version").help("Specific version when installing by name"))
                .arg(Arg::new("arch").long("arch").help("Specific architecture when installing by name")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(Arg::new("packages").num_args(0..))
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(clap::ArgAction::SetTrue)
                        .help("Remove every installed package"),
                ),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade installed packages along their recorded upgrade paths")
                .arg(Arg::new("packages").num_args(0..))
                .arg(Arg::new("prefer").long("prefer").value_parser(["stable", "daily"])),
        )
        .subcommand(
            Command::new("source")
                .about("Install the source companion of an installed package")
                .arg(Arg::new("package").required(true)),
        )
        .subcommand(
            Command::new("symbols")
                .about("Install the symbol companion of an installed package")
                .arg(Arg::new("package").required(true)),
        )
        .subcommand(
            Command::new("list").about("List installed packages").arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(clap::ArgAction::SetTrue),
            ),
        )
        .subcommand(
            Command::new("list-remote")
                .about("List packages available from the configured sources")
                .arg(Arg::new("source").long("source")),
        )
        .subcommand(Command::new("sources").about("Manage package sources"))
        .subcommand(Command::new("mirrors").about("Manage mirror substitution rules"))
        .subcommand(
            Command::new("download")
                .about("Download cabinets into a directory without installing")
                .arg(Arg::new("packages").required(true).num_args(1..))
                .arg(Arg::new("dir").long("dir").required(true)),
        )
}

fn main() -> std::io::Result<()> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let cmd = build_cli();
    let man = Man::new(cmd.clone());
    let mut buffer: Vec<u8> = Vec::new();
    man.render(&mut buffer)?;
    fs::write(man_dir.join("cabman.1"), buffer)?;

    for sub in cmd.get_subcommands() {
        let man = Man::new(sub.clone());
        let mut buffer: Vec<u8> = Vec::new();
        man.render(&mut buffer)?;
        fs::write(man_dir.join(format!("cabman-{}.1", sub.get_name())), buffer)?;
    }

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
