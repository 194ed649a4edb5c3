// devmake: download, verify and install developer tools with a single command.
//
//   devmake rust                  install the default Rust toolchain
//   devmake ide idea --variant eap
//   devmake go go-lang --remove
//   devmake --list

mod cli;
mod commands;
mod libs;
mod logger;
mod schemas;

use clap::Parser;
use colored::Colorize;
use cli::cmd_enums::Cli;
use commands::{install, list, remove};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.debug);
    log_debug!("[devmake] {:?}", cli);

    let result = if cli.list {
        list::run(&cli)
    } else if cli.remove {
        remove::run(&cli)
    } else {
        install::run(&cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log_error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
