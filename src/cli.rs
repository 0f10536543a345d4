//! The CLI surface of §6: flags only, no subcommands, grounded on
//! `control::cmd::serve::Args`'s `#[derive(clap::Args)]` shape.

use std::path::PathBuf;

use clap::Parser;

/// Exit codes reused by [`crate::main`], matching the BSD `sysexits.h`
/// convention the reference implementation follows.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const USAGE: i32 = 64;
    pub const DATA_ERROR: i32 = 65;
    pub const NO_DATABASE: i32 = 66;
}

#[derive(Parser, Debug)]
#[command(name = "tchatator413", about = "Direct-messaging server mediating administrators, professional accounts and member accounts")]
pub struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the resolved configuration and exit.
    #[arg(long)]
    pub dump_config: bool,

    /// Read one request from stdin (or the first positional argument),
    /// print one response, and exit — skips the TCP listener entirely.
    #[arg(short, long)]
    pub interactive: bool,

    /// Decrement log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Increment log verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The request body to evaluate in `--interactive` mode, in place of stdin.
    pub request: Option<String>,
}

impl Cli {
    /// Combines `-q`/`-v` into the single signed verbosity level that
    /// `Settings::log_warning`/`log_info`/`log_debug` read.
    pub fn verbosity(&self) -> i32 {
        if self.verbose >= 2 {
            i32::MAX
        } else {
            self.verbose as i32 - self.quiet as i32
        }
    }
}
