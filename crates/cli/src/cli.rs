//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "replkit", version, about = "Drive a remote repl from your terminal")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store the API key used to authenticate sessions
    Auth {
        /// The key to store; read from the environment when omitted
        #[arg(short, long, env = "REPLKIT_KEY")]
        key: Option<String>,
    },

    /// Link the current directory to a repl so commands can omit it
    Link {
        /// Repl id or @user/slug name
        repl: String,
    },

    /// Open an interactive shell on the repl
    Bash {
        /// Repl id or @user/slug name; defaults to the linked repl
        repl: Option<String>,
    },

    /// Execute a program on the repl and stream its output
    Exec {
        /// Repl id or @user/slug name; defaults to the linked repl
        #[arg(short, long)]
        repl: Option<String>,

        /// Program to execute
        program: String,

        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        arguments: Vec<String>,
    },

    /// Copy files between the local machine and the repl
    ///
    /// Remote paths are written with a `repl:` prefix, e.g.
    /// `replkit cp src/main.py repl:main.py my-repl`.
    Cp {
        src: String,
        dest: String,

        /// Repl id or @user/slug name; defaults to the linked repl
        repl: Option<String>,

        /// Abort a multi-file copy on the first failed write
        #[arg(long)]
        fail_fast: bool,
    },

    /// Start the repl's configured run target
    Run {
        /// Stop the running program instead of starting it
        #[arg(long, conflicts_with = "restart")]
        stop: bool,

        /// Stop the running program, then start it again
        #[arg(long)]
        restart: bool,

        /// Repl id or @user/slug name; defaults to the linked repl
        repl: Option<String>,
    },

    /// Run several commands over one shared connection
    ///
    /// Commands are separated by `--`; write `\--` for a literal `--`
    /// argument. Example:
    /// `replkit bulk -- cp a.py repl:a.py my-repl -- run my-repl`.
    Bulk {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}
