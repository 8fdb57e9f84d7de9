mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rmk_lib::consts::{APP_NAME, DEFAULT_TASK};

use crate::output::print_error;

/// rmk - incremental build engine driven by Lua build specs
#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Task to run on the root spec
  #[arg(default_value = DEFAULT_TASK)]
  task: String,

  /// Change to this directory before loading the root spec
  #[arg(short = 'C', long, value_name = "DIR")]
  directory: Option<PathBuf>,

  /// Write the invocation graph as JSON to this file
  #[arg(long, value_name = "FILE")]
  graph: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let args = cmd::BuildArgs {
    task: cli.task,
    directory: cli.directory,
    graph: cli.graph,
  };

  match cmd::cmd_build(&args) {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{:#}", e));
      println!("Build Failed");
      ExitCode::FAILURE
    }
  }
}

/// Logs go to stderr so stdout carries only command output and the result line.
fn init_tracing(verbose: u8) {
  let filter = match verbose {
    0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    1 => EnvFilter::new("info"),
    _ => EnvFilter::new("debug"),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
