//! Implementation of the default `rmk [TASK]` command.
//!
//! Loads the spec in the current directory, runs one task on it and reports
//! `Build OK` or `Build Failed` on stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use rmk_lib::graph::GraphSnapshot;
use rmk_lib::{Engine, EngineConfig};

use crate::output::{format_duration, print_error, write_json};

pub struct BuildArgs {
  pub task: String,
  pub directory: Option<PathBuf>,
  pub graph: Option<PathBuf>,
}

/// Run the build.
///
/// Setup problems (bad configuration, missing directory) are returned as
/// errors. A failing build is reported here and turned into a failure exit
/// code. The graph file is written in both cases.
pub fn cmd_build(args: &BuildArgs) -> Result<ExitCode> {
  let config = EngineConfig::from_env().context("Invalid configuration")?;

  // Resolve the graph path before changing directory so it stays relative to
  // where the user invoked us.
  let graph_path = match &args.graph {
    Some(path) => Some(std::path::absolute(path).context("Failed to resolve graph path")?),
    None => None,
  };

  if let Some(dir) = &args.directory {
    std::env::set_current_dir(dir).with_context(|| format!("Failed to enter directory {}", dir.display()))?;
  }

  let started = Instant::now();
  let engine = Engine::new(config);
  let result = engine.run(Path::new("."), &args.task);

  if let Some(path) = &graph_path {
    write_graph(path, &engine.graph())?;
  }

  match result {
    Ok(report) => {
      debug!(
        spec = %report.spec.display(),
        specs = report.specs_loaded,
        invocations = report.graph.nodes.len(),
        "build finished"
      );
      println!("Build OK ({})", format_duration(started.elapsed()));
      Ok(ExitCode::SUCCESS)
    }
    Err(e) => {
      print_error(&e.to_string());
      println!("Build Failed");
      Ok(ExitCode::FAILURE)
    }
  }
}

fn write_graph(path: &Path, graph: &GraphSnapshot) -> Result<()> {
  write_json(path, graph).with_context(|| format!("Failed to write graph to {}", path.display()))?;
  debug!(path = %path.display(), "graph written");
  Ok(())
}
