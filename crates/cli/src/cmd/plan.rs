//! Implementation of the `memake plan` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use memake_lib::command::CommandKind;
use memake_lib::execute::{PlannedAction, PlannedCommand};
use memake_lib::ops::{BuildOptions, Workspace, plan};

use crate::output::{Mark, OutputFormat, json, line, reason_line, stat};

#[derive(Serialize)]
struct PlanEntry {
  id: String,
  kind: CommandKind,
  label: String,
  command: String,
  run: bool,
  reason: String,
}

fn reason(planned: &PlannedCommand, all: &[PlannedCommand]) -> String {
  match &planned.action {
    PlannedAction::Run(staleness) => staleness.to_string(),
    PlannedAction::RunAfter(dep) => match all.iter().find(|p| &p.id == dep) {
      Some(p) => format!("after {} {}", p.kind, p.label),
      None => format!("after {}", dep),
    },
    PlannedAction::Skip => "up to date".to_string(),
  }
}

/// Execute the plan command.
///
/// Reports which commands `build` would run and why, without running any.
pub fn cmd_plan(file: &Path, options: &BuildOptions, verbose: bool, format: OutputFormat) -> Result<()> {
  let ws = Workspace::load(file).with_context(|| format!("Failed to load project: {}", file.display()))?;
  let planned = plan(&ws, options).context("Failed to plan build")?;

  if format.is_json() {
    let entries: Vec<PlanEntry> = planned
      .iter()
      .map(|p| PlanEntry {
        id: p.id.0.clone(),
        kind: p.kind,
        label: p.label.clone(),
        command: p.command.clone(),
        run: p.action.will_run(),
        reason: reason(p, &planned),
      })
      .collect();
    return json(&entries);
  }

  let to_run = planned.iter().filter(|p| p.action.will_run()).count();
  if to_run == 0 {
    line(Mark::Done, "Everything is up to date");
    return Ok(());
  }

  for p in &planned {
    let mark = match &p.action {
      PlannedAction::Run(_) => Mark::Stale,
      PlannedAction::RunAfter(_) => Mark::Follows,
      PlannedAction::Skip if verbose => Mark::UpToDate,
      PlannedAction::Skip => continue,
    };
    reason_line(mark, &format!("{} {}", p.kind, p.label), &reason(p, &planned));
    if verbose {
      println!("      {}", p.command);
    }
  }

  println!();
  stat("To run", to_run);
  stat("Up to date", planned.len() - to_run);
  Ok(())
}
