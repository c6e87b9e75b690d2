use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use chorus_core::db::verify::{CheckStatus, VerifyReport, verify_store};
use chorus_core::error::ErrorCode;
use clap::Args;

use super::{CodedError, Project};
use crate::output::{self, OutputMode};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Rebuild stale or missing document snapshots from history.
    #[arg(long)]
    pub repair: bool,
}

/// Check the store's schema, indexes, and snapshot consistency.
///
/// # Errors
///
/// Returns an error when any check fails.
pub fn run_verify(args: &VerifyArgs, mode: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root, false)?;
    let report = verify_store(&project.conn, args.repair)?;
    output::render(mode, &report, render_human)?;

    if report.is_ok() {
        Ok(())
    } else {
        Err(CodedError::new(ErrorCode::CorruptStore, "verify: failed").into())
    }
}

fn render_human(report: &VerifyReport, w: &mut dyn Write) -> io::Result<()> {
    for check in &report.checks {
        match &check.status {
            CheckStatus::Verified => writeln!(w, "OK   {}", check.name)?,
            CheckStatus::Repaired => writeln!(w, "FIX  {} (rebuilt from history)", check.name)?,
            CheckStatus::Failed(reason) => writeln!(w, "FAIL {} ({reason})", check.name)?,
        }
    }
    if report.is_ok() {
        writeln!(w, "verify: success")?;
    }
    Ok(())
}
