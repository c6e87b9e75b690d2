use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use chorus_core::clock::format_ms;
use chorus_core::db::query;
use chorus_core::model::DocumentHistoryEntry;
use clap::Args;
use serde::Serialize;

use super::{Project, parse_time_ms};
use crate::output::{self, OutputMode};

const PREVIEW_CHARS: usize = 48;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Channel id or document id.
    pub channel: String,

    /// Only entries at or after this RFC 3339 time.
    #[arg(long)]
    pub from: Option<String>,

    /// Only entries at or before this RFC 3339 time.
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    index: usize,
    #[serde(flatten)]
    entry: &'a DocumentHistoryEntry,
}

/// List document revisions with their history index.
///
/// Indexes always refer to the full history, so a filtered listing still
/// shows the index `chorus blame --at` expects.
///
/// # Errors
///
/// Returns an error if a time bound is malformed, the store is missing, or
/// the channel is unknown.
pub fn run_history(args: &HistoryArgs, mode: OutputMode, project_root: &Path) -> Result<()> {
    let from = args
        .from
        .as_deref()
        .map(|raw| parse_time_ms("--from", raw))
        .transpose()?;
    let to = args
        .to
        .as_deref()
        .map(|raw| parse_time_ms("--to", raw))
        .transpose()?;

    let project = Project::open(project_root, false)?;
    let channel = project.channel(&args.channel)?;
    let entries = query::document_history(&project.conn, &channel.id)?;
    let rows: Vec<HistoryRow<'_>> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| from.is_none_or(|f| e.timestamp_ms >= f))
        .filter(|(_, e)| to.is_none_or(|t| e.timestamp_ms <= t))
        .map(|(index, entry)| HistoryRow { index, entry })
        .collect();

    output::render(mode, &rows, |rows, w| render_human(rows, w))
}

fn render_human(rows: &[HistoryRow<'_>], w: &mut dyn Write) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(w, "(no revisions)");
    }
    for row in rows {
        writeln!(
            w,
            "{:>4}  {}  {:<12}  {}  {}",
            row.index,
            row.entry.commit_hash.short(),
            row.entry.user,
            format_ms(row.entry.timestamp_ms),
            preview(&row.entry.content)
        )?;
    }
    Ok(())
}

fn preview(content: &str) -> String {
    let flat: String = content
        .chars()
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS - 1).collect();
    cut.push('…');
    cut
}
