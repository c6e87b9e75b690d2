use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use chorus_core::attribution::{AuthorPalette, OverlayLine, to_overlay_lines};
use chorus_core::db::query;
use chorus_core::history::HistoryNavigator;
use clap::Args;
use serde::Serialize;

use super::{CodedError, Project};
use crate::output::{self, OutputMode};

const PALETTE_SLOTS: usize = 8;

#[derive(Args, Debug)]
pub struct BlameArgs {
    /// Channel id or document id.
    pub channel: String,

    /// History index to show instead of the current document.
    #[arg(long, value_name = "INDEX")]
    pub at: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BlameReport {
    /// `None` for the current document.
    pub index: Option<usize>,
    pub content: String,
    pub lines: Vec<OverlayLine>,
    /// Authors in order of first appearance; the position is the color slot.
    pub authors: Vec<String>,
}

/// Show who wrote each character of a document, line by line.
///
/// # Errors
///
/// Returns an error if the store is missing, the channel is unknown, the
/// index is out of range, or the document exceeds the attribution bound.
pub fn run_blame(args: &BlameArgs, mode: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root, false)?;
    let channel = project.channel(&args.channel)?;
    let report = blame(&project, &channel.id, args.at)?;
    output::render(mode, &report, render_human)
}

fn blame(project: &Project, channel_id: &str, at: Option<usize>) -> Result<BlameReport> {
    let mut navigator = HistoryNavigator::new(project.config.project.attribution.max_chars);
    navigator.set_entries(query::document_history(&project.conn, channel_id)?);

    let view = match at {
        Some(index) => navigator.view_at(index),
        None => {
            let live = query::get_snapshot(&project.conn, channel_id)?
                .map(|s| s.content)
                .unwrap_or_default();
            navigator.current_view(&live, &project.config.user_name)
        }
    }
    .map_err(|e| CodedError::new(e.code(), e.to_string()))?;

    let lines = to_overlay_lines(&view.attribution, &project.config.user_name);
    let mut palette = AuthorPalette::new(PALETTE_SLOTS);
    palette.observe(&lines);
    Ok(BlameReport {
        index: view.index,
        content: view.content,
        lines,
        authors: palette.authors().to_vec(),
    })
}

fn render_human(report: &BlameReport, w: &mut dyn Write) -> io::Result<()> {
    let width = report.authors.iter().map(String::len).max().unwrap_or(0);
    for line in &report.lines {
        if line.segments.is_empty() {
            writeln!(w, "{:width$} |", "")?;
            continue;
        }
        for (i, seg) in line.segments.iter().enumerate() {
            let gutter = if i == 0 { seg.author.as_str() } else { "" };
            writeln!(w, "{gutter:width$} | {}", seg.text)?;
        }
    }
    if !report.authors.is_empty() {
        writeln!(w)?;
        writeln!(w, "authors: {}", report.authors.join(", "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::commit::create;
    use chorus_core::db::ingest::Ingestor;
    use chorus_core::engine::DocId;
    use chorus_core::error::ErrorCode;
    use chorus_core::payload::Payload;

    fn blame_code(project: &Project, channel_id: &str, at: Option<usize>) -> Option<ErrorCode> {
        blame(project, channel_id, at)
            .err()
            .and_then(|e| e.downcast_ref::<CodedError>().map(|c| c.code))
    }

    fn project_with_history() -> (tempfile::TempDir, Project, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let project = Project::open(dir.path(), true).expect("open");
        let channel =
            query::ensure_channel(&project.conn, &DocId::new("doc-1"), "notes", 0).expect("channel");
        let commits = [
            create(&Payload::document("alice", "hello", 10).encode(), vec![]),
            create(&Payload::document("bob", "hello world", 20).encode(), vec![]),
        ];
        Ingestor::new(&project.conn)
            .ingest_at(&channel, &commits, 20)
            .expect("ingest");
        (dir, project, channel.id)
    }

    #[test]
    fn live_blame_splits_authors() {
        let (_dir, project, channel_id) = project_with_history();
        let report = blame(&project, &channel_id, None).expect("blame");
        assert_eq!(report.index, None);
        assert_eq!(report.content, "hello world");
        assert_eq!(report.authors, vec!["alice".to_owned(), "bob".to_owned()]);
        assert_eq!(report.lines.len(), 1);
        assert_eq!(report.lines[0].segments[0].text, "hello");
    }

    #[test]
    fn pinned_blame_shows_the_older_revision() {
        let (_dir, project, channel_id) = project_with_history();
        let report = blame(&project, &channel_id, Some(0)).expect("blame");
        assert_eq!(report.content, "hello");
        assert_eq!(report.authors, vec!["alice".to_owned()]);
        assert_eq!(
            blame_code(&project, &channel_id, Some(5)),
            Some(ErrorCode::HistoryIndexOutOfRange)
        );
    }
}
