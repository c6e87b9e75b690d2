use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chorus_core::clock::now_ms;
use chorus_core::commit::{Commit, CommitEvent, verify_strict};
use chorus_core::db::ingest::Ingestor;
use chorus_core::db::query;
use chorus_core::engine::DocId;
use clap::Args;
use serde::Serialize;

use super::Project;
use crate::output::{self, OutputMode};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSONL file of wire envelopes; omit to read from stdin.
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Name for channels created by this import (defaults to the doc id).
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub lines: usize,
    pub undecodable_lines: usize,
    pub channels: Vec<ChannelImport>,
}

#[derive(Debug, Serialize)]
pub struct ChannelImport {
    pub channel_id: String,
    pub doc_id: DocId,
    pub commits: usize,
    /// Commits whose hash did not verify.
    pub rejected: usize,
    /// Commits inside a batch envelope that could not be decoded.
    pub undecodable: usize,
    pub messages: usize,
    pub documents: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct PendingDoc {
    commits: Vec<Commit>,
    undecodable: usize,
}

/// Import a JSONL stream of wire envelopes into the local store.
///
/// # Errors
///
/// Returns an error if the input cannot be read or a store write fails.
/// Undecodable lines, undecodable commits inside a batch, and commits that
/// fail verification are counted and skipped.
pub fn run_import(args: &ImportArgs, mode: OutputMode, project_root: &Path) -> Result<()> {
    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let project = Project::open(project_root, true)?;
    let report = import_lines(&project, reader, args.name.as_deref())?;
    output::render(mode, &report, render_human)
}

fn import_lines(
    project: &Project,
    reader: impl BufRead,
    name: Option<&str>,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    let mut by_doc: BTreeMap<DocId, PendingDoc> = BTreeMap::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("read import input")?;
        if line.trim().is_empty() {
            continue;
        }
        report.lines += 1;
        match CommitEvent::decode_json(&line) {
            Ok(decoded) => {
                let pending = by_doc.entry(decoded.event.doc_id().clone()).or_default();
                pending.commits.extend_from_slice(decoded.event.commits());
                pending.undecodable += decoded.rejected.len();
            }
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "skipping undecodable envelope");
                report.undecodable_lines += 1;
            }
        }
    }

    let ingestor = Ingestor::new(&project.conn)
        .with_skew_threshold(project.config.project.clock.skew_threshold_secs);
    for (doc_id, PendingDoc { commits, undecodable }) in by_doc {
        let channel = query::ensure_channel(
            &project.conn,
            &doc_id,
            name.unwrap_or_else(|| doc_id.as_str()),
            now_ms(),
        )?;

        let total = commits.len();
        let verified: Vec<Commit> = commits
            .into_iter()
            .filter(|commit| match verify_strict(commit) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(commit = %commit.hash, code = %e.code(), error = %e, "rejecting commit");
                    false
                }
            })
            .collect();

        let persisted = ingestor.ingest(&channel, &verified)?;
        tracing::info!(
            channel = %channel.id,
            doc = %doc_id,
            messages = persisted.message_count,
            documents = persisted.document_count,
            "imported channel"
        );
        report.channels.push(ChannelImport {
            channel_id: channel.id,
            doc_id,
            commits: total,
            rejected: total - verified.len(),
            undecodable,
            messages: persisted.message_count,
            documents: persisted.document_count,
            skipped: persisted.skipped,
        });
    }
    Ok(report)
}

fn render_human(report: &ImportReport, w: &mut dyn Write) -> io::Result<()> {
    for channel in &report.channels {
        output::section(w, &format!("{} ({})", channel.doc_id, channel.channel_id))?;
        output::kv(w, "commits", channel.commits.to_string())?;
        output::kv(w, "messages", channel.messages.to_string())?;
        output::kv(w, "documents", channel.documents.to_string())?;
        output::kv(w, "skipped", channel.skipped.to_string())?;
        output::kv(w, "rejected", channel.rejected.to_string())?;
        if channel.undecodable > 0 {
            output::kv(w, "undecodable", channel.undecodable.to_string())?;
        }
        writeln!(w)?;
    }
    if report.undecodable_lines > 0 {
        writeln!(w, "{} undecodable lines skipped", report.undecodable_lines)?;
    }
    writeln!(w, "imported {} lines", report.lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::commit::create;
    use chorus_core::payload::Payload;

    fn envelope(doc: &str, commit: &Commit) -> String {
        CommitEvent::CommitAdded {
            doc_id: DocId::new(doc),
            commit: commit.clone(),
        }
        .to_json()
    }

    #[test]
    fn imports_grouped_by_document_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let project = Project::open(dir.path(), true).expect("open");
        let msg = create(&Payload::message("alice", "hi", 1).encode(), vec![]);
        let doc = create(&Payload::document("bob", "text", 2).encode(), vec![]);
        let mut forged = create(&Payload::message("eve", "x", 3).encode(), vec![]);
        forged.contents = b"tampered".to_vec();

        let input = [
            r#"{"type":"docCreated","id":"doc-1"}"#.to_owned(),
            envelope("doc-1", &msg),
            String::new(),
            "garbage".to_owned(),
            envelope("doc-1", &doc),
            envelope("doc-2", &forged),
        ]
        .join("\n");

        let report = import_lines(&project, input.as_bytes(), Some("general")).expect("import");
        assert_eq!(report.lines, 5);
        assert_eq!(report.undecodable_lines, 1);
        assert_eq!(report.channels.len(), 2);
        let first = &report.channels[0];
        assert_eq!((first.messages, first.documents, first.rejected), (1, 1, 0));
        assert_eq!(report.channels[1].rejected, 1);

        let again = import_lines(&project, input.as_bytes(), None).expect("reimport");
        assert_eq!(again.channels[0].messages, 0);
        assert_eq!(again.channels[0].documents, 0);
    }

    #[test]
    fn batch_with_one_bad_commit_imports_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let project = Project::open(dir.path(), true).expect("open");
        let msg = create(&Payload::message("alice", "survivor", 1).encode(), vec![]);
        let batch = CommitEvent::CommitsAdded {
            doc_id: DocId::new("doc-1"),
            commits: vec![msg.clone()],
        }
        .to_json();
        let head = batch.strip_suffix("]}").expect("commits last");
        let line = format!(
            r#"{head},{{"parents":[],"hash":"{}","contents":"%%%"}}]}}"#,
            msg.hash
        );

        let report = import_lines(&project, line.as_bytes(), None).expect("import");
        assert_eq!(report.undecodable_lines, 0);
        let channel = &report.channels[0];
        assert_eq!((channel.commits, channel.messages), (1, 1));
        assert_eq!(channel.undecodable, 1);
    }
}
