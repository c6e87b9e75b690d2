use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use chorus_core::clock::format_ms;
use chorus_core::db::query;
use chorus_core::model::Message;
use clap::Args;

use super::Project;
use crate::output::{self, OutputMode};

#[derive(Args, Debug)]
pub struct MessagesArgs {
    /// Channel id or document id.
    pub channel: String,
}

/// Print a channel's chat messages, oldest first.
///
/// # Errors
///
/// Returns an error if the store is missing or the channel is unknown.
pub fn run_messages(args: &MessagesArgs, mode: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root, false)?;
    let channel = project.channel(&args.channel)?;
    let messages = query::list_messages(&project.conn, &channel.id)?;
    output::render(mode, &messages, |messages, w| render_human(messages, w))
}

fn render_human(messages: &[Message], w: &mut dyn Write) -> io::Result<()> {
    if messages.is_empty() {
        return writeln!(w, "(no messages)");
    }
    for message in messages {
        writeln!(
            w,
            "[{}] {}: {}",
            format_ms(message.timestamp_ms),
            message.user,
            message.content
        )?;
    }
    Ok(())
}
