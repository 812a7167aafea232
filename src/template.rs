//! `{field}` substitution for reward commands.
//!
//! Values are inserted as raw text. A vote site controls every field except
//! the username charset, so a command sink that interprets its input (chat
//! colour codes, selectors, newlines in batched mode) sees whatever the site
//! sent. Sanitising is the sink's job.

use crate::vote_codec::VoteRecord;
use serde::{Deserialize, Serialize};

/// How the expanded commands of one vote reach the command sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One `send_command` call per configured template, in order.
    #[default]
    Separate,
    /// A single call carrying every command, each terminated by `\n`.
    Batched,
}

/// Expand every known `{placeholder}` in `template` using `record`.
///
/// Single pass: substituted text is never rescanned, and unknown or
/// unterminated brace sequences are copied through unchanged.
pub fn expand(template: &str, record: &VoteRecord) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];

        // `{` then the nearest `}` with no other `{` in between
        let close = after_open
            .find(|c: char| c == '{' || c == '}')
            .filter(|&idx| after_open.as_bytes()[idx] == b'}');

        match close.and_then(|idx| record.placeholder(&after_open[..idx]).map(|v| (idx, v))) {
            Some((idx, value)) => {
                out.push_str(value);
                rest = &after_open[idx + 1..];
            }
            None => {
                out.push('{');
                rest = after_open;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Expand each template independently, preserving configured order.
pub fn expand_all<S: AsRef<str>>(templates: &[S], record: &VoteRecord) -> Vec<String> {
    templates
        .iter()
        .map(|template| expand(template.as_ref(), record))
        .collect()
}

/// Group expanded commands into the payloads handed to the sink.
pub fn into_payloads(commands: Vec<String>, mode: DispatchMode) -> Vec<String> {
    match mode {
        DispatchMode::Separate => commands,
        DispatchMode::Batched if commands.is_empty() => Vec::new(),
        DispatchMode::Batched => {
            let mut batch = String::new();
            for command in commands {
                batch.push_str(&command);
                batch.push('\n');
            }
            vec![batch]
        }
    }
}
