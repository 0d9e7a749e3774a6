//! Search tool: regex over file lines across the workspace.

use editstage_core::error::ToolError;
use editstage_core::tool::{SEARCH_FILES, SearchFilesInput, ToolOutcome};
use editstage_security::{forbidden_match, relative_display};
use regex_lite::Regex;
use std::path::Path;
use walkdir::WalkDir;

use crate::workspace::WorkspaceTools;

impl WorkspaceTools {
    /// Matches are reported as `path:line: text`, in path order, up to the
    /// configured result cap. Unreadable and non-UTF-8 files are skipped.
    pub(crate) async fn search_files(
        &self,
        input: SearchFilesInput,
    ) -> Result<ToolOutcome, ToolError> {
        let regex = match Regex::new(&input.pattern) {
            Ok(regex) => regex,
            Err(e) => return Ok(ToolOutcome::fail(format!("Invalid regex pattern: {e}"))),
        };
        let start = self.resolve(SEARCH_FILES, input.path.as_deref().unwrap_or("."))?;

        let root = self.root.clone();
        let forbidden = self.forbidden_paths.clone();
        let limit = self.max_search_results;
        let (matches, truncated) =
            tokio::task::spawn_blocking(move || scan(&root, &start, &forbidden, &regex, limit))
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: SEARCH_FILES.into(),
                    reason: e.to_string(),
                })?;

        if matches.is_empty() {
            return Ok(ToolOutcome::ok("No matches found"));
        }
        let mut output = matches.join("\n");
        if truncated {
            output.push_str(&format!("\n... (results truncated at {limit})"));
        }
        Ok(ToolOutcome::ok(output))
    }
}

fn scan(
    root: &Path,
    start: &Path,
    forbidden: &[String],
    regex: &Regex,
    limit: usize,
) -> (Vec<String>, bool) {
    let mut matches = Vec::new();
    let walker = WalkDir::new(start)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            forbidden_match(relative, forbidden).is_none()
        });

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let display = relative_display(root, entry.path());
        for (idx, line) in content.lines().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            if matches.len() == limit {
                return (matches, true);
            }
            matches.push(format!("{display}:{}: {line}", idx + 1));
        }
    }
    (matches, false)
}
