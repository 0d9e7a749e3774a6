//! File tools: read, write, edit, and list within the workspace.

use editstage_core::error::ToolError;
use editstage_core::tool::{
    EDIT_FILE, EditFileInput, LIST_DIRECTORY, ListDirectoryInput, READ_FILE, ReadFileInput,
    ToolOutcome, WRITE_FILE, WriteFileInput, window_lines,
};
use editstage_security::forbidden_match;
use std::io::ErrorKind;
use tracing::debug;

use crate::workspace::WorkspaceTools;

impl WorkspaceTools {
    pub(crate) async fn read_file(&self, input: ReadFileInput) -> Result<ToolOutcome, ToolError> {
        let full = self.resolve(READ_FILE, &input.path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(ToolOutcome::ok(window_lines(
                &content,
                input.offset,
                input.max_lines,
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Ok(ToolOutcome::fail(format!("File not found: {}", input.path)))
            }
            Err(e) => Ok(ToolOutcome::fail(format!("Failed to read file: {e}"))),
        }
    }

    pub(crate) async fn write_file(&self, input: WriteFileInput) -> Result<ToolOutcome, ToolError> {
        let full = self.resolve(WRITE_FILE, &input.path)?;

        if let Some(parent) = full.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolOutcome::fail(format!("Failed to create directory: {e}")));
        }

        match tokio::fs::write(&full, &input.content).await {
            Ok(()) => {
                debug!(path = %input.path, bytes = input.content.len(), "File written");
                Ok(ToolOutcome::ok(format!(
                    "Wrote {} bytes to {}",
                    input.content.len(),
                    input.path
                )))
            }
            Err(e) => Ok(ToolOutcome::fail(format!("Failed to write file: {e}"))),
        }
    }

    /// Same single-occurrence rule as staged edits.
    pub(crate) async fn edit_file(&self, input: EditFileInput) -> Result<ToolOutcome, ToolError> {
        let full = self.resolve(EDIT_FILE, &input.path)?;
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ToolOutcome::fail(format!("File not found: {}", input.path)));
            }
            Err(e) => return Ok(ToolOutcome::fail(format!("Failed to read file: {e}"))),
        };

        let updated = match editstage_staging::replace_unique(
            &content,
            &input.old_text,
            &input.new_text,
            &input.path,
        ) {
            Ok(updated) => updated,
            Err(e) => return Ok(ToolOutcome::fail(e.to_string())),
        };

        match tokio::fs::write(&full, updated).await {
            Ok(()) => Ok(ToolOutcome::ok(format!("Edited {}", input.path))),
            Err(e) => Ok(ToolOutcome::fail(format!("Failed to write file: {e}"))),
        }
    }

    /// Sorted entries, directories suffixed with `/`, forbidden entries hidden.
    pub(crate) async fn list_directory(
        &self,
        input: ListDirectoryInput,
    ) -> Result<ToolOutcome, ToolError> {
        let requested = input.path.unwrap_or_else(|| ".".into());
        let full = self.resolve(LIST_DIRECTORY, &requested)?;
        let relative_dir = full.strip_prefix(&self.root).unwrap_or(&full).to_path_buf();

        let mut entries = match tokio::fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ToolOutcome::fail(format!("Directory not found: {requested}")));
            }
            Err(e) => return Ok(ToolOutcome::fail(format!("Failed to list directory: {e}"))),
        };

        let mut names = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Ok(ToolOutcome::fail(format!("Failed to list directory: {e}"))),
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if forbidden_match(&relative_dir.join(&name), &self.forbidden_paths).is_some() {
                continue;
            }
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            names.push(if is_dir { format!("{name}/") } else { name });
        }
        names.sort();

        if names.is_empty() {
            return Ok(ToolOutcome::ok("(empty directory)"));
        }
        Ok(ToolOutcome::ok(names.join("\n")))
    }
}
