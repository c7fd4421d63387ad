//! Editor integration: inserting the markdown link of an uploaded image into an open document.

use std::sync::{Arc, Mutex, PoisonError};

use mockall::automock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigStore, IS_CONTAIN_IMG_NAME};
use crate::contract::UploadResult;

/// Zero-based line and character column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("cursor {line}:{column} is outside the document")]
    OutOfBounds { line: usize, column: usize },
    #[error("document unavailable: {0}")]
    Unavailable(String),
}

/// An open document: an editing surface plus the model its content is committed to.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait EditorDocument: Send + Sync {
    fn cursor(&self) -> Result<Cursor, EditorError>;

    /// Inserts `text` at `at`, leaving the cursor after it.
    fn replace_selection(&self, text: &str, at: Cursor) -> Result<(), EditorError>;

    /// Full current text of the editing surface.
    fn value(&self) -> String;

    /// Commits `content` as the document's content.
    fn set_content(&self, content: String) -> Result<(), EditorError>;
}

#[derive(Debug, Default)]
struct BufferState {
    text: String,
    cursor: Cursor,
    commits: usize,
}

/// In-memory [`EditorDocument`] over a plain string.
#[derive(Debug, Default)]
pub struct TextBuffer {
    state: Mutex<BufferState>,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>, cursor: Cursor) -> Self {
        Self {
            state: Mutex::new(BufferState {
                text: text.into(),
                cursor,
                commits: 0,
            }),
        }
    }

    /// Buffer with the cursor after the last character.
    pub fn at_end(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = end_of(&text);
        Self::new(text, cursor)
    }

    /// Number of times content was committed.
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn end_of(text: &str) -> Cursor {
    let line = text.matches('\n').count();
    let last = text.rsplit('\n').next().unwrap_or("");
    Cursor {
        line,
        column: last.chars().count(),
    }
}

/// Byte offset of `cursor` in `text`.
fn offset_of(text: &str, cursor: Cursor) -> Result<usize, EditorError> {
    let out_of_bounds = || EditorError::OutOfBounds {
        line: cursor.line,
        column: cursor.column,
    };
    let mut line_start = 0;
    for _ in 0..cursor.line {
        let rest = &text[line_start..];
        let newline = rest.find('\n').ok_or_else(out_of_bounds)?;
        line_start += newline + 1;
    }
    let line = text[line_start..].split('\n').next().unwrap_or("");
    if cursor.column == line.chars().count() {
        return Ok(line_start + line.len());
    }
    line.char_indices()
        .nth(cursor.column)
        .map(|(i, _)| line_start + i)
        .ok_or_else(out_of_bounds)
}

impl EditorDocument for TextBuffer {
    fn cursor(&self) -> Result<Cursor, EditorError> {
        Ok(self.lock().cursor)
    }

    fn replace_selection(&self, text: &str, at: Cursor) -> Result<(), EditorError> {
        let mut state = self.lock();
        let offset = offset_of(&state.text, at)?;
        state.text.insert_str(offset, text);
        let inserted = end_of(text);
        state.cursor = if inserted.line == 0 {
            Cursor {
                line: at.line,
                column: at.column + inserted.column,
            }
        } else {
            Cursor {
                line: at.line + inserted.line,
                column: inserted.column,
            }
        };
        Ok(())
    }

    fn value(&self) -> String {
        self.lock().text.clone()
    }

    fn set_content(&self, content: String) -> Result<(), EditorError> {
        let mut state = self.lock();
        state.text = content;
        state.commits += 1;
        Ok(())
    }
}

/// Markdown image reference surrounded by newlines.
pub fn image_markup(result: &UploadResult, include_name: bool) -> String {
    if include_name {
        format!("\n![{}]({})\n", result.filename, result.url)
    } else {
        format!("\n![]({})\n", result.url)
    }
}

/// Writes upload results into documents, honouring the persisted "include file name" preference.
#[derive(Clone)]
pub struct EditorWriter {
    store: Arc<dyn ConfigStore>,
}

impl EditorWriter {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    fn include_name(&self) -> bool {
        match self.store.get(IS_CONTAIN_IMG_NAME) {
            Ok(value) => value.as_deref().map(str::trim) == Some("true"),
            Err(e) => {
                warn!(error = %e, "Could not read image name preference, leaving names out");
                false
            }
        }
    }

    /// Inserts the image at the cursor and commits the new content.
    pub fn insert(
        &self,
        document: &dyn EditorDocument,
        result: &UploadResult,
    ) -> Result<(), EditorError> {
        let text = image_markup(result, self.include_name());
        let cursor = document.cursor()?;
        document.replace_selection(&text, cursor)?;
        document.set_content(document.value())?;
        debug!(url = %result.url, line = cursor.line, "Inserted image link into document");
        Ok(())
    }
}
