//! The capabilities apklab needs from whatever is presenting it to the user (an editor, or a terminal).

use std::path::Path;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Error,
}

/// How a span of lines should be highlighted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HighlightStyle {
    /// The whole body of the method containing a report occurrence.
    MethodBody,
    /// The exact line of one of the two API calls of an occurrence. Drawn bolder than `MethodBody`.
    ApiCall,
}

/// An inclusive range of zero-based line numbers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(line: usize) -> Self {
        Self { start: line, end: line }
    }
}

pub trait Host {
    /// Brings the tool output into view. Output itself is written through the `log` facade.
    fn show_output(&self) {}

    /// Shows a short message to the user.
    fn notify(&self, level: NotifyLevel, message: &str);

    fn highlight(&self, file: &Path, style: HighlightStyle, spans: &[LineSpan]);

    /// Moves the cursor to the start of the given line and scrolls it to the top of the view.
    fn reveal_line(&self, file: &Path, line: usize);

    /// Opens the given directory as a new workspace.
    fn open_folder(&self, path: &Path);
}
