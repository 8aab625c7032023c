use alchemy_syntax::LineColumn;
use parking_lot::Mutex;
use serde::Serialize;

/// One reported problem. Errors only in this core; output order across
/// workers is unspecified, use [`Diagnostics::sorted`] for stable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

/// Shared diagnostics sink. Any thread may log at any time.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn error(&self, file_path: &str, location: LineColumn, message: String) {
        log::error!("{file_path} ({}:{}) {message}", location.line, location.column);
        self.list.lock().push(Diagnostic {
            file_path: file_path.to_string(),
            line: location.line,
            column: location.column,
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.list.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.list.lock().clone()
    }

    /// Stable ordering: by file, line, column, then message.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut list = self.snapshot();
        list.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then_with(|| a.line.cmp(&b.line))
                .then_with(|| a.column.cmp(&b.column))
                .then_with(|| a.message.cmp(&b.message))
        });
        list
    }

    pub fn clear(&self) {
        self.list.lock().clear();
    }
}
