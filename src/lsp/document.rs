use ropey::Rope;

use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

/// Converts an LSP position to a char offset in the Rope, clamped to the text.
fn position_to_char_offset(position: &Position, text: &Rope) -> usize {
    let line = (position.line as usize).min(text.len_lines().saturating_sub(1));
    let line_start = text.line_to_char(line);
    let line_len = text.line(line).len_chars();
    line_start + (position.character as usize).min(line_len)
}

/// Text of a document the editor has open
#[derive(Debug, Clone)]
pub struct EditorDocument {
    pub uri: Url,
    pub text: Rope,
    pub version: i32,
}

impl EditorDocument {
    pub fn new(uri: Url, text: &str, version: i32) -> Self {
        Self { uri, text: Rope::from_str(text), version }
    }

    /// Applies content changes in order. Returns the updated text if the
    /// version is newer, otherwise an error.
    pub fn apply(&mut self, changes: &[TextDocumentContentChangeEvent], version: i32) -> Result<String, String> {
        if version <= self.version {
            return Err(format!("Version {} not newer than {}", version, self.version));
        }
        for change in changes {
            if let Some(range) = change.range {
                let start = position_to_char_offset(&range.start, &self.text);
                let end = position_to_char_offset(&range.end, &self.text).max(start);
                self.text.remove(start..end);
                self.text.insert(start, &change.text);
            } else {
                self.text = Rope::from_str(&change.text);
            }
        }
        self.version = version;
        Ok(self.text.to_string())
    }
}

/// Identifier under `position`, if any
pub fn word_at(text: &Rope, position: &Position) -> Option<String> {
    if position.line as usize >= text.len_lines() {
        return None;
    }
    let line: Vec<char> = text.line(position.line as usize).chars().collect();
    let is_word = |c: &char| c.is_alphanumeric() || *c == '_';
    let cursor = (position.character as usize).min(line.len());

    let mut start = cursor;
    while start > 0 && is_word(&line[start - 1]) {
        start -= 1;
    }
    let mut end = cursor;
    while end < line.len() && is_word(&line[end]) {
        end += 1;
    }
    (start < end).then(|| line[start..end].iter().collect())
}
