//! Seam between the scheduler and the script front end
//!
//! The scheduler owns module state and ordering; everything that needs to
//! understand script syntax lives behind [`ModuleAnalyzer`].

use ropey::Rope;
use tower_lsp::lsp_types::{Diagnostic, Position, Range};

use super::module::{Module, ModuleId};
use crate::kb::{ScriptTypeDecl, TypeDatabase};

pub trait ModuleAnalyzer: Send {
    /// Parses the module's current content, replacing earlier results
    fn parse(&mut self, module: &Module) -> anyhow::Result<()>;

    /// Types the last parse declared
    fn declared_types(&mut self, module: &Module) -> Vec<ScriptTypeDecl>;

    /// Binds the module against the database and reports problems
    fn resolve(&mut self, module: &Module, db: &TypeDatabase) -> Vec<Diagnostic>;

    /// Ranges in the module that refer to `name`
    fn find_references(&self, module: &Module, name: &str) -> Vec<Range>;

    /// Drops cached state for a module
    fn forget(&mut self, _module: ModuleId) {}
}

/// Converts a byte offset into an LSP position (line, character)
pub fn byte_to_position(text: &Rope, byte: usize) -> Position {
    let byte = byte.min(text.len_bytes());
    let char_idx = text.byte_to_char(byte);
    let line = text.char_to_line(char_idx);
    let character = char_idx - text.line_to_char(line);
    Position { line: line as u32, character: character as u32 }
}

pub fn byte_range(text: &Rope, start: usize, end: usize) -> Range {
    Range { start: byte_to_position(text, start), end: byte_to_position(text, end) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_to_position_counts_lines_and_columns() {
        let text = Rope::from_str("class A\n{\n  int X;\n}");
        let offset = text.to_string().find("X").unwrap();
        assert_eq!(byte_to_position(&text, offset), Position { line: 2, character: 6 });
        assert_eq!(byte_to_position(&text, 10_000), Position { line: 3, character: 1 });
    }
}
