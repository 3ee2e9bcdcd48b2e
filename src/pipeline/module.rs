//! Per-file pipeline state

use ropey::Rope;
use std::path::{Path, PathBuf};

/// Index of a module in the scheduler's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) u32);

/// Position of a module in the pipeline, derived from its stage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleStage {
    Unloaded,
    Loaded,
    Parsed,
    TypesRegistered,
    Resolved,
}

/// One script file
#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    /// Dotted name derived from the workspace-relative path
    pub name: String,
    pub path: PathBuf,
    pub content: Rope,
    pub content_hash: Option<blake3::Hash>,
    pub loaded: bool,
    pub parsed: bool,
    pub types_post_processed: bool,
    pub resolved: bool,
    pub is_opened: bool,
    /// Database generation and script revision of the last resolution
    pub resolved_against: Option<(u64, u64)>,
    /// Text to load instead of reading the file, set by editor events
    pub(crate) pending_text: Option<String>,
}

impl Module {
    pub(crate) fn new(id: ModuleId, name: String, path: PathBuf) -> Self {
        Self {
            id,
            name,
            path,
            content: Rope::new(),
            content_hash: None,
            loaded: false,
            parsed: false,
            types_post_processed: false,
            resolved: false,
            is_opened: false,
            resolved_against: None,
            pending_text: None,
        }
    }

    pub fn stage(&self) -> ModuleStage {
        if self.resolved {
            ModuleStage::Resolved
        } else if self.types_post_processed {
            ModuleStage::TypesRegistered
        } else if self.parsed {
            ModuleStage::Parsed
        } else if self.loaded {
            ModuleStage::Loaded
        } else {
            ModuleStage::Unloaded
        }
    }

    pub fn has_been_resolved(&self) -> bool {
        self.resolved_against.is_some()
    }

    /// Replaces the content; returns false when it is byte-identical
    pub(crate) fn set_content(&mut self, text: &str) -> bool {
        let hash = blake3::hash(text.as_bytes());
        self.loaded = true;
        if self.content_hash == Some(hash) {
            return false;
        }
        self.content = Rope::from_str(text);
        self.content_hash = Some(hash);
        self.invalidate_from_parse();
        true
    }

    /// Resets every stage after loading back to pending
    pub(crate) fn invalidate_from_parse(&mut self) {
        self.parsed = false;
        self.types_post_processed = false;
        self.resolved = false;
    }
}

/// `<root>/Game/Hero.as` becomes `Game.Hero`
pub fn module_name_for(root: Option<&Path>, path: &Path) -> String {
    let relative = root.and_then(|root| path.strip_prefix(root).ok()).unwrap_or(path);
    let relative = relative.with_extension("");
    relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}
