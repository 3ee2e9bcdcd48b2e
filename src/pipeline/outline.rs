//! Regex-based outline analyzer
//!
//! Best-effort declaration scanning used when no full script front end is
//! plugged in. Recognises top-level `class`, `struct` and `enum` blocks with
//! their base class, plus member functions and properties declared directly
//! inside class and struct bodies. Comments and string literals are blanked
//! out first so offsets stay valid while their content is ignored.

use anyhow::bail;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Range};
use tracing::trace;

use super::analyzer::{byte_range, ModuleAnalyzer};
use super::module::{Module, ModuleId};
use crate::kb::fragment::{ArgDecl, MethodDecl, PropertyDecl};
use crate::kb::{DeclarationSpan, NamespaceId, ScriptTypeDecl, TypeDatabase, TypeDecl, TypeKind, Visibility};

static TYPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(class|struct|enum)\s+([A-Za-z_]\w*)(?:\s*:\s*([A-Za-z_][\w:]*))?\s*\{").unwrap()
});

static METHOD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[\t ]*(?:(private|protected)\s+)?(?:(static)\s+)?(?:([A-Za-z_][\w:<>, ]*?[&@]?)\s+)?([A-Za-z_]\w*)\s*\(([^)]*)\)\s*(const)?",
    )
    .unwrap()
});

static PROPERTY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[\t ]*(?:(private|protected)\s+)?([A-Za-z_][\w:<>]*)\s+([A-Za-z_]\w*)\s*(?:=[^;]*)?;")
        .unwrap()
});

/// Words that can open a statement and must not be mistaken for a type
const KEYWORDS: &[&str] = &[
    "return", "default", "delete", "if", "else", "for", "while", "switch", "case", "import",
    "UFUNCTION", "UPROPERTY", "UCLASS", "USTRUCT", "UENUM",
];

#[derive(Debug, Clone)]
struct OutlineType {
    decl: ScriptTypeDecl,
    /// Byte range of the base class name, if one is written
    base: Option<(usize, usize)>,
}

#[derive(Debug, Default)]
pub struct OutlineAnalyzer {
    outlines: FxHashMap<ModuleId, Vec<OutlineType>>,
}

impl OutlineAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleAnalyzer for OutlineAnalyzer {
    fn parse(&mut self, module: &Module) -> anyhow::Result<()> {
        self.outlines.remove(&module.id);
        let source = module.content.to_string();
        let masked = mask_comments_and_strings(&source);
        let types = scan_types(&masked)?;
        trace!("Outlined {} types in {}", types.len(), module.name);
        self.outlines.insert(module.id, types);
        Ok(())
    }

    fn declared_types(&mut self, module: &Module) -> Vec<ScriptTypeDecl> {
        self.outlines
            .get(&module.id)
            .map(|types| types.iter().map(|t| t.decl.clone()).collect())
            .unwrap_or_default()
    }

    fn resolve(&mut self, module: &Module, db: &TypeDatabase) -> Vec<Diagnostic> {
        let Some(types) = self.outlines.get(&module.id) else {
            return Vec::new();
        };
        let mut diagnostics = Vec::new();
        for ty in types {
            let (Some(base_name), Some((start, end))) = (ty.decl.decl.supertype.as_deref(), ty.base) else {
                continue;
            };
            if db.resolve_type_reference(base_name, NamespaceId::ROOT).is_none() {
                diagnostics.push(Diagnostic {
                    range: byte_range(&module.content, start, end),
                    severity: Some(DiagnosticSeverity::ERROR),
                    source: Some("angelscript".to_string()),
                    message: format!("Unknown base class '{}' for '{}'", base_name, ty.decl.decl.name),
                    ..Default::default()
                });
            }
        }
        diagnostics
    }

    fn find_references(&self, module: &Module, name: &str) -> Vec<Range> {
        let Ok(pattern) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
            return Vec::new();
        };
        let source = module.content.to_string();
        let masked = mask_comments_and_strings(&source);
        pattern
            .find_iter(&masked)
            .map(|m| byte_range(&module.content, m.start(), m.end()))
            .collect()
    }

    fn forget(&mut self, module: ModuleId) {
        self.outlines.remove(&module);
    }
}

/// Replaces comment and string contents with spaces, keeping newlines and
/// byte offsets intact
fn mask_comments_and_strings(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(u8),
    }

    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut state = State::Code;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = State::LineComment;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                }
                (b'/', Some(b'*')) => {
                    state = State::BlockComment;
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                }
                (b'"', _) | (b'\'', _) => state = State::Str(b),
                _ => {}
            },
            State::LineComment => {
                if b == b'\n' {
                    state = State::Code;
                } else {
                    out[i] = b' ';
                }
            }
            State::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 1;
                    state = State::Code;
                } else if b != b'\n' {
                    out[i] = b' ';
                }
            }
            State::Str(quote) => {
                if b == b'\\' {
                    out[i] = b' ';
                    if next.is_some_and(|n| n != b'\n') {
                        out[i + 1] = b' ';
                        i += 1;
                    }
                } else if b == quote || b == b'\n' {
                    state = State::Code;
                } else {
                    out[i] = b' ';
                }
            }
        }
        i += 1;
    }
    // Masking blanks every byte of a multi-byte character, so this only
    // falls back on input that was not valid UTF-8 to begin with.
    String::from_utf8(out).unwrap_or_else(|e| {
        e.into_bytes().into_iter().map(|b| if b.is_ascii() { b as char } else { ' ' }).collect()
    })
}

/// Offset of the brace closing the one at `open`
fn matching_brace(text: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, b) in text.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn scan_types(masked: &str) -> anyhow::Result<Vec<OutlineType>> {
    let bytes = masked.as_bytes();
    let mut types = Vec::new();
    let mut resume = 0;

    for caps in TYPE_PATTERN.captures_iter(masked) {
        let (Some(whole), Some(keyword), Some(name)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if whole.start() < resume {
            continue;
        }
        let open = whole.end() - 1;
        let Some(close) = matching_brace(bytes, open) else {
            bail!("Unterminated {} '{}'", keyword.as_str(), name.as_str());
        };
        resume = close + 1;

        let kind = match keyword.as_str() {
            "struct" => TypeKind::Struct,
            "enum" => TypeKind::Enum,
            _ => TypeKind::Class,
        };
        let base = caps.get(3);
        let (methods, properties) = if kind == TypeKind::Enum {
            (Vec::new(), Vec::new())
        } else {
            scan_members(&masked[open + 1..close], name.as_str())
        };

        types.push(OutlineType {
            decl: ScriptTypeDecl {
                decl: TypeDecl {
                    name: name.as_str().to_string(),
                    kind,
                    supertype: base.map(|b| b.as_str().to_string()),
                    methods,
                    properties,
                    ..Default::default()
                },
                span: DeclarationSpan {
                    start: keyword.start(),
                    end: close + 1,
                    scope_start: open,
                    scope_end: close + 1,
                },
            },
            base: base.map(|b| (b.start(), b.end())),
        });
    }
    Ok(types)
}

/// Whether `offset` of `body` sits directly inside the body, not in a
/// nested block
fn at_top_level(body: &[u8], offset: usize) -> bool {
    let mut depth = 0i32;
    for b in &body[..offset] {
        match b {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
    }
    depth == 0
}

fn visibility_of(keyword: Option<regex::Match<'_>>) -> Visibility {
    match keyword.map(|m| m.as_str()) {
        Some("private") => Visibility::Private,
        Some("protected") => Visibility::Protected,
        _ => Visibility::Public,
    }
}

fn parse_args(list: &str) -> Vec<ArgDecl> {
    list.split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(|arg| {
            let (decl, default) = match arg.split_once('=') {
                Some((decl, default)) => (decl.trim(), Some(default.trim().to_string())),
                None => (arg, None),
            };
            match decl.rsplit_once(char::is_whitespace) {
                Some((ty, name)) => ArgDecl { name: name.to_string(), type_name: ty.trim().to_string(), default },
                None => ArgDecl { name: String::new(), type_name: decl.to_string(), default },
            }
        })
        .collect()
}

fn scan_members(body: &str, type_name: &str) -> (Vec<MethodDecl>, Vec<PropertyDecl>) {
    let bytes = body.as_bytes();
    let mut methods = Vec::new();
    let mut properties = Vec::new();

    for caps in METHOD_PATTERN.captures_iter(body) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(4)) else {
            continue;
        };
        if !at_top_level(bytes, whole.start()) {
            continue;
        }
        let return_type = caps.get(3).map(|m| m.as_str().trim().to_string());
        let is_constructor = return_type.is_none() && name.as_str() == type_name;
        if return_type.as_deref().is_some_and(|t| KEYWORDS.contains(&t)) || KEYWORDS.contains(&name.as_str()) {
            continue;
        }
        if return_type.is_none() && !is_constructor {
            continue;
        }
        methods.push(MethodDecl {
            name: name.as_str().to_string(),
            return_type: return_type.unwrap_or_else(|| "void".to_string()),
            args: caps.get(5).map(|m| parse_args(m.as_str())).unwrap_or_default(),
            visibility: visibility_of(caps.get(1)),
            is_constructor,
            is_static: caps.get(2).is_some(),
            is_const: caps.get(6).is_some(),
            ..Default::default()
        });
    }

    for caps in PROPERTY_PATTERN.captures_iter(body) {
        let (Some(whole), Some(ty), Some(name)) = (caps.get(0), caps.get(2), caps.get(3)) else {
            continue;
        };
        if !at_top_level(bytes, whole.start()) || KEYWORDS.contains(&ty.as_str()) {
            continue;
        }
        properties.push(PropertyDecl {
            name: name.as_str().to_string(),
            type_name: ty.as_str().to_string(),
            visibility: visibility_of(caps.get(1)),
            ..Default::default()
        });
    }

    (methods, properties)
}
