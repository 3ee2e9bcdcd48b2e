//! Fuzzy symbol search and ranking
//!
//! Query syntax:
//! - `|` separates OR groups
//! - whitespace separates words; words match case-insensitively in order
//! - `.` and `::` are hard separators; when written without whitespace before
//!   them they must be the next separator in the candidate, and a word written
//!   right after one must match inside the segment that follows it
//!
//! One matcher both accepts and scores a candidate: it explores every
//! in-order placement of the tokens (memoized on token index and cursor) and
//! keeps the best score. A candidate is rejected when no placement exists.
//!
//! Ranking (in order of priority):
//! 1. Kind partition: types, functions, properties, everything else
//! 2. Score (higher is better)
//! 3. Lexicographic label order as tie-breaker

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use super::QueryResult;
use crate::kb::{DbNamespace, DbType, Symbol, SymbolKind, TypeDatabase, TypeOrigin};

const POSITION_ZERO_BONUS: i32 = 100;
const WORD_BOUNDARY_BONUS: i32 = 30;
const UPPERCASE_CHAR_BONUS: i32 = 3;
const FIRST_UPPERCASE_BONUS: i32 = 10;
const DISTANCE_BONUS: i32 = 20;
const SHORT_TOKEN_LENGTH: i32 = 8;
const SCOPE_SEPARATOR_BONUS: i32 = 25;
const DOT_SEPARATOR_BONUS: i32 = 15;
const EXACT_NAME_BONUS: i32 = 500;
const SHORT_LABEL_LENGTH: i32 = 40;

/// Which provenance a result may have
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceFilter {
    Native,
    Script,
    #[default]
    Both,
}

impl SourceFilter {
    fn allows(self, is_script: bool) -> bool {
        match self {
            SourceFilter::Native => !is_script,
            SourceFilter::Script => is_script,
            SourceFilter::Both => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    pub source_filter: SourceFilter,
    pub limit: Option<usize>,
}

/// Result partitions, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchKind {
    Type,
    Function,
    Property,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub kind: SearchKind,
    pub label: String,
    pub identity: String,
    pub score: i32,
}

// ===== Query parsing =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Dot,
    Scope,
}

impl Separator {
    fn text(self) -> &'static [u8] {
        match self {
            Separator::Dot => b".",
            Separator::Scope => b"::",
        }
    }

    fn bonus(self) -> i32 {
        match self {
            Separator::Dot => DOT_SEPARATOR_BONUS,
            Separator::Scope => SCOPE_SEPARATOR_BONUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    /// Lower-cased word
    Word(String),
    Separator(Separator),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    /// No whitespace between this token and the previous one
    tight: bool,
}

/// One `|`-separated alternative of a query
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryGroup {
    tokens: Vec<Token>,
}

impl QueryGroup {
    fn parse(text: &str) -> Option<Self> {
        let mut tokens = Vec::new();
        let mut word = String::new();
        let mut tight = false;
        let mut chars = text.chars().peekable();

        let flush = |word: &mut String, tokens: &mut Vec<Token>, tight: &mut bool| {
            if !word.is_empty() {
                tokens.push(Token { kind: TokenKind::Word(word.to_ascii_lowercase()), tight: *tight });
                word.clear();
                *tight = true;
            }
        };

        while let Some(c) = chars.next() {
            if c.is_whitespace() {
                flush(&mut word, &mut tokens, &mut tight);
                tight = false;
                continue;
            }
            let separator = match c {
                '.' => Some(Separator::Dot),
                ':' if chars.peek() == Some(&':') => {
                    chars.next();
                    Some(Separator::Scope)
                }
                _ => None,
            };
            match separator {
                Some(sep) => {
                    flush(&mut word, &mut tokens, &mut tight);
                    tokens.push(Token { kind: TokenKind::Separator(sep), tight: tight && !tokens.is_empty() });
                    tight = true;
                }
                None => word.push(c),
            }
        }
        flush(&mut word, &mut tokens, &mut tight);

        if tokens.is_empty() { None } else { Some(Self { tokens }) }
    }

    /// Tokens before the first separator, used to gate containers
    fn container_prefix(&self) -> Option<&[Token]> {
        let first = self
            .tokens
            .iter()
            .position(|t| matches!(t.kind, TokenKind::Separator(_)))?;
        Some(&self.tokens[..first])
    }
}

/// A parsed search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    groups: Vec<QueryGroup>,
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        Self { groups: query.split('|').filter_map(QueryGroup::parse).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Best score over all groups, or `None` when no group accepts `label`.
    /// `name` is the candidate's bare name, used for the exact-match bonus.
    pub fn score(&self, label: &str, name: &str) -> Option<i32> {
        self.groups
            .iter()
            .filter_map(|group| score_group(&group.tokens, label, name))
            .max()
    }

    pub fn accepts(&self, label: &str) -> bool {
        self.groups
            .iter()
            .any(|group| TokenMatcher::new(&group.tokens, label).best(0, 0).is_some())
    }

    /// Whether the members of a container labelled `label` may match.
    ///
    /// A group without separators can match members of any container; a
    /// group with separators needs its leading tokens to accept the container.
    fn admits_container(&self, label: &str) -> bool {
        self.groups.iter().any(|group| match group.container_prefix() {
            None => true,
            Some([]) => true,
            Some(prefix) => TokenMatcher::new(prefix, label).best(0, 0).is_some(),
        })
    }
}

fn score_group(tokens: &[Token], label: &str, name: &str) -> Option<i32> {
    let placement = TokenMatcher::new(tokens, label).best(0, 0)?;

    let mut score = placement;
    if let [Token { kind: TokenKind::Word(word), .. }] = tokens {
        if name.eq_ignore_ascii_case(word) {
            score += EXACT_NAME_BONUS;
        }
    }
    let length = label.len().min(SHORT_LABEL_LENGTH as usize) as i32;
    score += (SHORT_LABEL_LENGTH - length) / 4;
    Some(score)
}

// ===== Matcher =====

struct TokenMatcher<'a> {
    tokens: &'a [Token],
    label: &'a [u8],
    lowered: Vec<u8>,
    memo: FxHashMap<(usize, usize), Option<i32>>,
}

impl<'a> TokenMatcher<'a> {
    fn new(tokens: &'a [Token], label: &'a str) -> Self {
        Self {
            tokens,
            label: label.as_bytes(),
            lowered: label.as_bytes().to_ascii_lowercase(),
            memo: FxHashMap::default(),
        }
    }

    /// Best score for placing `tokens[index..]` at or after `cursor`
    fn best(&mut self, index: usize, cursor: usize) -> Option<i32> {
        if index == self.tokens.len() {
            return Some(0);
        }
        if let Some(cached) = self.memo.get(&(index, cursor)) {
            return *cached;
        }

        let token = &self.tokens[index];
        let result = match &token.kind {
            TokenKind::Word(word) => {
                let after_separator = index > 0
                    && token.tight
                    && matches!(self.tokens[index - 1].kind, TokenKind::Separator(_));
                self.best_word(index, cursor, word.as_bytes(), after_separator)
            }
            TokenKind::Separator(sep) => self.best_separator(index, cursor, *sep, token.tight),
        };
        self.memo.insert((index, cursor), result);
        result
    }

    fn best_word(&mut self, index: usize, cursor: usize, word: &[u8], in_segment: bool) -> Option<i32> {
        let limit = if in_segment {
            next_separator(self.label, cursor).map_or(self.label.len(), |(pos, _)| pos)
        } else {
            self.label.len()
        };
        if word.is_empty() || limit < word.len() {
            return None;
        }

        let mut best = None;
        for pos in cursor..=(limit - word.len()) {
            if !self.lowered[pos..].starts_with(word) {
                continue;
            }
            let Some(rest) = self.best(index + 1, pos + word.len()) else {
                continue;
            };
            let total = rest + self.word_bonus(pos, word.len(), cursor);
            best = Some(best.map_or(total, |b: i32| b.max(total)));
        }
        best
    }

    fn best_separator(&mut self, index: usize, cursor: usize, sep: Separator, tight: bool) -> Option<i32> {
        let text = sep.text();
        if tight {
            let (pos, found) = next_separator(self.label, cursor)?;
            if found != sep {
                return None;
            }
            return self.best(index + 1, pos + text.len()).map(|rest| rest + sep.bonus());
        }

        let mut best = None;
        let mut pos = cursor;
        while let Some((at, found)) = next_separator(self.label, pos) {
            if found == sep {
                if let Some(rest) = self.best(index + 1, at + text.len()) {
                    let total = rest + sep.bonus();
                    best = Some(best.map_or(total, |b: i32| b.max(total)));
                }
            }
            pos = at + found.text().len();
        }
        best
    }

    fn word_bonus(&self, pos: usize, len: usize, cursor: usize) -> i32 {
        let mut bonus = 0;
        if pos == 0 {
            bonus += POSITION_ZERO_BONUS;
        } else if is_word_boundary(self.label, pos) {
            bonus += WORD_BOUNDARY_BONUS;
        }

        let span = &self.label[pos..pos + len];
        bonus += span.iter().filter(|b| b.is_ascii_uppercase()).count() as i32 * UPPERCASE_CHAR_BONUS;
        if span.first().is_some_and(u8::is_ascii_uppercase) {
            bonus += FIRST_UPPERCASE_BONUS;
        }

        bonus += DISTANCE_BONUS / (1 + (pos - cursor) as i32);
        bonus += (SHORT_TOKEN_LENGTH - len as i32).max(0);
        bonus
    }
}

/// First `.` or `::` at or after `from`
fn next_separator(label: &[u8], from: usize) -> Option<(usize, Separator)> {
    let mut pos = from;
    while pos < label.len() {
        match label[pos] {
            b'.' => return Some((pos, Separator::Dot)),
            b':' if label.get(pos + 1) == Some(&b':') => return Some((pos, Separator::Scope)),
            _ => pos += 1,
        }
    }
    None
}

fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_word_boundary(label: &[u8], pos: usize) -> bool {
    let prev = label[pos - 1];
    let cur = label[pos];
    !is_word_char(prev) || (prev.is_ascii_lowercase() && cur.is_ascii_uppercase())
}

// ===== Candidate enumeration =====

struct Candidate {
    kind: SearchKind,
    label: String,
    name: String,
    identity: String,
}

fn symbol_candidate(symbol: &Symbol, container: &str, joiner: &str) -> Option<Candidate> {
    let label = if container.is_empty() {
        symbol.name().to_string()
    } else {
        format!("{}{}{}", container, joiner, symbol.name())
    };
    match &symbol.kind {
        SymbolKind::Method(method) => {
            if method.is_constructor && method.parameters.len() <= 1 {
                return None;
            }
            if method.is_operator_overload() {
                return None;
            }
            let params: Vec<&str> = method.parameters.iter().map(|p| p.type_name.as_str()).collect();
            Some(Candidate {
                kind: SearchKind::Function,
                identity: format!("function:{}({})", label, params.join(",")),
                name: method.name.clone(),
                label,
            })
        }
        SymbolKind::Property(property) => Some(Candidate {
            kind: SearchKind::Property,
            identity: format!("property:{}", label),
            name: property.name.clone(),
            label,
        }),
    }
}

struct SearchRun<'a> {
    db: &'a TypeDatabase,
    query: SearchQuery,
    filter: SourceFilter,
    seen: FxHashSet<String>,
    results: Vec<SearchResult>,
}

impl<'a> SearchRun<'a> {
    fn offer(&mut self, candidate: Candidate) {
        if !self.seen.insert(candidate.identity.clone()) {
            return;
        }
        if let Some(score) = self.query.score(&candidate.label, &candidate.name) {
            self.results.push(SearchResult {
                kind: candidate.kind,
                label: candidate.label,
                identity: candidate.identity,
                score,
            });
        }
    }

    fn search_namespace(&mut self, ns: &DbNamespace) {
        let db = self.db;
        if !ns.is_root() && self.filter.allows(false) {
            self.offer(Candidate {
                kind: SearchKind::Other,
                label: ns.qualified_name.clone(),
                name: ns.name.clone(),
                identity: format!("namespace:{}", ns.qualified_name),
            });
        }

        let admitted = if ns.is_root() {
            self.query.groups.iter().any(|g| g.container_prefix().is_none_or(<[Token]>::is_empty))
        } else {
            self.query.admits_container(&ns.qualified_name)
        };
        if !admitted {
            return;
        }
        for &id in ns.functions.iter().chain(ns.properties.iter()) {
            let Some(symbol) = db.symbol(id) else {
                continue;
            };
            if !self.filter.allows(symbol.module.is_some()) {
                continue;
            }
            if let Some(candidate) = symbol_candidate(symbol, &ns.qualified_name, "::") {
                self.offer(candidate);
            }
        }
    }

    fn search_type(&mut self, ty: &DbType) {
        let db = self.db;
        let label = db.qualified_type_name(ty.id);
        let is_script = matches!(ty.origin, TypeOrigin::Script { .. });
        if self.filter.allows(is_script) {
            self.offer(Candidate {
                kind: SearchKind::Type,
                identity: format!("type:{}", label),
                name: ty.name.clone(),
                label: label.clone(),
            });
        }

        if !self.query.admits_container(&label) {
            return;
        }
        for &id in ty.methods.iter().chain(ty.properties.iter()) {
            let Some(symbol) = db.symbol(id) else {
                continue;
            };
            if !self.filter.allows(symbol.module.is_some()) {
                continue;
            }
            if let Some(candidate) = symbol_candidate(symbol, &label, ".") {
                self.offer(candidate);
            }
        }
    }
}

fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| a.label.cmp(&b.label))
}

/// Searches every namespace, type and member of the database
pub fn search_symbols(db: &TypeDatabase, params: &SearchParams) -> QueryResult<Vec<SearchResult>> {
    let query = SearchQuery::parse(&params.query);
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let mut run = SearchRun {
        db,
        query,
        filter: params.source_filter,
        seen: FxHashSet::default(),
        results: Vec::new(),
    };
    for ns in db.namespaces() {
        run.search_namespace(ns);
    }
    for ty in db.types() {
        run.search_type(ty);
    }

    let mut results = run.results;
    results.sort_by(compare_results);
    if let Some(limit) = params.limit {
        results.truncate(limit);
    }
    debug!("Search '{}' produced {} results", params.query, results.len());
    Ok(results)
}
