use serde::Serialize;

use crate::lexer::Token;
use crate::node::{NodeIndex, RawNodeIndex, TokenRange};
use crate::nodes::{AstNode, FileNode, NodeData, NodeKind};

/// 1-based line/column pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineColumn {
    pub line: u32,
    pub column: u32,
}

/// The parsed form of one file: source text, token stream, node array and
/// line table. The semantic crates treat this as read-only.
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    pub source: String,
    pub tokens: Vec<Token>,
    pub nodes: Vec<AstNode>,
    pub line_starts: Vec<u32>,
    pub root: NodeIndex<FileNode>,
}

impl SyntaxTree {
    pub fn new(source: String, tokens: Vec<Token>) -> Self {
        let line_starts = compute_line_starts(&source);
        let mut tree = SyntaxTree {
            source,
            tokens,
            nodes: Vec::with_capacity(64),
            line_starts,
            root: NodeIndex::NONE,
        };
        // slot 0 is reserved for "absent"
        tree.nodes.push(AstNode {
            kind: NodeKind::Absent,
            token_start: 0,
            token_end: 0,
        });
        tree
    }

    /// Append a node. Node indices are 16-bit by contract; overflowing the
    /// array is a truncation fault and not recoverable.
    pub fn push(&mut self, kind: NodeKind, range: TokenRange) -> RawNodeIndex {
        let index = self.nodes.len();
        if index > u16::MAX as usize {
            panic!("syntax tree truncated: more than {} nodes", u16::MAX);
        }
        self.nodes.push(AstNode {
            kind,
            token_start: range.start,
            token_end: range.end,
        });
        RawNodeIndex(index as u16)
    }

    pub fn node(&self, index: RawNodeIndex) -> Option<&AstNode> {
        if !index.is_valid() {
            return None;
        }
        self.nodes.get(index.0 as usize)
    }

    pub fn kind(&self, index: RawNodeIndex) -> Option<&NodeKind> {
        self.node(index).map(|n| &n.kind)
    }

    /// Typed access: returns the payload only if the tag matches.
    pub fn get<T: NodeData>(&self, index: NodeIndex<T>) -> Option<&T> {
        self.kind(index.raw()).and_then(T::from_kind)
    }

    pub fn get_mut_kind(&mut self, index: RawNodeIndex) -> Option<&mut NodeKind> {
        if !index.is_valid() {
            return None;
        }
        self.nodes.get_mut(index.0 as usize).map(|n| &mut n.kind)
    }

    pub fn token_range(&self, index: RawNodeIndex) -> TokenRange {
        self.node(index).map(|n| n.token_range()).unwrap_or_default()
    }

    pub fn token_text(&self, token: u16) -> &str {
        match self.tokens.get(token as usize) {
            Some(tok) => &self.source[tok.start as usize..tok.end as usize],
            None => "",
        }
    }

    /// Source text covered by a half-open token range.
    pub fn source_range(&self, range: TokenRange) -> &str {
        if !range.is_valid() || range.end as usize > self.tokens.len() {
            return "";
        }
        let start = self.tokens[range.start as usize].start as usize;
        let end = self.tokens[range.end as usize - 1].end as usize;
        &self.source[start..end]
    }

    pub fn location_from_token(&self, token: u16) -> LineColumn {
        let offset = self
            .tokens
            .get(token as usize)
            .map(|t| t.start)
            .unwrap_or(0);
        self.location_from_offset(offset)
    }

    pub fn location_from_node(&self, index: RawNodeIndex) -> LineColumn {
        self.location_from_token(self.token_range(index).start)
    }

    pub fn location_from_offset(&self, offset: u32) -> LineColumn {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line_idx).copied().unwrap_or(0);
        LineColumn {
            line: line_idx as u32 + 1,
            column: offset - line_start + 1,
        }
    }

    /// Walk a sibling list starting at `first`, yielding node indices.
    pub fn iter_list(&self, first: RawNodeIndex) -> ListIter<'_> {
        ListIter {
            tree: self,
            current: first,
        }
    }
}

pub struct ListIter<'a> {
    tree: &'a SyntaxTree,
    current: RawNodeIndex,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = (RawNodeIndex, &'a AstNode);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current;
        let node = self.tree.node(index)?;
        self.current = node.kind.next();
        Some((index, node))
    }
}

fn compute_line_starts(source: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i as u32 + 1);
        }
    }
    starts
}
