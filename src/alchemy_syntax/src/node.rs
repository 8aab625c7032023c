use std::marker::PhantomData;

use crate::nodes::NodeData;

/// Half-open range of token indices covered by a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenRange {
    pub start: u16,
    pub end: u16,
}

impl TokenRange {
    pub fn new(start: u16, end: u16) -> Self {
        TokenRange { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start != self.end
    }
}

/// Untyped handle into the node array. Zero means "no node".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RawNodeIndex(pub u16);

impl RawNodeIndex {
    pub const NONE: RawNodeIndex = RawNodeIndex(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

/// Typed handle into the node array. The payload is the same 16-bit index
/// as [`RawNodeIndex`]; the marker only constrains which accessor can
/// dereference it.
pub struct NodeIndex<T> {
    raw: u16,
    marker: PhantomData<fn() -> T>,
}

impl<T> NodeIndex<T> {
    pub const NONE: NodeIndex<T> = NodeIndex {
        raw: 0,
        marker: PhantomData,
    };

    pub fn new(raw: u16) -> Self {
        NodeIndex {
            raw,
            marker: PhantomData,
        }
    }

    pub fn raw(&self) -> RawNodeIndex {
        RawNodeIndex(self.raw)
    }

    pub fn index(&self) -> u16 {
        self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.raw != 0
    }
}

impl<T> Clone for NodeIndex<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeIndex<T> {}

impl<T> Default for NodeIndex<T> {
    fn default() -> Self {
        NodeIndex::NONE
    }
}

impl<T> PartialEq for NodeIndex<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for NodeIndex<T> {}

impl<T> std::fmt::Debug for NodeIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeIndex({})", self.raw)
    }
}

impl<T: NodeData> From<NodeIndex<T>> for RawNodeIndex {
    fn from(value: NodeIndex<T>) -> Self {
        value.raw()
    }
}
