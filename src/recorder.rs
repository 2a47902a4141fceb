//! Buffered edge recording.
//!
//! Events emit edges into a per-event buffer; flushing sorts the buffer
//! and squashes adjacent compatible intervals, both inside the buffer and
//! against the tail of the edge table, so `(l, m, p, c)` and
//! `(m, r, p, c)` land as the single row `(l, r, p, c)`.

use crate::tables::TableCollection;
use crate::NodeId;

#[derive(Clone, Copy, Debug)]
struct BufferedEdge {
    left: f64,
    right: f64,
    parent: NodeId,
    child: NodeId,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Recorder {
    buffer: Vec<BufferedEdge>,
}

impl Recorder {
    pub fn record_edge(&mut self, left: f64, right: f64, parent: NodeId, child: NodeId) {
        self.buffer.push(BufferedEdge {
            left,
            right,
            parent,
            child,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Sort the buffered edges by `(parent, child, left)` and append them,
    /// squashed, to the edge table.
    pub fn flush(&mut self, tables: &mut TableCollection) {
        self.buffer.sort_by(|a, b| {
            (a.parent, a.child)
                .cmp(&(b.parent, b.child))
                .then(a.left.partial_cmp(&b.left).unwrap())
        });
        for e in self.buffer.drain(..) {
            tables
                .edges_mut()
                .squash_or_add(e.left, e.right, e.parent, e.child);
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
