use std::rc::Rc;

use ivc_ads::{FuncRef, Value};
use ivc_seqhash::{Combine, Hashable, SeqHash};
use ivc_types::Hash;
use rand::Rng;

/// One half of an Entry/Exit pair recorded around a tracked call. A
/// completed call log is a flat, well-nested sequence of these: an
/// `Entry` for the call, then the flattened entries of everything it
/// called, then the matching `Exit`.
#[derive(Clone, Debug)]
pub enum LogEntry {
    Entry { func: FuncRef, args: Vec<Value> },
    Exit { results: Vec<Value>, length: i64 },
}

impl LogEntry {
    pub fn is_entry(&self) -> bool {
        matches!(self, LogEntry::Entry { .. })
    }
}

impl Hashable for LogEntry {
    fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(64);
        match self {
            LogEntry::Entry { func, args } => {
                buf.push(0);
                buf.push(func.id as u8);
                buf.extend_from_slice(&(args.len() as u32).to_le_bytes());
                for a in args {
                    buf.extend_from_slice(a.content_hash().bytes());
                }
            }
            LogEntry::Exit { results, length } => {
                buf.push(1);
                buf.extend_from_slice(&length.to_le_bytes());
                buf.extend_from_slice(&(results.len() as u32).to_le_bytes());
                for r in results {
                    buf.extend_from_slice(r.content_hash().bytes());
                }
            }
        }
        Hash::sum(&buf)
    }
}

/// Structural equality used when comparing a replayed call's arguments
/// (or a cached call's results) against a previously recorded entry.
pub fn values_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
}

/// A Merkle-like binary index over a flattened call log, built by
/// combining adjacent `LogEntry`s pairwise. Unlike [`LogTreap`], which
/// exists to make append/slice cheap, a `LogTree`'s shape records the
/// exact bracketing `SeqHash` chose — which is what makes it safe to
/// address by flat position (`index`/`count`) when replaying a log.
pub enum LogTree {
    Leaf {
        entry: Rc<LogEntry>,
        hash: Hash,
    },
    Node {
        num: usize,
        left: Rc<LogTree>,
        right: Rc<LogTree>,
        hash: Hash,
    },
}

impl LogTree {
    fn leaf(entry: Rc<LogEntry>) -> LogTree {
        let hash = entry.hash();
        LogTree::Leaf { entry, hash }
    }

    pub fn count(&self) -> usize {
        match self {
            LogTree::Leaf { .. } => 1,
            LogTree::Node { num, .. } => *num,
        }
    }

    /// The `i`th entry in this tree's flattened order, in `O(log n)`.
    pub fn index(&self, i: usize) -> Rc<LogEntry> {
        match self {
            LogTree::Leaf { entry, .. } => {
                assert_eq!(i, 0, "LogTree leaf index out of bounds");
                entry.clone()
            }
            LogTree::Node { left, right, .. } => {
                let lc = left.count();
                if i < lc {
                    left.index(i)
                } else {
                    right.index(i - lc)
                }
            }
        }
    }

    pub fn flatten(&self) -> Vec<Rc<LogEntry>> {
        let mut out = Vec::with_capacity(self.count());
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Rc<LogEntry>>) {
        match self {
            LogTree::Leaf { entry, .. } => out.push(entry.clone()),
            LogTree::Node { left, right, .. } => {
                left.flatten_into(out);
                right.flatten_into(out);
            }
        }
    }
}

impl Hashable for LogTree {
    fn hash(&self) -> Hash {
        match self {
            LogTree::Leaf { hash, .. } => *hash,
            LogTree::Node { hash, .. } => *hash,
        }
    }
}

impl Combine for LogTree {
    fn combine(left: Rc<LogTree>, right: Rc<LogTree>) -> Rc<LogTree> {
        let num = left.count() + right.count();
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(left.hash().bytes());
        buf.extend_from_slice(right.hash().bytes());
        let hash = Hash::sum(&buf);
        Rc::new(LogTree::Node { num, left, right, hash })
    }
}

fn node_count(node: &Option<Rc<TreapNode>>) -> usize {
    node.as_ref().map_or(0, |n| n.count)
}

fn node_merged(node: &Option<Rc<TreapNode>>) -> SeqHash<LogTree> {
    node.as_ref().map_or_else(SeqHash::empty, |n| n.merged.clone())
}

/// A persistent treap node over the call log, ordered purely by
/// position (never by a key comparison) so that [`join`] only ever has
/// to compare priorities. `merged` caches the `SeqHash<LogTree>` of this
/// node's whole subtree, built eagerly on construction rather than
/// lazily — simpler than deferring it, at the cost of rebuilding a
/// `SeqHash` on every rotation `join`/`split` performs.
struct TreapNode {
    entry: Rc<LogEntry>,
    priority: u64,
    left: Option<Rc<TreapNode>>,
    right: Option<Rc<TreapNode>>,
    count: usize,
    merged: SeqHash<LogTree>,
}

impl TreapNode {
    fn new(
        entry: Rc<LogEntry>,
        priority: u64,
        left: Option<Rc<TreapNode>>,
        right: Option<Rc<TreapNode>>,
    ) -> Rc<TreapNode> {
        let own = SeqHash::new(LogTree::leaf(entry.clone()));
        let merged = SeqHash::merge(&node_merged(&left), &SeqHash::merge(&own, &node_merged(&right)));
        let count = node_count(&left) + 1 + node_count(&right);
        Rc::new(TreapNode {
            entry,
            priority,
            left,
            right,
            count,
            merged,
        })
    }
}

/// Joins two treaps known to be positionally adjacent (every element of
/// `left` precedes every element of `right`), maintaining heap order on
/// `priority` by always hanging the lower-priority root underneath.
fn join(left: Option<Rc<TreapNode>>, right: Option<Rc<TreapNode>>) -> Option<Rc<TreapNode>> {
    match (left, right) {
        (None, r) => r,
        (l, None) => l,
        (Some(l), Some(r)) => {
            if l.priority >= r.priority {
                let new_right = join(l.right.clone(), Some(r));
                Some(TreapNode::new(l.entry.clone(), l.priority, l.left.clone(), new_right))
            } else {
                let new_left = join(Some(l), r.left.clone());
                Some(TreapNode::new(r.entry.clone(), r.priority, new_left, r.right.clone()))
            }
        }
    }
}

/// Splits a treap at flat position `pos`: the first `pos` elements go
/// left, the rest go right.
fn split(node: Option<Rc<TreapNode>>, pos: usize) -> (Option<Rc<TreapNode>>, Option<Rc<TreapNode>>) {
    let n = match node {
        Some(n) => n,
        None => return (None, None),
    };
    let lc = node_count(&n.left);
    if pos <= lc {
        let (ll, lr) = split(n.left.clone(), pos);
        let right = Some(TreapNode::new(n.entry.clone(), n.priority, lr, n.right.clone()));
        (ll, right)
    } else {
        let (rl, rr) = split(n.right.clone(), pos - lc - 1);
        let left = Some(TreapNode::new(n.entry.clone(), n.priority, n.left.clone(), rl));
        (left, rr)
    }
}

/// The running call log: a persistent treap over `LogEntry`, ordered by
/// position with random priorities so that repeated merges stay
/// balanced regardless of append pattern. Every node caches the
/// `SeqHash<LogTree>` of its subtree, so [`LogTreap::finish`] (the
/// history-independent `LogTree` a verifier checks proofs against) is
/// always just the root's cached value.
pub struct LogTreap {
    root: Option<Rc<TreapNode>>,
}

impl LogTreap {
    pub fn empty() -> LogTreap {
        LogTreap { root: None }
    }

    /// A log containing exactly `entry`, with a fresh random priority.
    pub fn new(entry: LogEntry) -> LogTreap {
        let priority: u64 = rand::thread_rng().gen();
        LogTreap {
            root: Some(TreapNode::new(Rc::new(entry), priority, None, None)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn count(&self) -> usize {
        node_count(&self.root)
    }

    pub fn merge(left: &LogTreap, right: &LogTreap) -> LogTreap {
        LogTreap {
            root: join(left.root.clone(), right.root.clone()),
        }
    }

    /// The sub-log covering flat positions `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> LogTreap {
        let (_, rest) = split(self.root.clone(), start);
        let (mid, _) = split(rest, end - start);
        LogTreap { root: mid }
    }

    pub fn index(&self, i: usize) -> Rc<LogEntry> {
        let mut node = self.root.clone().expect("LogTreap index out of bounds");
        let mut i = i;
        loop {
            let lc = node_count(&node.left);
            node = if i < lc {
                node.left.clone().expect("count invariant violated")
            } else if i == lc {
                return node.entry.clone();
            } else {
                i -= lc + 1;
                node.right.clone().expect("count invariant violated")
            };
        }
    }

    pub fn flatten(&self) -> Vec<Rc<LogEntry>> {
        fn walk(node: &Option<Rc<TreapNode>>, out: &mut Vec<Rc<LogEntry>>) {
            if let Some(n) = node {
                walk(&n.left, out);
                out.push(n.entry.clone());
                walk(&n.right, out);
            }
        }
        let mut out = Vec::with_capacity(self.count());
        walk(&self.root, &mut out);
        out
    }

    /// Collapses the log to its history-independent `LogTree`, the index
    /// a verifier addresses entries through. `None` only for an empty
    /// log.
    pub fn finish(&self) -> Option<Rc<LogTree>> {
        self.root.as_ref().and_then(|n| n.merged.finish())
    }

    /// The log's commitment hash. `Hash::ZERO` for an empty log.
    pub fn commitment(&self) -> Hash {
        self.finish().map_or(Hash::ZERO, |t| t.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_and_exit_hash_differently() {
        let f = FuncRef::register(101, "log_entry_test_fn");
        let entry = LogEntry::Entry {
            func: f,
            args: vec![Value::I64(1)],
        };
        let exit = LogEntry::Exit {
            results: vec![Value::I64(1)],
            length: 0,
        };
        assert_ne!(entry.hash(), exit.hash());
    }

    #[test]
    fn identical_entries_hash_equally() {
        let f = FuncRef::register(102, "log_entry_test_fn2");
        let a = LogEntry::Entry {
            func: f,
            args: vec![Value::I64(7)],
        };
        let b = LogEntry::Entry {
            func: f,
            args: vec![Value::I64(7)],
        };
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn treap_flatten_preserves_append_order() {
        let f = FuncRef::register(103, "log_entry_test_fn3");
        let mut log = LogTreap::empty();
        for i in 0..20i64 {
            log = LogTreap::merge(
                &log,
                &LogTreap::new(LogEntry::Entry {
                    func: f,
                    args: vec![Value::I64(i)],
                }),
            );
        }
        assert_eq!(log.count(), 20);
        let flat = log.flatten();
        for (i, entry) in flat.iter().enumerate() {
            match entry.as_ref() {
                LogEntry::Entry { args, .. } => assert!(values_eq(args, &[Value::I64(i as i64)])),
                LogEntry::Exit { .. } => panic!("unexpected Exit"),
            }
        }
    }

    #[test]
    fn slice_matches_commitment_of_a_fresh_treap_over_the_same_range() {
        let f = FuncRef::register(104, "log_entry_test_fn4");
        let mut log = LogTreap::empty();
        for i in 0..10i64 {
            log = LogTreap::merge(
                &log,
                &LogTreap::new(LogEntry::Entry {
                    func: f,
                    args: vec![Value::I64(i)],
                }),
            );
        }
        let sliced = log.slice(3, 7);
        let mut rebuilt = LogTreap::empty();
        for i in 3..7i64 {
            rebuilt = LogTreap::merge(
                &rebuilt,
                &LogTreap::new(LogEntry::Entry {
                    func: f,
                    args: vec![Value::I64(i)],
                }),
            );
        }
        assert_eq!(sliced.commitment(), rebuilt.commitment());
    }
}
