//! Object identifier database (ODB).
//!
//! A variable-arity trie keyed by OID arcs. Interior `Branch` nodes carry
//! one arc each and chain their children as ordered sibling lists (SNMP
//! fan-out is small and GetNext needs ordered traversal, so a sorted chain
//! beats a general map here). A complete OID ends in a `Branch` whose single
//! child is a `Leaf` holding the value.
//!
//! Nodes live in an arena indexed by `NodeId`, with `parent`/`child`/
//! `sibling` links as indices. Freed slots go on a free list and are reused
//! by later inserts.
//!
//! Structural invariants, maintained by every operation:
//! - sibling chains are strictly ascending by arc;
//! - a `Branch` always has at least one child (childless branches are pruned
//!   during removal);
//! - a `Leaf` is always the only child of its parent, and is terminal;
//! - a path is either a mapping or an interior prefix, never both.

use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::value::Value;
use smallvec::SmallVec;

type NodeId = usize;

#[derive(Debug)]
enum NodeKind {
    Branch(u32),
    Leaf(Value),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    child: Option<NodeId>,
    sibling: Option<NodeId>,
}

/// OID-to-value database with exact and successor lookup.
#[derive(Debug, Default)]
pub struct Odb {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    len: usize,
}

impl Odb {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of complete OID mappings.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the database holds no mappings.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove every mapping. Safe to call on an already-empty database.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    /// Insert a mapping.
    ///
    /// Fails with [`Error::ObjectExists`] when `oid` is already mapped, is a
    /// strict prefix of an existing mapping, or extends an existing mapping.
    /// Validation runs before any node is allocated, so a failed insert
    /// leaves the database untouched.
    pub fn insert(&mut self, oid: &Oid, value: Value) -> Result<()> {
        let arcs = oid.arcs();
        if arcs.is_empty() {
            return Err(Error::InvalidOid("empty object identifier".into()));
        }

        // Locate the attach point, rejecting conflicts up front.
        let mut parent: Option<NodeId> = None;
        let mut depth = 0;
        'descend: while depth < arcs.len() {
            let head = match parent {
                Some(p) => self.nodes[p].child,
                None => self.root,
            };
            let mut cur = head;
            while let Some(id) = cur {
                match self.nodes[id].kind {
                    // The path dead-ends in a complete OID: the existing
                    // mapping is a prefix of the one being added.
                    NodeKind::Leaf(_) => return Err(Error::ObjectExists(oid.clone())),
                    NodeKind::Branch(seg) => {
                        if seg == arcs[depth] {
                            if depth + 1 == arcs.len() {
                                // Full path already present, as a mapping or
                                // as an interior node.
                                return Err(Error::ObjectExists(oid.clone()));
                            }
                            parent = Some(id);
                            depth += 1;
                            continue 'descend;
                        }
                        if seg > arcs[depth] {
                            break;
                        }
                        cur = self.nodes[id].sibling;
                    }
                }
            }
            break;
        }

        // Build the new spine bottom-up: leaf first, then branches for the
        // unmatched arcs.
        let mut below = self.alloc(NodeKind::Leaf(value));
        for &arc in arcs[depth..].iter().rev() {
            let branch = self.alloc(NodeKind::Branch(arc));
            self.nodes[branch].child = Some(below);
            self.nodes[below].parent = Some(branch);
            below = branch;
        }

        self.link_sibling(parent, below, arcs[depth]);
        self.len += 1;
        Ok(())
    }

    /// Remove the mapping or subtree rooted at `oid`.
    ///
    /// Does nothing if `oid` does not name a branch in the tree. Ancestor
    /// branches left childless by the removal are pruned.
    pub fn remove(&mut self, oid: &Oid) {
        let arcs = oid.arcs();
        if arcs.is_empty() {
            return;
        }

        let mut parent: Option<NodeId> = None;
        let mut target: Option<NodeId> = None;
        for (depth, &arc) in arcs.iter().enumerate() {
            let head = match parent {
                Some(p) => self.nodes[p].child,
                None => self.root,
            };
            let found = self.find_branch(head, arc);
            let Some(id) = found else { return };
            if depth + 1 == arcs.len() {
                target = Some(id);
            } else {
                parent = Some(id);
            }
        }

        let Some(target) = target else { return };
        self.unlink(parent, target);
        self.free_subtree(target);

        // Prune ancestors that lost their last child.
        let mut cur = parent;
        while let Some(id) = cur {
            if self.nodes[id].child.is_some() {
                break;
            }
            let up = self.nodes[id].parent;
            self.unlink(up, id);
            self.free_node(id);
            cur = up;
        }
    }

    /// Exact-match lookup.
    pub fn get(&self, oid: &Oid) -> Option<&Value> {
        let arcs = oid.arcs();
        if arcs.is_empty() {
            return None;
        }

        let mut chain = self.root;
        for (depth, &arc) in arcs.iter().enumerate() {
            let id = self.find_branch(chain, arc)?;
            if depth + 1 == arcs.len() {
                let child = self.nodes[id].child?;
                return match &self.nodes[child].kind {
                    NodeKind::Leaf(value) => Some(value),
                    NodeKind::Branch(_) => None,
                };
            }
            chain = self.nodes[id].child;
        }
        None
    }

    /// Successor lookup: the smallest mapped OID strictly greater than `oid`.
    ///
    /// `oid` may be a partial prefix, need not exist in the tree, and may be
    /// empty, in which case the smallest mapped OID is returned. The result
    /// is an owned copy.
    pub fn get_next(&self, oid: &Oid) -> Option<(Oid, Value)> {
        let root = self.root?;
        let hit = if oid.is_empty() {
            self.find_first(root)
        } else {
            self.find_next(self.root, oid.arcs())?
        };

        let leaf = self.nodes[hit].child?;
        match &self.nodes[leaf].kind {
            NodeKind::Leaf(value) => Some((self.path_of(hit), value.clone())),
            NodeKind::Branch(_) => None,
        }
    }

    /// In-order iterator over all mappings.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            odb: self,
            stack: self.root.into_iter().collect(),
        }
    }

    /// Scan a sibling chain for the branch carrying `arc`.
    ///
    /// The chain is ascending, so the scan stops early at the first larger
    /// arc. Returns `None` when the chain dead-ends in a leaf.
    fn find_branch(&self, head: Option<NodeId>, arc: u32) -> Option<NodeId> {
        let mut cur = head;
        while let Some(id) = cur {
            match self.nodes[id].kind {
                NodeKind::Leaf(_) => return None,
                NodeKind::Branch(seg) => {
                    if seg == arc {
                        return Some(id);
                    }
                    if seg > arc {
                        return None;
                    }
                    cur = self.nodes[id].sibling;
                }
            }
        }
        None
    }

    /// Successor search over a sibling chain against the remaining query
    /// arcs. Returns the branch whose child leaf is the answer.
    fn find_next(&self, mut cur: Option<NodeId>, arcs: &[u32]) -> Option<NodeId> {
        let q = arcs[0];
        while let Some(id) = cur {
            let node = &self.nodes[id];
            let NodeKind::Branch(seg) = node.kind else {
                // A leaf chain: the query walked past a complete OID, so no
                // successor lives under this prefix.
                return None;
            };

            if seg > q {
                // Everything in this subtree sorts after the query.
                return Some(self.find_first(id));
            }

            if seg == q {
                if arcs.len() > 1 {
                    if let Some(hit) = self.find_next(node.child, &arcs[1..]) {
                        return Some(hit);
                    }
                } else {
                    // Last query arc. The node itself is excluded (successor
                    // semantics); answer here only if its subtree goes
                    // deeper than a terminal value.
                    if let Some(child) = node.child
                        && self.nodes[child].child.is_some()
                    {
                        return Some(self.find_first(id));
                    }
                }
            }

            cur = node.sibling;
        }
        None
    }

    /// Leftmost descent: the branch holding the smallest complete OID in the
    /// subtree rooted at `id`.
    fn find_first(&self, mut id: NodeId) -> NodeId {
        while let Some(child) = self.nodes[id].child {
            match self.nodes[child].kind {
                NodeKind::Branch(_) => id = child,
                NodeKind::Leaf(_) => break,
            }
        }
        id
    }

    /// Reconstruct the full OID of a branch by walking parent links.
    fn path_of(&self, id: NodeId) -> Oid {
        let mut arcs: SmallVec<[u32; 16]> = SmallVec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            if let NodeKind::Branch(seg) = self.nodes[n].kind {
                arcs.push(seg);
            }
            cur = self.nodes[n].parent;
        }
        arcs.reverse();
        Oid::new(arcs)
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let node = Node {
            kind,
            parent: None,
            child: None,
            sibling: None,
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free_node(&mut self, id: NodeId) {
        // Overwrite so the old value drops now; the slot is dead until the
        // free list hands it out again.
        self.nodes[id] = Node {
            kind: NodeKind::Branch(0),
            parent: None,
            child: None,
            sibling: None,
        };
        self.free.push(id);
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let mut child = self.nodes[n].child;
            while let Some(c) = child {
                child = self.nodes[c].sibling;
                stack.push(c);
            }
            if matches!(self.nodes[n].kind, NodeKind::Leaf(_)) {
                self.len -= 1;
            }
            self.free_node(n);
        }
    }

    /// Splice `node` (a branch carrying `seg`) into the child chain of
    /// `parent` (the root chain when `parent` is `None`), keeping the chain
    /// ascending.
    fn link_sibling(&mut self, parent: Option<NodeId>, node: NodeId, seg: u32) {
        self.nodes[node].parent = parent;

        let head = match parent {
            Some(p) => self.nodes[p].child,
            None => self.root,
        };

        let mut prev: Option<NodeId> = None;
        let mut cur = head;
        while let Some(id) = cur {
            let NodeKind::Branch(s) = self.nodes[id].kind else {
                break;
            };
            if s > seg {
                break;
            }
            prev = Some(id);
            cur = self.nodes[id].sibling;
        }

        self.nodes[node].sibling = cur;
        match prev {
            Some(p) => self.nodes[p].sibling = Some(node),
            None => match parent {
                Some(p) => self.nodes[p].child = Some(node),
                None => self.root = Some(node),
            },
        }
    }

    /// Remove `node` from the child chain of `parent` (root chain when
    /// `None`). The node itself is not freed.
    fn unlink(&mut self, parent: Option<NodeId>, node: NodeId) {
        let head = match parent {
            Some(p) => self.nodes[p].child,
            None => self.root,
        };

        let after = self.nodes[node].sibling;
        let mut prev: Option<NodeId> = None;
        let mut cur = head;
        while let Some(id) = cur {
            if id == node {
                break;
            }
            prev = Some(id);
            cur = self.nodes[id].sibling;
        }

        match prev {
            Some(p) => self.nodes[p].sibling = after,
            None => match parent {
                Some(p) => self.nodes[p].child = after,
                None => self.root = after,
            },
        }
        self.nodes[node].sibling = None;
    }
}

/// In-order iterator over ODB mappings.
pub struct Iter<'a> {
    odb: &'a Odb,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Oid, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let odb = self.odb;
        while let Some(id) = self.stack.pop() {
            let node = &odb.nodes[id];
            if let Some(s) = node.sibling {
                self.stack.push(s);
            }
            match &node.kind {
                NodeKind::Branch(_) => {
                    if let Some(c) = node.child {
                        self.stack.push(c);
                    }
                }
                NodeKind::Leaf(value) => {
                    let parent = node.parent?;
                    return Some((odb.path_of(parent), value));
                }
            }
        }
        None
    }
}
