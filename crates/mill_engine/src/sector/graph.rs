//! Sector graph
//!
//! Sectors form a finite graph under legal moves: placements move a stone
//! from hand to board, removals shrink the opponent, and in the Lasker
//! variant slides connect a sector to its own mirror. The builder walks
//! this graph to touch every reachable sector exactly once.
//!
//! A sector and its mirror that reach each other collapse into one node of
//! the orbit arena; all links between nodes are stored by index, not by
//! pointer.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::rules::Variant;
use crate::sector::id::SectorId;

/// Successor ids of `u` (white to move), already negated to the opponent's
/// viewpoint, deduplicated and with self-loops removed.
pub fn successors(variant: Variant, u: SectorId) -> Vec<SectorId> {
    let mut raw: Vec<(i32, i32, i32, i32)> = Vec::new();
    let (w, b, wf, bf) = (u.w as i32, u.b as i32, u.wf as i32, u.bf as i32);

    match variant {
        Variant::Standard | Variant::Morabaraba => {
            if wf > 0 {
                raw.push((w + 1, b, wf - 1, bf));
                raw.push((w + 1, b - 1, wf - 1, bf));
            } else {
                raw.push((w, b - 1, wf, bf));
            }
        }
        Variant::Lasker => {
            if wf > 0 {
                raw.push((w + 1, b, wf - 1, bf));
                raw.push((w + 1, b - 1, wf - 1, bf));
            }
            if w > 0 {
                raw.push((w, b, wf, bf));
                raw.push((w, b - 1, wf, bf));
            }
        }
    }

    let mut out: BTreeSet<SectorId> = raw
        .into_iter()
        .filter(|&(_, b2, _, bf2)| b2 + bf2 >= 3 && b2 >= 0)
        .map(|(w2, b2, wf2, bf2)| {
            SectorId::new(w2 as u8, b2 as u8, wf2 as u8, bf2 as u8).negate()
        })
        .collect();
    out.remove(&u);
    out.into_iter().collect()
}

/// One node of the orbit arena.
#[derive(Debug)]
pub struct Wu {
    pub id: SectorId,
    /// The node stands for the sector and its mirror at once.
    pub paired: bool,
    /// Arena indices of the nodes whose results this one feeds into.
    pub parents: BTreeSet<usize>,
    /// Number of arena nodes this one depends on.
    pub child_count: u32,
}

pub struct SectorGraph {
    /// Every reachable sector, in id order.
    pub list: Vec<SectorId>,
    pub edges: BTreeMap<SectorId, Vec<SectorId>>,
    pub edges_t: BTreeMap<SectorId, Vec<SectorId>>,
    pub arena: Vec<Wu>,
    node_of: HashMap<SectorId, usize>,
}

impl SectorGraph {
    /// Breadth-first walk of everything reachable from the starting sector
    /// (empty board, full hands).
    pub fn build(variant: Variant) -> SectorGraph {
        let start = SectorId::new(0, 0, variant.max_pieces(), variant.max_pieces());
        let mut queue = VecDeque::from([start]);
        let mut seen = BTreeSet::from([start]);
        let mut edges: BTreeMap<SectorId, Vec<SectorId>> = BTreeMap::new();
        let mut edges_t: BTreeMap<SectorId, Vec<SectorId>> = BTreeMap::new();

        while let Some(u) = queue.pop_front() {
            for v in successors(variant, u) {
                if seen.insert(v) {
                    queue.push_back(v);
                }
                edges.entry(u).or_default().push(v);
                edges_t.entry(v).or_default().push(u);
            }
        }

        let list: Vec<SectorId> = seen.into_iter().collect();

        // Mutually-reachable pairs are mirrors of each other and share one
        // node, owned by the smaller id.
        let mut rep: BTreeMap<SectorId, SectorId> = list.iter().map(|&id| (id, id)).collect();
        for &s1 in &list {
            for &s2 in edges.get(&s1).map(Vec::as_slice).unwrap_or(&[]) {
                let mutual = edges.get(&s2).map(|e| e.contains(&s1)).unwrap_or(false);
                if mutual {
                    debug_assert_eq!(s1, s2.negate());
                    let lo = s1.min(s2);
                    rep.insert(s1.max(s2), lo);
                }
            }
        }

        let mut node_of: HashMap<SectorId, usize> = HashMap::new();
        let mut arena: Vec<Wu> = Vec::new();
        for &id in &list {
            let r = rep[&id];
            if r == id {
                node_of.insert(id, arena.len());
                arena.push(Wu {
                    id,
                    paired: false,
                    parents: BTreeSet::new(),
                    child_count: 0,
                });
            }
        }
        for &id in &list {
            let r = rep[&id];
            if r != id {
                let n = node_of[&r];
                arena[n].paired = true;
                node_of.insert(id, n);
            }
        }

        // Dependency links: a node's results feed into every sector that
        // can reach one of its orientations.
        for &id in &list {
            let n = node_of[&id];
            for &p in edges_t.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                let pn = node_of[&p];
                if pn != n && arena[n].parents.insert(pn) {
                    arena[pn].child_count += 1;
                }
            }
        }

        SectorGraph {
            list,
            edges,
            edges_t,
            arena,
            node_of,
        }
    }

    pub fn node(&self, id: SectorId) -> Option<&Wu> {
        self.node_of.get(&id).map(|&n| &self.arena[n])
    }

    /// Whether this sector shares its arena node with its mirror.
    pub fn is_paired(&self, id: SectorId) -> bool {
        self.node(id).map(|w| w.paired).unwrap_or(false)
    }
}
