//! Byte-pair merge engine.
//!
//! Takes one pre-token (already in the byte-level alphabet) and merges
//! adjacent token pairs by priority until no rule applies, yielding the
//! final token IDs.
//!
//! The working set is an arena of doubly linked nodes addressed by `u32`
//! index, with a min-heap of candidate merges keyed by
//! `(priority, original_position)`. The position component makes equal
//! priorities resolve left to right, so the output is deterministic. Stale
//! heap entries are never removed eagerly; a popped entry is discarded when
//! either side of its pair has been marked deleted. When a merge changes a
//! node's right neighbor, the node is re-inserted as a fresh arena slot and
//! the old slot is marked deleted, which invalidates its heap entry without
//! a decrease-key operation. Each arena slot therefore enters the heap at
//! most once.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::vocab::{MergeTable, Vocabulary};

const NONE: u32 = u32::MAX;

struct Node {
    token: u32,
    /// Index of the leftmost seed token this node covers; the heap
    /// tie-breaker.
    orig_pos: u32,
    prev: u32,
    next: u32,
    /// Token produced if this node merges with its `next`.
    pending_merge: u32,
    deleted: bool,
}

/// Candidate queue ordered by `(priority, original position, slot)`.
type MergeQueue = BinaryHeap<Reverse<(u32, u32, u32)>>;

/// Run BPE over one pre-token and return its token IDs.
///
/// The caller handles caching and the whole-token fast path; this function
/// always performs the merge loop. Codepoints missing from the vocabulary
/// are dropped from the seed sequence (unreachable for well-formed
/// pre-tokens).
pub(crate) fn byte_pair_encode(
    pretoken: &str,
    vocab: &Vocabulary,
    merges: &MergeTable,
) -> Vec<u32> {
    let mut buf = [0u8; 4];
    let seed: Vec<u32> = pretoken
        .chars()
        .filter_map(|ch| vocab.id(ch.encode_utf8(&mut buf)))
        .collect();

    if seed.len() <= 1 {
        return seed;
    }

    let mut nodes: Vec<Node> = Vec::with_capacity(seed.len() * 2);
    let mut queue = MergeQueue::new();

    for (i, &token) in seed.iter().enumerate() {
        let idx = i as u32;
        nodes.push(Node {
            token,
            orig_pos: idx,
            prev: if i == 0 { NONE } else { idx - 1 },
            next: if i == seed.len() - 1 { NONE } else { idx + 1 },
            pending_merge: NONE,
            deleted: false,
        });
    }
    for i in 0..seed.len() as u32 - 1 {
        push_candidate(&mut nodes, &mut queue, merges, i, i + 1);
    }

    let mut first = 0u32;

    while let Some(Reverse((_, _, left))) = queue.pop() {
        let right = nodes[left as usize].next;
        if nodes[left as usize].deleted || right == NONE || nodes[right as usize].deleted {
            continue;
        }

        nodes[left as usize].deleted = true;
        nodes[right as usize].deleted = true;

        // Re-insert the left neighbor under a fresh slot so its queued
        // candidate (if any) dies with the old slot.
        let mut prev = nodes[left as usize].prev;
        if prev != NONE {
            let old = prev as usize;
            nodes[old].deleted = true;
            let clone = Node {
                token: nodes[old].token,
                orig_pos: nodes[old].orig_pos,
                prev: nodes[old].prev,
                next: NONE,
                pending_merge: NONE,
                deleted: false,
            };
            nodes.push(clone);
            prev = nodes.len() as u32 - 1;
            let before = nodes[prev as usize].prev;
            if before != NONE {
                nodes[before as usize].next = prev;
            } else {
                first = prev;
            }
        }

        let merged = Node {
            token: nodes[left as usize].pending_merge,
            orig_pos: nodes[left as usize].orig_pos,
            prev,
            next: nodes[right as usize].next,
            pending_merge: NONE,
            deleted: false,
        };
        nodes.push(merged);
        let merged_idx = nodes.len() as u32 - 1;

        if prev != NONE {
            nodes[prev as usize].next = merged_idx;
            push_candidate(&mut nodes, &mut queue, merges, prev, merged_idx);
        } else {
            first = merged_idx;
        }

        let next = nodes[merged_idx as usize].next;
        if next != NONE {
            nodes[next as usize].prev = merged_idx;
            push_candidate(&mut nodes, &mut queue, merges, merged_idx, next);
        }
    }

    let mut out = Vec::with_capacity(seed.len());
    let mut cursor = first;
    while cursor != NONE {
        out.push(nodes[cursor as usize].token);
        cursor = nodes[cursor as usize].next;
    }
    out
}

/// Queue the pair `(left, right)` if the merge table knows it.
fn push_candidate(
    nodes: &mut [Node],
    queue: &mut MergeQueue,
    merges: &MergeTable,
    left: u32,
    right: u32,
) {
    let pair = (nodes[left as usize].token, nodes[right as usize].token);
    if let Some(rule) = merges.get(&pair) {
        nodes[left as usize].pending_merge = rule.merged;
        queue.push(Reverse((rule.priority, nodes[left as usize].orig_pos, left)));
    }
}
