//! Skip List Module
//!
//! Rank-aware ordered set of `(member, score)` pairs, ordered by score and
//! then by member. Used as the expiry index of the cache: the score is the
//! entry's expiration time, the member its key.
//!
//! Nodes are stored in an arena and linked by index. Slot 0 is the header.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Upper bound on the number of levels a node may span.
pub const MAX_LEVEL: usize = 32;

/// Probability of promoting a node to the next level.
const LEVEL_PROBABILITY: f64 = 0.25;

const HEAD: usize = 0;

#[derive(Debug, Clone, Copy, Default)]
struct Level {
    forward: Option<usize>,
    /// Number of level-0 steps covered by `forward`
    span: usize,
}

#[derive(Debug)]
struct Node {
    member: String,
    score: i64,
    backward: Option<usize>,
    levels: Vec<Level>,
}

impl Node {
    fn new(member: String, score: i64, level: usize) -> Self {
        Self {
            member,
            score,
            backward: None,
            levels: vec![Level::default(); level],
        }
    }

    /// True if this node sorts strictly before `(score, member)`.
    #[inline]
    fn precedes(&self, score: i64, member: &str) -> bool {
        self.score < score || (self.score == score && self.member.as_str() < member)
    }

    #[inline]
    fn is(&self, score: i64, member: &str) -> bool {
        self.score == score && self.member == member
    }
}

// == Skip List ==
/// Probabilistically balanced ordered set with O(log n) rank queries.
#[derive(Debug)]
pub struct SkipList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    tail: Option<usize>,
    level: usize,
    length: usize,
    rng: StdRng,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    // == Constructor ==
    /// Creates an empty skip list with an entropy-seeded level generator.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates an empty skip list whose node levels are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            nodes: vec![Node::new(String::new(), 0, MAX_LEVEL)],
            free: Vec::new(),
            tail: None,
            level: 1,
            length: 0,
            rng,
        }
    }

    /// Number of pairs in the list.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    // == Insert ==
    /// Inserts `(member, score)` at its sorted position.
    ///
    /// The pair must not already be present; callers replacing a member's
    /// score remove the old pair first.
    pub fn insert(&mut self, member: String, score: i64) {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(next) = self.nodes[x].levels[i].forward {
                if !self.nodes[next].precedes(score, &member) {
                    break;
                }
                rank[i] += self.nodes[x].levels[i].span;
                x = next;
            }
            update[i] = x;
        }

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD].levels[i].span = self.length;
            }
            self.level = level;
        }

        let x = self.alloc(member, score, level);
        for i in 0..level {
            let prev = update[i];
            let skipped = rank[0] - rank[i];
            let prev_level = self.nodes[prev].levels[i];

            self.nodes[x].levels[i] = Level {
                forward: prev_level.forward,
                span: prev_level.span - skipped,
            };
            self.nodes[prev].levels[i] = Level {
                forward: Some(x),
                span: skipped + 1,
            };
        }

        // Levels above the new node now cover one more step
        for i in level..self.level {
            self.nodes[update[i]].levels[i].span += 1;
        }

        self.nodes[x].backward = (update[0] != HEAD).then_some(update[0]);
        match self.nodes[x].levels[0].forward {
            Some(next) => self.nodes[next].backward = Some(x),
            None => self.tail = Some(x),
        }
        self.length += 1;
    }

    // == Remove ==
    /// Removes the exact `(member, score)` pair.
    ///
    /// Returns `false` without touching the list if the pair is absent, which
    /// happens when the caller's idea of the current score is stale.
    pub fn remove(&mut self, member: &str, score: i64) -> bool {
        let mut update = [HEAD; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                if !self.nodes[next].precedes(score, member) {
                    break;
                }
                x = next;
            }
            update[i] = x;
        }

        match self.nodes[x].levels[0].forward {
            Some(target) if self.nodes[target].is(score, member) => {
                self.unlink(target, &update);
                self.release(target);
                true
            }
            _ => false,
        }
    }

    fn unlink(&mut self, x: usize, update: &[usize; MAX_LEVEL]) {
        for (i, &prev) in update.iter().enumerate().take(self.level) {
            if self.nodes[prev].levels[i].forward == Some(x) {
                let removed = self.nodes[x].levels[i];
                let prev_level = &mut self.nodes[prev].levels[i];
                prev_level.span = prev_level.span + removed.span - 1;
                prev_level.forward = removed.forward;
            } else {
                self.nodes[prev].levels[i].span -= 1;
            }
        }

        let backward = self.nodes[x].backward;
        match self.nodes[x].levels[0].forward {
            Some(next) => self.nodes[next].backward = backward,
            None => self.tail = backward,
        }

        while self.level > 1 && self.nodes[HEAD].levels[self.level - 1].forward.is_none() {
            self.level -= 1;
        }
        self.length -= 1;
    }

    // == Rank ==
    /// Returns the 1-based rank of the exact `(member, score)` pair.
    pub fn rank(&self, member: &str, score: i64) -> Option<usize> {
        let mut rank = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                let node = &self.nodes[next];
                if !(node.precedes(score, member) || node.is(score, member)) {
                    break;
                }
                rank += self.nodes[x].levels[i].span;
                x = next;
            }
            if x != HEAD && self.nodes[x].is(score, member) {
                return Some(rank);
            }
        }
        None
    }

    /// Returns the `(member, score)` pair at the given 1-based rank.
    pub fn get_by_rank(&self, rank: usize) -> Option<(&str, i64)> {
        self.node_at_rank(rank).map(|x| {
            let node = &self.nodes[x];
            (node.member.as_str(), node.score)
        })
    }

    fn node_at_rank(&self, rank: usize) -> Option<usize> {
        if rank == 0 || rank > self.length {
            return None;
        }

        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                let span = self.nodes[x].levels[i].span;
                if traversed + span > rank {
                    break;
                }
                traversed += span;
                x = next;
            }
            if traversed == rank {
                return Some(x);
            }
        }
        None
    }

    // == Range Queries ==
    /// Members with `min <= score < max`, ascending.
    pub fn range_by_score(&self, min: i64, max: i64) -> Vec<String> {
        if min >= max {
            return Vec::new();
        }
        // Nothing at or above min
        match self.last() {
            Some((_, highest)) if highest >= min => {}
            _ => return Vec::new(),
        }

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                if self.nodes[next].score >= min {
                    break;
                }
                x = next;
            }
        }

        let mut members = Vec::new();
        let mut cursor = self.nodes[x].levels[0].forward;
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            if node.score >= max {
                break;
            }
            members.push(node.member.clone());
            cursor = node.levels[0].forward;
        }
        members
    }

    /// Members whose 1-based rank lies in `[max(start, 1), end)`, ascending.
    pub fn range_by_rank(&self, start: usize, end: usize) -> Vec<String> {
        let start = start.max(1);
        let end = end.min(self.length + 1);
        if start >= end {
            return Vec::new();
        }

        let mut members = Vec::with_capacity(end - start);
        let mut cursor = self.node_at_rank(start);
        while let Some(idx) = cursor {
            if members.len() == end - start {
                break;
            }
            let node = &self.nodes[idx];
            members.push(node.member.clone());
            cursor = node.levels[0].forward;
        }
        members
    }

    /// Ascending iterator over `(member, score)` pairs.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.nodes[HEAD].levels[0].forward,
        }
    }

    /// The pair with the highest `(score, member)`.
    pub fn last(&self) -> Option<(&str, i64)> {
        self.tail.map(|x| (self.nodes[x].member.as_str(), self.nodes[x].score))
    }

    // == Arena ==
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen_bool(LEVEL_PROBABILITY) {
            level += 1;
        }
        level
    }

    fn alloc(&mut self, member: String, score: i64, level: usize) -> usize {
        let node = Node::new(member, score, level);
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        let node = &mut self.nodes[idx];
        node.member = String::new();
        node.backward = None;
        node.levels = Vec::new();
        self.free.push(idx);
    }
}

/// Iterator returned by [`SkipList::iter`].
pub struct Iter<'a> {
    list: &'a SkipList,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, i64);

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.list.nodes[self.cursor?];
        self.cursor = node.levels[0].forward;
        Some((node.member.as_str(), node.score))
    }
}
