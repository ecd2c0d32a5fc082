//! Holds the node types of the tree (internal and leaf) and the split selection that decides how a
//! set of matchables gets partitioned.
//!
//! An internal node splits on a single bit index: matchables with that bit cleared go left, the
//! others go right. Every bit index is used at most once along a root-to-leaf path, which bounds
//! the depth of the tree by the descriptor width.

use std::mem;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::{Descriptor, Matchable};
use crate::tree::TreeConfig;

/// How a set of matchables that outgrew its leaf chooses its split bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplittingStrategy {
    /// Never split; leaves only grow
    DoNothing,
    /// Bit whose 0/1 partition is closest to balanced, lowest index on ties
    #[default]
    SplitEven,
    /// Most unbalanced bit that still leaves both sides populated, lowest index on ties
    SplitUneven,
    /// First acceptable bit in a uniformly shuffled order
    SplitRandomUniform,
}

#[derive(Debug, PartialEq)]
pub enum NodeType {
    Internal,
    Leaf,
}

#[derive(Debug, Clone)]
pub struct InternalNode<const BITS: usize> {
    pub split_bit: usize,
    pub left_child: Box<Node<BITS>>,
    pub right_child: Box<Node<BITS>>,
}

impl<const BITS: usize> InternalNode<BITS> {

    /// Child on the side of `descriptor`'s split bit
    #[inline]
    pub fn child_for(&self, descriptor: &Descriptor<BITS>) -> &Node<BITS> {
        match descriptor.bit(self.split_bit) {
            false => &self.left_child,
            true => &self.right_child,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeafNode<const BITS: usize> {
    pub matchables: Vec<Matchable<BITS>>,
}

impl<const BITS: usize> LeafNode<BITS> {

    /// Merges `matchable` into a stored matchable with the identical descriptor, or appends it.
    ///
    /// Returns true when it was merged.
    pub fn insert(&mut self, matchable: Matchable<BITS>) -> bool {

        let existing = self
            .matchables
            .iter_mut()
            .find(|stored| stored.descriptor() == matchable.descriptor());

        match existing {
            Some(stored) => {
                stored.merge(matchable);
                true
            },
            None => {
                self.matchables.push(matchable);
                false
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node<const BITS: usize> {
    Internal(InternalNode<BITS>),
    Leaf(LeafNode<BITS>),
}

impl<const BITS: usize> Node<BITS> {

    pub fn empty() -> Self {
        return Node::Leaf(LeafNode::default());
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Internal(_) => NodeType::Internal,
            Node::Leaf(_) => NodeType::Leaf,
        }
    }

    /// Recursively partitions an already deduplicated set.
    ///
    /// `available[i]` is true when bit `i` has not been used by an ancestor; the flags are
    /// restored before returning.
    pub fn build<R: Rng + ?Sized>(matchables: Vec<Matchable<BITS>>,
                                  available: &mut [bool],
                                  config: &TreeConfig,
                                  strategy: SplittingStrategy,
                                  rng: &mut R) -> Self {

        match select_split_bit(&matchables, available, config, strategy, rng) {
            None => Node::Leaf(LeafNode { matchables }),
            Some(split_bit) => Self::split(matchables, split_bit, available, config, strategy, rng),
        }
    }

    fn split<R: Rng + ?Sized>(matchables: Vec<Matchable<BITS>>,
                              split_bit: usize,
                              available: &mut [bool],
                              config: &TreeConfig,
                              strategy: SplittingStrategy,
                              rng: &mut R) -> Self {

        let (left, right): (Vec<_>, Vec<_>) = matchables
            .into_iter()
            .partition(|m| !m.descriptor().bit(split_bit));

        available[split_bit] = false;
        let left_child = Box::new(Self::build(left, available, config, strategy, rng));
        let right_child = Box::new(Self::build(right, available, config, strategy, rng));
        available[split_bit] = true;

        return Node::Internal(InternalNode {
            split_bit,
            left_child,
            right_child,
        });
    }

    /// Routes a batch down the existing splits, merges or appends it into the reached leaves and
    /// converts every leaf that no longer satisfies the leaf condition into a subtree.
    ///
    /// Returns the number of matchables that were stored as new entries (not merged).
    pub fn insert<R: Rng + ?Sized>(&mut self,
                                   batch: Vec<Matchable<BITS>>,
                                   available: &mut [bool],
                                   config: &TreeConfig,
                                   strategy: SplittingStrategy,
                                   rng: &mut R) -> usize {

        if batch.is_empty() {
            return 0;
        }

        match self {
            Node::Internal(node) => {

                let split_bit = node.split_bit;
                let (left, right): (Vec<_>, Vec<_>) = batch
                    .into_iter()
                    .partition(|m| !m.descriptor().bit(split_bit));

                available[split_bit] = false;
                let added = node.left_child.insert(left, available, config, strategy, rng)
                    + node.right_child.insert(right, available, config, strategy, rng);
                available[split_bit] = true;

                added
            },
            Node::Leaf(leaf) => {

                let mut added = 0;
                for matchable in batch {
                    if !leaf.insert(matchable) {
                        added += 1;
                    }
                }

                if let Some(split_bit) = select_split_bit(&leaf.matchables, available, config, strategy, rng) {
                    log::trace!("converting leaf of {} matchables, split bit {}", leaf.matchables.len(), split_bit);
                    let matchables = mem::take(&mut leaf.matchables);
                    *self = Self::split(matchables, split_bit, available, config, strategy, rng);
                }

                added
            },
        }
    }

    /// Follows the split bits of `descriptor` down to exactly one leaf
    pub fn leaf_for(&self, descriptor: &Descriptor<BITS>) -> &LeafNode<BITS> {

        let mut node = self;
        loop {
            match node {
                Node::Leaf(leaf) => return leaf,
                Node::Internal(internal) => node = internal.child_for(descriptor),
            }
        }
    }

    /// Tears the subtree down and hands back every stored matchable
    pub fn into_matchables(self) -> Vec<Matchable<BITS>> {

        let mut matchables: Vec<Matchable<BITS>> = Vec::new();
        let mut nodes_to_visit: Vec<Node<BITS>> = vec![self];

        while let Some(node) = nodes_to_visit.pop() {
            match node {
                Node::Leaf(leaf) => matchables.extend(leaf.matchables),
                Node::Internal(internal) => {
                    nodes_to_visit.push(*internal.right_child);
                    nodes_to_visit.push(*internal.left_child);
                },
            }
        }

        return matchables;
    }
}

/// Whether splitting `n` matchables into `ones` and `n - ones` is worth it
fn acceptable(ones: usize, n: usize, maximum_partitioning: f64) -> bool {

    if ones == 0 || ones == n {
        return false;
    }

    let partitioning = (0.5 - ones as f64 / n as f64).abs();
    return partitioning < maximum_partitioning;
}

fn ones_at<const BITS: usize>(matchables: &[Matchable<BITS>], bit: usize) -> usize {
    matchables.iter().filter(|m| m.descriptor().bit(bit)).count()
}

/// Picks the split bit for `matchables`, or `None` when the set must stay a leaf.
///
/// The set stays a leaf when it holds at most `maximum_leaf_size` descriptors, when every bit has
/// been used along the path, or when no unused bit gives an acceptable partition (both sides
/// populated and imbalance below `maximum_partitioning`).
pub fn select_split_bit<const BITS: usize, R: Rng + ?Sized>(matchables: &[Matchable<BITS>],
                                                            available: &[bool],
                                                            config: &TreeConfig,
                                                            strategy: SplittingStrategy,
                                                            rng: &mut R) -> Option<usize> {

    let n = matchables.len();

    if n <= config.maximum_leaf_size.max(1) {
        return None;
    }

    let candidates: Vec<usize> = (0..BITS).filter(|bit| available[*bit]).collect();
    if candidates.is_empty() {
        return None;
    }

    match strategy {
        SplittingStrategy::DoNothing => None,

        SplittingStrategy::SplitEven => {

            let mut best: Option<(usize, usize)> = None;
            for bit in candidates {
                let ones = ones_at(matchables, bit);
                if !acceptable(ones, n, config.maximum_partitioning) {
                    continue;
                }

                let imbalance = (2 * ones).abs_diff(n);
                match best {
                    Some((_, best_imbalance)) if best_imbalance <= imbalance => {},
                    _ => best = Some((bit, imbalance)),
                }

                if imbalance == n % 2 {
                    //cannot do better than this
                    break;
                }
            }

            best.map(|(bit, _)| bit)
        },

        SplittingStrategy::SplitUneven => {

            let mut best: Option<(usize, usize)> = None;
            for bit in candidates {
                let ones = ones_at(matchables, bit);
                if !acceptable(ones, n, config.maximum_partitioning) {
                    continue;
                }

                let imbalance = (2 * ones).abs_diff(n);
                match best {
                    Some((_, best_imbalance)) if best_imbalance >= imbalance => {},
                    _ => best = Some((bit, imbalance)),
                }
            }

            best.map(|(bit, _)| bit)
        },

        SplittingStrategy::SplitRandomUniform => {

            let mut candidates = candidates;
            candidates.shuffle(rng);

            candidates
                .into_iter()
                .find(|bit| acceptable(ones_at(matchables, *bit), n, config.maximum_partitioning))
        },
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn matchables_from(bit_strings: &[&str]) -> Vec<Matchable<4>> {
        bit_strings
            .iter()
            .enumerate()
            .map(|(i, s)| Matchable::with_index(i as u64, Descriptor::from_bit_str(s).unwrap(), 0))
            .collect()
    }

    fn splitting_config() -> TreeConfig {
        let mut config = TreeConfig::default();
        config.maximum_leaf_size = 1;
        return config;
    }

    #[test]
    fn split_even_prefers_balance_then_low_index() {

        let mut rng = StdRng::seed_from_u64(0);
        let config = splitting_config();

        //bit 0: 1/3, bit 1: 2/2, bit 2: 2/2, bit 3: 0/4
        let matchables = matchables_from(&["0000", "0110", "0100", "1010"]);
        let available = [true; 4];

        let bit = select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitEven, &mut rng);
        assert_eq!(bit, Some(1));

        let available = [true, false, true, true];
        let bit = select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitEven, &mut rng);
        assert_eq!(bit, Some(2));
    }

    #[test]
    fn split_uneven_prefers_imbalance() {

        let mut rng = StdRng::seed_from_u64(0);
        let config = splitting_config();

        let matchables = matchables_from(&["0000", "0110", "0100", "1010"]);
        let available = [true; 4];

        let bit = select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitUneven, &mut rng);
        assert_eq!(bit, Some(0));
    }

    #[test]
    fn leaf_when_no_bit_separates() {

        let mut rng = StdRng::seed_from_u64(0);
        let config = splitting_config();

        //only bit 3 differs, and it is already used on the path
        let matchables = matchables_from(&["0100", "0101"]);
        let available = [true, true, true, false];

        for strategy in [SplittingStrategy::SplitEven, SplittingStrategy::SplitUneven, SplittingStrategy::SplitRandomUniform] {
            assert_eq!(select_split_bit(&matchables, &available, &config, strategy, &mut rng), None);
        }

        let available = [false; 4];
        let matchables = matchables_from(&["0100", "1011"]);
        assert_eq!(select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitEven, &mut rng), None);
    }

    #[test]
    fn leaf_size_and_do_nothing() {

        let mut rng = StdRng::seed_from_u64(0);
        let matchables = matchables_from(&["0000", "1111", "0011"]);
        let available = [true; 4];

        let config = TreeConfig::default();
        assert_eq!(select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitEven, &mut rng), None);

        let config = splitting_config();
        assert_eq!(select_split_bit(&matchables, &available, &config, SplittingStrategy::DoNothing, &mut rng), None);
        assert!(select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitEven, &mut rng).is_some());
    }

    #[test]
    fn maximum_partitioning_rejects_lopsided_bits() {

        let mut rng = StdRng::seed_from_u64(0);
        let mut config = splitting_config();
        config.maximum_partitioning = 0.1;

        //every bit splits 1 against 4
        let matchables = matchables_from(&["0000", "1000", "0100", "0010", "0001"]);
        let available = [true; 4];

        assert_eq!(select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitEven, &mut rng), None);

        config.maximum_partitioning = 0.5;
        assert_eq!(select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitEven, &mut rng), Some(0));
    }

    #[test]
    fn random_split_is_always_acceptable() {

        let mut rng = StdRng::seed_from_u64(11);
        let config = splitting_config();

        //bits 0 and 3 are constant, only 1 and 2 separate anything
        let matchables = matchables_from(&["0100", "0010", "0110"]);
        let available = [true; 4];

        for _ in 0..50 {
            let bit = select_split_bit(&matchables, &available, &config, SplittingStrategy::SplitRandomUniform, &mut rng);
            assert!(matches!(bit, Some(1) | Some(2)));
        }
    }

    #[test]
    fn build_partitions_exactly() {

        let mut rng = StdRng::seed_from_u64(0);
        let config = splitting_config();
        let mut available = [true; 4];

        let matchables = matchables_from(&["0000", "0110", "0100", "1010"]);
        let root = Node::build(matchables, &mut available, &config, SplittingStrategy::SplitEven, &mut rng);

        assert_eq!(available, [true; 4]);

        let internal = match &root {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected a split"),
        };
        assert_eq!(internal.split_bit, 1);

        for matchable in internal.left_child.as_ref().clone().into_matchables() {
            assert!(!matchable.descriptor().bit(1));
        }
        for matchable in internal.right_child.as_ref().clone().into_matchables() {
            assert!(matchable.descriptor().bit(1));
        }

        assert_eq!(root.into_matchables().len(), 4);
    }

    #[test]
    fn insert_merges_and_converts_leaf() {

        let mut rng = StdRng::seed_from_u64(0);
        let mut config = TreeConfig::default();
        config.maximum_leaf_size = 2;
        let mut available = [true; 4];

        let mut root: Node<4> = Node::empty();

        let added = root.insert(matchables_from(&["0000", "0000"]), &mut available, &config, SplittingStrategy::SplitEven, &mut rng);
        assert_eq!(added, 1);
        match &root {
            Node::Leaf(leaf) => {
                assert_eq!(leaf.matchables.len(), 1);
                assert_eq!(leaf.matchables[0].origins().len(), 2);
            },
            Node::Internal(_) => panic!("two identical descriptors must not split"),
        }

        let added = root.insert(matchables_from(&["1111", "1100"]), &mut available, &config, SplittingStrategy::SplitEven, &mut rng);
        assert_eq!(added, 2);
        assert_eq!(root.node_type(), NodeType::Internal);
        assert_eq!(available, [true; 4]);

        let leaf = root.leaf_for(&Descriptor::from_bit_str("1100").unwrap());
        assert!(leaf.matchables.iter().any(|m| m.descriptor().to_bit_string() == "1100"));
    }
}
