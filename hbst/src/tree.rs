//! Implementation of tree creation, incremental growth and querying

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::File;
use std::io::prelude::*;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::data::{CollectionId, Descriptor, Matchable};
use crate::error::{Error, Result};
use crate::matches::{self, Match, MatchVector, MatchVectorMap};
use crate::node::{Node, SplittingStrategy};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TreeConfig {
    /// Leaves holding at most this many distinct descriptors are never split
    pub maximum_leaf_size: usize,
    /// A split bit is accepted only if `|0.5 - ones / n|` stays below this value
    pub maximum_partitioning: f64,
    /// Strategy used by construction and rebuilds
    pub strategy: SplittingStrategy,
    /// Seed for randomized strategies, entropy when unset
    pub seed: Option<u64>,
}

impl Default for TreeConfig {

    fn default() -> Self {
        return Self {
            maximum_leaf_size: 100,
            maximum_partitioning: 0.5,
            strategy: SplittingStrategy::SplitEven,
            seed: None,
        }
    }
}

impl TreeConfig {

    pub fn from_file(filename: &str) -> Result<Self> {

        let serialized = std::fs::read_to_string(filename)?;
        let deserialized: Self = serde_yaml::from_str(&serialized)?;
        deserialized.validate()?;

        return Ok(deserialized);
    }

    pub fn to_file(&self, filename: &str) -> Result<()> {

        let serialized = serde_yaml::to_string(&self)?;
        let mut file = File::create(filename)?;
        file.write_all(serialized.as_bytes())?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {

        if self.maximum_leaf_size == 0 {
            return Err(Error::InvalidConfig("maximum_leaf_size must be at least 1".to_string()));
        }

        if !(self.maximum_partitioning > 0.0 && self.maximum_partitioning <= 0.5) {
            return Err(Error::InvalidConfig(format!(
                "maximum_partitioning must be in (0, 0.5], got {}",
                self.maximum_partitioning
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeStatistics {
    pub number_of_matchables: usize,
    pub number_of_leafs: usize,
    pub number_of_internal_nodes: usize,
    /// Number of internal nodes on the longest root-to-leaf path
    pub maximum_depth: usize,
    pub mean_leaf_size: f64,
}

/// Binary search tree over `BITS` wide descriptors
///
/// Owns its nodes and every stored matchable. Queries borrow the tree immutably and may run
/// side by side; anything that grows or reshapes the tree needs `&mut self`.
#[derive(Debug)]
pub struct Tree<const BITS: usize> {
    identifier: u64,
    root: Node<BITS>,
    config: TreeConfig,
    collections: BTreeSet<CollectionId>,
    number_of_matchables: usize,
    rng: StdRng,
}

pub type Tree128 = Tree<128>;
pub type Tree256 = Tree<256>;
pub type Tree512 = Tree<512>;

/// Collapses bit-identical descriptors into one matchable carrying all of their provenance
fn deduplicate<const BITS: usize>(matchables: Vec<Matchable<BITS>>) -> Vec<Matchable<BITS>> {

    let mut unique: Vec<Matchable<BITS>> = Vec::with_capacity(matchables.len());
    let mut positions: HashMap<Descriptor<BITS>, usize> = HashMap::with_capacity(matchables.len());

    for matchable in matchables {
        match positions.get(matchable.descriptor()) {
            Some(position) => unique[*position].merge(matchable),
            None => {
                positions.insert(matchable.descriptor().clone(), unique.len());
                unique.push(matchable);
            },
        }
    }

    return unique;
}

impl<const BITS: usize> Tree<BITS> {

    /// Builds a tree with the default configuration
    pub fn build(identifier: u64, matchables: Vec<Matchable<BITS>>) -> Result<Self> {
        Self::with_config(identifier, matchables, TreeConfig::default())
    }

    pub fn with_config(identifier: u64, matchables: Vec<Matchable<BITS>>, config: TreeConfig) -> Result<Self> {

        config.validate()?;

        if BITS == 0 {
            return Err(Error::InvalidConfig("descriptor width must be at least one bit".to_string()));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut tree = Self {
            identifier,
            root: Node::empty(),
            config,
            collections: BTreeSet::new(),
            number_of_matchables: 0,
            rng,
        };

        tree.construct(matchables);

        debug!("built tree {} with {} matchables ({} bits)", tree.identifier, tree.number_of_matchables, BITS);

        return Ok(tree);
    }

    fn construct(&mut self, matchables: Vec<Matchable<BITS>>) {

        for matchable in matchables.iter() {
            self.collections.extend(matchable.origins().iter().copied());
        }

        let matchables = deduplicate(matchables);
        self.number_of_matchables = matchables.len();

        let mut available = vec![true; BITS];
        let strategy = self.config.strategy;
        self.root = Node::build(matchables, &mut available, &self.config, strategy, &mut self.rng);
    }

    ///Adds a batch of matchables. Each one descends along the existing splits to a leaf where it is
    ///either merged into an identical descriptor or appended. Leaves that outgrow the leaf
    ///condition are then split with `strategy`, using only bits still unused on their path.
    pub fn add(&mut self, matchables: Vec<Matchable<BITS>>, strategy: SplittingStrategy) {

        if matchables.is_empty() {
            return;
        }

        for matchable in matchables.iter() {
            self.collections.extend(matchable.origins().iter().copied());
        }

        let batch_size = matchables.len();
        let mut available = vec![true; BITS];
        let added = self.root.insert(matchables, &mut available, &self.config, strategy, &mut self.rng);
        self.number_of_matchables += added;

        debug!("added {} matchables to tree {} ({} new, {} merged)", batch_size, self.identifier, added, batch_size - added);
    }

    /// Matches every query against the single leaf its descriptor descends to.
    ///
    /// The map has an entry for every collection known to the tree, empty or not. Matches are keyed
    /// by the collection of the reference descriptor; within a collection they follow query order.
    pub fn match_grouped(&self, queries: &[Matchable<BITS>], max_distance: u32) -> MatchVectorMap {

        let mut grouped: MatchVectorMap = self
            .collections
            .iter()
            .map(|collection| (*collection, Vec::new()))
            .collect();

        for query in queries {

            let leaf = self.root.leaf_for(query.descriptor());

            for reference in leaf.matchables.iter() {

                let distance = query.distance(reference);
                if distance > max_distance {
                    continue;
                }

                for query_provenance in query.provenance() {
                    for reference_provenance in reference.provenance() {
                        grouped
                            .entry(reference_provenance.collection)
                            .or_default()
                            .push(Match {
                                query: query_provenance,
                                reference: reference_provenance,
                                distance,
                            });
                    }
                }
            }
        }

        return grouped;
    }

    /// All matches in one vector: the grouped matches concatenated in ascending collection order
    pub fn match_flat(&self, queries: &[Matchable<BITS>], max_distance: u32) -> MatchVector {
        matches::flatten(self.match_grouped(queries, max_distance))
    }

    /// Queries the batch against the current tree, then adds it
    pub fn match_and_add(&mut self, matchables: Vec<Matchable<BITS>>, max_distance: u32, strategy: SplittingStrategy) -> MatchVectorMap {

        let grouped = self.match_grouped(&matchables, max_distance);
        self.add(matchables, strategy);

        return grouped;
    }

    /// Rebuilds the whole tree from its stored matchables with the configured strategy
    pub fn rebuild(&mut self) {

        let root = std::mem::replace(&mut self.root, Node::empty());
        let matchables = root.into_matchables();

        let mut available = vec![true; BITS];
        let strategy = self.config.strategy;
        self.root = Node::build(matchables, &mut available, &self.config, strategy, &mut self.rng);

        debug!("rebuilt tree {} with {} matchables", self.identifier, self.number_of_matchables);
    }

    /// Drops every node and stored matchable
    pub fn clear(&mut self) {
        self.root = Node::empty();
        self.collections.clear();
        self.number_of_matchables = 0;
    }

    ///Returns whether or not the exact provided descriptor is in the tree
    pub fn contains(&self, descriptor: &Descriptor<BITS>) -> bool {

        let leaf = self.root.leaf_for(descriptor);
        return leaf.matchables.iter().any(|m| m.descriptor() == descriptor);
    }

    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    /// Number of distinct descriptors stored
    pub fn size(&self) -> usize {
        self.number_of_matchables
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_matchables == 0
    }

    /// Every collection id that contributed a matchable
    pub fn collections(&self) -> &BTreeSet<CollectionId> {
        &self.collections
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn root(&self) -> &Node<BITS> {
        &self.root
    }

    pub fn statistics(&self) -> TreeStatistics {

        let mut number_of_leafs = 0;
        let mut number_of_internal_nodes = 0;
        let mut maximum_depth = 0;
        let mut number_of_matchables = 0;

        let mut nodes_to_check: VecDeque<(&Node<BITS>, usize)> = VecDeque::new();
        nodes_to_check.push_back((&self.root, 0));

        while let Some((node, depth)) = nodes_to_check.pop_back() {
            match node {
                Node::Leaf(leaf) => {
                    number_of_leafs += 1;
                    number_of_matchables += leaf.matchables.len();
                    maximum_depth = maximum_depth.max(depth);
                },
                Node::Internal(internal) => {
                    number_of_internal_nodes += 1;
                    nodes_to_check.push_back((internal.left_child.as_ref(), depth + 1));
                    nodes_to_check.push_back((internal.right_child.as_ref(), depth + 1));
                },
            }
        }

        return TreeStatistics {
            number_of_matchables,
            number_of_leafs,
            number_of_internal_nodes,
            maximum_depth,
            mean_leaf_size: number_of_matchables as f64 / number_of_leafs as f64,
        };
    }
}
