//! Implementation of a hierarchical binary search tree for approximate Hamming distance matching of
//! binary descriptors.
//!
//! Intended for place recognition and feature matching pipelines where every image contributes a
//! few hundred to a few thousand binary descriptors (ORB, BRIEF, ...), and every new image has to
//! be matched against everything seen so far before being added itself.
//!
//! Internal nodes of the tree hold no descriptors, only the index of the bit they split on. Leaf
//! nodes hold matchables: a descriptor plus every (collection, local id, external reference) it was
//! seen with. A query descends to exactly one leaf and is compared against that leaf only, so the
//! search is approximate: a neighbor that differs in a split bit on the way down is missed.
//!
//! The tree can be built in one go or grown incrementally; leaves that become too large get split
//! in place with one of the [`node::SplittingStrategy`] variants.
pub mod error;
pub mod layout;
pub mod data;
pub mod matches;
pub mod node;
pub mod tree;
pub mod io;

pub use data::{CollectionId, Descriptor, ExternalRef, LocalId, Matchable};
pub use error::{Error, Result};
pub use matches::{Match, MatchVector, MatchVectorMap, Provenance};
pub use node::SplittingStrategy;
pub use tree::{Tree, TreeConfig, TreeStatistics};
