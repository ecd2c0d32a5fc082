//! Holds the descriptor and matchable types that get stored in and queried against the tree
//!
//! A [`Descriptor`] is a fixed width, immutable bit vector whose width is part of its type. A
//! [`Matchable`] wraps one descriptor together with every origin that produced this exact bit
//! pattern, so identical descriptors are stored once and carry all of their provenance.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout;
use crate::matches::Provenance;

/// Identifier of a source collection, e.g. one image
pub type CollectionId = u64;

/// Identifier of a descriptor inside its source collection, e.g. a keypoint index
pub type LocalId = u64;

/// Opaque handle into caller owned storage (a keypoint buffer, a landmark table, ...).
///
/// The tree copies the handle around but never resolves it; keeping the referenced data alive is
/// up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalRef(pub usize);

/// Fixed width bit vector of `BITS` bits.
///
/// The words live in a boxed slice of exactly [`Self::WORDS`] entries: an inline `[u64; BITS / 64]`
/// needs `generic_const_exprs`, which stable Rust does not have, and a second `WORDS` parameter
/// would leak into every type generic over the width. Bits past `BITS` in the last word are
/// always zero.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Descriptor<const BITS: usize> {
    words: Box<[u64]>,
}

impl<const BITS: usize> Descriptor<BITS> {

    /// Number of `u64` words backing a descriptor of this width
    pub const WORDS: usize = layout::words_for_bits(BITS);

    /// Number of bytes in an external row carrying a descriptor of this width
    pub const BYTES: usize = layout::bytes_for_bits(BITS);

    pub fn zeros() -> Self {
        return Self { words: vec![0u64; Self::WORDS].into_boxed_slice() };
    }

    pub fn from_words(words: Vec<u64>) -> Result<Self> {

        if words.len() != Self::WORDS {
            return Err(Error::WordCount { expected: Self::WORDS, actual: words.len() });
        }

        if let Some(last) = words.last() {
            if last & !layout::tail_mask(BITS) != 0 {
                return Err(Error::PaddingBits(BITS));
            }
        }

        return Ok(Self { words: words.into_boxed_slice() });
    }

    /// Reads a descriptor from an MSB-first byte row of exactly [`Self::BYTES`] bytes.
    ///
    /// When `BITS` is not a multiple of 8 the remaining bits come from the high-order bits of the
    /// final byte; its low-order bits are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {

        if bytes.len() != Self::BYTES {
            return Err(Error::DescriptorSize { expected: Self::BYTES, actual: bytes.len() });
        }

        let words = layout::pack_bytes(bytes, BITS);
        return Ok(Self { words: words.into_boxed_slice() });
    }

    /// Parses a string of `'0'`/`'1'` characters; character `i` becomes bit `i`
    pub fn from_bit_str(s: &str) -> Result<Self> {

        if s.len() != BITS {
            return Err(Error::InvalidBitString(format!("expected {} characters, got {}", BITS, s.len())));
        }

        let mut words = vec![0u64; Self::WORDS];
        for (index, c) in s.chars().enumerate() {
            match c {
                '0' => {},
                '1' => {
                    let (word, mask) = layout::bit_position(index);
                    words[word] |= mask;
                },
                other => {
                    return Err(Error::InvalidBitString(format!("unexpected character {:?} at {}", other, index)));
                },
            }
        }

        return Ok(Self { words: words.into_boxed_slice() });
    }

    /// Builds a descriptor by asking `f` for the value of every bit index in `[0, BITS)`
    pub fn from_fn<F: FnMut(usize) -> bool>(mut f: F) -> Self {

        let mut words = vec![0u64; Self::WORDS];
        for index in 0..BITS {
            if f(index) {
                let (word, mask) = layout::bit_position(index);
                words[word] |= mask;
            }
        }

        return Self { words: words.into_boxed_slice() };
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {

        let mut words: Vec<u64> = (0..Self::WORDS).map(|_| rng.gen::<u64>()).collect();
        if let Some(last) = words.last_mut() {
            *last &= layout::tail_mask(BITS);
        }

        return Self { words: words.into_boxed_slice() };
    }

    /// Value of the bit at `index`.
    ///
    /// Panics if `index >= BITS`.
    #[inline]
    pub fn bit(&self, index: usize) -> bool {
        assert!(index < BITS, "bit index {} out of range for a {} bit descriptor", index, BITS);
        let (word, mask) = layout::bit_position(index);
        return self.words[word] & mask != 0;
    }

    /// Hamming distance: population count of the XOR of both descriptors
    #[inline]
    pub fn distance(&self, other: &Self) -> u32 {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        layout::unpack_words(&self.words, BITS)
    }

    pub fn to_bit_string(&self) -> String {
        (0..BITS).map(|i| if self.bit(i) { '1' } else { '0' }).collect()
    }
}

impl<const BITS: usize> fmt::Debug for Descriptor<BITS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Descriptor<{}>({})", BITS, self.to_bit_string())
    }
}

impl<const BITS: usize> fmt::Display for Descriptor<BITS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_bit_string())
    }
}

pub type Descriptor128 = Descriptor<128>;
pub type Descriptor256 = Descriptor<256>;
pub type Descriptor512 = Descriptor<512>;

/// A descriptor plus every (collection, local id, external reference) it was seen with.
///
/// Matchables always carry at least one identifier entry. Identical descriptors inserted into a
/// tree are merged into the one already stored there.
#[derive(Debug, Clone, PartialEq)]
pub struct Matchable<const BITS: usize> {
    descriptor: Descriptor<BITS>,
    identifiers: BTreeMap<CollectionId, LocalId>,
    references: BTreeMap<CollectionId, Option<ExternalRef>>,
    origins: Vec<CollectionId>,
}

impl<const BITS: usize> Matchable<BITS> {

    pub fn new(index: LocalId, reference: Option<ExternalRef>, descriptor: Descriptor<BITS>, collection: CollectionId) -> Self {

        let mut identifiers = BTreeMap::new();
        identifiers.insert(collection, index);

        let mut references = BTreeMap::new();
        references.insert(collection, reference);

        return Self {
            descriptor,
            identifiers,
            references,
            origins: vec![collection],
        };
    }

    pub fn with_index(index: LocalId, descriptor: Descriptor<BITS>, collection: CollectionId) -> Self {
        Self::new(index, None, descriptor, collection)
    }

    /// Local id defaults to 0 when only a reference identifies the descriptor
    pub fn with_reference(reference: ExternalRef, descriptor: Descriptor<BITS>, collection: CollectionId) -> Self {
        Self::new(0, Some(reference), descriptor, collection)
    }

    pub fn random<R: Rng + ?Sized>(index: LocalId, collection: CollectionId, rng: &mut R) -> Self {
        Self::with_index(index, Descriptor::random(rng), collection)
    }

    pub fn descriptor(&self) -> &Descriptor<BITS> {
        &self.descriptor
    }

    pub fn identifiers(&self) -> &BTreeMap<CollectionId, LocalId> {
        &self.identifiers
    }

    pub fn references(&self) -> &BTreeMap<CollectionId, Option<ExternalRef>> {
        &self.references
    }

    /// Every collection that contributed this descriptor, in merge order, duplicates included
    pub fn origins(&self) -> &[CollectionId] {
        &self.origins
    }

    #[inline]
    pub fn distance(&self, other: &Matchable<BITS>) -> u32 {
        self.descriptor.distance(&other.descriptor)
    }

    /// Folds the provenance of `other` into this matchable.
    ///
    /// Only meaningful for bit-identical descriptors; no distance check happens here. For a
    /// collection already present the existing entry is kept.
    pub fn merge(&mut self, other: Matchable<BITS>) {

        for (collection, index) in other.identifiers {
            self.identifiers.entry(collection).or_insert(index);
        }

        for (collection, reference) in other.references {
            self.references.entry(collection).or_insert(reference);
        }

        self.origins.extend(other.origins);
    }

    /// One provenance entry per identifier
    pub fn provenance(&self) -> impl Iterator<Item = Provenance> + '_ {
        self.identifiers.iter().map(move |(collection, index)| Provenance {
            collection: *collection,
            index: *index,
            reference: self.references.get(collection).copied().flatten(),
        })
    }
}

pub type Matchable128 = Matchable<128>;
pub type Matchable256 = Matchable<256>;
pub type Matchable512 = Matchable<512>;
