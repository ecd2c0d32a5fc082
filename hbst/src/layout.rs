//! Sets constants and helpers for the descriptor bit layout
//!
//! Descriptor bits are stored in `u64` words, most significant bit first: bit `i` of a descriptor
//! lives in word `i / 64` at the `(i % 64)`-th most significant position. Byte rows coming from an
//! external feature pipeline use the same order (bit `i` is the `(i % 8)`-th most significant bit
//! of byte `i / 8`), so a row maps onto words by plain big endian reads.

use byteorder::{BigEndian, ByteOrder};

pub const WORD_BITS: usize = 64;
pub const WORD_BYTES: usize = 8;
pub const BYTE_BITS: usize = 8;

/// Number of `u64` words needed to hold `bits` bits
pub const fn words_for_bits(bits: usize) -> usize {
    (bits + WORD_BITS - 1) / WORD_BITS
}

/// Number of bytes a row must have to carry `bits` bits, including a trailing partial byte
pub const fn bytes_for_bits(bits: usize) -> usize {
    (bits + BYTE_BITS - 1) / BYTE_BITS
}

/// Returns the word index and the single bit mask that address bit `index`
#[inline]
pub const fn bit_position(index: usize) -> (usize, u64) {
    let word = index / WORD_BITS;
    let mask = 1u64 << (WORD_BITS - 1 - (index % WORD_BITS));
    (word, mask)
}

/// Mask of the bits of the final word that belong to a `bits` wide descriptor
pub const fn tail_mask(bits: usize) -> u64 {
    let used = bits % WORD_BITS;
    if used == 0 {
        u64::MAX
    } else {
        !(u64::MAX >> used)
    }
}

/// Packs an MSB-first byte row into descriptor words.
///
/// `bytes` must hold exactly `bytes_for_bits(bits)` bytes (the caller validates this). Any bits of
/// the final partial byte beyond the descriptor width are low-order bits and get cleared.
pub fn pack_bytes(bytes: &[u8], bits: usize) -> Vec<u64> {

    let num_words = words_for_bits(bits);

    let mut buffer = vec![0u8; num_words * WORD_BYTES];
    buffer[..bytes.len()].copy_from_slice(bytes);

    let mut words: Vec<u64> = buffer
        .chunks_exact(WORD_BYTES)
        .map(BigEndian::read_u64)
        .collect();

    if let Some(last) = words.last_mut() {
        *last &= tail_mask(bits);
    }

    return words;
}

/// Inverse of [`pack_bytes`]: writes the words back out as `bytes_for_bits(bits)` bytes
pub fn unpack_words(words: &[u64], bits: usize) -> Vec<u8> {

    let mut buffer = vec![0u8; words.len() * WORD_BYTES];
    for (chunk, word) in buffer.chunks_exact_mut(WORD_BYTES).zip(words.iter()) {
        BigEndian::write_u64(chunk, *word);
    }

    buffer.truncate(bytes_for_bits(bits));
    return buffer;
}
