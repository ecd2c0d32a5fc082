//! Turns descriptor rows coming out of a feature pipeline into matchables
//!
//! A pipeline hands over one contiguous byte buffer with one row per descriptor. Every row must be
//! exactly `Descriptor::<BITS>::BYTES` long, MSB-first (see [`crate::layout`]). Shape problems are
//! reported before a single matchable is produced.

use crate::data::{CollectionId, Descriptor, ExternalRef, Matchable};
use crate::error::{Error, Result};

/// Row-major view over a buffer of `rows` descriptors of `row_bytes` bytes each
#[derive(Debug, Clone, Copy)]
pub struct DescriptorMatrix<'a> {
    data: &'a [u8],
    rows: usize,
    row_bytes: usize,
}

impl<'a> DescriptorMatrix<'a> {

    pub fn new(data: &'a [u8], rows: usize, row_bytes: usize) -> Result<Self> {

        //a shape whose byte count overflows can never describe a real buffer
        let expected = match rows.checked_mul(row_bytes) {
            Some(expected) => expected,
            None => return Err(Error::MatrixShape { rows, row_bytes, expected: usize::MAX, actual: data.len() }),
        };

        if data.len() != expected {
            return Err(Error::MatrixShape { rows, row_bytes, expected, actual: data.len() });
        }

        return Ok(Self { data, rows, row_bytes });
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn row(&self, index: usize) -> &'a [u8] {
        let start = index * self.row_bytes;
        &self.data[start..start + self.row_bytes]
    }

    fn descriptors<const BITS: usize>(&self) -> Result<Vec<Descriptor<BITS>>> {

        if self.row_bytes != Descriptor::<BITS>::BYTES {
            return Err(Error::DescriptorSize { expected: Descriptor::<BITS>::BYTES, actual: self.row_bytes });
        }

        (0..self.rows).map(|index| Descriptor::from_bytes(self.row(index))).collect()
    }
}

/// One matchable per row, identified by its row index within `collection`
pub fn matchables_with_index<const BITS: usize>(matrix: &DescriptorMatrix, collection: CollectionId) -> Result<Vec<Matchable<BITS>>> {

    let descriptors = matrix.descriptors::<BITS>()?;

    let matchables = descriptors
        .into_iter()
        .enumerate()
        .map(|(index, descriptor)| Matchable::with_index(index as u64, descriptor, collection))
        .collect();

    return Ok(matchables);
}

/// One matchable per row, identified by its row index and carrying the row's external reference
pub fn matchables_with_references<const BITS: usize>(matrix: &DescriptorMatrix,
                                                     references: &[ExternalRef],
                                                     collection: CollectionId) -> Result<Vec<Matchable<BITS>>> {

    if references.len() != matrix.rows() {
        return Err(Error::ReferenceCount { expected: matrix.rows(), actual: references.len() });
    }

    let descriptors = matrix.descriptors::<BITS>()?;

    let matchables = descriptors
        .into_iter()
        .zip(references.iter())
        .enumerate()
        .map(|(index, (descriptor, reference))| Matchable::new(index as u64, Some(*reference), descriptor, collection))
        .collect();

    return Ok(matchables);
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::matches::Provenance;
    use crate::node::SplittingStrategy;
    use crate::tree::Tree;

    fn buffer(rows: usize, row_bytes: usize) -> Vec<u8> {
        (0..rows * row_bytes).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn rows_become_indexed_matchables() {

        let data = buffer(3, 32);
        let matrix = DescriptorMatrix::new(&data, 3, 32).unwrap();

        let matchables = matchables_with_index::<256>(&matrix, 4).unwrap();
        assert_eq!(matchables.len(), 3);

        for (index, matchable) in matchables.iter().enumerate() {
            assert_eq!(matchable.descriptor().to_bytes(), matrix.row(index));
            assert_eq!(matchable.identifiers()[&4], index as u64);
            assert_eq!(matchable.origins(), &[4]);
        }
    }

    #[test]
    fn references_follow_rows() {

        let data = buffer(2, 16);
        let matrix = DescriptorMatrix::new(&data, 2, 16).unwrap();
        let references = [ExternalRef(100), ExternalRef(200)];

        let matchables = matchables_with_references::<128>(&matrix, &references, 1).unwrap();

        let provenance: Vec<Provenance> = matchables.iter().flat_map(|m| m.provenance()).collect();
        assert_eq!(provenance, vec![
            Provenance { collection: 1, index: 0, reference: Some(ExternalRef(100)) },
            Provenance { collection: 1, index: 1, reference: Some(ExternalRef(200)) },
        ]);
    }

    #[test]
    fn shape_errors() {

        let data = buffer(2, 32);

        assert!(matches!(
            DescriptorMatrix::new(&data, 3, 32),
            Err(Error::MatrixShape { rows: 3, row_bytes: 32, expected: 96, actual: 64 })
        ));

        //row count times row width does not fit in a usize
        assert!(matches!(
            DescriptorMatrix::new(&[], usize::MAX / 2 + 1, 2),
            Err(Error::MatrixShape { row_bytes: 2, expected: usize::MAX, actual: 0, .. })
        ));
        assert!(matches!(
            DescriptorMatrix::new(&data, usize::MAX, usize::MAX),
            Err(Error::MatrixShape { .. })
        ));

        let matrix = DescriptorMatrix::new(&data, 2, 32).unwrap();
        assert!(matches!(
            matchables_with_index::<512>(&matrix, 0),
            Err(Error::DescriptorSize { expected: 64, actual: 32 })
        ));
        assert!(matches!(
            matchables_with_references::<256>(&matrix, &[ExternalRef(0)], 0),
            Err(Error::ReferenceCount { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn odd_width_rows() {

        //12 bit descriptors travel in 2 byte rows, the low nibble of the second byte is ignored
        let data = [0b1111_0000, 0b1010_1111, 0b1111_0000, 0b1010_0000];
        let matrix = DescriptorMatrix::new(&data, 2, 2).unwrap();

        let matchables = matchables_with_index::<12>(&matrix, 0).unwrap();
        assert_eq!(matchables[0].descriptor(), matchables[1].descriptor());
        assert_eq!(matchables[0].descriptor().to_bit_string(), "111100001010");
    }

    #[test]
    fn ingested_rows_match_themselves() {

        let data = buffer(50, 32);
        let matrix = DescriptorMatrix::new(&data, 50, 32).unwrap();

        let references: Vec<ExternalRef> = (0..50).map(ExternalRef).collect();
        let train = matchables_with_references::<256>(&matrix, &references, 0).unwrap();
        let query = matchables_with_index::<256>(&matrix, 1).unwrap();

        let mut tree = Tree::build(0, Vec::new()).unwrap();
        tree.add(train, SplittingStrategy::SplitEven);

        let matches = tree.match_flat(&query, 0);
        let distinct = {
            let mut rows: Vec<&[u8]> = (0..50).map(|i| matrix.row(i)).collect();
            rows.sort();
            rows.dedup();
            rows.len()
        };

        assert_eq!(tree.size(), distinct);
        assert_eq!(matches.len(), 50);
        for m in matches.iter() {
            assert_eq!(m.reference.reference, Some(ExternalRef(m.reference.index as usize)));
            assert_eq!(matrix.row(m.query.index as usize), matrix.row(m.reference.index as usize));
        }
    }
}
