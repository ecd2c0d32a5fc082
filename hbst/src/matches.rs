//! Query results: one [`Match`] per (query provenance, reference provenance) pair within range

use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::{CollectionId, ExternalRef, LocalId};

/// Where a descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Provenance {
    pub collection: CollectionId,
    pub index: LocalId,
    pub reference: Option<ExternalRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Match {
    pub query: Provenance,
    pub reference: Provenance,
    pub distance: u32,
}

pub type MatchVector = Vec<Match>;

/// Matches keyed by the collection of the matched reference descriptor
pub type MatchVectorMap = BTreeMap<CollectionId, MatchVector>;

/// Concatenates the per-collection match vectors in ascending collection order
pub fn flatten(grouped: MatchVectorMap) -> MatchVector {

    let total = grouped.values().map(|v| v.len()).sum();

    let mut matches: MatchVector = Vec::with_capacity(total);
    for (_, group) in grouped.into_iter() {
        matches.extend(group);
    }

    return matches;
}

/// Number of matches per collection, handy for summaries
pub fn counts(grouped: &MatchVectorMap) -> BTreeMap<CollectionId, usize> {
    grouped.iter().map(|(collection, matches)| (*collection, matches.len())).collect()
}

#[cfg(test)]
mod tests {

    use super::*;

    fn provenance(collection: CollectionId, index: LocalId) -> Provenance {
        Provenance { collection, index, reference: None }
    }

    #[test]
    fn flatten_orders_by_collection() {

        let early = Match { query: provenance(9, 0), reference: provenance(1, 3), distance: 2 };
        let late = Match { query: provenance(9, 1), reference: provenance(5, 0), distance: 0 };

        let mut grouped = MatchVectorMap::new();
        grouped.insert(5, vec![late]);
        grouped.insert(3, vec![]);
        grouped.insert(1, vec![early]);

        assert_eq!(counts(&grouped).into_iter().collect::<Vec<_>>(), vec![(1, 1), (3, 0), (5, 1)]);
        assert_eq!(flatten(grouped), vec![early, late]);
    }
}
