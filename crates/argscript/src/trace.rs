//! Tracing source positions through text rewrites
//!
//! Before a line is tokenized it goes through two rewrites: comment removal
//! and variable substitution. Errors, however, must point at the text the
//! user wrote. A [`PositionMap`] records breakpoints where the transformed
//! text diverges from the original, and resolves any transformed offset back
//! to the original one with a floor lookup.

use std::collections::BTreeMap;

/// A monotonic map from offsets in a transformed text to offsets in the
/// original text.
///
/// Between two breakpoints the texts advance in lockstep, so resolving an
/// offset finds the closest breakpoint at or before it and adds the
/// distance. With no breakpoint at or before the offset the map is the
/// identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionMap {
    entries: BTreeMap<usize, usize>,
}

impl PositionMap {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records that offset `transformed` of the rewritten text corresponds
    /// to offset `original` of the source text.
    ///
    /// Breakpoints must be added left to right; rewrites scan the text once
    /// so this holds by construction.
    pub fn add_entry(&mut self, transformed: usize, original: usize) {
        debug_assert!(
            self.entries
                .last_key_value()
                .map_or(true, |(&t, _)| t <= transformed),
            "position map breakpoints must be added in increasing order",
        );
        self.entries.insert(transformed, original);
    }

    /// Copies all breakpoints of `other` into this map.
    pub fn add_all(&mut self, other: &PositionMap) {
        for (&transformed, &original) in &other.entries {
            self.entries.insert(transformed, original);
        }
    }

    /// Resolves an offset in the transformed text to the corresponding
    /// offset in the original text.
    pub fn resolve(&self, position: usize) -> usize {
        match self.entries.range(..=position).next_back() {
            None => position,
            Some((&transformed, &original)) => original + (position - transformed),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_is_identity() {
        let map = PositionMap::new();
        for position in [0, 1, 17, 4096] {
            assert_eq!(map.resolve(position), position);
        }
    }

    #[test]
    fn floor_lookup() {
        let mut map = PositionMap::new();
        // A rewrite removed 6 chars before transformed offset 4 and another
        // 10 chars before transformed offset 20.
        map.add_entry(4, 10);
        map.add_entry(20, 36);
        let cases = [(0, 0), (3, 3), (4, 10), (5, 11), (19, 25), (20, 36), (25, 41)];
        for (position, want) in cases {
            assert_eq!(map.resolve(position), want, "position {position}");
        }
    }

    #[test]
    fn layered_rewrites_compose_through_one_map() {
        // Original:  "ab#<x#>cd $v ef" with $v == "LONGVALUE".
        // Stripped:  "abcd $v ef" (comment map: 2 -> 7).
        // Final:     "abcd LONGVALUE ef".
        let mut comment_map = PositionMap::new();
        comment_map.add_entry(2, 7);

        let mut map = comment_map.clone();
        // The substitution starts at stripped offset 5 (original 10) and the
        // replacement ends at final offset 14 (original 12, right after $v).
        map.add_entry(5, comment_map.resolve(5));
        map.add_entry(14, comment_map.resolve(7));

        // 'a' and 'c' in the final text.
        assert_eq!(map.resolve(0), 0);
        assert_eq!(map.resolve(2), 7);
        // First char of the substituted value points at the '$'.
        assert_eq!(map.resolve(5), 10);
        // "ef" after the substitution.
        assert_eq!(map.resolve(15), 13);
    }

    #[test]
    fn add_all_merges_breakpoints() {
        let mut base = PositionMap::new();
        base.add_entry(3, 8);
        let mut map = PositionMap::new();
        map.add_all(&base);
        map.add_entry(10, 30);
        assert_eq!(map.resolve(4), 9);
        assert_eq!(map.resolve(12), 32);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_round_trip() {
        let mut map = PositionMap::new();
        map.add_entry(4, 10);
        let serialized = serde_json::to_string(&map).unwrap();
        let deserialized: PositionMap = serde_json::from_str(&serialized).unwrap();
        assert_eq!(map, deserialized);
    }
}
