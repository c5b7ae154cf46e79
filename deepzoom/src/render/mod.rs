//! Renderer-side helpers: ancestor fallback and per-frame in-use tracking.

mod frame;

pub use frame::{FrameStats, FrameTracker};

use std::iter;

use crate::cache::RequestTable;
use crate::coord::TileAddress;
use crate::decode::TileDecoder;
use crate::source::ResolvedTile;

/// Anything that can find a bitmap for a screen tile.
pub trait TileResolver {
    fn resolve(&self, address: TileAddress) -> Option<ResolvedTile>;
}

/// Walks `address` and then its ancestors, returning the first entry in
/// `table` whose bitmap decodes. The entry found is marked in use.
pub fn resolve_in_table(
    table: &RequestTable,
    decoder: &dyn TileDecoder,
    address: TileAddress,
) -> Option<ResolvedTile> {
    for candidate in iter::once(address).chain(address.ancestors()) {
        let Some(entry) = table.get(&candidate) else {
            continue;
        };
        let Some(bitmap) = entry.bitmap(decoder) else {
            continue;
        };
        let offset = address.offset_within(&candidate)?;
        entry.set_in_use(true);
        return Some(ResolvedTile {
            entry,
            bitmap,
            offset,
        });
    }
    None
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::decode::{Bitmap, DecodeError, TileDecoder};

    /// Decodes any non-empty bytes into a 1x1 bitmap; `b"bad"` fails.
    pub(crate) struct StubDecoder;

    impl TileDecoder for StubDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<Bitmap, DecodeError> {
            if bytes.is_empty() || bytes == b"bad" {
                return Err(DecodeError::Empty);
            }
            Ok(Bitmap::new(1, 1, bytes[..1].repeat(4)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubDecoder;
    use super::*;
    use bytes::Bytes;

    fn table_with(tiles: &[(TileAddress, &'static str)]) -> RequestTable {
        let table = RequestTable::new();
        for (address, bytes) in tiles {
            table.touch_or_insert(*address);
            table.update(address, Some(Bytes::from_static(bytes.as_bytes())));
        }
        table
    }

    #[test]
    fn test_exact_tile_wins() {
        let tile = TileAddress::new(2, 3, 1);
        let table = table_with(&[(tile, "own"), (TileAddress::new(1, 1, 0), "parent")]);

        let resolved = resolve_in_table(&table, &StubDecoder, tile).unwrap();
        assert_eq!(resolved.entry.address(), tile);
        assert!(!resolved.is_fallback());
        assert!(resolved.entry.is_in_use());
    }

    #[test]
    fn test_falls_back_to_nearest_decodable_ancestor() {
        let tile = TileAddress::new(3, 5, 6);
        let table = table_with(&[
            (TileAddress::new(2, 2, 3), "bad"),
            (TileAddress::new(0, 0, 0), "root"),
        ]);
        table.touch_or_insert(tile); // pending, no bytes yet

        let resolved = resolve_in_table(&table, &StubDecoder, tile).unwrap();
        assert_eq!(resolved.entry.address(), TileAddress::new(0, 0, 0));
        assert_eq!(resolved.offset.levels, 3);
        assert_eq!((resolved.offset.x, resolved.offset.y), (5, 6));
        assert!(!table.get(&tile).unwrap().is_in_use());
    }

    #[test]
    fn test_nothing_to_draw() {
        let table = RequestTable::new();
        assert!(resolve_in_table(&table, &StubDecoder, TileAddress::new(4, 1, 1)).is_none());
    }
}
