//! Cached record for one tile address.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::coord::TileAddress;
use crate::decode::{Bitmap, TileDecoder};

#[derive(Debug)]
enum EntryState {
    /// Requested, bytes not yet known.
    Pending,
    /// Fetch finished. `None` means the provider had nothing for the address.
    Resolved(Option<Bytes>),
    /// Evicted, invalidated or torn down.
    Released,
}

#[derive(Debug)]
enum BitmapSlot {
    Empty,
    Decoded(Arc<Bitmap>),
    Failed,
}

/// Raw bytes for one tile plus a lazily decoded bitmap.
///
/// Bytes are owned by the entry until it is released. The decoded bitmap is a
/// cache on top of them and can be dropped on its own (see
/// [`TileEntry::clear_bitmap`]) without touching byte ownership.
///
/// `in_use` is set by the renderer while a visible screen tile maps to this
/// entry and protects it from eviction.
#[derive(Debug)]
pub struct TileEntry {
    address: TileAddress,
    state: RwLock<EntryState>,
    bitmap: Mutex<BitmapSlot>,
    in_use: AtomicBool,
}

impl TileEntry {
    /// Creates an entry whose fetch has not completed.
    pub fn pending(address: TileAddress) -> Self {
        Self {
            address,
            state: RwLock::new(EntryState::Pending),
            bitmap: Mutex::new(BitmapSlot::Empty),
            in_use: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> TileAddress {
        self.address
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.read(), EntryState::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.read(), EntryState::Resolved(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(*self.state.read(), EntryState::Released)
    }

    /// The tile's bytes, if resolved with content.
    pub fn bytes(&self) -> Option<Bytes> {
        match &*self.state.read() {
            EntryState::Resolved(bytes) => bytes.clone(),
            _ => None,
        }
    }

    /// Bytes accounted against the cache budget.
    pub fn size_bytes(&self) -> u64 {
        match &*self.state.read() {
            EntryState::Resolved(Some(bytes)) => bytes.len() as u64,
            _ => 0,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn set_in_use(&self, in_use: bool) {
        self.in_use.store(in_use, Ordering::Release);
    }

    /// True when a decoded bitmap is currently held.
    pub fn has_bitmap(&self) -> bool {
        matches!(*self.bitmap.lock(), BitmapSlot::Decoded(_))
    }

    /// Returns the decoded bitmap, decoding on first use.
    ///
    /// A failed decode is remembered so the same bytes are not decoded again.
    pub fn bitmap(&self, decoder: &dyn TileDecoder) -> Option<Arc<Bitmap>> {
        match &*self.bitmap.lock() {
            BitmapSlot::Decoded(bitmap) => return Some(Arc::clone(bitmap)),
            BitmapSlot::Failed => return None,
            BitmapSlot::Empty => {}
        }

        let bytes = self.bytes()?;
        let decoded = decoder.decode(&bytes);

        let mut slot = self.bitmap.lock();
        if self.is_released() {
            return None;
        }
        match decoded {
            Ok(bitmap) => {
                let bitmap = Arc::new(bitmap);
                *slot = BitmapSlot::Decoded(Arc::clone(&bitmap));
                Some(bitmap)
            }
            Err(e) => {
                debug!(address = %self.address, error = %e, "Tile bitmap decode failed");
                *slot = BitmapSlot::Failed;
                None
            }
        }
    }

    /// Drops the decoded bitmap, keeping the bytes.
    pub fn clear_bitmap(&self) {
        let mut slot = self.bitmap.lock();
        if matches!(*slot, BitmapSlot::Decoded(_)) {
            *slot = BitmapSlot::Empty;
        }
    }

    /// Stores the fetch result. Returns the new byte size.
    pub(crate) fn resolve(&self, bytes: Option<Bytes>) -> u64 {
        let size = bytes.as_ref().map_or(0, |b| b.len() as u64);
        *self.state.write() = EntryState::Resolved(bytes);
        *self.bitmap.lock() = BitmapSlot::Empty;
        size
    }

    /// Frees bytes and bitmap. The entry can no longer resolve.
    pub(crate) fn release(&self) {
        *self.state.write() = EntryState::Released;
        *self.bitmap.lock() = BitmapSlot::Empty;
        self.set_in_use(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeError;
    use std::sync::atomic::AtomicUsize;

    /// Decoder that turns any non-empty input into a 1x1 bitmap and counts calls.
    #[derive(Default)]
    struct CountingDecoder {
        calls: AtomicUsize,
    }

    impl TileDecoder for CountingDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<Bitmap, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if bytes.starts_with(b"bad") {
                return Err(DecodeError::Empty);
            }
            Ok(Bitmap::new(1, 1, vec![0, 0, 0, 255]))
        }
    }

    fn addr() -> TileAddress {
        TileAddress::new(2, 1, 1)
    }

    #[test]
    fn test_pending_entry_has_no_bytes() {
        let entry = TileEntry::pending(addr());
        assert!(entry.is_pending());
        assert!(entry.bytes().is_none());
        assert_eq!(entry.size_bytes(), 0);
    }

    #[test]
    fn test_resolve_sets_size() {
        let entry = TileEntry::pending(addr());
        let size = entry.resolve(Some(Bytes::from_static(b"hello")));
        assert_eq!(size, 5);
        assert!(entry.is_resolved());
        assert_eq!(entry.size_bytes(), 5);
    }

    #[test]
    fn test_empty_resolution_has_no_bitmap() {
        let entry = TileEntry::pending(addr());
        entry.resolve(None);
        let decoder = CountingDecoder::default();
        assert!(entry.is_resolved());
        assert!(entry.bitmap(&decoder).is_none());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bitmap_decoded_once() {
        let entry = TileEntry::pending(addr());
        entry.resolve(Some(Bytes::from_static(b"png")));
        let decoder = CountingDecoder::default();

        assert!(entry.bitmap(&decoder).is_some());
        assert!(entry.bitmap(&decoder).is_some());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
        assert!(entry.has_bitmap());
    }

    #[test]
    fn test_failed_decode_is_remembered() {
        let entry = TileEntry::pending(addr());
        entry.resolve(Some(Bytes::from_static(b"bad bytes")));
        let decoder = CountingDecoder::default();

        assert!(entry.bitmap(&decoder).is_none());
        assert!(entry.bitmap(&decoder).is_none());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_bitmap_keeps_bytes() {
        let entry = TileEntry::pending(addr());
        entry.resolve(Some(Bytes::from_static(b"png")));
        let decoder = CountingDecoder::default();
        entry.bitmap(&decoder);

        entry.clear_bitmap();
        assert!(!entry.has_bitmap());
        assert_eq!(entry.size_bytes(), 3);

        entry.bitmap(&decoder);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_release_frees_everything() {
        let entry = TileEntry::pending(addr());
        entry.resolve(Some(Bytes::from_static(b"png")));
        entry.set_in_use(true);
        entry.release();

        assert!(entry.is_released());
        assert!(entry.bytes().is_none());
        assert!(!entry.is_in_use());
        assert!(entry.bitmap(&CountingDecoder::default()).is_none());
    }
}
