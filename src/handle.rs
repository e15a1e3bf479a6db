/*
Handles
=======

Callers never hold a reference to a voice. They hold a `Handle`: a 32-bit
value naming a slot in the engine's voice table together with the
generation that slot had when the voice was created.

  bit 31      group tag (set for voice-group handles)
  bits 12-30  generation (wraps, 19 bits)
  bits 0-11   slot index + 1

Every time a slot is reused its generation is bumped, so a handle issued for
the previous occupant no longer resolves. Nothing is ever dereferenced
through a stale handle; the engine compares generations and treats a
mismatch as "this voice is gone".

The raw value 0 is reserved as the null handle. Because the index field is
stored as `index + 1`, no live handle can ever be 0.
*/

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const INDEX_BITS: u32 = 12;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_BITS: u32 = 19;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;
const GROUP_TAG: u32 = 1 << 31;

/// Largest number of slots addressable by a handle.
pub const MAX_HANDLE_SLOTS: usize = INDEX_MASK as usize;

/// Opaque reference to a voice or voice group.
///
/// Safe to keep after the voice has ended; operations on a stale handle are
/// silently ignored.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handle(u32);

impl Handle {
    /// The null handle. Returned when a voice could not be started.
    pub const NONE: Handle = Handle(0);

    pub(crate) fn voice(index: usize, generation: u32) -> Self {
        Self::pack(index, generation)
    }

    pub(crate) fn group(index: usize, generation: u32) -> Self {
        Handle(Self::pack(index, generation).0 | GROUP_TAG)
    }

    fn pack(index: usize, generation: u32) -> Self {
        debug_assert!(index < MAX_HANDLE_SLOTS);
        let slot = (index as u32 + 1) & INDEX_MASK;
        let generation = generation & GENERATION_MASK;
        Handle((generation << INDEX_BITS) | slot)
    }

    /// Rebuild a handle from a value previously obtained through [`Handle::raw`].
    pub fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn is_group(self) -> bool {
        self.0 & GROUP_TAG != 0
    }

    /// Slot index this handle names, if any.
    pub(crate) fn index(self) -> Option<usize> {
        let slot = self.0 & INDEX_MASK;
        if slot == 0 {
            None
        } else {
            Some(slot as usize - 1)
        }
    }

    pub(crate) fn generation(self) -> u32 {
        (self.0 >> INDEX_BITS) & GENERATION_MASK
    }
}

/// Advance a slot generation, staying inside the bits a handle can carry.
pub(crate) fn next_generation(generation: u32) -> u32 {
    generation.wrapping_add(1) & GENERATION_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_handle_round_trips_index_and_generation() {
        let handle = Handle::voice(41, 7);
        assert_eq!(handle.index(), Some(41));
        assert_eq!(handle.generation(), 7);
        assert!(!handle.is_group());
        assert!(!handle.is_none());
    }

    #[test]
    fn group_tag_is_distinct_from_voice() {
        let voice = Handle::voice(3, 2);
        let group = Handle::group(3, 2);
        assert_ne!(voice, group);
        assert!(group.is_group());
        assert_eq!(group.index(), Some(3));
        assert_eq!(group.generation(), 2);
    }

    #[test]
    fn slot_zero_generation_zero_is_not_null() {
        let handle = Handle::voice(0, 0);
        assert!(!handle.is_none());
        assert_eq!(Handle::NONE.index(), None);
    }

    #[test]
    fn generation_wraps_inside_mask() {
        let last = GENERATION_MASK;
        assert_eq!(next_generation(last), 0);
        let handle = Handle::voice(MAX_HANDLE_SLOTS - 1, last);
        assert_eq!(handle.generation(), last);
        assert!(!handle.is_group());
    }
}
