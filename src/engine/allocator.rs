use crate::{
    handle::{next_generation, Handle},
    voice::Voice,
};

/*
Voice Table
===========

A fixed arena of `max_voices` slots. Each slot has a generation counter
that is bumped when its voice is destroyed, and a handle is only honoured
while its generation matches:

  play     pop a free slot, return Handle(slot, generation)
  stop     drop the voice, generation += 1, push the slot back
  lookup   slot occupied && generation == handle.generation

The free list is a stack sized to the table, so releasing a slot from the
audio thread never allocates.

When no slot is free, an `EvictionPolicy` picks a victim among the voices
that may be replaced. Protected voices and buses are never offered.
*/

pub(crate) struct VoiceTable {
    slots: Vec<Option<Voice>>,
    generations: Vec<u32>,
    free: Vec<usize>,
}

impl VoiceTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            generations: vec![0; capacity],
            // Lowest slot is handed out first.
            free: (0..capacity).rev().collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Slot index of the live voice `handle` names.
    pub fn resolve(&self, handle: Handle) -> Option<usize> {
        if handle.is_group() {
            return None;
        }
        let index = handle.index()?;
        let occupied = self.slots.get(index)?.is_some();
        (occupied && self.generations[index] == handle.generation()).then_some(index)
    }

    pub fn handle_of(&self, index: usize) -> Handle {
        Handle::voice(index, self.generations[index])
    }

    pub fn get(&self, index: usize) -> Option<&Voice> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Voice> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Resolve and borrow in one step.
    pub fn voice(&self, handle: Handle) -> Option<&Voice> {
        self.get(self.resolve(handle)?)
    }

    pub fn voice_mut(&mut self, handle: Handle) -> Option<&mut Voice> {
        let index = self.resolve(handle)?;
        self.get_mut(index)
    }

    /// Place `voice` in a free slot. Hands the voice back when the table is
    /// full.
    pub fn insert(&mut self, voice: Voice) -> Result<Handle, Voice> {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(voice);
                Ok(self.handle_of(index))
            }
            None => Err(voice),
        }
    }

    /// Take the voice out of its slot and retire the slot's handles.
    pub fn remove(&mut self, index: usize) -> Option<Voice> {
        let voice = self.slots.get_mut(index)?.take()?;
        self.generations[index] = next_generation(self.generations[index]);
        self.free.push(index);
        Some(voice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Voice)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|voice| (index, voice)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Voice)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|voice| (index, voice)))
    }
}

/// What an eviction policy gets to see about each replaceable voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceInfo {
    pub handle: Handle,
    /// Monotonic start order; lower started earlier.
    pub play_index: u64,
    /// Volume including 3D attenuation.
    pub overall_volume: f32,
    pub paused: bool,
}

/// Chooses which voice to replace when the table is full.
pub trait EvictionPolicy: Send {
    /// Index into `candidates` of the voice to evict, or `None` to refuse
    /// the new voice. `candidates` is never empty.
    fn select_victim(&self, candidates: &[VoiceInfo]) -> Option<usize>;
}

/// Evict the voice that started first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Oldest;

impl EvictionPolicy for Oldest {
    fn select_victim(&self, candidates: &[VoiceInfo]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, info)| info.play_index)
            .map(|(index, _)| index)
    }
}

/// Evict the quietest voice; ties go to the oldest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quietest;

impl EvictionPolicy for Quietest {
    fn select_victim(&self, candidates: &[VoiceInfo]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.overall_volume
                    .total_cmp(&b.overall_volume)
                    .then(a.play_index.cmp(&b.play_index))
            })
            .map(|(index, _)| index)
    }
}
