use crate::handle::{next_generation, Handle, MAX_HANDLE_SLOTS};

/// Voice groups: named sets of voice handles that broadcast control calls.
///
/// Group handles share the voice handle layout with the group tag set, and
/// carry their own generation so a destroyed group stops resolving at once.
/// Membership is stored as plain voice handles; members that expire are
/// skipped on use and pruned on the next insert.
#[derive(Default)]
pub(crate) struct GroupTable {
    groups: Vec<Option<Vec<Handle>>>,
    generations: Vec<u32>,
    free: Vec<usize>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` once every group slot is taken.
    pub fn create(&mut self) -> Option<Handle> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.groups.len() < MAX_HANDLE_SLOTS => {
                self.groups.push(None);
                self.generations.push(0);
                self.groups.len() - 1
            }
            None => return None,
        };
        self.groups[index] = Some(Vec::new());
        Some(Handle::group(index, self.generations[index]))
    }

    pub fn resolve(&self, handle: Handle) -> Option<usize> {
        if !handle.is_group() {
            return None;
        }
        let index = handle.index()?;
        let live = self.groups.get(index)?.is_some();
        (live && self.generations[index] == handle.generation()).then_some(index)
    }

    pub fn destroy(&mut self, handle: Handle) -> bool {
        let Some(index) = self.resolve(handle) else {
            return false;
        };
        self.groups[index] = None;
        self.generations[index] = next_generation(self.generations[index]);
        self.free.push(index);
        true
    }

    pub fn members(&self, handle: Handle) -> Option<&[Handle]> {
        let index = self.resolve(handle)?;
        self.groups[index].as_deref()
    }

    /// Add `voice` unless already present. `is_live` decides which existing
    /// members to keep.
    pub fn insert(&mut self, handle: Handle, voice: Handle, is_live: impl Fn(Handle) -> bool) -> bool {
        let Some(index) = self.resolve(handle) else {
            return false;
        };
        let Some(members) = self.groups[index].as_mut() else {
            return false;
        };
        members.retain(|&member| is_live(member));
        if !members.contains(&voice) {
            members.push(voice);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroyed_group_stops_resolving() {
        let mut groups = GroupTable::new();
        let group = groups.create().unwrap();
        assert!(group.is_group());
        assert!(groups.members(group).is_some());

        assert!(groups.destroy(group));
        assert!(groups.members(group).is_none());
        assert!(!groups.destroy(group));

        let reused = groups.create().unwrap();
        assert_eq!(reused.index(), group.index());
        assert_ne!(reused, group);
    }

    #[test]
    fn insert_deduplicates_and_prunes() {
        let mut groups = GroupTable::new();
        let group = groups.create().unwrap();
        let a = Handle::voice(0, 0);
        let b = Handle::voice(1, 0);

        groups.insert(group, a, |_| true);
        groups.insert(group, a, |_| true);
        assert_eq!(groups.members(group).unwrap(), &[a]);

        groups.insert(group, b, |member| member != a);
        assert_eq!(groups.members(group).unwrap(), &[b]);
    }
}
