//! Copy-on-write ACL list.
//!
//! Readers call [`AclSet::snapshot`] and get an `Arc` to an immutable list;
//! they never lock and never observe a half-applied change. Writers build a
//! new list from the current one and publish it with a single atomic swap.
//! Writers serialize among themselves on a small mutex so that two
//! concurrent read-modify-write updates cannot lose each other's change.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use keyline_types::Acl;
use parking_lot::Mutex;

/// A set-like, ordered list of ACL entries with lock-free snapshots.
///
/// Entries are unique up to [`Acl::is_equivalent`]: adding an entry for an
/// identity that is already present merges the rights into the existing
/// entry.
pub struct AclSet {
    current: ArcSwap<Vec<Acl>>,
    writer: Mutex<()>,
}

impl AclSet {
    /// Create a set from `entries`, merging equivalent entries.
    pub fn new(entries: Vec<Acl>) -> Self {
        Self {
            current: ArcSwap::from_pointee(merge_all(entries)),
            writer: Mutex::new(()),
        }
    }

    /// The current entries. The returned list is never modified.
    pub fn snapshot(&self) -> Arc<Vec<Acl>> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Returns `true` if an equivalent entry holds at least `acl`'s rights.
    pub fn contains(&self, acl: &Acl) -> bool {
        self.current
            .load()
            .iter()
            .any(|a| a.is_equivalent(acl) && a.rights.contains(acl.rights))
    }

    /// Add `acl`, merging its rights into an equivalent entry if present.
    ///
    /// Returns `false` if nothing changed (an equivalent entry already held
    /// every right in `acl`).
    pub fn add(&self, acl: Acl) -> bool {
        self.update(|entries| merge_one(entries, acl))
    }

    /// Remove `acl`'s rights from the equivalent entry, dropping the entry
    /// once no rights remain.
    ///
    /// Returns `false` if no equivalent entry held any of the rights.
    pub fn remove(&self, acl: &Acl) -> bool {
        self.update(|entries| {
            let Some(idx) = entries.iter().position(|a| a.is_equivalent(acl)) else {
                return false;
            };
            if entries[idx] == *acl {
                entries.remove(idx);
                return true;
            }
            let remaining = entries[idx].rights.difference(acl.rights);
            if remaining == entries[idx].rights {
                return false;
            }
            if remaining.is_empty() {
                entries.remove(idx);
            } else {
                entries[idx].rights = remaining;
            }
            true
        })
    }

    /// Replace every entry with `entries` (equivalent entries merged).
    ///
    /// Returns `true` if the resulting list differs from the previous one.
    pub fn replace_all(&self, entries: Vec<Acl>) -> bool {
        let next = merge_all(entries);
        self.update(move |current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    /// Run a read-modify-write under the writer lock and publish the result
    /// if `f` reports a change.
    fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Vec<Acl>) -> bool,
    {
        let _guard = self.writer.lock();
        let mut next: Vec<Acl> = (**self.current.load()).clone();
        let changed = f(&mut next);
        if changed {
            self.current.store(Arc::new(next));
        }
        changed
    }
}

fn merge_one(entries: &mut Vec<Acl>, acl: Acl) -> bool {
    match entries.iter_mut().find(|a| a.is_equivalent(&acl)) {
        Some(existing) => {
            if existing.rights.contains(acl.rights) {
                return false;
            }
            existing.rights = existing.rights.union(acl.rights);
            true
        }
        None => {
            entries.push(acl);
            true
        }
    }
}

fn merge_all(entries: Vec<Acl>) -> Vec<Acl> {
    let mut merged = Vec::with_capacity(entries.len());
    for acl in entries {
        merge_one(&mut merged, acl);
    }
    merged
}

impl Default for AclSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Clone for AclSet {
    fn clone(&self) -> Self {
        Self {
            current: ArcSwap::new(self.snapshot()),
            writer: Mutex::new(()),
        }
    }
}

impl PartialEq for AclSet {
    fn eq(&self, other: &Self) -> bool {
        *self.snapshot() == *other.snapshot()
    }
}

impl Eq for AclSet {}

impl fmt::Debug for AclSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyline_types::{AclIdentityType, AclRights, AclScope};
    use std::thread;

    fn alice(rights: AclRights) -> Acl {
        Acl::user("alice", rights)
    }

    #[test]
    fn add_new_entry() {
        let set = AclSet::default();
        assert!(set.add(alice(AclRights::READ)));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&alice(AclRights::READ)));
    }

    #[test]
    fn add_identical_entry_is_noop() {
        let set = AclSet::new(vec![alice(AclRights::READ)]);
        assert!(!set.add(alice(AclRights::READ)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn add_merges_rights_into_equivalent_entry() {
        let set = AclSet::new(vec![alice(AclRights::READ)]);
        assert!(set.add(alice(AclRights::WRITE)));
        let snap = set.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].rights, AclRights::READ | AclRights::WRITE);
        // A subset of existing rights changes nothing.
        assert!(!set.add(alice(AclRights::WRITE)));
    }

    #[test]
    fn different_scope_is_separate_entry() {
        let set = AclSet::new(vec![alice(AclRights::READ)]);
        let default_scope = Acl::new(
            AclIdentityType::User,
            "alice",
            AclRights::READ,
            AclScope::Default,
        );
        assert!(set.add(default_scope));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_partial_rights_keeps_entry() {
        let set = AclSet::new(vec![alice(AclRights::READ | AclRights::WRITE)]);
        assert!(set.remove(&alice(AclRights::WRITE)));
        assert_eq!(set.snapshot()[0].rights, AclRights::READ);
    }

    #[test]
    fn remove_all_rights_drops_entry() {
        let set = AclSet::new(vec![alice(AclRights::READ | AclRights::WRITE)]);
        assert!(set.remove(&alice(AclRights::READ | AclRights::WRITE)));
        assert!(set.is_empty());
    }

    #[test]
    fn remove_missing_returns_false() {
        let set = AclSet::new(vec![alice(AclRights::READ)]);
        assert!(!set.remove(&Acl::user("bob", AclRights::READ)));
        assert!(!set.remove(&alice(AclRights::DELETE)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn new_merges_duplicates() {
        let set = AclSet::new(vec![alice(AclRights::READ), alice(AclRights::LIST)]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.snapshot()[0].rights, AclRights::READ | AclRights::LIST);
    }

    #[test]
    fn replace_all_reports_change() {
        let set = AclSet::new(vec![alice(AclRights::READ)]);
        assert!(!set.replace_all(vec![alice(AclRights::READ)]));
        assert!(set.replace_all(vec![Acl::world(AclRights::LIST)]));
        assert_eq!(*set.snapshot(), vec![Acl::world(AclRights::LIST)]);
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let set = AclSet::new(vec![alice(AclRights::READ)]);
        let before = set.snapshot();
        set.add(Acl::user("bob", AclRights::ALL));
        set.remove(&alice(AclRights::READ));
        assert_eq!(*before, vec![alice(AclRights::READ)]);
        assert_eq!(*set.snapshot(), vec![Acl::user("bob", AclRights::ALL)]);
    }

    #[test]
    fn clone_is_independent() {
        let set = AclSet::new(vec![alice(AclRights::READ)]);
        let copy = set.clone();
        set.add(Acl::user("bob", AclRights::READ));
        assert_eq!(copy.len(), 1);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let set = Arc::new(AclSet::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    for j in 0..25 {
                        set.add(Acl::user(format!("user-{i}-{j}"), AclRights::READ));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), 200);
    }

    #[test]
    fn readers_see_whole_snapshots_during_writes() {
        let set = Arc::new(AclSet::default());
        let writer = {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                for j in 0..200 {
                    set.replace_all(vec![
                        Acl::user(format!("a{j}"), AclRights::READ),
                        Acl::user(format!("b{j}"), AclRights::READ),
                    ]);
                }
            })
        };
        for _ in 0..200 {
            let snap = set.snapshot();
            // Every published list has either zero or exactly two entries.
            assert!(snap.is_empty() || snap.len() == 2);
        }
        writer.join().unwrap();
    }
}
