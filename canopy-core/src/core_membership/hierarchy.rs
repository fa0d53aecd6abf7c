//! Read-only traversal of the group tree
//!
//! Implementors only answer three primitive queries against persisted state
//! (find a group, list its children, find a thread's guest group). Every
//! other traversal is derived here and evaluated lazily, one query per tree
//! level, so nothing is cached between calls.

use super::error::StoreError;
use super::group::{Group, ThreadRef};
use super::types::GroupId;
use std::collections::{HashSet, VecDeque};

pub trait GroupHierarchy {
    /// Look up a single group
    fn find_group(&self, id: &GroupId) -> Result<Option<Group>, StoreError>;

    /// Direct children of a group, guest groups included
    fn children_of(&self, id: &GroupId) -> Result<Vec<Group>, StoreError>;

    /// Guest group hosting `thread`, if one was created
    fn guest_group_for(&self, thread: &ThreadRef) -> Result<Option<Group>, StoreError>;

    /// Every group whose parent chain reaches `id`, breadth first
    ///
    /// Includes guest groups. Does not include `id` itself.
    fn descendants_of(&self, id: &GroupId) -> Descendants<'_, Self> {
        Descendants::new(self, *id)
    }

    /// Parent chain of `id`, nearest first. Empty for roots and unknown ids.
    fn ancestors_of(&self, id: &GroupId) -> Ancestors<'_, Self> {
        Ancestors::new(self, *id)
    }

    /// True iff `candidate` is in `descendants_of(of)`
    ///
    /// Walks up from the candidate, which touches one row per level instead
    /// of the whole subtree.
    fn is_descendant(&self, candidate: &GroupId, of: &GroupId) -> Result<bool, StoreError> {
        if candidate == of {
            return Ok(false);
        }
        for ancestor in self.ancestors_of(candidate) {
            if ancestor?.id == *of {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Guest groups hosted directly by `id`
    fn guest_groups_of(&self, id: &GroupId) -> Result<Vec<Group>, StoreError> {
        Ok(self
            .children_of(id)?
            .into_iter()
            .filter(Group::is_guest)
            .collect())
    }
}

/// Lazy breadth-first walk below a group
///
/// Yields an error at most once; the walk ends after it.
pub struct Descendants<'a, H: ?Sized> {
    hierarchy: &'a H,
    frontier: VecDeque<GroupId>,
    ready: VecDeque<Group>,
    seen: HashSet<GroupId>,
}

impl<'a, H: GroupHierarchy + ?Sized> Descendants<'a, H> {
    fn new(hierarchy: &'a H, root: GroupId) -> Self {
        Self {
            hierarchy,
            frontier: VecDeque::from([root]),
            ready: VecDeque::new(),
            seen: HashSet::from([root]),
        }
    }
}

impl<'a, H: GroupHierarchy + ?Sized> Iterator for Descendants<'a, H> {
    type Item = Result<Group, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(group) = self.ready.pop_front() {
                // guest groups are leaves
                if !group.is_guest() {
                    self.frontier.push_back(group.id);
                }
                return Some(Ok(group));
            }

            let next = self.frontier.pop_front()?;
            match self.hierarchy.children_of(&next) {
                Ok(children) => {
                    // the seen set stops corrupt cyclic data from looping forever
                    self.ready
                        .extend(children.into_iter().filter(|c| self.seen.insert(c.id)));
                }
                Err(e) => {
                    self.frontier.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Lazy walk up the parent chain
pub struct Ancestors<'a, H: ?Sized> {
    hierarchy: &'a H,
    origin: GroupId,
    next: Option<GroupId>,
    seen: HashSet<GroupId>,
}

impl<'a, H: GroupHierarchy + ?Sized> Ancestors<'a, H> {
    fn new(hierarchy: &'a H, origin: GroupId) -> Self {
        Self {
            hierarchy,
            origin,
            next: Some(origin),
            seen: HashSet::new(),
        }
    }
}

impl<'a, H: GroupHierarchy + ?Sized> Iterator for Ancestors<'a, H> {
    type Item = Result<Group, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.next.take()?;
            if !self.seen.insert(id) {
                return None;
            }

            let group = match self.hierarchy.find_group(&id) {
                Ok(Some(group)) => group,
                Ok(None) if id == self.origin => return None,
                Ok(None) => {
                    return Some(Err(StoreError::Corrupt(format!(
                        "dangling parent reference to group {}",
                        id
                    ))))
                }
                Err(e) => return Some(Err(e)),
            };

            self.next = group.parent_id;
            if id != self.origin {
                return Some(Ok(group));
            }
        }
    }
}
