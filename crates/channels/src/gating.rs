use std::collections::BTreeSet;

use relaydesk_common::{OperatorId, PeerId};

/// The configured set of operator identities.
///
/// The owner is always an operator; additional operators come from config.
#[derive(Debug, Clone, Default)]
pub struct OperatorSet {
    owner: Option<OperatorId>,
    members: BTreeSet<OperatorId>,
}

impl OperatorSet {
    pub fn new(owner: Option<OperatorId>, members: impl IntoIterator<Item = OperatorId>) -> Self {
        let mut members: BTreeSet<OperatorId> = members.into_iter().collect();
        if let Some(owner) = owner {
            members.remove(&owner);
        }
        Self { owner, members }
    }

    pub fn is_operator(&self, peer: PeerId) -> bool {
        self.authorize(peer).is_some()
    }

    /// Returns the operator identity for `peer` when it is authorized.
    pub fn authorize(&self, peer: PeerId) -> Option<OperatorId> {
        let id = peer.as_operator();
        (self.owner == Some(id) || self.members.contains(&id)).then_some(id)
    }

    /// Owner first, then the remaining operators in id order.
    pub fn iter(&self) -> impl Iterator<Item = OperatorId> + '_ {
        self.owner.into_iter().chain(self.members.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.members.len() + usize::from(self.owner.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_authorizes_nobody() {
        let set = OperatorSet::default();
        assert!(set.is_empty());
        assert!(!set.is_operator(PeerId(1)));
    }

    #[test]
    fn owner_and_members_are_operators() {
        let set = OperatorSet::new(Some(OperatorId(1)), [OperatorId(2), OperatorId(3)]);
        assert_eq!(set.authorize(PeerId(1)), Some(OperatorId(1)));
        assert_eq!(set.authorize(PeerId(3)), Some(OperatorId(3)));
        assert_eq!(set.authorize(PeerId(4)), None);
    }

    #[test]
    fn owner_listed_twice_is_counted_once() {
        let set = OperatorSet::new(Some(OperatorId(1)), [OperatorId(1), OperatorId(2)]);
        assert_eq!(set.len(), 2);
        let ids: Vec<OperatorId> = set.iter().collect();
        assert_eq!(ids, vec![OperatorId(1), OperatorId(2)]);
    }
}
