use parley_types::{User, UserId};

/// Users present in the active room, in the order they became present.
/// Driven strictly by arrival order: the last join/leave for an id wins.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: Vec<User>,
}

impl PresenceTracker {
    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.users.iter().any(|u| &u.id == user_id)
    }

    /// Replace the whole set with a `users in room` snapshot.
    pub fn replace(&mut self, snapshot: Vec<User>) {
        self.users.clear();
        for user in snapshot {
            self.joined(user);
        }
    }

    /// Returns `false` when the user was already present.
    pub fn joined(&mut self, user: User) -> bool {
        if self.contains(&user.id) {
            return false;
        }
        self.users.push(user);
        true
    }

    /// Returns `false` when the user was not present; duplicate leaves are
    /// expected and ignored.
    pub fn left(&mut self, user_id: &UserId) -> bool {
        let before = self.users.len();
        self.users.retain(|u| &u.id != user_id);
        self.users.len() != before
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(tracker: &PresenceTracker) -> Vec<&str> {
        tracker.users().iter().map(|u| u.id.as_str()).collect()
    }

    #[test]
    fn applies_increments_after_snapshot_in_arrival_order() {
        let mut presence = PresenceTracker::default();
        presence.replace(vec![User::new("a", "alice"), User::new("b", "bob")]);

        presence.joined(User::new("c", "carol"));
        presence.left(&UserId::from("a"));
        presence.joined(User::new("a", "alice"));
        presence.left(&UserId::from("b"));

        assert_eq!(ids(&presence), vec!["c", "a"]);
    }

    #[test]
    fn duplicate_leave_is_a_no_op() {
        let mut presence = PresenceTracker::default();
        presence.replace(vec![User::new("a", "alice")]);

        assert!(presence.left(&UserId::from("a")));
        assert!(!presence.left(&UserId::from("a")));
        assert!(presence.users().is_empty());
    }

    #[test]
    fn snapshot_replaces_instead_of_merging() {
        let mut presence = PresenceTracker::default();
        presence.joined(User::new("stale", "ghost"));

        presence.replace(vec![User::new("a", "alice"), User::new("a", "alice")]);

        assert_eq!(ids(&presence), vec!["a"]);
        assert!(!presence.contains(&UserId::from("stale")));
    }

    #[test]
    fn join_of_present_user_does_not_duplicate() {
        let mut presence = PresenceTracker::default();
        assert!(presence.joined(User::new("a", "alice")));
        assert!(!presence.joined(User::new("a", "alice")));
        assert_eq!(presence.users().len(), 1);
    }
}
