/// Per-socket state for one announced login session.
pub struct Session {
    pub user_id: i64,
    pub login_epoch: i64,
    /// Server-assigned transport identifier, distinct from the client's
    /// login epoch.
    pub transport_id: String,
    /// Chat groups this socket asked to join.
    pub chat_ids: Vec<i64>,
}

impl Session {
    pub fn new(user_id: i64, login_epoch: i64) -> Self {
        Self {
            user_id,
            login_epoch,
            transport_id: uuid::Uuid::new_v4().to_string(),
            chat_ids: Vec::new(),
        }
    }

    pub fn should_receive_event(
        &self,
        chat_id: Option<i64>,
        target_user_ids: Option<&[i64]>,
    ) -> bool {
        // If the event targets specific users, only deliver to them.
        if let Some(targets) = target_user_ids {
            return targets.contains(&self.user_id);
        }
        match chat_id {
            None => true,
            Some(cid) => self.chat_ids.contains(&cid),
        }
    }

    pub fn join_chat(&mut self, chat_id: i64) {
        if !self.chat_ids.contains(&chat_id) {
            self.chat_ids.push(chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Session;

    #[test]
    fn targeted_events_ignore_chat_membership() {
        let session = Session::new(7, 100);
        assert!(session.should_receive_event(Some(99), Some(&[7])));
        assert!(!session.should_receive_event(None, Some(&[8, 9])));
    }

    #[test]
    fn chat_scoped_events_require_join() {
        let mut session = Session::new(7, 100);
        assert!(!session.should_receive_event(Some(4), None));
        session.join_chat(4);
        assert!(session.should_receive_event(Some(4), None));
        // Joining twice keeps a single entry.
        session.join_chat(4);
        assert_eq!(session.chat_ids, vec![4]);
    }

    #[test]
    fn unscoped_events_reach_everyone() {
        let session = Session::new(7, 100);
        assert!(session.should_receive_event(None, None));
    }
}
