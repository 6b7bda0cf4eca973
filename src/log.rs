use crate::types::{DeliveryStatus, Message, Sender};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Ordered mirror of the server-side conversation for one visitor.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Marks the visitor message carrying `id` as delivered.
    pub fn mark_sent(&mut self, id: &str) {
        if let Some(message) = self
            .messages
            .iter_mut()
            .find(|m| m.id.as_deref() == Some(id))
        {
            message.status = Some(DeliveryStatus::Sent);
        }
    }

    /// Replaces the log with the server's list, keeping local visitor
    /// messages that are still undelivered and unknown to the server. A
    /// delivered message comes back in the authoritative list under the
    /// server's own identity, so its local copy yields rather than
    /// duplicate the echo. Where ids match, the server's copy wins, status
    /// included. Local messages without ids (synthesized notices) drop out.
    pub fn reconcile(&mut self, server: Vec<Message>) {
        let retained: Vec<Message> = {
            let known: HashSet<&str> = server.iter().filter_map(|m| m.id.as_deref()).collect();
            self.messages
                .drain(..)
                .filter(|m| {
                    m.sender == Sender::Visitor
                        && m.status == Some(DeliveryStatus::Active)
                        && m.id.as_deref().is_some_and(|id| !known.contains(id))
                })
                .collect()
        };
        self.messages = server;
        self.messages.extend(retained);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// True when an admin message is strictly newer than the last-seen
    /// marker; with no marker, any admin message counts.
    pub fn has_unread(&self, last_seen: Option<DateTime<Utc>>) -> bool {
        self.messages.iter().any(|m| {
            m.sender == Sender::Admin && last_seen.is_none_or(|seen| m.timestamp > seen)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn admin_at(text: &str, at: &str) -> Message {
        Message {
            sender: Sender::Admin,
            text: text.to_string(),
            timestamp: ts(at),
            status: None,
            id: None,
        }
    }

    fn server_visitor(text: &str, at: &str, id: Option<&str>, status: Option<DeliveryStatus>) -> Message {
        Message {
            sender: Sender::Visitor,
            text: text.to_string(),
            timestamp: ts(at),
            status,
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn reconcile_keeps_undelivered_local_message() {
        let mut log = ConversationLog::new();
        let local = Message::visitor("anyone there?", Utc::now());
        let local_id = local.id.clone().unwrap();
        log.push(local);

        log.reconcile(vec![admin_at("hello", "2026-08-20T10:00:00Z")]);

        assert_eq!(log.len(), 2);
        assert_eq!(log.messages()[0].sender, Sender::Admin);
        assert_eq!(log.messages()[1].id.as_deref(), Some(local_id.as_str()));
        assert_eq!(log.messages()[1].status, Some(DeliveryStatus::Active));
    }

    #[test]
    fn reconcile_drops_delivered_copy_in_favor_of_server_echo() {
        let mut log = ConversationLog::new();
        let local = Message::visitor("hi", Utc::now());
        let local_id = local.id.clone().unwrap();
        log.push(local);
        log.mark_sent(&local_id);

        // the echo carries the server's own identity, not the client id
        log.reconcile(vec![server_visitor("hi", "2026-08-20T10:00:00Z", None, None)]);

        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].id, None);
    }

    #[test]
    fn reconcile_takes_server_copy_on_matched_id() {
        let mut log = ConversationLog::new();
        let local = Message::visitor("hi", Utc::now());
        let local_id = local.id.clone().unwrap();
        log.push(local);

        log.reconcile(vec![server_visitor(
            "hi",
            "2026-08-20T10:00:00Z",
            Some(&local_id),
            Some(DeliveryStatus::Read),
        )]);

        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].status, Some(DeliveryStatus::Read));
    }

    #[test]
    fn reconcile_drops_synthesized_notices() {
        let mut log = ConversationLog::new();
        log.push(Message::admin_notice("welcome", Utc::now()));
        log.reconcile(vec![admin_at("real reply", "2026-08-20T10:00:00Z")]);

        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].text, "real reply");
    }

    #[test]
    fn reconcile_preserves_relative_order_of_retained_messages() {
        let mut log = ConversationLog::new();
        let first = Message::visitor("first", Utc::now());
        let second = Message::visitor("second", Utc::now());
        log.push(first);
        log.push(second);

        log.reconcile(Vec::new());

        assert_eq!(log.messages()[0].text, "first");
        assert_eq!(log.messages()[1].text, "second");
    }

    #[test]
    fn mark_sent_only_touches_the_matching_message() {
        let mut log = ConversationLog::new();
        let first = Message::visitor("first", Utc::now());
        let second = Message::visitor("second", Utc::now());
        let first_id = first.id.clone().unwrap();
        log.push(first);
        log.push(second);

        log.mark_sent(&first_id);

        assert_eq!(log.messages()[0].status, Some(DeliveryStatus::Sent));
        assert_eq!(log.messages()[1].status, Some(DeliveryStatus::Active));
    }

    #[test]
    fn unread_requires_admin_message_after_marker() {
        let mut log = ConversationLog::new();
        log.push(admin_at("hello", "2026-08-20T10:00:00Z"));

        assert!(log.has_unread(None));
        assert!(log.has_unread(Some(ts("2026-08-20T09:00:00Z"))));
        // equality is not "after"
        assert!(!log.has_unread(Some(ts("2026-08-20T10:00:00Z"))));
        assert!(!log.has_unread(Some(ts("2026-08-20T11:00:00Z"))));
    }

    #[test]
    fn visitor_messages_never_count_as_unread() {
        let mut log = ConversationLog::new();
        log.push(Message::visitor("hi", Utc::now()));
        assert!(!log.has_unread(None));
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = ConversationLog::new();
        log.push(Message::visitor("hi", Utc::now()));
        log.clear();
        assert!(log.is_empty());
    }
}
