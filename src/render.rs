use crate::types::{DeliveryStatus, Message, Sender};
use chrono::{DateTime, Utc};

pub fn conversation_lines(messages: &[Message], now: DateTime<Utc>) -> Vec<String> {
    messages.iter().map(|m| message_line(m, now)).collect()
}

fn message_line(message: &Message, now: DateTime<Utc>) -> String {
    let time = time_label(message.timestamp, now);
    match message.sender {
        Sender::Visitor => {
            // a visitor message that arrives without a status shows as delivered
            let status = message.status.unwrap_or(DeliveryStatus::Sent);
            format!("[{time}] you: {} [{}]", message.text, status.label())
        }
        Sender::Admin => format!("[{time}] support: {}", message.text),
    }
}

pub fn badge_line(title: &str, unread: bool) -> String {
    if unread {
        format!("[{title}: 1 unread]")
    } else {
        format!("[{title}]")
    }
}

/// Same calendar day as `now` renders time-only; anything else gets the
/// month and day in front.
pub fn time_label(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if timestamp.date_naive() == now.date_naive() {
        timestamp.format("%-I:%M %p").to_string()
    } else {
        timestamp.format("%b %-d, %-I:%M %p").to_string()
    }
}
