//! Transient user notices (input errors, send failures, server errors).

use std::time::Duration;

use crate::events::{ChatEvent, Effect};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub text: String,
}

/// Visible notices, each dismissed by its own expiry timer.
#[derive(Debug)]
pub struct NoticeBoard {
    active: Vec<Notice>,
    next_id: u64,
    ttl: Duration,
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            active: Vec::new(),
            next_id: 0,
            ttl,
        }
    }

    pub fn active(&self) -> &[Notice] {
        &self.active
    }

    /// Show a notice and schedule its dismissal.
    pub fn push(&mut self, text: impl Into<String>) -> Vec<Effect> {
        self.next_id += 1;
        let notice = Notice {
            id: self.next_id,
            text: text.into(),
        };
        crate::log_warn!("Notice: {}", notice.text);
        self.active.push(notice.clone());
        vec![
            Effect::Emit(ChatEvent::NoticeShown(notice)),
            Effect::ScheduleNoticeExpiry {
                id: self.next_id,
                delay: self.ttl,
            },
        ]
    }

    /// Dismiss a notice whose timer fired. Unknown ids are ignored.
    pub fn expire(&mut self, id: u64) -> Vec<Effect> {
        let before = self.active.len();
        self.active.retain(|n| n.id != id);
        if self.active.len() == before {
            return Vec::new();
        }
        vec![Effect::Emit(ChatEvent::NoticeDismissed(id))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_shows_and_schedules_expiry() {
        let mut board = NoticeBoard::new(Duration::from_secs(5));
        let effects = board.push("Type a message first");
        assert_eq!(board.active().len(), 1);
        assert!(matches!(
            &effects[..],
            [
                Effect::Emit(ChatEvent::NoticeShown(Notice { id: 1, .. })),
                Effect::ScheduleNoticeExpiry { id: 1, delay }
            ] if *delay == Duration::from_secs(5)
        ));
    }

    #[test]
    fn expire_removes_only_that_notice() {
        let mut board = NoticeBoard::new(Duration::from_secs(5));
        board.push("one");
        board.push("two");
        assert_eq!(
            board.expire(1),
            vec![Effect::Emit(ChatEvent::NoticeDismissed(1))]
        );
        assert_eq!(board.active().len(), 1);
        assert_eq!(board.active()[0].text, "two");
        assert!(board.expire(1).is_empty());
    }
}
