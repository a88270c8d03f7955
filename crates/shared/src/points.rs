//! Reward point types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Most recent events kept in the history
pub const HISTORY_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointEventType {
    Login,
    Chat,
    Feedback,
    Signup,
    Daily,
    Other,
}

impl PointEventType {
    /// Whether an event of this type starts out acknowledged.
    ///
    /// Chat awards fire on every sent message and never reach the unread
    /// badge; every other award is unread until the user opens the bell.
    pub fn created_read(&self) -> bool {
        matches!(self, PointEventType::Chat)
    }
}

/// Point awards with fixed amounts
#[derive(Debug, Clone, Copy)]
pub struct PointRule {
    pub kind: PointEventType,
    pub points: u32,
    pub message: &'static str,
}

pub const LOGIN_RULE: PointRule = PointRule {
    kind: PointEventType::Login,
    points: 5,
    message: "You earned 5 points for logging in!",
};

pub const CHAT_RULE: PointRule = PointRule {
    kind: PointEventType::Chat,
    points: 1,
    message: "You earned 1 point for sending a message!",
};

pub const FEEDBACK_RULE: PointRule = PointRule {
    kind: PointEventType::Feedback,
    points: 2,
    message: "You earned 2 points for providing feedback!",
};

pub const SIGNUP_RULE: PointRule = PointRule {
    kind: PointEventType::Signup,
    points: 50,
    message: "You earned 50 points for signing up!",
};

pub const DAILY_RULE: PointRule = PointRule {
    kind: PointEventType::Daily,
    points: 3,
    message: "You earned 3 points as a daily login bonus!",
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PointEventType,
    pub points: u32,
    pub message: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub read: bool,
}

impl PointEvent {
    pub fn new(kind: PointEventType, points: u32, message: impl Into<String>, timestamp: i64) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("point-{}-{}", timestamp, &suffix[..8]),
            kind,
            points,
            message: message.into(),
            timestamp,
            read: kind.created_read(),
        }
    }
}

/// Running balance plus capped, newest-first history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsState {
    pub total_points: u64,
    pub history: Vec<PointEvent>,
}

impl PointsState {
    /// Credit the event and put it at the front; the oldest entries beyond
    /// the cap are dropped without touching the balance.
    pub fn record(&mut self, event: PointEvent) {
        self.total_points += u64::from(event.points);
        self.history.insert(0, event);
        self.history.truncate(HISTORY_CAP);
    }

    pub fn unread_count(&self) -> usize {
        self.history.iter().filter(|e| !e.read).count()
    }
}

/// One queued "+N points" toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub id: String,
    pub points: u32,
    pub timestamp: i64,
}

impl From<&PointEvent> for NotificationEntry {
    fn from(event: &PointEvent) -> Self {
        Self {
            id: event.id.clone(),
            points: event.points,
            timestamp: event.timestamp,
        }
    }
}

/// Screen offset of the floating points widget, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorPosition {
    pub x: f64,
    pub y: f64,
}

impl IndicatorPosition {
    /// Keep a `widget`-sized box fully inside `viewport` (both width, height)
    pub fn clamped(self, viewport: (f64, f64), widget: (f64, f64)) -> Self {
        let max_x = (viewport.0 - widget.0).max(0.0);
        let max_y = (viewport.1 - widget.1).max(0.0);
        Self {
            x: self.x.clamp(0.0, max_x),
            y: self.y.clamp(0.0, max_y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(points: u32) -> PointEvent {
        PointEvent::new(PointEventType::Other, points, "test", 1_000)
    }

    #[test]
    fn test_record_caps_history_but_not_balance() {
        let mut state = PointsState::default();
        for i in 1..=25 {
            state.record(event(i));
        }
        assert_eq!(state.history.len(), HISTORY_CAP);
        assert_eq!(state.total_points, (1..=25).sum::<u64>());
        assert_eq!(state.history[0].points, 25);
        assert_eq!(state.history[HISTORY_CAP - 1].points, 6);
    }

    #[test]
    fn test_read_policy() {
        assert!(PointEvent::new(PointEventType::Chat, 1, "", 0).read);
        assert!(!PointEvent::new(PointEventType::Daily, 3, "", 0).read);
    }

    #[test]
    fn test_event_ids_are_unique_within_a_millisecond() {
        let a = PointEvent::new(PointEventType::Chat, 1, "", 42);
        let b = PointEvent::new(PointEventType::Chat, 1, "", 42);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("point-42-"));
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(PointEvent::new(PointEventType::Signup, 50, "hi", 7)).unwrap();
        assert_eq!(json["type"], "signup");
        assert_eq!(json["read"], false);
    }

    #[test]
    fn test_indicator_clamp() {
        let pos = IndicatorPosition { x: 1900.0, y: -20.0 };
        let clamped = pos.clamped((1280.0, 720.0), (100.0, 40.0));
        assert_eq!(clamped, IndicatorPosition { x: 1180.0, y: 0.0 });

        // Widget larger than the viewport pins to the origin
        let tiny = pos.clamped((50.0, 50.0), (100.0, 100.0));
        assert_eq!(tiny, IndicatorPosition { x: 0.0, y: 0.0 });
    }
}
