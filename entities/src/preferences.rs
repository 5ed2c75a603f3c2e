use crate::users::UserId;
use chrono::{NaiveTime, Timelike};

/// Per-user settings for the flash offer category.
///
/// A user without a stored record is treated as [`NotificationPreference::fail_open`]:
/// enabled, no quiet hours, no distance cap.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPreference {
    pub user_id: UserId,
    pub flash_offers_enabled: bool,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub timezone: String,
    pub max_distance_miles: Option<f64>,
}

impl NotificationPreference {
    pub const DEFAULT_TIMEZONE: &'static str = "UTC";

    pub fn fail_open(user_id: UserId) -> Self {
        Self {
            user_id,
            flash_offers_enabled: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
            timezone: Self::DEFAULT_TIMEZONE.to_string(),
            max_distance_miles: None,
        }
    }

    /// Quiet hours only apply when both ends of the window are configured.
    pub fn quiet_hours(&self) -> Option<QuietHours> {
        match (self.quiet_hours_start, self.quiet_hours_end) {
            (Some(start), Some(end)) => Some(QuietHours { start, end }),
            _ => None,
        }
    }
}

/// A local time-of-day window. `start > end` means the window wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn contains(&self, seconds_since_midnight: u32) -> bool {
        let start = self.start.num_seconds_from_midnight();
        let end = self.end.num_seconds_from_midnight();
        if start > end {
            seconds_since_midnight >= start || seconds_since_midnight < end
        } else {
            start <= seconds_since_midnight && seconds_since_midnight < end
        }
    }
}
