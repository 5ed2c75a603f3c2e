use crate::flash_offers::targeting::Candidate;
use chrono::{DateTime, Utc};
use entities::preferences::NotificationPreference;
use shared_kernel::zoned_time::seconds_since_local_midnight;
use std::collections::HashMap;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Exclusion {
    CategoryDisabled,
    QuietHours,
    BeyondMaxDistance,
}

/// Applies each recipient's own notification settings. No I/O.
pub struct PreferenceFilter;

impl PreferenceFilter {
    pub fn filter(candidates: Vec<Candidate>, now: DateTime<Utc>) -> Vec<Candidate> {
        let mut excluded: HashMap<Exclusion, usize> = HashMap::new();
        let kept = candidates
            .into_iter()
            .filter(|candidate| match Self::exclusion(candidate, now) {
                Some(reason) => {
                    *excluded.entry(reason).or_default() += 1;
                    false
                }
                None => true,
            })
            .collect::<Vec<_>>();

        if !excluded.is_empty() {
            tracing::info!(
                kept = kept.len(),
                category_disabled = excluded.get(&Exclusion::CategoryDisabled).copied().unwrap_or_default(),
                quiet_hours = excluded.get(&Exclusion::QuietHours).copied().unwrap_or_default(),
                beyond_max_distance = excluded.get(&Exclusion::BeyondMaxDistance).copied().unwrap_or_default(),
                "Candidates excluded by their preferences"
            );
        }
        kept
    }

    /// First rule the candidate fails, in evaluation order. A missing record passes.
    pub fn exclusion(candidate: &Candidate, now: DateTime<Utc>) -> Option<Exclusion> {
        let preference = candidate.preferences.as_ref()?;

        if !preference.flash_offers_enabled {
            return Some(Exclusion::CategoryDisabled);
        }
        if in_quiet_hours(preference, now) {
            return Some(Exclusion::QuietHours);
        }
        match preference.max_distance_miles {
            Some(max_distance) if candidate.distance_miles > max_distance => {
                Some(Exclusion::BeyondMaxDistance)
            }
            _ => None,
        }
    }
}

fn in_quiet_hours(preference: &NotificationPreference, now: DateTime<Utc>) -> bool {
    let Some(window) = preference.quiet_hours() else {
        return false;
    };
    match seconds_since_local_midnight(&preference.timezone, now) {
        Ok(seconds) => window.contains(seconds),
        Err(err) => {
            tracing::warn!(
                user_id = %preference.user_id,
                "Ignoring quiet hours: {err}"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use entities::devices::{Platform, PushToken};
    use entities::users::UserId;
    use rstest::rstest;

    fn candidate(preferences: Option<NotificationPreference>, distance_miles: f64) -> Candidate {
        let user_id = preferences
            .as_ref()
            .map(|p| p.user_id)
            .unwrap_or_default();
        Candidate {
            user_id,
            device_token: PushToken::new(format!("token-{user_id}")),
            platform: Platform::Ios,
            preferences,
            distance_miles,
        }
    }

    fn preference() -> NotificationPreference {
        NotificationPreference::fail_open(UserId::new())
    }

    fn overnight(timezone: &str) -> NotificationPreference {
        NotificationPreference {
            quiet_hours_start: NaiveTime::from_hms_opt(22, 0, 0),
            quiet_hours_end: NaiveTime::from_hms_opt(8, 0, 0),
            timezone: timezone.to_string(),
            ..preference()
        }
    }

    fn utc(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    #[test]
    fn missing_preferences_fail_open() {
        assert_eq!(PreferenceFilter::exclusion(&candidate(None, 9999.0), utc(3)), None);
    }

    #[test]
    fn disabled_category_is_always_excluded() {
        let disabled = NotificationPreference {
            flash_offers_enabled: false,
            ..preference()
        };
        assert_eq!(
            PreferenceFilter::exclusion(&candidate(Some(disabled), 0.0), utc(12)),
            Some(Exclusion::CategoryDisabled)
        );
    }

    #[rstest]
    #[case(22, true)]
    #[case(23, true)]
    #[case(0, true)]
    #[case(7, true)]
    #[case(8, false)]
    #[case(15, false)]
    #[case(21, false)]
    fn quiet_hours_are_evaluated_in_utc(#[case] hour: u32, #[case] excluded: bool) {
        let candidate = candidate(Some(overnight("UTC")), 0.0);
        assert_eq!(
            PreferenceFilter::exclusion(&candidate, utc(hour)) == Some(Exclusion::QuietHours),
            excluded
        );
    }

    #[rstest]
    // 03:00 UTC is 22:00 in New York during winter
    #[case(3, true)]
    // 13:00 UTC is 08:00 in New York
    #[case(13, false)]
    // 12:00 UTC is 07:00 in New York
    #[case(12, true)]
    // 02:00 UTC is 21:00 in New York
    #[case(2, false)]
    fn quiet_hours_follow_the_users_timezone(#[case] utc_hour: u32, #[case] excluded: bool) {
        let candidate = candidate(Some(overnight("America/New_York")), 0.0);
        assert_eq!(
            PreferenceFilter::exclusion(&candidate, utc(utc_hour)) == Some(Exclusion::QuietHours),
            excluded
        );
    }

    #[test]
    fn unknown_timezone_fails_open() {
        let candidate = candidate(Some(overnight("Mars/Olympus_Mons")), 0.0);
        assert_eq!(PreferenceFilter::exclusion(&candidate, utc(23)), None);
    }

    #[rstest]
    #[case(4.9, false)]
    #[case(5.0, false)]
    #[case(5.1, true)]
    fn distance_cap_excludes_farther_candidates(#[case] distance: f64, #[case] excluded: bool) {
        let capped = NotificationPreference {
            max_distance_miles: Some(5.0),
            ..preference()
        };
        assert_eq!(
            PreferenceFilter::exclusion(&candidate(Some(capped), distance), utc(12)).is_some(),
            excluded
        );
    }

    #[test]
    fn filter_keeps_only_eligible_candidates() {
        let disabled = NotificationPreference {
            flash_offers_enabled: false,
            ..preference()
        };
        let enabled = preference();
        let kept_user = enabled.user_id;
        let candidates = vec![
            candidate(Some(disabled), 0.0),
            candidate(Some(enabled), 0.0),
            candidate(Some(overnight("UTC")), 0.0),
        ];

        let kept = PreferenceFilter::filter(candidates, utc(23));

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].user_id, kept_user);
    }
}
