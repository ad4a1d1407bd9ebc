use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version written into every persisted session blob.
///
/// Blobs carrying a different (or missing) version are treated as corrupt
/// and discarded rather than migrated.
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// Sessions untouched for longer than this are treated as absent.
pub const SESSION_EXPIRY_DAYS: i64 = 7;

/// Stage of the plaque builder the customer is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    TeamName,
    Plaque,
    Roster,
    Cards,
    Review,
    Done,
}

/// The plaque product the customer picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedPlaque {
    pub id: String,
    pub name: String,
    pub material: String,
    pub style: String,
    pub price_cents: i64,
}

/// One position on the roster, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSlot {
    pub id: String,
    pub position: String,
    pub player_name: String,
}

/// The trading card chosen for a roster slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSelection {
    pub card_id: String,
    pub player_name: String,
    pub year: Option<u16>,
    pub brand: Option<String>,
    pub price_cents: i64,
    pub image_url: Option<String>,
}

/// An in-progress plaque configuration, persisted client-side between visits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSession {
    pub version: u32,
    pub session_id: String,
    pub team_name: Option<String>,
    pub sport: Option<String>,
    pub current_step: BuildStep,
    pub selected_plaque: Option<SelectedPlaque>,
    pub roster_slots: Vec<RosterSlot>,
    /// Keyed by roster slot id.
    pub card_selections: BTreeMap<String, CardSelection>,
    pub last_updated: DateTime<Utc>,
}

/// Partial update merged into a [`BuildSession`] by `SessionStore::save`.
///
/// `None` fields leave the existing value untouched; roster and card fields
/// replace wholesale (the builder UI always submits the full list).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub team_name: Option<String>,
    pub sport: Option<String>,
    pub current_step: Option<BuildStep>,
    pub selected_plaque: Option<SelectedPlaque>,
    pub roster_slots: Option<Vec<RosterSlot>>,
    pub card_selections: Option<BTreeMap<String, CardSelection>>,
}

impl BuildSession {
    pub fn new(session_id: String, now: DateTime<Utc>) -> Self {
        Self {
            version: SESSION_SCHEMA_VERSION,
            session_id,
            team_name: None,
            sport: None,
            current_step: BuildStep::TeamName,
            selected_plaque: None,
            roster_slots: Vec::new(),
            card_selections: BTreeMap::new(),
            last_updated: now,
        }
    }

    /// Merge a patch into this session and stamp `last_updated`.
    ///
    /// The stamp strictly increases even if the supplied clock has not
    /// advanced since the previous mutation.
    pub fn apply(&mut self, patch: SessionPatch, now: DateTime<Utc>) {
        if let Some(team_name) = patch.team_name {
            self.team_name = Some(team_name);
        }
        if let Some(sport) = patch.sport {
            self.sport = Some(sport);
        }
        if let Some(step) = patch.current_step {
            self.current_step = step;
        }
        if let Some(plaque) = patch.selected_plaque {
            self.selected_plaque = Some(plaque);
        }
        if let Some(slots) = patch.roster_slots {
            self.roster_slots = slots;
        }
        if let Some(cards) = patch.card_selections {
            self.card_selections = cards;
        }
        self.last_updated = if now > self.last_updated {
            now
        } else {
            self.last_updated + Duration::milliseconds(1)
        };
    }

    /// Whether this session has outlived the 7-day window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > Duration::days(SESSION_EXPIRY_DAYS)
    }

    /// A session on the terminal step is complete and not worth resuming.
    pub fn is_resumable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.current_step != BuildStep::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn apply_merges_only_provided_fields() {
        let mut session = BuildSession::new("s1".into(), t0());
        session.apply(
            SessionPatch {
                team_name: Some("Wolves".into()),
                ..Default::default()
            },
            t0() + Duration::seconds(1),
        );
        session.apply(
            SessionPatch {
                current_step: Some(BuildStep::Cards),
                ..Default::default()
            },
            t0() + Duration::seconds(2),
        );

        assert_eq!(session.team_name.as_deref(), Some("Wolves"));
        assert_eq!(session.current_step, BuildStep::Cards);
        assert!(session.sport.is_none());
    }

    #[test]
    fn last_updated_strictly_increases_with_stalled_clock() {
        let mut session = BuildSession::new("s1".into(), t0());
        let before = session.last_updated;
        session.apply(SessionPatch::default(), t0());
        assert!(session.last_updated > before);
    }

    #[test]
    fn expiry_boundary_is_seven_days() {
        let session = BuildSession::new("s1".into(), t0());
        assert!(!session.is_expired(t0() + Duration::days(7)));
        assert!(session.is_expired(t0() + Duration::days(7) + Duration::seconds(1)));
    }

    #[test]
    fn done_sessions_are_not_resumable() {
        let mut session = BuildSession::new("s1".into(), t0());
        session.apply(
            SessionPatch {
                current_step: Some(BuildStep::Done),
                ..Default::default()
            },
            t0() + Duration::seconds(1),
        );
        assert!(!session.is_resumable(t0() + Duration::seconds(2)));
    }
}
