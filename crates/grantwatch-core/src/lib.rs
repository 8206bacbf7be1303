//! Core domain model and record classification for Grantwatch.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "grantwatch-core";

/// Keyword list used to decide whether a feed record is nonprofit-relevant.
/// Matched case-insensitively against concatenated title/synopsis/eligibility.
pub const NONPROFIT_KEYWORDS: &[&str] = &[
    "nonprofit",
    "non-profit",
    "501(c)(3)",
    "501c3",
    "charitable",
    "charity",
    "community organization",
    "faith-based",
    "ngo",
    "tax-exempt",
];

/// One opportunity as parsed out of the upstream bulk feed, before any
/// classification. Every field the feed may omit is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FeedRecord {
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub post_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    pub synopsis: Option<String>,
    pub eligibility: Option<String>,
}

/// Field set written to the store on upsert. The external id is the
/// natural key; everything else is replaced wholesale on each sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantDraft {
    pub external_id: String,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub post_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    pub synopsis: Option<String>,
    pub eligibility: Option<String>,
}

/// Persisted grant row. At most one row exists per external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: Uuid,
    pub external_id: String,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub post_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    pub synopsis: Option<String>,
    pub eligibility: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of classifying a single feed record against the sync policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// No usable external id; never touches the store.
    MissingId,
    /// Close date strictly before tomorrow; any stored row is deleted.
    Expired { external_id: String },
    /// No nonprofit keyword matched; skipped.
    NotRelevant { external_id: String },
    /// Upsert all mapped fields.
    Keep(GrantDraft),
}

/// A record is expired when its close date falls strictly before tomorrow,
/// i.e. it closes today or earlier. Records without a close date never expire.
pub fn is_expired(close_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    match (close_date, today.checked_add_days(Days::new(1))) {
        (Some(close), Some(tomorrow)) => close < tomorrow,
        _ => false,
    }
}

/// Case-insensitive keyword match across the record's title, synopsis,
/// and eligibility text.
pub fn is_nonprofit_relevant(record: &FeedRecord) -> bool {
    let haystack = format!(
        "{} {} {}",
        record.title.as_deref().unwrap_or_default(),
        record.synopsis.as_deref().unwrap_or_default(),
        record.eligibility.as_deref().unwrap_or_default(),
    )
    .to_lowercase();
    NONPROFIT_KEYWORDS
        .iter()
        .any(|keyword| haystack.contains(keyword))
}

/// Classify one feed record. Checks run in order: identifier presence,
/// expiry, relevance. Expired records are reported even when they would
/// also fail the relevance check, so stale rows still get deleted.
pub fn classify(record: &FeedRecord, today: NaiveDate) -> Disposition {
    let external_id = match record.external_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Disposition::MissingId,
    };

    if is_expired(record.close_date, today) {
        return Disposition::Expired { external_id };
    }

    if !is_nonprofit_relevant(record) {
        return Disposition::NotRelevant { external_id };
    }

    Disposition::Keep(GrantDraft {
        external_id,
        title: record.title.clone(),
        agency: record.agency.clone(),
        post_date: record.post_date,
        close_date: record.close_date,
        synopsis: record.synopsis.clone(),
        eligibility: record.eligibility.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relevant_record(external_id: Option<&str>) -> FeedRecord {
        FeedRecord {
            external_id: external_id.map(ToString::to_string),
            title: Some("Community Development Block Grant".to_string()),
            agency: Some("HUD".to_string()),
            post_date: NaiveDate::from_ymd_opt(2026, 1, 15),
            close_date: NaiveDate::from_ymd_opt(2026, 12, 31),
            synopsis: Some("Funding for local nonprofit housing programs".to_string()),
            eligibility: Some("Open to 501(c)(3) organizations".to_string()),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    #[test]
    fn missing_id_is_rejected() {
        assert_eq!(classify(&relevant_record(None), today()), Disposition::MissingId);
        assert_eq!(
            classify(&relevant_record(Some("   ")), today()),
            Disposition::MissingId
        );
    }

    #[test]
    fn close_date_before_tomorrow_is_expired() {
        let mut record = relevant_record(Some("GW-1"));
        record.close_date = NaiveDate::from_ymd_opt(2026, 5, 31);
        assert!(matches!(
            classify(&record, today()),
            Disposition::Expired { .. }
        ));

        // Closing today still counts as expired.
        record.close_date = Some(today());
        assert!(matches!(
            classify(&record, today()),
            Disposition::Expired { .. }
        ));

        // Closing tomorrow does not.
        record.close_date = NaiveDate::from_ymd_opt(2026, 6, 2);
        assert!(matches!(classify(&record, today()), Disposition::Keep(_)));
    }

    #[test]
    fn expired_wins_over_relevance() {
        let record = FeedRecord {
            external_id: Some("GW-2".to_string()),
            title: Some("Defense procurement".to_string()),
            close_date: NaiveDate::from_ymd_opt(2020, 1, 1),
            ..FeedRecord::default()
        };
        assert_eq!(
            classify(&record, today()),
            Disposition::Expired {
                external_id: "GW-2".to_string()
            }
        );
    }

    #[test]
    fn no_keyword_match_is_rejected() {
        let record = FeedRecord {
            external_id: Some("GW-3".to_string()),
            title: Some("Advanced materials research".to_string()),
            synopsis: Some("University laboratory equipment".to_string()),
            eligibility: Some("State governments only".to_string()),
            close_date: NaiveDate::from_ymd_opt(2027, 1, 1),
            ..FeedRecord::default()
        };
        assert_eq!(
            classify(&record, today()),
            Disposition::NotRelevant {
                external_id: "GW-3".to_string()
            }
        );
    }

    #[test]
    fn keyword_match_is_case_insensitive_across_fields() {
        let record = FeedRecord {
            external_id: Some("GW-4".to_string()),
            title: Some("Rural broadband expansion".to_string()),
            synopsis: None,
            eligibility: Some("Eligible applicants include NON-PROFIT entities".to_string()),
            close_date: NaiveDate::from_ymd_opt(2027, 1, 1),
            ..FeedRecord::default()
        };
        match classify(&record, today()) {
            Disposition::Keep(draft) => {
                assert_eq!(draft.external_id, "GW-4");
                assert_eq!(draft.title.as_deref(), Some("Rural broadband expansion"));
            }
            other => panic!("expected Keep, got {other:?}"),
        }
    }

    #[test]
    fn kept_draft_carries_all_mapped_fields() {
        let record = relevant_record(Some("GW-5"));
        match classify(&record, today()) {
            Disposition::Keep(draft) => {
                assert_eq!(draft.agency.as_deref(), Some("HUD"));
                assert_eq!(draft.post_date, record.post_date);
                assert_eq!(draft.close_date, record.close_date);
                assert_eq!(draft.synopsis, record.synopsis);
                assert_eq!(draft.eligibility, record.eligibility);
            }
            other => panic!("expected Keep, got {other:?}"),
        }
    }

    #[test]
    fn records_without_close_date_never_expire() {
        assert!(!is_expired(None, today()));
    }
}
