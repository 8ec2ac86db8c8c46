//! Rolling leaderboard over `daily_scores`.
//!
//! `daily_scores` is filled by the spreadsheet side: one node per date,
//! each listing the journalists scored that day.
//!
//! ```text
//! daily_scores/
//!   2024-11-07/
//!     journalist_info: [ { id, name, publication, daily_points }, ... ]
//! ```

use crate::error::TallyError;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Database path the scores live under.
pub const DAILY_SCORES_PATH: &str = "daily_scores";

/// Date string (`YYYY-MM-DD`) → that day's scores.
pub type DailyScores = BTreeMap<String, DayScores>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayScores {
    #[serde(default)]
    pub journalist_info: Vec<JournalistDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalistDay {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub publication: String,
    /// Written by a sheet formula, so it may arrive as a number or a string.
    #[serde(default)]
    pub daily_points: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub publication: String,
    pub points: f64,
}

/// Numeric value of a stored points field; anything unparsable is 0.
pub fn points_value(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Decode the `daily_scores` node. A missing node is an empty map.
pub fn parse_daily_scores(value: Option<Value>) -> Result<DailyScores, TallyError> {
    match value {
        None | Some(Value::Null) => Ok(DailyScores::new()),
        Some(v) => serde_json::from_value(v).map_err(|e| TallyError::DatabaseRead {
            path: DAILY_SCORES_PATH.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// `today - days`, clamped to the earliest representable date.
fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Top `limit` journalists by points over `[today - days, today]`.
///
/// Points are summed per journalist id. Ties are broken by name.
pub fn top_journalists(
    scores: &DailyScores,
    today: NaiveDate,
    days: u32,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    let start = window_start(today, days);
    let mut totals: HashMap<&str, LeaderboardEntry> = HashMap::new();

    for (date, day) in scores {
        let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
            debug!("Ignoring daily_scores entry with unparsable date '{}'", date);
            continue;
        };
        if date < start || date > today {
            continue;
        }
        for j in &day.journalist_info {
            let entry = totals.entry(j.id.as_str()).or_insert_with(|| LeaderboardEntry {
                id: j.id.clone(),
                name: j.name.clone(),
                publication: j.publication.clone(),
                points: 0.0,
            });
            entry.points += points_value(&j.daily_points);
        }
    }

    let mut ranked: Vec<LeaderboardEntry> = totals.into_values().collect();
    ranked.sort_by(|a, b| {
        b.points
            .total_cmp(&a.points)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(limit);
    ranked
}

/// `"{start} - {today}"` for the window [`top_journalists`] covers.
pub fn date_range_label(today: NaiveDate, days: u32) -> String {
    let start = window_start(today, days);
    format!("{} - {}", start.format("%Y-%m-%d"), today.format("%Y-%m-%d"))
}
