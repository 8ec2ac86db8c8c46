//! Leaderboard points.
//!
//! A journalist's points for a day are a weighted sum of front-page,
//! exclusive and standard articles. Overall points add up the stored
//! `daily_points` across every day in `daily_scores`.

use crate::leaderboard::{points_value, DailyScores};
use crate::output::JournalistStat;
use serde::{Deserialize, Serialize};

/// Points per article kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointsWeights {
    pub front_page: f64,
    pub exclusive: f64,
    pub standard: f64,
}

impl Default for PointsWeights {
    fn default() -> Self {
        Self {
            front_page: 3.0,
            exclusive: 2.0,
            standard: 1.0,
        }
    }
}

/// One journalist's article counts for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMetrics {
    #[serde(default)]
    pub front_page: u64,
    #[serde(default)]
    pub exclusive: u64,
    #[serde(default)]
    pub standard: u64,
}

impl From<&JournalistStat> for DailyMetrics {
    /// Extraction does not detect front-page placement, so that count is 0.
    fn from(stat: &JournalistStat) -> Self {
        Self {
            front_page: 0,
            exclusive: stat.exclusive,
            standard: stat.standard,
        }
    }
}

pub fn daily_points(metrics: &DailyMetrics, weights: &PointsWeights) -> f64 {
    metrics.front_page as f64 * weights.front_page
        + metrics.exclusive as f64 * weights.exclusive
        + metrics.standard as f64 * weights.standard
}

/// Sum of `daily_points` for `journalist_id` over all days.
///
/// Only the first entry with a matching id counts on any given day.
pub fn overall_points(scores: &DailyScores, journalist_id: &str) -> f64 {
    scores
        .values()
        .filter_map(|day| day.journalist_info.iter().find(|j| j.id == journalist_id))
        .map(|j| points_value(&j.daily_points))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn weighted_sum() {
        let m = DailyMetrics {
            front_page: 1,
            exclusive: 2,
            standard: 3,
        };
        assert_eq!(daily_points(&m, &PointsWeights::default()), 3.0 + 4.0 + 3.0);

        let flat = PointsWeights {
            front_page: 1.0,
            exclusive: 1.0,
            standard: 1.0,
        };
        assert_eq!(daily_points(&m, &flat), 6.0);
    }

    #[test]
    fn metrics_from_tally_entry() {
        let stat = JournalistStat {
            exclusive: 1,
            standard: 2,
            pages: vec![1, 4],
        };
        let m = DailyMetrics::from(&stat);
        assert_eq!(m, DailyMetrics { front_page: 0, exclusive: 1, standard: 2 });
    }

    #[test]
    fn overall_sums_every_day() {
        let scores: DailyScores = serde_json::from_value(json!({
            "2024-11-06": {"journalist_info": [
                {"id": "A1B2C", "name": "Alice", "daily_points": 4},
                {"id": "ZZZZZ", "name": "Bob", "daily_points": 9}
            ]},
            "2024-11-07": {"journalist_info": [
                {"id": "A1B2C", "name": "Alice", "daily_points": "2.5"}
            ]},
            "2024-11-08": {}
        }))
        .unwrap();
        assert_eq!(overall_points(&scores, "A1B2C"), 6.5);
        assert_eq!(overall_points(&scores, "nobody"), 0.0);
    }
}
