//! Read-only views over a materialized observation collection.
//!
//! Everything here is a pure function of its inputs: favorites, the
//! date/favorite filter, free-text search and the statistics shown on the
//! statistics screen. Nothing writes back to storage.

use crate::types::{ImagePayload, Observation};
use chrono::{Datelike, Local, NaiveDate, TimeZone};
use std::collections::HashMap;

/// Number of species shown by the statistics view.
pub const TOP_SPECIES_LIMIT: usize = 3;

/// Short English month names, January first.
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Date and favorite filter for the observation list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    /// Day to match.
    pub date: NaiveDate,
    /// `None` ignores the flag; `Some(v)` keeps observations with `is_favorite == v`.
    pub is_favorite: Option<bool>,
    /// Inactive filter: show everything.
    pub is_cleared: bool,
}

impl Filter {
    /// Match observations made on `date`.
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date,
            is_favorite: None,
            is_cleared: false,
        }
    }

    /// An inactive filter.
    pub fn cleared() -> Self {
        Self {
            is_cleared: true,
            ..Self::default()
        }
    }

    /// Also require the favorite flag to equal `favorite`.
    pub fn with_favorite(mut self, favorite: bool) -> Self {
        self.is_favorite = Some(favorite);
        self
    }
}

impl Default for Filter {
    /// Today, any favorite state.
    fn default() -> Self {
        Self::on(Local::now().date_naive())
    }
}

/// Observations marked as favorite, in input order.
pub fn favorites(observations: &[Observation]) -> Vec<Observation> {
    observations
        .iter()
        .filter(|o| o.is_favorite)
        .cloned()
        .collect()
}

/// Observations whose species, behavior or habits contain `query`.
///
/// Matching is a case-sensitive substring test. An empty query returns the
/// input unchanged.
pub fn search(observations: &[Observation], query: &str) -> Vec<Observation> {
    if query.is_empty() {
        return observations.to_vec();
    }

    observations
        .iter()
        .filter(|o| {
            o.species.contains(query) || o.behavior.contains(query) || o.habits.contains(query)
        })
        .cloned()
        .collect()
}

/// Apply a [`Filter`], comparing calendar days in `tz`.
pub fn apply_filter<Tz: TimeZone>(
    observations: &[Observation],
    filter: &Filter,
    tz: &Tz,
) -> Vec<Observation> {
    if filter.is_cleared {
        return observations.to_vec();
    }

    observations
        .iter()
        .filter(|o| o.date.with_timezone(tz).date_naive() == filter.date)
        .filter(|o| filter.is_favorite.map_or(true, |fav| o.is_favorite == fav))
        .cloned()
        .collect()
}

/// Per-species tally for the statistics view.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeciesCount {
    pub species: String,
    pub count: usize,
    /// First image of the first observation of this species, if any.
    pub image: Option<ImagePayload>,
}

/// The `limit` most observed species, most frequent first.
///
/// Species are grouped in encounter order and the sort is stable, so ties
/// keep the order in which their species first appeared.
pub fn top_species(observations: &[Observation], limit: usize) -> Vec<SpeciesCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<SpeciesCount> = Vec::new();

    for observation in observations {
        match index.get(observation.species.as_str()) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(observation.species.as_str(), counts.len());
                counts.push(SpeciesCount {
                    species: observation.species.clone(),
                    count: 1,
                    image: observation.images.first().cloned(),
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

/// Count of observations in one calendar month.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthBucket {
    /// 1 = January.
    pub month: u32,
    pub label: &'static str,
    pub count: usize,
}

/// Observations per calendar month, regardless of year.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthlyHistogram {
    buckets: Vec<MonthBucket>,
}

impl MonthlyHistogram {
    /// Exactly twelve buckets, January first.
    pub fn buckets(&self) -> &[MonthBucket] {
        &self.buckets
    }

    /// Count for `month` (1-12). Out-of-range months count zero.
    pub fn count(&self, month: u32) -> usize {
        self.buckets
            .iter()
            .find(|b| b.month == month)
            .map_or(0, |b| b.count)
    }

    /// Largest bucket count.
    pub fn max_count(&self) -> usize {
        self.buckets.iter().map(|b| b.count).max().unwrap_or(0)
    }

    /// Upper bound for a chart axis. Never zero.
    pub fn scale_max(&self) -> usize {
        self.max_count().max(1)
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.count).sum()
    }
}

/// Bucket observations by month, reading dates in `tz`.
pub fn monthly_histogram<Tz: TimeZone>(observations: &[Observation], tz: &Tz) -> MonthlyHistogram {
    let mut counts = [0usize; 12];
    for observation in observations {
        let month = observation.date.with_timezone(tz).month();
        counts[(month - 1) as usize] += 1;
    }

    let buckets = MONTH_LABELS
        .iter()
        .zip(counts)
        .enumerate()
        .map(|(i, (&label, count))| MonthBucket {
            month: i as u32 + 1,
            label,
            count,
        })
        .collect();

    MonthlyHistogram { buckets }
}

/// Total number of observations.
pub fn total_observations(observations: &[Observation]) -> usize {
    observations.len()
}
