//! Search-demand numbers: the synthetic per-slug trend used to rank
//! ingredients, and the helpers that turn fetched volume history into
//! ranks and yearly sparklines.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::f64::consts::PI;

use chrono::{Datelike, Months, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

pub const TREND_MONTHS: u32 = 12;
pub const SPARKLINE_YEARS: i32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub month: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetrics {
    pub total_monthly_searches: i64,
    pub average_monthly_searches: i64,
    pub rank: u32,
    pub trend: Vec<TrendPoint>,
}

/// One monthly data point from the volume-history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub date: String,
    #[serde(default, deserialize_with = "volume_or_zero")]
    pub volume: i64,
}

fn volume_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
        .unwrap_or(0))
}

/// `Mon YYYY` labels for the twelve months ending with `today`'s month,
/// oldest first.
pub fn month_labels(today: NaiveDate) -> Vec<String> {
    let first = today.with_day(1).unwrap_or(today);
    (0..TREND_MONTHS)
        .rev()
        .map(|back| {
            first
                .checked_sub_months(Months::new(back))
                .unwrap_or(first)
                .format("%b %Y")
                .to_string()
        })
        .collect()
}

/// Deterministic pseudo-random monthly demand for `slug`.
pub fn generate_search_trend(slug: &str, labels: &[String]) -> Vec<TrendPoint> {
    let mut rng = StdRng::seed_from_u64(seed_for(slug));
    labels
        .iter()
        .enumerate()
        .map(|(index, month)| {
            let base = 250.0 + rng.gen::<f64>() * 500.0;
            let amplitude = 40.0 + rng.gen::<f64>() * 30.0;
            let seasonal = (index as f64 / 12.0 * PI * 2.0).sin() * amplitude;
            let noise = rng.gen::<f64>() * 120.0;
            let value = ((base + seasonal + noise).round() as i64).max(30);
            TrendPoint {
                month: month.clone(),
                value,
            }
        })
        .collect()
}

fn seed_for(slug: &str) -> u64 {
    let digest = Sha256::digest(slug.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

pub fn total_searches(trend: &[TrendPoint]) -> i64 {
    trend.iter().map(|p| p.value).sum()
}

pub fn build_metrics(trend: Vec<TrendPoint>, rank: u32) -> SearchMetrics {
    let total = total_searches(&trend);
    let average = if trend.is_empty() {
        0
    } else {
        (total as f64 / trend.len() as f64).round() as i64
    };
    SearchMetrics {
        total_monthly_searches: total,
        average_monthly_searches: average,
        rank,
        trend,
    }
}

/// 1-based ranks by descending volume. Titles without a positive volume
/// get no rank; equal volumes keep input order.
pub fn assign_ranks(volumes: &[(String, Option<i64>)]) -> HashMap<String, u32> {
    let mut ranked: Vec<(&String, i64)> = volumes
        .iter()
        .filter_map(|(title, volume)| volume.filter(|v| *v > 0).map(|v| (title, v)))
        .collect();
    ranked.sort_by_key(|(_, v)| Reverse(*v));
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (title, _))| (title.clone(), i as u32 + 1))
        .collect()
}

fn point_date(point: &VolumePoint) -> Option<NaiveDate> {
    let day = point.date.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Points dated within the last ten calendar years (inclusive of the
/// current one), sorted by date. Unparseable dates are dropped.
pub fn filter_last_ten_years(points: &[VolumePoint], today: NaiveDate) -> Vec<VolumePoint> {
    let end_year = today.year();
    let start_year = end_year - (SPARKLINE_YEARS - 1);
    let mut kept: Vec<(NaiveDate, VolumePoint)> = points
        .iter()
        .filter_map(|p| point_date(p).map(|d| (d, p.clone())))
        .filter(|(d, _)| (start_year..=end_year).contains(&d.year()))
        .collect();
    kept.sort_by_key(|(d, _)| *d);
    kept.into_iter().map(|(_, p)| p).collect()
}

/// Average volume per calendar year over the last ten years, oldest
/// first; `None` for years without points. Empty input gives an empty
/// sparkline.
pub fn yearly_average(points: &[VolumePoint], today: NaiveDate) -> Vec<Option<i64>> {
    if points.is_empty() {
        return Vec::new();
    }
    let end_year = today.year();
    let start_year = end_year - (SPARKLINE_YEARS - 1);
    let mut sums: HashMap<i32, (i64, i64)> = HashMap::new();
    for point in points {
        if let Some(date) = point_date(point) {
            let entry = sums.entry(date.year()).or_insert((0, 0));
            entry.0 += point.volume;
            entry.1 += 1;
        }
    }
    (start_year..=end_year)
        .map(|year| {
            sums.get(&year)
                .map(|(sum, n)| (*sum as f64 / *n as f64).round() as i64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn vp(date: &str, volume: i64) -> VolumePoint {
        VolumePoint {
            date: date.to_string(),
            volume,
        }
    }

    #[test]
    fn labels_cover_twelve_months() {
        let labels = month_labels(day(2026, 3, 18));
        assert_eq!(labels.len(), 12);
        assert_eq!(labels.first().unwrap(), "Apr 2025");
        assert_eq!(labels.last().unwrap(), "Mar 2026");
    }

    #[test]
    fn trend_is_deterministic_per_slug() {
        let labels = month_labels(day(2026, 3, 18));
        let a = generate_search_trend("sugar", &labels);
        let b = generate_search_trend("sugar", &labels);
        let c = generate_search_trend("salt", &labels);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|p| p.value >= 30));
    }

    #[test]
    fn metrics_from_trend() {
        let trend = vec![
            TrendPoint { month: "a".into(), value: 100 },
            TrendPoint { month: "b".into(), value: 201 },
        ];
        let m = build_metrics(trend, 3);
        assert_eq!(m.total_monthly_searches, 301);
        assert_eq!(m.average_monthly_searches, 151);
        assert_eq!(m.rank, 3);
    }

    #[test]
    fn ranks_skip_missing_and_zero() {
        let volumes = vec![
            ("Citric acid".to_string(), Some(500)),
            ("Sugar".to_string(), Some(9000)),
            ("Obscure".to_string(), Some(0)),
            ("Unknown".to_string(), None),
            ("Salt".to_string(), Some(500)),
        ];
        let ranks = assign_ranks(&volumes);
        assert_eq!(ranks.get("Sugar"), Some(&1));
        assert_eq!(ranks.get("Citric acid"), Some(&2));
        assert_eq!(ranks.get("Salt"), Some(&3));
        assert!(!ranks.contains_key("Obscure"));
        assert!(!ranks.contains_key("Unknown"));
    }

    #[test]
    fn null_volume_reads_as_zero() {
        let points: Vec<VolumePoint> = serde_json::from_str(
            r#"[{"date": "2024-01-01", "volume": null}, {"date": "2024-02-01"}, {"date": "2024-03-01", "volume": 12}]"#,
        )
        .unwrap();
        let volumes: Vec<i64> = points.iter().map(|p| p.volume).collect();
        assert_eq!(volumes, vec![0, 0, 12]);
    }

    #[test]
    fn last_ten_years_window() {
        let points = vec![
            vp("2026-02-01", 30),
            vp("2016-12-01", 10),
            vp("2017-01-01", 20),
            vp("not a date", 99),
            vp("2017-06-01T00:00:00Z", 40),
        ];
        let kept = filter_last_ten_years(&points, day(2026, 10, 18));
        let dates: Vec<&str> = kept.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["2017-01-01", "2017-06-01T00:00:00Z", "2026-02-01"]);
    }

    #[test]
    fn sparkline_buckets_by_year() {
        let today = day(2026, 10, 18);
        let points = vec![vp("2017-01-01", 20), vp("2017-06-01", 41), vp("2026-02-01", 30)];
        let spark = yearly_average(&points, today);
        assert_eq!(spark.len(), 10);
        assert_eq!(spark[0], Some(31));
        assert!(spark[1..9].iter().all(Option::is_none));
        assert_eq!(spark[9], Some(30));

        assert!(yearly_average(&[], today).is_empty());
    }
}
