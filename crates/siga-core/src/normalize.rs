//! Total conversion helpers for scraped timestamps and engagement counters.
//!
//! Scraped values are noisy: timestamps arrive as ISO strings, bare dates, or
//! relative phrases ("3d ago", "2 jam yang lalu"); counters arrive as
//! locale-suffixed strings ("12.3K", "2RB"). Both normalizers are total so a
//! bad value can never fail a cycle — timestamps fall back to the current
//! instant, counters fall back to zero.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^\s*(\d+)\s*
          (detik|second|sec|menit|minute|min|jam|hour|hari|day|minggu|week|bulan|month|mo|tahun|year|s|m|h|d|w|y)
          s?\s*(?:yang\s+lalu|lalu|ago)\s*$",
    )
    .unwrap()
});

static GROUPED_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+$").unwrap());

/// Normalize a scraped timestamp to UTC. Missing or unparseable input yields
/// the current instant, so any two records stay comparable.
pub fn normalize_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    normalize_timestamp_at(raw, Utc::now())
}

/// Deterministic variant of [`normalize_timestamp`] with an explicit "now".
pub fn normalize_timestamp_at(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return now;
    };
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("n/a") {
        return now;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Utc.from_utc_datetime(&naive);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
    }

    if let Some(caps) = RELATIVE_RE.captures(s) {
        let amount: i64 = caps[1].parse().unwrap_or(0);
        let delta = match caps[2].to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "detik" => Duration::seconds(amount),
            "m" | "min" | "minute" | "menit" => Duration::minutes(amount),
            "h" | "hour" | "jam" => Duration::hours(amount),
            "d" | "day" | "hari" => Duration::days(amount),
            "w" | "week" | "minggu" => Duration::weeks(amount),
            // calendar-less approximations, matching the capture side
            "mo" | "month" | "bulan" => Duration::days(amount * 30),
            "y" | "year" | "tahun" => Duration::days(amount * 365),
            _ => return now,
        };
        return now - delta;
    }

    now
}

/// Normalize a magnitude-suffixed counter string to a non-negative integer.
/// `K`/`RB` scale by 1 000, `M`/`JT` by 1 000 000, `B` by 1 000 000 000.
/// Anything unparseable yields zero.
pub fn normalize_metric(raw: &str) -> u64 {
    let s: String = raw
        .trim()
        .to_ascii_uppercase()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if s.is_empty() || s == "N/A" || s == "-" {
        return 0;
    }

    // Multi-letter suffixes first: "2RB" must not be read as "2R" + B.
    const SUFFIXES: [(&str, u64); 5] = [
        ("RB", 1_000),
        ("JT", 1_000_000),
        ("K", 1_000),
        ("M", 1_000_000),
        ("B", 1_000_000_000),
    ];
    for (suffix, factor) in SUFFIXES {
        if let Some(body) = s.strip_suffix(suffix) {
            return match body.parse::<f64>() {
                Ok(v) if v.is_finite() && v > 0.0 => (v * factor as f64).round() as u64,
                _ => 0,
            };
        }
    }

    // Indonesian-style grouping separators: 1.234.567
    if GROUPED_DIGITS_RE.is_match(&s) {
        return s.replace('.', "").parse().unwrap_or(0);
    }

    if let Ok(v) = s.parse::<u64>() {
        return v;
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v as u64,
        _ => 0,
    }
}
