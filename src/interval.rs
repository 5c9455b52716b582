//! Temporal interval utilities
//!
//! Pure helpers for the two pieces of time reasoning the scheduler needs:
//! testing whether a candidate `[start, end)` interval overlaps any already
//! registered interval, and picking the TLE file whose filename timestamp is
//! closest to a scene's start time.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

/// A half-open `[start, end)` time interval.
pub type Interval = (DateTime<Utc>, DateTime<Utc>);

/// Return the first interval in `existing` that overlaps `candidate`.
///
/// Overlap holds when either endpoint of one interval falls strictly inside
/// the other, or when one interval fully contains the other. The list is
/// scanned in the supplied order and the first hit wins — there is no
/// best-match ranking.
pub fn overlapping(candidate: Interval, existing: &[Interval]) -> Option<Interval> {
    let (start, end) = candidate;
    for &(tstart, tend) in existing {
        if (tstart <= start && tend > start) || (tstart < end && tend >= end) {
            return Some((tstart, tend));
        }
        if tstart >= start && tend <= end {
            return Some((tstart, tend));
        }
    }
    None
}

/// Fraction of the shorter of the two intervals covered by their overlap.
///
/// Returns 0.0 for disjoint intervals and for degenerate (zero-length)
/// inputs. Used by the scheduler to decide whether two notifications with
/// slightly different timestamps denote the same overpass (~0.85 threshold).
pub fn overlap_fraction(a: Interval, b: Interval) -> f64 {
    let shorter = (a.1 - a.0).min(b.1 - b.0);
    if shorter <= Duration::zero() {
        return 0.0;
    }
    let inside = a.1.min(b.1) - a.0.max(b.0);
    if inside <= Duration::zero() {
        return 0.0;
    }
    inside.num_milliseconds() as f64 / shorter.num_milliseconds() as f64
}

/// How many date/time components a filename pattern captures.
#[derive(Debug, Clone, Copy)]
enum StampKind {
    /// `YYYYMMDD` + `HHMMSS`
    Seconds,
    /// `YYYYMMDD` + `HHMM`
    Minutes,
    /// `YYYYMMDD` + `HH`
    Hours,
    /// `YYYYMMDD`
    Day,
    /// `YYMMDD` (2-digit year)
    DayShortYear,
}

/// Filename timestamp patterns, most specific first.
///
/// TLE providers name their files inconsistently; these cover full seconds
/// down to a bare 2-digit-year date, with optional `_`, `-` or `T`
/// separators between date and time.
static STAMP_PATTERNS: LazyLock<Vec<(Regex, StampKind)>> = LazyLock::new(|| {
    [
        (
            r"^.*(\d{4})(\d{2})(\d{2})_?-?T?(\d{2})(\d{2})(\d{2}).*$",
            StampKind::Seconds,
        ),
        (
            r"^.*(\d{4})(\d{2})(\d{2})_?-?T?(\d{2})(\d{2}).*$",
            StampKind::Minutes,
        ),
        (
            r"^.*(\d{4})(\d{2})(\d{2})_?-?T?(\d{2}).*$",
            StampKind::Hours,
        ),
        (r"^.*(\d{4})(\d{2})(\d{2}).*$", StampKind::Day),
        (r"^.*(\d{2})(\d{2})(\d{2}).*$", StampKind::DayShortYear),
    ]
    .into_iter()
    .map(|(pat, kind)| (Regex::new(pat).expect("static pattern compiles"), kind))
    .collect()
});

/// Extract a timestamp from a TLE-style filename.
///
/// Patterns are tried from most to least specific; the first pattern that
/// matches is authoritative for the file — later patterns are not attempted,
/// even when the matched groups do not form a valid calendar date.
pub fn extract_timestamp(filename: &str) -> Option<DateTime<Utc>> {
    for (regex, kind) in STAMP_PATTERNS.iter() {
        let Some(caps) = regex.captures(filename) else {
            continue;
        };
        let mut digits = String::new();
        for group in caps.iter().skip(1).flatten() {
            digits.push_str(group.as_str());
        }
        return parse_stamp(&digits, *kind).map(|naive| naive.and_utc());
    }
    None
}

fn parse_stamp(digits: &str, kind: StampKind) -> Option<NaiveDateTime> {
    let fmt = match kind {
        StampKind::Seconds => "%Y%m%d%H%M%S",
        StampKind::Minutes => "%Y%m%d%H%M",
        StampKind::Hours => "%Y%m%d%H",
        StampKind::Day | StampKind::DayShortYear => {
            // Date-only stamps have no time component to parse.
            let fmt = if matches!(kind, StampKind::Day) {
                "%Y%m%d"
            } else {
                "%y%m%d"
            };
            return NaiveDate::parse_from_str(digits, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0));
        }
    };
    NaiveDateTime::parse_from_str(digits, fmt).ok()
}

/// A timestamped candidate file.
#[derive(Debug, Clone)]
pub struct TimedFile {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

/// Pick the candidate temporally closest to `target`, within `tolerance`.
///
/// Exact-distance ties are broken by lexical filename order so the result
/// does not depend on directory-listing order.
pub fn closest_match(
    target: DateTime<Utc>,
    candidates: &[TimedFile],
    tolerance: Duration,
) -> Option<PathBuf> {
    let mut best: Option<(&TimedFile, Duration)> = None;
    for candidate in candidates {
        let distance = (target - candidate.timestamp).abs();
        if distance > tolerance {
            continue;
        }
        best = match best {
            None => Some((candidate, distance)),
            Some((cur, cur_dist)) => {
                if distance < cur_dist
                    || (distance == cur_dist && file_name(&candidate.path) < file_name(&cur.path))
                {
                    Some((candidate, distance))
                } else {
                    Some((cur, cur_dist))
                }
            }
        };
    }
    best.map(|(c, _)| c.path.clone())
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Build timestamped candidates from a list of paths.
///
/// Files whose names carry no recognizable timestamp are dropped.
pub fn timed_files(paths: &[PathBuf]) -> Vec<TimedFile> {
    paths
        .iter()
        .filter_map(|path| {
            let name = file_name(path);
            extract_timestamp(name).map(|timestamp| TimedFile {
                path: path.clone(),
                timestamp,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_overlap_partial() {
        let existing = vec![(utc(2021, 1, 19, 14, 0, 0), utc(2021, 1, 19, 14, 15, 0))];
        let candidate = (utc(2021, 1, 19, 14, 10, 0), utc(2021, 1, 19, 14, 25, 0));
        assert_eq!(overlapping(candidate, &existing), Some(existing[0]));
    }

    #[test]
    fn test_overlap_containment_both_directions() {
        let outer = (utc(2021, 1, 19, 14, 0, 0), utc(2021, 1, 19, 15, 0, 0));
        let inner = (utc(2021, 1, 19, 14, 10, 0), utc(2021, 1, 19, 14, 20, 0));
        // Containment is overlap regardless of which side holds the registry.
        assert!(overlapping(inner, &[outer]).is_some());
        assert!(overlapping(outer, &[inner]).is_some());
    }

    #[test]
    fn test_overlap_disjoint() {
        let existing = vec![(utc(2021, 1, 19, 12, 0, 0), utc(2021, 1, 19, 12, 15, 0))];
        let candidate = (utc(2021, 1, 19, 14, 0, 0), utc(2021, 1, 19, 14, 15, 0));
        assert!(overlapping(candidate, &existing).is_none());
    }

    #[test]
    fn test_overlap_first_match_wins() {
        let a = (utc(2021, 1, 19, 14, 0, 0), utc(2021, 1, 19, 14, 30, 0));
        let b = (utc(2021, 1, 19, 14, 5, 0), utc(2021, 1, 19, 14, 35, 0));
        let candidate = (utc(2021, 1, 19, 14, 10, 0), utc(2021, 1, 19, 14, 20, 0));
        assert_eq!(overlapping(candidate, &[a, b]), Some(a));
    }

    #[test]
    fn test_overlap_fraction() {
        let a = (utc(2021, 1, 19, 14, 0, 0), utc(2021, 1, 19, 14, 10, 0));
        let b = (utc(2021, 1, 19, 14, 1, 0), utc(2021, 1, 19, 14, 11, 0));
        let frac = overlap_fraction(a, b);
        assert!((frac - 0.9).abs() < 1e-9);

        let disjoint = (utc(2021, 1, 19, 16, 0, 0), utc(2021, 1, 19, 16, 10, 0));
        assert_eq!(overlap_fraction(a, disjoint), 0.0);
    }

    #[test]
    fn test_extract_timestamp_full_seconds() {
        let ts = extract_timestamp("tle_20210119T140826.txt").unwrap();
        assert_eq!(ts, utc(2021, 1, 19, 14, 8, 26));
    }

    #[test]
    fn test_extract_timestamp_minutes() {
        let ts = extract_timestamp("weather202101190616.tle").unwrap();
        assert_eq!(ts, utc(2021, 1, 19, 6, 16, 0));
    }

    #[test]
    fn test_extract_timestamp_day_only() {
        let ts = extract_timestamp("tle-20210119.txt").unwrap();
        assert_eq!(ts, utc(2021, 1, 19, 0, 0, 0));
    }

    #[test]
    fn test_extract_timestamp_short_year() {
        let ts = extract_timestamp("tle210119.txt").unwrap();
        assert_eq!(ts, utc(2021, 1, 19, 0, 0, 0));
    }

    #[test]
    fn test_extract_timestamp_none() {
        assert!(extract_timestamp("satid.txt").is_none());
    }

    #[test]
    fn test_closest_match_within_tolerance() {
        let target = utc(2021, 1, 19, 12, 0, 0);
        let candidates = vec![
            TimedFile {
                path: PathBuf::from("tle_a.txt"),
                timestamp: target - Duration::days(10),
            },
            TimedFile {
                path: PathBuf::from("tle_b.txt"),
                timestamp: target - Duration::days(2),
            },
            TimedFile {
                path: PathBuf::from("tle_c.txt"),
                timestamp: target + Duration::days(1),
            },
        ];
        assert_eq!(
            closest_match(target, &candidates, Duration::days(3)),
            Some(PathBuf::from("tle_c.txt"))
        );
        // With all candidates further away than the tolerance: no match.
        assert_eq!(
            closest_match(target, &candidates, Duration::hours(12)),
            None
        );
    }

    #[test]
    fn test_closest_match_early_side_candidates() {
        // T-10d, T-2d, T+1d with tolerance 3d picks T+1d; shrink the
        // candidate set to the two on the early side and T-2d wins.
        let target = utc(2021, 1, 19, 12, 0, 0);
        let early = vec![
            TimedFile {
                path: PathBuf::from("tle_old.txt"),
                timestamp: target - Duration::days(10),
            },
            TimedFile {
                path: PathBuf::from("tle_recent.txt"),
                timestamp: target - Duration::days(2),
            },
        ];
        assert_eq!(
            closest_match(target, &early, Duration::days(3)),
            Some(PathBuf::from("tle_recent.txt"))
        );
        assert_eq!(closest_match(target, &early, Duration::days(1)), None);
    }

    #[test]
    fn test_closest_match_tie_breaks_lexically() {
        let target = utc(2021, 1, 19, 12, 0, 0);
        let candidates = vec![
            TimedFile {
                path: PathBuf::from("tle_z.txt"),
                timestamp: target + Duration::days(1),
            },
            TimedFile {
                path: PathBuf::from("tle_a.txt"),
                timestamp: target - Duration::days(1),
            },
        ];
        assert_eq!(
            closest_match(target, &candidates, Duration::days(3)),
            Some(PathBuf::from("tle_a.txt"))
        );
    }

    #[test]
    fn test_timed_files_drops_unstamped() {
        let paths = vec![
            PathBuf::from("weather202101180325.tle"),
            PathBuf::from("satid.txt"),
        ];
        let timed = timed_files(&paths);
        assert_eq!(timed.len(), 1);
        assert_eq!(timed[0].path, PathBuf::from("weather202101180325.tle"));
    }
}
