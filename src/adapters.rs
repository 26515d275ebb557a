//! Input adapters — turn loosely-structured text, CSV, or JSON into a
//! `Vec<Fix>`.
//!
//! Every adapter here follows the same policy: a malformed record is
//! logged at `warn` and skipped, never propagated as an error. The only
//! error this module can return is a hard I/O or CSV-framing failure from
//! [`parse_from_csv`] — a record that merely fails to parse as a fix is not
//! one of those.

use std::io::Read;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::Result;
use crate::types::{ExtendedFix, Fix};

const LAT_ALIASES: [&str; 4] = ["lat", "latitude", "latitude1", "y"];
const LNG_ALIASES: [&str; 4] = ["lng", "lon", "longitude", "longitude1", "x"];
const TIME_ALIASES: [&str; 5] = ["timestamp", "time", "currenttime", "date", "datetime"];
const SPD_ALIASES: [&str; 2] = ["spd", "speed"];
const ALT_ALIASES: [&str; 2] = ["alt", "altitude"];
const COG_ALIASES: [&str; 2] = ["cog", "course"];
const ARRAY_KEYS: [&str; 6] = ["points", "data", "locations", "coordinates", "trajectory", "path"];
const CIVIL_DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Numeric timestamps in `[SECONDS_LOWER, SECONDS_UPPER)` are treated as
/// Unix seconds (roughly year 2000 onward); outside that band they're
/// assumed to already be milliseconds.
const SECONDS_LOWER: i64 = 946_684_800;
const SECONDS_UPPER: i64 = 946_684_800_000;

/// One fix per line; tokens separated by any of `, \t ;`. Blank lines and
/// lines starting with `#` or `//` are skipped. The first two numeric
/// tokens are lat/lng; an optional third is the timestamp.
pub fn parse_from_str(text: &str) -> Vec<Fix> {
    let mut out = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let tokens: Vec<&str> = line
            .split(|c: char| c == ',' || c == '\t' || c == ';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() < 2 {
            log::warn!("line {}: expected at least lat,lng — skipping {:?}", line_no + 1, line);
            continue;
        }
        let (Ok(lat), Ok(lng)) = (tokens[0].parse::<f64>(), tokens[1].parse::<f64>()) else {
            log::warn!("line {}: lat/lng did not parse as numbers — skipping {:?}", line_no + 1, line);
            continue;
        };
        let t = tokens
            .get(2)
            .and_then(|tok| parse_timestamp(tok))
            .unwrap_or_else(|| synthesize_timestamp(line_no));
        match Fix::validated(lat, lng, t) {
            Ok(fix) => out.push(fix),
            Err(e) => log::warn!("line {}: {e}", line_no + 1),
        }
    }
    out
}

/// CSV with an optional `lat,lng,timestamp[,spd,alt,cog]` header. When no
/// header is present (the first cell parses as a number), columns are
/// assumed to appear in that same order. Reduces each row to a plain
/// [`Fix`] immediately (see [`parse_extended_from_csv`] for the optional
/// `spd, alt, cog` columns).
pub fn parse_from_csv<R: Read>(reader: R) -> Result<Vec<Fix>> {
    Ok(parse_extended_from_csv(reader)?.into_iter().map(ExtendedFix::to_fix).collect())
}

fn find_column(header: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|h| aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
}

fn extract_extended_fix_from_record(
    record: &csv::StringRecord,
    lat_idx: usize,
    lng_idx: usize,
    t_idx: Option<usize>,
    spd_idx: Option<usize>,
    alt_idx: Option<usize>,
    cog_idx: Option<usize>,
    idx: usize,
) -> Option<ExtendedFix> {
    let lat: f64 = record.get(lat_idx)?.trim().parse().ok()?;
    let lng: f64 = record.get(lng_idx)?.trim().parse().ok()?;
    let t = t_idx
        .and_then(|i| record.get(i))
        .and_then(parse_timestamp)
        .unwrap_or_else(|| synthesize_timestamp(idx));
    Fix::validated(lat, lng, t).ok()?;
    let field = |i: Option<usize>| i.and_then(|i| record.get(i)).and_then(|v| v.trim().parse::<f64>().ok());
    Some(ExtendedFix {
        lat,
        lng,
        t,
        speed: field(spd_idx),
        altitude: field(alt_idx),
        course: field(cog_idx),
    })
}

/// As [`parse_from_csv`], but returns the full [`ExtendedFix`] records
/// (`spd, alt, cog`) instead of reducing them to a plain [`Fix`] — for a
/// caller that wants the optional fields the detector itself never uses.
pub fn parse_extended_from_csv<R: Read>(reader: R) -> Result<Vec<ExtendedFix>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = rdr.records();

    let mut header: Option<csv::StringRecord> = None;
    let mut pending_first: Option<csv::StringRecord> = None;
    if let Some(first) = records.next() {
        let first = first?;
        let looks_numeric = first.get(0).and_then(|v| v.trim().parse::<f64>().ok()).is_some();
        if looks_numeric {
            pending_first = Some(first);
        } else {
            header = Some(first);
        }
    }

    let lat_idx = header.as_ref().and_then(|h| find_column(h, &LAT_ALIASES)).unwrap_or(0);
    let lng_idx = header.as_ref().and_then(|h| find_column(h, &LNG_ALIASES)).unwrap_or(1);
    let t_idx = header.as_ref().and_then(|h| find_column(h, &TIME_ALIASES)).or(Some(2));
    let spd_idx = header.as_ref().and_then(|h| find_column(h, &SPD_ALIASES)).or(Some(3));
    let alt_idx = header.as_ref().and_then(|h| find_column(h, &ALT_ALIASES)).or(Some(4));
    let cog_idx = header.as_ref().and_then(|h| find_column(h, &COG_ALIASES)).or(Some(5));

    let mut out = Vec::new();
    let rows = pending_first.into_iter().chain(records.filter_map(|r| r.ok()));
    for (idx, record) in rows.enumerate() {
        match extract_extended_fix_from_record(&record, lat_idx, lng_idx, t_idx, spd_idx, alt_idx, cog_idx, idx) {
            Some(fix) => out.push(fix),
            None => log::warn!("csv row {}: skipped (missing/invalid lat/lng or out of range)", idx),
        }
    }
    Ok(out)
}

/// Accepts a bare array of fix-like objects, or an object carrying the
/// array under one of [`ARRAY_KEYS`], with a further fallback to
/// `data[0].locations` / `data[0].section.locations`. Reduces each object to
/// a plain [`Fix`] immediately (see [`load_extended_from_json`] for the
/// optional `spd, alt, cog` fields).
pub fn load_from_json(value: &Value) -> Vec<Fix> {
    load_extended_from_json(value).into_iter().map(ExtendedFix::to_fix).collect()
}

/// As [`load_from_json`], but returns the full [`ExtendedFix`] records
/// (`spd, alt, cog`, any of which may be absent) instead of reducing them to
/// a plain [`Fix`] — for a caller that wants the optional fields the
/// detector itself never uses.
pub fn load_extended_from_json(value: &Value) -> Vec<ExtendedFix> {
    let Some(array) = find_fix_array(value) else {
        log::warn!("json input: no recognizable fix array found");
        return Vec::new();
    };

    let mut out = Vec::new();
    for (idx, item) in array.iter().enumerate() {
        match extract_extended_fix_from_value(item, idx) {
            Ok(fix) => out.push(fix),
            Err(e) => log::warn!("json item {idx}: {e}"),
        }
    }
    out
}

fn find_fix_array(value: &Value) -> Option<&Vec<Value>> {
    if let Some(arr) = value.as_array() {
        return Some(arr);
    }
    let obj = value.as_object()?;
    for key in ARRAY_KEYS {
        if let Some(arr) = obj.get(key).and_then(Value::as_array) {
            return Some(arr);
        }
    }
    let first_data_entry = obj.get("data").and_then(Value::as_array).and_then(|a| a.first())?;
    if let Some(arr) = first_data_entry.get("locations").and_then(Value::as_array) {
        return Some(arr);
    }
    first_data_entry
        .get("section")
        .and_then(|s| s.get("locations"))
        .and_then(Value::as_array)
}

fn extract_extended_fix_from_value(value: &Value, idx: usize) -> crate::error::Result<ExtendedFix> {
    let obj = value
        .as_object()
        .ok_or_else(|| crate::error::DriftFilterError::InputFormat("expected a JSON object".into()))?;
    let lat = first_numeric(obj, &LAT_ALIASES)
        .ok_or_else(|| crate::error::DriftFilterError::InputFormat("missing lat field".into()))?;
    let lng = first_numeric(obj, &LNG_ALIASES)
        .ok_or_else(|| crate::error::DriftFilterError::InputFormat("missing lng field".into()))?;
    let t = first_timestamp(obj, &TIME_ALIASES).unwrap_or_else(|| synthesize_timestamp(idx));
    Fix::validated(lat, lng, t)?;
    Ok(ExtendedFix {
        lat,
        lng,
        t,
        speed: first_numeric(obj, &SPD_ALIASES),
        altitude: first_numeric(obj, &ALT_ALIASES),
        course: first_numeric(obj, &COG_ALIASES),
    })
}

fn first_numeric(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    for k in keys {
        let Some(v) = obj.get(*k) else { continue };
        if let Some(n) = v.as_f64() {
            return Some(n);
        }
        if let Some(s) = v.as_str() {
            if let Ok(n) = s.parse::<f64>() {
                return Some(n);
            }
        }
    }
    None
}

fn first_timestamp(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<i64> {
    for k in keys {
        let Some(v) = obj.get(*k) else { continue };
        if let Some(n) = v.as_i64() {
            return Some(normalize_numeric_timestamp(n));
        }
        if let Some(n) = v.as_f64() {
            return Some(normalize_numeric_timestamp(n as i64));
        }
        if let Some(s) = v.as_str() {
            if let Some(t) = parse_timestamp(s) {
                return Some(t);
            }
        }
    }
    None
}

/// `(a)` a numeric token, seconds vs. milliseconds disambiguated by
/// magnitude; `(b)` any string parseable as a civil datetime.
pub fn parse_timestamp(token: &str) -> Option<i64> {
    let trimmed = token.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        return Some(normalize_numeric_timestamp(n as i64));
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_millis());
    }
    for fmt in CIVIL_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}

fn normalize_numeric_timestamp(n: i64) -> i64 {
    if n >= SECONDS_LOWER && n < SECONDS_UPPER {
        n * 1000
    } else {
        n
    }
}

fn synthesize_timestamp(idx: usize) -> i64 {
    chrono::Utc::now().timestamp_millis() + idx as i64 * 1000
}
