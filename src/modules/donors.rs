use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Donor {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub name: String,
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient_date")]
    pub date: Option<DateTime<Utc>>,
}

impl Donor {
    pub fn donated_at(&self) -> Option<DateTime<Utc>> {
        self.date
    }
}

// The donors endpoint has served both string and numeric ids.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

// Dates arrive as RFC 3339 strings, unix seconds, or null. Anything that
// does not parse is treated as unknown instead of failing the whole snapshot.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDate {
        Seconds(f64),
        Text(String),
    }

    Ok(match Option::<RawDate>::deserialize(deserializer)? {
        Some(RawDate::Seconds(secs)) => DateTime::from_timestamp(secs as i64, 0),
        Some(RawDate::Text(text)) => match text.trim().parse::<i64>() {
            Ok(secs) => DateTime::from_timestamp(secs, 0),
            Err(_) => DateTime::parse_from_rfc3339(text.trim())
                .ok()
                .map(|d| d.with_timezone(&Utc)),
        },
        None => None,
    })
}

/// The donor currently shown in the ticker line, paired with its position in
/// the snapshot. `donor` is `None` until the first snapshot arrives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibleDonor {
    pub donor: Option<Donor>,
    pub index: usize,
}

impl VisibleDonor {
    pub fn latest(snapshot: &[Donor]) -> Self {
        Self {
            donor: snapshot.first().cloned(),
            index: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.donor.as_ref().map(|d| d.name.as_str()).unwrap_or(LOADING)
    }
}

pub const LOADING: &str = "loading...";

/// Tracks the last snapshot and reports donors that were not in it.
///
/// Detection is add-only: donors that drop out of the "recent" window are
/// never reported. While the baseline is empty (startup, or an API that
/// returned nothing) nothing is reported, so history is not replayed as new.
#[derive(Debug, Default)]
pub struct NewDonorDetector {
    previous: Vec<Donor>,
}

impl NewDonorDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts `snapshot` as the new baseline and returns the donors it added.
    pub fn observe(&mut self, snapshot: &[Donor]) -> Vec<Donor> {
        let added = if self.previous.is_empty() {
            Vec::new()
        } else {
            new_donors(&self.previous, snapshot)
        };
        self.previous = snapshot.to_vec();
        added
    }

    pub fn snapshot(&self) -> &[Donor] {
        &self.previous
    }
}

/// Donors of `current` whose id is absent from `previous`, in `current` order.
pub fn new_donors(previous: &[Donor], current: &[Donor]) -> Vec<Donor> {
    let seen: HashSet<&str> = previous.iter().map(|d| d.id.as_str()).collect();
    current
        .iter()
        .filter(|d| !seen.contains(d.id.as_str()))
        .cloned()
        .collect()
}

pub fn truncate_name(name: &str, limit: usize) -> String {
    if name.chars().count() > limit {
        let head: String = name.chars().take(limit).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

/// Rupee amount with thousands separators, rounded to whole units.
pub fn format_amount(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0 {
        format!("-₹{}", grouped)
    } else {
        format!("₹{}", grouped)
    }
}

/// Relative time in the buckets moment.js `fromNow` uses: each unit is the
/// rounded total, and a unit is only used below its threshold.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0) as f64;
    let minutes = (seconds / 60.0).round() as i64;
    let hours = (seconds / 3600.0).round() as i64;
    let days = (seconds / 86_400.0).round() as i64;
    let months_exact = seconds / 86_400.0 * 4800.0 / 146_097.0;
    let months = months_exact.round() as i64;
    let years = (months_exact / 12.0).round() as i64;

    let phrase = if seconds < 45.0 {
        "a few seconds".to_string()
    } else if minutes <= 1 {
        "a minute".to_string()
    } else if minutes < 45 {
        format!("{} minutes", minutes)
    } else if hours <= 1 {
        "an hour".to_string()
    } else if hours < 22 {
        format!("{} hours", hours)
    } else if days <= 1 {
        "a day".to_string()
    } else if days < 26 {
        format!("{} days", days)
    } else if months <= 1 {
        "a month".to_string()
    } else if months < 11 {
        format!("{} months", months)
    } else if years <= 1 {
        "a year".to_string()
    } else {
        format!("{} years", years)
    };
    format!("{} ago", phrase)
}

#[cfg(test)]
pub(crate) fn donor(id: &str, name: &str, amount: f64) -> Donor {
    Donor {
        id: id.to_string(),
        name: name.to_string(),
        amount,
        date: None,
    }
}
