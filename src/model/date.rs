use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};

/// Parses the date formats the forum shows on posts
///
/// Accepts `YYYY-MM-DD, HH:MM`, `YYYY-MM-DD` (midnight) and RFC 3339. Forum
/// times carry no zone and are taken as UTC. Precision is cut to
/// microseconds, the resolution of the review store.
pub fn parse_post_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).trunc_subsecs(6));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d, %H:%M") {
        return Some(naive.and_utc());
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Serde adapter: writes RFC 3339, reads any format `parse_post_date` knows
pub mod post_date {
    use super::parse_post_date;
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_post_date(&raw)
            .ok_or_else(|| de::Error::custom(format!("unrecognized post date '{}'", raw)))
    }
}
