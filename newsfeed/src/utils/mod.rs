use serde::{
    de::{self, Visitor},
    Deserializer,
};
use std::{error::Error as StdError, fmt, fmt::Write};

/// Date format from the newsfeed api server
///
/// The server sends ISO-8601 timestamps, sometimes with an offset and
/// sometimes without one. The offset is dropped: dates are shown exactly as
/// the server wrote them.
pub mod iso_date_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        let s = s.trim();
        if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(s) {
            return Ok(datetime.naive_local());
        }
        if let Ok(datetime) = s.parse::<NaiveDateTime>() {
            return Ok(datetime);
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
    }
}

/// Accept both `123` and `"123"`.
pub fn string_or_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOri64;

    impl<'de> Visitor<'de> for StringOri64 {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("string or i64")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            value.trim().parse().map_err(de::Error::custom)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i64::try_from(v).map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(StringOri64)
}

/// Cut `text` to at most `limit` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(limit.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Render an error followed by every `source()` below it.
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(chain, "\ncaused by: {cause}");
        source = cause.source();
    }
    chain
}
