//! Timestamp helpers: RFC 3339 serde for message timestamps and a short
//! wall-clock rendering for transcripts shown in the terminal.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// Deserialize an RFC 3339 string into an `OffsetDateTime`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    OffsetDateTime::parse(&s, &Rfc3339).map_err(serde::de::Error::custom)
}

/// Serialize an `OffsetDateTime` as an RFC 3339 string.
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// Render the time of day as `HH:MM:SS`.
pub fn clock(datetime: OffsetDateTime) -> String {
    let format = format_description!("[hour]:[minute]:[second]");
    datetime
        .format(&format)
        .unwrap_or_else(|_| datetime.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn clock_renders_time_of_day() {
        assert_eq!(clock(datetime!(2024-05-01 07:08:09 UTC)), "07:08:09");
    }
}
