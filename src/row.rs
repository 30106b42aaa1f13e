use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::{Error, Result};

/// One row of a `jsonv2` result. Every cell arrives as an optional string.
#[derive(Debug)]
pub struct SnowflakeRow {
    pub(crate) row: Vec<Option<String>>,
    pub(crate) column_names: Arc<HashMap<String, usize>>,
}

impl SnowflakeRow {
    /// Decode a column by name. Names are matched case-insensitively.
    pub fn get<T: SnowflakeDecode>(&self, column_name: &str) -> Result<T> {
        let index = self
            .column_names
            .get(&column_name.to_ascii_uppercase())
            .ok_or_else(|| Error::Decode(format!("column not found: {column_name}")))?;
        let value = self
            .row
            .get(*index)
            .ok_or_else(|| Error::Decode(format!("row has no cell for column {column_name}")))?;
        T::try_decode(value)
    }

    pub fn column_names(&self) -> Vec<&str> {
        let mut names = self
            .column_names
            .iter()
            .map(|(name, index)| (*index, name.as_str()))
            .collect::<Vec<_>>();
        names.sort_unstable();
        names.into_iter().map(|(_, name)| name).collect()
    }

    pub fn raw(&self) -> &[Option<String>] {
        &self.row
    }
}

pub trait SnowflakeDecode: Sized {
    fn try_decode(value: &Option<String>) -> Result<Self>;
}

macro_rules! impl_decode_from_str {
    ($($ty:ty),*) => {
        $(
            impl SnowflakeDecode for $ty {
                fn try_decode(value: &Option<String>) -> Result<Self> {
                    let value = unwrap(value)?;
                    value.parse().map_err(|_| {
                        Error::Decode(format!("'{value}' is not {}", stringify!($ty)))
                    })
                }
            }
        )*
    };
}

impl_decode_from_str!(u64, i64, i32, f64);

impl SnowflakeDecode for String {
    fn try_decode(value: &Option<String>) -> Result<Self> {
        let value = unwrap(value)?;
        Ok(value.to_string())
    }
}

impl SnowflakeDecode for bool {
    fn try_decode(value: &Option<String>) -> Result<Self> {
        let value = unwrap(value)?;
        if let Ok(v) = value.parse::<u16>() {
            return Ok(v > 0);
        }
        if let Ok(v) = value.to_ascii_lowercase().parse::<bool>() {
            return Ok(v);
        }
        Err(Error::Decode(format!("'{value}' is not bool")))
    }
}

impl SnowflakeDecode for NaiveDate {
    fn try_decode(value: &Option<String>) -> Result<Self> {
        let value = unwrap(value)?;
        // DATE arrives as days since the epoch
        if let Ok(days) = value.parse::<i64>() {
            return days
                .checked_mul(86_400)
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.date_naive())
                .ok_or_else(|| Error::Decode(format!("invalid date: {value}")));
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| Error::Decode(format!("'{value}' is not date")))
    }
}

impl SnowflakeDecode for NaiveTime {
    fn try_decode(value: &Option<String>) -> Result<Self> {
        let value = unwrap(value)?;
        if let Some((secs, nsec)) = parse_epoch(value) {
            return u32::try_from(secs)
                .ok()
                .and_then(|secs| NaiveTime::from_num_seconds_from_midnight_opt(secs, nsec))
                .ok_or_else(|| Error::Decode(format!("invalid time: {value}")));
        }
        NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
            .map_err(|_| Error::Decode(format!("'{value}' is not time")))
    }
}

impl SnowflakeDecode for NaiveDateTime {
    fn try_decode(value: &Option<String>) -> Result<Self> {
        let value = unwrap(value)?;
        // TIMESTAMP_TZ carries the offset as a second, space-separated field
        let epoch = value.split_whitespace().next().unwrap_or_default();
        if let Some((secs, nsec)) = parse_epoch(epoch) {
            return DateTime::from_timestamp(secs, nsec)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| Error::Decode(format!("invalid datetime: {value}")));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|_| Error::Decode(format!("'{value}' is not datetime")))
    }
}

impl SnowflakeDecode for serde_json::Value {
    fn try_decode(value: &Option<String>) -> Result<Self> {
        let value = unwrap(value)?;
        serde_json::from_str(value).map_err(|_| Error::Decode(format!("'{value}' is not json")))
    }
}

impl SnowflakeDecode for uuid::Uuid {
    fn try_decode(value: &Option<String>) -> Result<Self> {
        let value = unwrap(value)?;
        uuid::Uuid::parse_str(value).map_err(|_| Error::Decode(format!("'{value}' is not uuid")))
    }
}

impl<T: SnowflakeDecode> SnowflakeDecode for Option<T> {
    fn try_decode(value: &Option<String>) -> Result<Self> {
        if value.is_none() {
            return Ok(None);
        }
        T::try_decode(value).map(Some)
    }
}

/// Split `"<secs>.<fraction>"` into whole seconds and nanoseconds without going through `f64`.
fn parse_epoch(value: &str) -> Option<(i64, u32)> {
    let (secs, fraction) = value.split_once('.').unwrap_or((value, ""));
    if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut secs = secs.parse::<i64>().ok()?;
    let mut nsec = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse::<u32>().ok()?
    };
    if value.starts_with('-') && nsec > 0 {
        secs -= 1;
        nsec = 1_000_000_000 - nsec;
    }
    Some((secs, nsec))
}

fn unwrap(value: &Option<String>) -> Result<&String> {
    value
        .as_ref()
        .ok_or_else(|| Error::Decode("value is null".into()))
}
