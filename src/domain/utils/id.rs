use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::{Error, Result};

/// Numeric catalog identifier tagged with the entity it belongs to.
///
/// The tag keeps an equipment id from being passed where an activity id is expected,
/// while the value stays the plain number used in the JSON catalog.
pub struct Id<T> {
    pub id: u64,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub const fn new(id: u64) -> Self {
        Id { id, _marker: PhantomData }
    }

    pub fn value(&self) -> u64 {
        self.id
    }
}

// Manual impls so that the tag type needs no trait bounds.
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> From<u64> for Id<T> {
    fn from(id: u64) -> Self {
        Id::new(id)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        let display_name = clean_name.replace("Tag", "Id");

        write!(f, "{}: {}", display_name, self.id)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct EquipmentTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct ActivityTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct OrderTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct StaffTag;

pub type EquipmentId = Id<EquipmentTag>;
pub type ActivityId = Id<ActivityTag>;
pub type OrderId = Id<OrderTag>;
pub type StaffId = Id<StaffTag>;

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// Formats a timestamp as `HH:MM` for log lines.
pub fn hhmm(time: Timestamp) -> String {
    match chrono::DateTime::from_timestamp(time, 0) {
        Some(datetime) => datetime.format("%H:%M").to_string(),
        None => time.to_string(),
    }
}

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses `%Y-%m-%d %H:%M:%S` (read as UTC) into seconds since the epoch.
pub fn parse_datetime(text: &str) -> Result<Timestamp> {
    chrono::NaiveDateTime::parse_from_str(text.trim(), DATETIME_FORMAT)
        .map(|datetime| datetime.and_utc().timestamp())
        .map_err(|e| Error::ModelConstructionError(format!("invalid date '{}': {}", text, e)))
}

pub fn format_datetime(time: Timestamp) -> String {
    match chrono::DateTime::from_timestamp(time, 0) {
        Some(datetime) => datetime.format(DATETIME_FORMAT).to_string(),
        None => time.to_string(),
    }
}
