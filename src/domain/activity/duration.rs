use crate::error::{Error, Result};

/// One quantity range `[min, max]` mapped to a fixed processing duration (a "faixa").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationBand {
    pub quantity_min: i64,
    pub quantity_max: i64,
    pub duration_s: i64,
}

/// Ordered table of duration bands of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DurationTable {
    bands: Vec<DurationBand>,
}

impl DurationTable {
    /// Builds the table, sorting bands ascending by their minimum.
    pub fn new(mut bands: Vec<DurationBand>) -> Result<Self> {
        if bands.is_empty() {
            return Err(Error::ModelConstructionError("duration table without bands".to_string()));
        }

        if let Some(band) = bands.iter().find(|band| band.quantity_min > band.quantity_max || band.duration_s <= 0) {
            return Err(Error::ModelConstructionError(format!(
                "invalid duration band [{}, {}] -> {}s",
                band.quantity_min, band.quantity_max, band.duration_s
            )));
        }

        bands.sort_by_key(|band| band.quantity_min);
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[DurationBand] {
        &self.bands
    }

    /// Duration in seconds of the first band containing `quantity`.
    pub fn resolve(&self, quantity: i64) -> Result<i64> {
        self.bands
            .iter()
            .find(|band| band.quantity_min <= quantity && quantity <= band.quantity_max)
            .map(|band| band.duration_s)
            .ok_or_else(|| Error::OutOfRangeQuantity {
                quantity,
                lowest: self.bands.first().map_or(0, |band| band.quantity_min),
                highest: self.bands.last().map_or(0, |band| band.quantity_max),
            })
    }
}

/// Parses a `HH:MM:SS` duration into seconds. Hours may exceed 23.
pub fn parse_hms(text: &str) -> Result<i64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let invalid = || Error::ModelConstructionError(format!("invalid duration '{}', expected HH:MM:SS", text));

    if parts.len() != 3 {
        return Err(invalid());
    }

    let mut values = [0i64; 3];
    for (value, part) in values.iter_mut().zip(&parts) {
        *value = part.parse::<i64>().map_err(|_| invalid())?;
    }

    let [hours, minutes, seconds] = values;
    if hours < 0 || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return Err(invalid());
    }

    Ok(hours * 3600 + minutes * 60 + seconds)
}
