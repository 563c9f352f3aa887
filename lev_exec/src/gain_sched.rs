//! # Gain scheduler
//!
//! Piecewise linear lookup over height-ordered calibration tables. Two tables are used by the
//! levitation controller: the PID gain schedule and the feedforward fan speed table. Both must be
//! strictly ascending by height, which is checked whenever a table is built or edited.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use thiserror::Error;

// Internal
use util::maths::{lerp, ratio};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A value which can be linearly interpolated field by field.
pub trait Interpolate: Copy {
    /// Interpolate between `lower` (`ratio = 0`) and `upper` (`ratio = 1`).
    fn interpolate(lower: Self, upper: Self, ratio: f64) -> Self;
}

/// A row of a schedule table.
pub trait ScheduleEntry {
    /// The value looked up from the table.
    type Value: Interpolate;

    /// Height this row is calibrated at.
    ///
    /// Units: millimeters
    fn height_mm(&self) -> f64;

    /// The value calibrated at `height_mm`.
    fn value(&self) -> Self::Value;

    /// True if the row holds usable values.
    fn is_valid(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A set of PID gains.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// PID gains calibrated at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainProfile {
    /// Units: millimeters
    pub height_mm: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Open loop fan speed calibrated at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedforwardProfile {
    /// Units: millimeters
    pub height_mm: f64,

    /// Fan speed fraction in [0, 1]
    pub speed: f64,
}

/// The gain and feedforward tables used by the controller.
#[derive(Debug, Default, Clone)]
pub struct ScheduleTables {
    gains: Vec<GainProfile>,
    feedforward: Vec<FeedforwardProfile>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while building or editing a schedule table.
#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("The {0} table is empty")]
    EmptyTable(&'static str),

    #[error("Entry {index} of the {table} table is not strictly above the previous entry's height")]
    NotAscending {
        table: &'static str,
        index: usize
    },

    #[error("Entry {index} of the {table} table holds an invalid value")]
    InvalidEntry {
        table: &'static str,
        index: usize
    },

    #[error("Index {index} is out of bounds (0-{max})")]
    IndexOutOfBounds {
        index: usize,
        max: usize
    },
}

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const GAIN_TABLE: &str = "gain schedule";
const FF_TABLE: &str = "feedforward";

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Look up the value at `height_mm` in an ascending table.
///
/// - Below the first entry the first entry's value is returned.
/// - Above the last entry, or on an exact match, the entry's own value is returned.
/// - Otherwise the value is interpolated between the two surrounding entries.
///
/// Returns `None` only for an empty table.
pub fn interpolate<E>(table: &[E], height_mm: f64) -> Option<E::Value>
where
    E: ScheduleEntry
{
    let first = table.first()?;

    // Greatest entry at or below, and smallest entry at or above, the height
    let lower = table.iter().rev().find(|e| e.height_mm() <= height_mm);
    let upper = table.iter().find(|e| e.height_mm() >= height_mm);

    let value = match (lower, upper) {
        (None, _) => first.value(),
        (Some(l), None) => l.value(),
        (Some(l), Some(u)) if l.height_mm() == u.height_mm() => l.value(),
        (Some(l), Some(u)) => E::Value::interpolate(
            l.value(),
            u.value(),
            ratio(l.height_mm(), u.height_mm(), height_mm)
        )
    };

    Some(value)
}

/// Check that a table is non-empty, holds valid rows, and is strictly ascending by height.
pub fn validate_table<E>(table: &[E], name: &'static str) -> Result<(), ScheduleError>
where
    E: ScheduleEntry
{
    if table.is_empty() {
        return Err(ScheduleError::EmptyTable(name))
    }

    for (index, entry) in table.iter().enumerate() {
        if !entry.is_valid() {
            return Err(ScheduleError::InvalidEntry { table: name, index })
        }

        if index > 0 && entry.height_mm() <= table[index - 1].height_mm() {
            return Err(ScheduleError::NotAscending { table: name, index })
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Interpolate for f64 {
    fn interpolate(lower: Self, upper: Self, ratio: f64) -> Self {
        lerp(lower, upper, ratio)
    }
}

impl Interpolate for Gains {
    fn interpolate(lower: Self, upper: Self, ratio: f64) -> Self {
        Self {
            kp: lerp(lower.kp, upper.kp, ratio),
            ki: lerp(lower.ki, upper.ki, ratio),
            kd: lerp(lower.kd, upper.kd, ratio),
        }
    }
}

impl ScheduleEntry for GainProfile {
    type Value = Gains;

    fn height_mm(&self) -> f64 {
        self.height_mm
    }

    fn value(&self) -> Gains {
        Gains {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd
        }
    }

    fn is_valid(&self) -> bool {
        self.height_mm.is_finite()
            && self.kp.is_finite()
            && self.ki.is_finite()
            && self.kd.is_finite()
    }
}

impl ScheduleEntry for FeedforwardProfile {
    type Value = f64;

    fn height_mm(&self) -> f64 {
        self.height_mm
    }

    fn value(&self) -> f64 {
        self.speed
    }

    fn is_valid(&self) -> bool {
        self.height_mm.is_finite() && (0.0..=1.0).contains(&self.speed)
    }
}

impl ScheduleTables {
    /// Build the tables, validating both.
    pub fn new(
        gains: Vec<GainProfile>,
        feedforward: Vec<FeedforwardProfile>
    ) -> Result<Self, ScheduleError> {
        validate_table(&gains, GAIN_TABLE)?;
        validate_table(&feedforward, FF_TABLE)?;

        Ok(Self {
            gains,
            feedforward
        })
    }

    /// Scheduled gains at the given height.
    pub fn gains_at(&self, height_mm: f64) -> Gains {
        interpolate(&self.gains, height_mm).unwrap_or_default()
    }

    /// Feedforward fan speed at the given height.
    pub fn feedforward_at(&self, height_mm: f64) -> f64 {
        interpolate(&self.feedforward, height_mm).unwrap_or(0.0)
    }

    pub fn feedforward(&self) -> &[FeedforwardProfile] {
        &self.feedforward
    }

    /// Replace a single row of the feedforward table.
    ///
    /// The edit is rejected, leaving the table untouched, if the index is out of range, the row is
    /// invalid, or the table would no longer be strictly ascending.
    pub fn set_feedforward_entry(
        &mut self,
        index: usize,
        entry: FeedforwardProfile
    ) -> Result<(), ScheduleError> {
        if index >= self.feedforward.len() {
            return Err(ScheduleError::IndexOutOfBounds {
                index,
                max: self.feedforward.len().saturating_sub(1)
            })
        }

        let mut edited = self.feedforward.clone();
        edited[index] = entry;
        validate_table(&edited, FF_TABLE)?;

        self.feedforward = edited;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn gain_table() -> Vec<GainProfile> {
        vec![
            GainProfile { height_mm: 100.0, kp: 0.002, ki: 0.0002, kd: 0.006 },
            GainProfile { height_mm: 200.0, kp: 0.004, ki: 0.0004, kd: 0.008 },
        ]
    }

    fn ff_table() -> Vec<FeedforwardProfile> {
        vec![
            FeedforwardProfile { height_mm: 50.0, speed: 0.35 },
            FeedforwardProfile { height_mm: 250.0, speed: 0.30 },
            FeedforwardProfile { height_mm: 450.0, speed: 0.30 },
        ]
    }

    #[test]
    fn test_interpolate_gains() {
        let table = gain_table();

        // Midpoint
        let g = interpolate(&table, 150.0).unwrap();
        assert_eq!(g.kp, 0.003);

        // Exact match
        assert_eq!(interpolate(&table, 100.0), Some(table[0].value()));
        assert_eq!(interpolate(&table, 200.0), Some(table[1].value()));

        // Clamp below and above
        assert_eq!(interpolate(&table, 50.0), Some(table[0].value()));
        assert_eq!(interpolate(&table, 250.0), Some(table[1].value()));
    }

    #[test]
    fn test_interpolate_fields_independent() {
        let table = gain_table();

        let g = interpolate(&table, 125.0).unwrap();
        assert!((g.kp - 0.0025).abs() < 1e-15);
        assert!((g.ki - 0.00025).abs() < 1e-15);
        assert!((g.kd - 0.0065).abs() < 1e-15);
    }

    #[test]
    fn test_interpolate_feedforward() {
        let table = ff_table();

        assert!((interpolate(&table, 150.0).unwrap() - 0.325).abs() < 1e-12);
        assert_eq!(interpolate(&table, 350.0), Some(0.30));
        assert_eq!(interpolate(&table, 0.0), Some(0.35));
        assert_eq!(interpolate(&table, 8000.0), Some(0.30));
    }

    #[test]
    fn test_interpolate_empty() {
        let table: Vec<FeedforwardProfile> = Vec::new();
        assert_eq!(interpolate(&table, 100.0), None);
    }

    #[test]
    fn test_validate_table() {
        assert_eq!(validate_table(&gain_table(), "gain"), Ok(()));

        let empty: Vec<GainProfile> = Vec::new();
        assert_eq!(validate_table(&empty, "gain"), Err(ScheduleError::EmptyTable("gain")));

        let mut dup = ff_table();
        dup[1].height_mm = 50.0;
        assert_eq!(
            validate_table(&dup, "ff"),
            Err(ScheduleError::NotAscending { table: "ff", index: 1 })
        );

        let mut bad_speed = ff_table();
        bad_speed[2].speed = 1.5;
        assert_eq!(
            validate_table(&bad_speed, "ff"),
            Err(ScheduleError::InvalidEntry { table: "ff", index: 2 })
        );
    }

    #[test]
    fn test_set_feedforward_entry() -> Result<(), ScheduleError> {
        let mut tables = ScheduleTables::new(gain_table(), ff_table())?;

        tables.set_feedforward_entry(1, FeedforwardProfile { height_mm: 200.0, speed: 0.45 })?;
        assert_eq!(tables.feedforward()[1], FeedforwardProfile { height_mm: 200.0, speed: 0.45 });
        assert_eq!(tables.feedforward_at(200.0), 0.45);

        // Out of range index leaves the table untouched
        let before = tables.feedforward().to_vec();
        assert_eq!(
            tables.set_feedforward_entry(3, FeedforwardProfile { height_mm: 500.0, speed: 0.3 }),
            Err(ScheduleError::IndexOutOfBounds { index: 3, max: 2 })
        );
        assert_eq!(tables.feedforward(), &before[..]);

        // So does an edit breaking the ordering
        assert_eq!(
            tables.set_feedforward_entry(0, FeedforwardProfile { height_mm: 300.0, speed: 0.3 }),
            Err(ScheduleError::NotAscending { table: FF_TABLE, index: 1 })
        );
        assert_eq!(tables.feedforward(), &before[..]);

        Ok(())
    }

    #[test]
    fn test_set_feedforward_entry_empty() {
        let mut tables = ScheduleTables::default();

        assert_eq!(
            tables.set_feedforward_entry(0, FeedforwardProfile { height_mm: 100.0, speed: 0.3 }),
            Err(ScheduleError::IndexOutOfBounds { index: 0, max: 0 })
        );
        assert!(tables.feedforward().is_empty());
    }
}
