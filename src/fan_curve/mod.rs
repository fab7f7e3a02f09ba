use std::path::PathBuf;

use thiserror::Error;

pub mod csv_loader;
pub mod linear_curve;

pub trait FanCurve {
    // Return the number of points in the curve
    fn points_num(&self) -> usize;

    // Return the fan duty (0-100) for the given temperature
    fn get_speed(&self, temp: f64) -> u8;
}

// A single temperature (°C) to fan duty (%) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub temp: f64,
    pub duty: f64,
}

impl From<(f64, f64)> for CurvePoint {
    fn from(value: (f64, f64)) -> Self {
        Self {
            temp: value.0,
            duty: value.1,
        }
    }
}

#[derive(Debug, Error)]
pub enum CurveLoadError {
    #[error("Failed to read fan curve \"{}\"", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed fan curve: {0}")]
    Csv(#[from] csv::Error),
    #[error("Fan curve has no points")]
    Empty,
    #[error("Row {row}: expected 2 columns (temperature,duty), found {found}")]
    ColumnCount { row: u64, found: usize },
    #[error("Row {row}: \"{value}\" is not a number")]
    InvalidNumber { row: u64, value: String },
    #[error("Row {row}: temperature and duty must be finite")]
    NonFinite { row: u64 },
    #[error("Row {row}: duty {duty} is outside 0-100")]
    DutyOutOfRange { row: u64, duty: f64 },
    #[error(
        "Row {row}: temperature {current} does not increase over the previous {previous}"
    )]
    NotIncreasing { row: u64, previous: f64, current: f64 },
}

// Check a point against the curve invariants,
// `previous` is the point on the row before it if any
pub(crate) fn check_point(
    row: u64,
    previous: Option<&CurvePoint>,
    point: &CurvePoint,
) -> Result<(), CurveLoadError> {
    if !point.temp.is_finite() || !point.duty.is_finite() {
        return Err(CurveLoadError::NonFinite { row });
    }

    if !(0.0..=100.0).contains(&point.duty) {
        return Err(CurveLoadError::DutyOutOfRange {
            row,
            duty: point.duty,
        });
    }

    if let Some(previous) = previous {
        if point.temp <= previous.temp {
            return Err(CurveLoadError::NotIncreasing {
                row,
                previous: previous.temp,
                current: point.temp,
            });
        }
    }

    Ok(())
}
