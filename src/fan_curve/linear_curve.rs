use crate::fan_curve::{CurveLoadError, CurvePoint, FanCurve, check_point};

// Piecewise linear fan curve.
// Points are kept in the order they were given, temperatures strictly
// increasing, and the curve can't be modified once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearCurve {
    points: Vec<CurvePoint>,
}

impl LinearCurve {
    // Build a curve from an ordered list of points
    pub fn try_new(points: Vec<CurvePoint>) -> Result<Self, CurveLoadError> {
        if points.is_empty() {
            return Err(CurveLoadError::Empty);
        }

        for (i, point) in points.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| &points[p]);
            check_point(i as u64 + 1, previous, point)?;
        }

        Ok(Self { points })
    }

    // Return the curve as (temperature, duty) pairs
    pub fn table(&self) -> Vec<(f64, f64)> {
        self.points.iter().map(|p| (p.temp, p.duty)).collect()
    }
}

impl FanCurve for LinearCurve {
    fn points_num(&self) -> usize {
        self.points.len()
    }

    fn get_speed(&self, temp: f64) -> u8 {
        // The constructor guarantees at least one point
        let (Some(first), Some(last)) = (self.points.first(), self.points.last())
        else {
            return 100;
        };

        // Without a usable temperature run at the top of the curve
        if temp.is_nan() {
            return to_duty(last.duty);
        }

        // Clamp outside of the curve range
        if temp <= first.temp {
            return to_duty(first.duty);
        }
        if temp >= last.temp {
            return to_duty(last.duty);
        }

        // Find the 2 points of the temperature interval,
        // `index` is the first point hotter than temp
        let index = self.points.partition_point(|p| p.temp <= temp);

        to_duty(linear_interpolation(
            &self.points[index - 1],
            &self.points[index],
            temp,
        ))
    }
}

// Perform the linear interpolation between
// two points and return the raw duty
fn linear_interpolation(pre: &CurvePoint, suc: &CurvePoint, temp: f64) -> f64 {
    pre.duty + (temp - pre.temp) * (suc.duty - pre.duty) / (suc.temp - pre.temp)
}

// Truncate toward zero, never round
fn to_duty(raw: f64) -> u8 {
    raw.clamp(0., 100.).trunc() as u8
}
