use std::{fs::File, io::Read, path::Path};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink},
    fan_curve::{CurveLoadError, CurvePoint, check_point, linear_curve::LinearCurve},
};

// Load the fan curve stored at the given path and report it to the sink.
// The file holds one `temperature,duty` row per point, without header,
// in increasing temperature order.
pub fn load_curve(
    path: &Path,
    sink: &dyn DiagnosticSink,
) -> Result<LinearCurve, CurveLoadError> {
    let file = File::open(path).map_err(|source| CurveLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let curve = parse_curve(file)?;

    sink.record(Diagnostic::CurveLoaded {
        table: curve.table(),
    });

    Ok(curve)
}

// Parse a fan curve from any CSV source.
// Rows are validated in file order, never sorted.
pub fn parse_curve<R: Read>(reader: R) -> Result<LinearCurve, CurveLoadError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut points: Vec<CurvePoint> = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record?;

        let row = record
            .position()
            .map(|p| p.line())
            .unwrap_or(i as u64 + 1);

        // Lines holding only whitespace
        if record.iter().all(str::is_empty) {
            continue;
        }

        let point = parse_row(row, &record)?;
        check_point(row, points.last(), &point)?;

        points.push(point);
    }

    if points.is_empty() {
        return Err(CurveLoadError::Empty);
    }

    LinearCurve::try_new(points)
}

fn parse_row(row: u64, record: &StringRecord) -> Result<CurvePoint, CurveLoadError> {
    if record.len() != 2 {
        return Err(CurveLoadError::ColumnCount {
            row,
            found: record.len(),
        });
    }

    let parse = |field: &str| {
        field
            .parse::<f64>()
            .map_err(|_| CurveLoadError::InvalidNumber {
                row,
                value: field.to_string(),
            })
    };

    Ok(CurvePoint {
        temp: parse(&record[0])?,
        duty: parse(&record[1])?,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::{diagnostics::RecordingSink, fan_curve::FanCurve};

    #[test]
    fn parses_rows_in_order() {
        let curve = parse_curve("20,0\n40,50\n60,100\n".as_bytes()).unwrap();

        assert_eq!(curve.table(), vec![(20., 0.), (40., 50.), (60., 100.)]);
    }

    #[test]
    fn tolerates_whitespace_and_blank_lines() {
        let curve = parse_curve(" 30 , 20.5 \n\n  \n50,80\r\n".as_bytes()).unwrap();

        assert_eq!(curve.table(), vec![(30., 20.5), (50., 80.)]);
    }

    #[test]
    fn rejects_decreasing_temperatures() {
        let err = parse_curve("40,30\n30,50\n".as_bytes()).unwrap_err();

        assert!(matches!(
            err,
            CurveLoadError::NotIncreasing {
                row: 2,
                previous,
                current,
            } if previous == 40. && current == 30.
        ));
    }

    #[test]
    fn rejects_empty_source() {
        assert!(matches!(
            parse_curve("".as_bytes()),
            Err(CurveLoadError::Empty)
        ));
        assert!(matches!(
            parse_curve("\n \n".as_bytes()),
            Err(CurveLoadError::Empty)
        ));
    }

    #[test]
    fn rejects_wrong_column_count() {
        assert!(matches!(
            parse_curve("20,0\n40,50,1\n".as_bytes()),
            Err(CurveLoadError::ColumnCount { row: 2, found: 3 })
        ));
        assert!(matches!(
            parse_curve("20\n".as_bytes()),
            Err(CurveLoadError::ColumnCount { row: 1, found: 1 })
        ));
    }

    #[test]
    fn rejects_non_numeric_fields() {
        let err = parse_curve("temp,duty\n20,0\n".as_bytes()).unwrap_err();

        assert!(matches!(
            err,
            CurveLoadError::InvalidNumber { row: 1, ref value } if value == "temp"
        ));
    }

    #[test]
    fn rejects_nan() {
        assert!(matches!(
            parse_curve("20,NaN\n".as_bytes()),
            Err(CurveLoadError::NonFinite { row: 1 })
        ));
    }

    #[test]
    fn load_reports_curve() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "30,20").unwrap();
        writeln!(file, "50,80").unwrap();

        let sink = RecordingSink::new();
        let curve = load_curve(file.path(), &sink).unwrap();

        assert_eq!(curve.points_num(), 2);
        assert_eq!(
            sink.records(),
            vec![Diagnostic::CurveLoaded {
                table: vec![(30., 20.), (50., 80.)]
            }]
        );
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();

        let err = load_curve(&dir.path().join("fan_curve.csv"), &sink).unwrap_err();

        assert!(matches!(err, CurveLoadError::Io { .. }));
        assert!(sink.records().is_empty());
    }
}
