//! CSV export of the variable trace and of final reports.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::report::{FinalReport, ReportValue};
use crate::sim::variable::TraceRecord;

/// Column header of the trace export.
const TRACE_HEADER: &str = "time_h,model,variable,value,derivative";

/// Column header of the report export.
const REPORT_HEADER: &str = "model,label,value,unit,at_h";

/// Exports a variable trace to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_trace_csv(trace: &[TraceRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_trace_csv(trace, io::BufWriter::new(file))
}

/// Writes a variable trace as CSV to any writer.
///
/// One row per exported-variable sample, in write order. The derivative
/// column is empty for samples without a derivative.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_trace_csv(trace: &[TraceRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(TRACE_HEADER.split(','))?;
    for r in trace {
        wtr.write_record(&[
            format!("{:.6}", r.time_h),
            r.model.clone(),
            r.variable.clone(),
            format!("{:.6}", r.value),
            r.derivative.map(|d| format!("{d:.6}")).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes final reports as CSV, one row per report line.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_reports_csv(reports: &[FinalReport], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(REPORT_HEADER.split(','))?;
    for report in reports {
        for line in &report.lines {
            let value = match &line.value {
                ReportValue::Number(v) => format!("{v:.6}"),
                ReportValue::Text(t) => t.clone(),
            };
            wtr.write_record(&[
                report.model.to_string(),
                line.label.clone(),
                value,
                line.unit.clone().unwrap_or_default(),
                line.at.map(|t| format!("{:.6}", t.hours())).unwrap_or_default(),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::report::TOTAL_CONSUMPTION;
    use crate::sim::time::SimTime;
    use crate::sim::types::ModelUri;

    fn sample(i: usize) -> TraceRecord {
        TraceRecord {
            time_h: i as f64 / 60.0,
            model: "heater-temperature".into(),
            variable: "currentTemperature".into(),
            value: 19.0 + i as f64 * 0.1,
            derivative: (i % 2 == 0).then_some(-0.72),
        }
    }

    #[test]
    fn trace_header_and_rows() {
        let trace: Vec<TraceRecord> = (0..3).map(sample).collect();
        let mut buf = Vec::new();
        assert!(write_trace_csv(&trace, &mut buf).is_ok());
        let output = String::from_utf8(buf).unwrap_or_default();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], TRACE_HEADER);
        assert!(lines[2].ends_with(','), "missing derivative is empty: {}", lines[2]);
    }

    #[test]
    fn trace_round_trip_parseable() {
        let trace: Vec<TraceRecord> = (0..4).map(sample).collect();
        let mut buf = Vec::new();
        assert!(write_trace_csv(&trace, &mut buf).is_ok());

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let mut rows = 0;
        for record in rdr.records() {
            let rec = record.unwrap_or_default();
            assert!(rec[0].parse::<f64>().is_ok());
            assert!(rec[3].parse::<f64>().is_ok());
            rows += 1;
        }
        assert_eq!(rows, 4);
    }

    #[test]
    fn reports_flatten_to_lines() {
        let reports = vec![
            FinalReport::new(ModelUri::from("heater-electricity")).number(
                TOTAL_CONSUMPTION,
                0.1,
                "kWh",
            ),
            FinalReport::new(ModelUri::from("meter"))
                .number_at("largest power debt", 5.0, "W", SimTime::from_hours(0.5))
                .text("final state", "OFF"),
        ];
        let mut buf = Vec::new();
        assert!(write_reports_csv(&reports, &mut buf).is_ok());
        let output = String::from_utf8(buf).unwrap_or_default();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "meter,largest power debt,5.000000,W,0.500000");
        assert_eq!(lines[3], "meter,final state,OFF,,");
    }
}
