//! Line-oriented numeric records on stdin/stdout.

use std::io::{BufRead, Lines, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rtbp_core::RunConfig;

/// Whitespace-separated numeric records, one per non-blank line.
pub struct RecordReader<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
            line_no: 0,
        }
    }

    /// Line number of the last record returned.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// The mass parameter preamble: a single value on the first line.
    pub fn preamble(&mut self) -> Result<f64> {
        match self.next_record::<1>()? {
            Some([mu]) => Ok(mu),
            None => bail!("missing mass parameter preamble"),
        }
    }

    /// Next record of exactly `N` values, `None` at end of input.
    pub fn next_record<const N: usize>(&mut self) -> Result<Option<[f64; N]>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.context("failed to read input")?;
            if line.trim().is_empty() {
                continue;
            }
            let values = parse_fields(&line)
                .with_context(|| format!("line {}: malformed record", self.line_no))?;
            if values.len() != N {
                bail!(
                    "line {}: expected {} values, got {}",
                    self.line_no,
                    N,
                    values.len()
                );
            }
            let mut record = [0.0; N];
            record.copy_from_slice(&values);
            return Ok(Some(record));
        }
        Ok(None)
    }
}

fn parse_fields(line: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|field| {
            field
                .parse::<f64>()
                .with_context(|| format!("not a number: {field:?}"))
        })
        .collect()
}

/// 17 significant digits, enough to round-trip any `f64`.
pub fn format_f64(value: f64) -> String {
    format!("{value:.16e}")
}

/// Writes one record and flushes it, so results stream as they are computed.
pub fn write_record(out: &mut impl Write, fields: &[String]) -> Result<()> {
    writeln!(out, "{}", fields.join(" ")).context("failed to write output")?;
    out.flush().context("failed to flush output")?;
    Ok(())
}

pub fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtbp_core::{ConvergencePolicy, Section};
    use std::io::Cursor;

    #[test]
    fn reads_preamble_then_records_skipping_blank_lines() {
        let input = Cursor::new("0.00095\n\n1 2 3 4\n  \n-1e-3 0 0.5 7\n");
        let mut reader = RecordReader::new(input);
        assert_eq!(reader.preamble().unwrap(), 0.00095);
        assert_eq!(reader.next_record::<4>().unwrap(), Some([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(reader.next_record::<4>().unwrap(), Some([-1e-3, 0.0, 0.5, 7.0]));
        assert_eq!(reader.line_no(), 5);
        assert_eq!(reader.next_record::<4>().unwrap(), None);
    }

    #[test]
    fn wrong_arity_names_the_line() {
        let mut reader = RecordReader::new(Cursor::new("0.1\n1 2\n"));
        reader.preamble().unwrap();
        let err = reader.next_record::<3>().unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let mut reader = RecordReader::new(Cursor::new("abc\n"));
        assert!(reader.preamble().is_err());
    }

    #[test]
    fn formatted_values_round_trip() {
        for value in [0.1, -1.0 / 3.0, 6.02214076e23, f64::MIN_POSITIVE] {
            let text = format_f64(value);
            assert_eq!(text.parse::<f64>().unwrap(), value);
        }
    }

    #[test]
    fn records_are_newline_terminated() {
        let mut out = Vec::new();
        write_record(&mut out, &[format_f64(1.0), "3".to_string()]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1.0000000000000000e0 3\n");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{ "section": "pericentre-pi", "crossing": { "policy": "reject" } }"#,
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.section, Section::PericentrePi);
        assert_eq!(config.crossing.policy, ConvergencePolicy::Reject);
        assert_eq!(config.manifold.max_iterates, 100);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.json"))).is_err());
    }
}
