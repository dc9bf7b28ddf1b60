//! The three batch pipelines behind the subcommands.
//!
//! Each reads the mass parameter preamble and then streams records. Outcomes
//! that only concern one record (no intersection, non-converged roots, a
//! record whose point has no fixed point or saddle nearby) are logged as
//! warnings and the stream continues; every other error aborts the run.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use rtbp_core::crossing::advance;
use rtbp_core::fixed_point::{eigendata, solve_fixed_point};
use rtbp_core::solvers::AdaptiveFlow;
use rtbp_core::{
    approximate_intersection, optimal_displacement, refine_intersection, Approximation,
    PoincareMap, RtbpError, Rtbp, RunConfig, Stability, TargetLine, TimeDirection,
};
use tracing::{info, warn};

use crate::io::{format_f64, write_record, RecordReader};

/// Counts of one run, logged at the end.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub records: usize,
    pub written: usize,
    pub skipped: usize,
}

impl Summary {
    fn log(&self, command: &str) {
        info!(
            command,
            records = self.records,
            written = self.written,
            skipped = self.skipped,
            "finished"
        );
    }
}

fn is_record_local(err: &RtbpError) -> bool {
    matches!(
        err,
        RtbpError::NotConverged { .. }
            | RtbpError::FixedPoint { .. }
            | RtbpError::NotSaddle { .. }
            | RtbpError::EnergyInversion { .. }
    )
}

/// Runs `work` for one record, turning record-local failures into a skip.
fn per_record<T>(
    summary: &mut Summary,
    line_no: usize,
    work: impl FnOnce() -> Result<T, RtbpError>,
) -> Result<Option<T>> {
    summary.records += 1;
    match work() {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_record_local(&err) => {
            warn!(line = line_no, "skipping record: {err}");
            summary.skipped += 1;
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| format!("line {line_no}: fatal error")),
    }
}

fn model_from_preamble<R: BufRead>(reader: &mut RecordReader<R>, config: &mut RunConfig) -> Result<Rtbp> {
    config.mu = reader.preamble()?;
    Rtbp::new(config.mu).context("invalid mass parameter")
}

/// Records `x y px py`; output `x y px py time` at the requested cut.
pub fn section<R: BufRead, W: Write>(
    mut config: RunConfig,
    cuts: usize,
    direction: TimeDirection,
    input: R,
    mut out: W,
) -> Result<Summary> {
    let mut reader = RecordReader::new(input);
    let model = model_from_preamble(&mut reader, &mut config)?;
    let mut flow = AdaptiveFlow::new(4, config.integrator);
    let mut summary = Summary::default();

    while let Some(state) = reader.next_record::<4>()? {
        let hit = per_record(&mut summary, reader.line_no(), || {
            advance(&model, &mut flow, &state, config.section, cuts, direction, &config.crossing)
        })?;
        let Some(hit) = hit else { continue };
        if !hit.status.is_converged() {
            warn!(line = reader.line_no(), "crossing refinement did not converge");
        }
        let mut fields: Vec<String> = hit.state.iter().map(|&v| format_f64(v)).collect();
        fields.push(format_f64(hit.time));
        write_record(&mut out, &fields)?;
        summary.written += 1;
    }
    summary.log("section");
    Ok(summary)
}

/// Records `energy u v` (a fixed-point guess); output
/// `u v period lambda_u vu_1 vu_2 lambda_s vs_1 vs_2`.
pub fn eigen<R: BufRead, W: Write>(mut config: RunConfig, input: R, mut out: W) -> Result<Summary> {
    let mut reader = RecordReader::new(input);
    model_from_preamble(&mut reader, &mut config)?;
    let mut summary = Summary::default();

    while let Some([energy, u, v]) = reader.next_record::<3>()? {
        let found = per_record(&mut summary, reader.line_no(), || {
            let mut map = PoincareMap::from_config(&config, energy)?;
            let fixed = solve_fixed_point(&mut map, [u, v], &config.newton)?;
            let data = eigendata(&fixed.jacobian)?;
            Ok((fixed, data))
        })?;
        let Some((fixed, data)) = found else { continue };
        let fields = [
            fixed.point[0],
            fixed.point[1],
            fixed.period,
            data.unstable.value,
            data.unstable.vector[0],
            data.unstable.vector[1],
            data.stable.value,
            data.stable.vector[0],
            data.stable.vector[1],
        ];
        write_record(&mut out, &fields.map(format_f64))?;
        summary.written += 1;
    }
    summary.log("eigen");
    Ok(summary)
}

/// Records `energy u v` (a fixed-point guess); output
/// `h iterates u v x y px py time residual`: the refined displacement, the
/// number of map iterates, the reduced preimage, the homoclinic point and
/// the integration time from preimage to homoclinic point.
pub fn homoclinic<R: BufRead, W: Write>(
    mut config: RunConfig,
    stability: Stability,
    target: TargetLine,
    input: R,
    mut out: W,
) -> Result<Summary> {
    let mut reader = RecordReader::new(input);
    model_from_preamble(&mut reader, &mut config)?;
    let mut summary = Summary::default();

    while let Some([energy, u, v]) = reader.next_record::<3>()? {
        let line_no = reader.line_no();
        let outcome = per_record(&mut summary, line_no, || {
            let mut map = PoincareMap::from_config(&config, energy)?;
            let fixed = solve_fixed_point(&mut map, [u, v], &config.newton)?;
            let data = eigendata(&fixed.jacobian)?;
            let eigen = data.get(stability);
            let h = optimal_displacement(&mut map, fixed.point, eigen, &config.displacement)?;
            let approximation =
                approximate_intersection(&mut map, fixed.point, eigen, h, &target, &config.manifold)?;
            let Approximation::Bracketed(found) = approximation else {
                return Ok(None);
            };
            let refined = refine_intersection(
                &mut map,
                fixed.point,
                eigen,
                found.bracket,
                &target,
                found.iterates,
                stability.direction(),
                &config.refine,
            )?;
            Ok(Some((found.iterates, refined)))
        })?;

        match outcome {
            None => {}
            Some(None) => {
                warn!(
                    line = line_no,
                    iterates = config.manifold.max_iterates,
                    "skipping record: manifold does not reach the target"
                );
                summary.skipped += 1;
            }
            Some(Some((iterates, refined))) => {
                if !refined.status.is_converged() {
                    warn!(line = line_no, "refinement did not converge, keeping best estimate");
                }
                let mut fields = vec![format_f64(refined.displacement), iterates.to_string()];
                fields.extend(refined.preimage.iter().map(|&v| format_f64(v)));
                fields.extend(refined.homoclinic_state.iter().map(|&v| format_f64(v)));
                fields.push(format_f64(refined.time));
                fields.push(format_f64(refined.residual));
                write_record(&mut out, &fields)?;
                summary.written += 1;
            }
        }
    }
    summary.log("homoclinic");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtbp_core::rtbp::circular_orbit_state;
    use rtbp_core::Axis;
    use std::f64::consts::PI;
    use std::io::Cursor;

    fn parse_output(out: &[u8]) -> Vec<Vec<f64>> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(|line| line.split_whitespace().map(|f| f.parse().unwrap()).collect())
            .collect()
    }

    #[test]
    fn section_streams_one_line_per_record() {
        let radius = 3.0_f64.powf(-2.0 / 3.0);
        let state = circular_orbit_state(radius, PI / 2.0);
        let record = state.map(format_f64).join(" ");
        let input = format!("0\n{record}\n\n{record}\n");
        let mut out = Vec::new();

        let summary = section(
            RunConfig::default(),
            1,
            TimeDirection::Forward,
            Cursor::new(input),
            &mut out,
        )
        .unwrap();

        assert_eq!(summary.written, 2);
        let rows = parse_output(&out);
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.len(), 5);
            assert_eq!(row[1], 0.0);
            assert!((row[4] - PI / 4.0).abs() < 1e-10);
        }
    }

    #[test]
    fn unreachable_energy_skips_the_record() {
        let input = "0.00095\n-5.0 0.45 0.1\n-5.0 0.5 0.0\n";
        let mut out = Vec::new();

        let summary = eigen(RunConfig::default(), Cursor::new(input), &mut out).unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.written, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_record_aborts_the_run() {
        let target = TargetLine::new(Axis::Second, 0.0);
        let result = homoclinic(
            RunConfig::default(),
            Stability::Unstable,
            target,
            Cursor::new("0.00095\n-1.5 0.4\n"),
            Vec::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn invalid_mass_parameter_is_fatal() {
        let result = section(
            RunConfig::default(),
            1,
            TimeDirection::Forward,
            Cursor::new("0.7\n"),
            Vec::new(),
        );
        assert!(result.is_err());
    }
}
