//! Return maps in reduced two-dimensional coordinates.

use tracing::debug;

use crate::config::{RunConfig, SectionSettings};
use crate::crossing::{advance, TimeDirection};
use crate::error::RtbpResult;
use crate::roots::RootStatus;
use crate::rtbp::{PhaseState, Rtbp};
use crate::section::{Point2, Section};
use crate::solvers::AdaptiveFlow;
use crate::traits::Flow;

/// Image of a point after one or more map iterates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapImage {
    pub state: PhaseState,
    pub point: Point2,
    /// Accumulated integration time, negative for backward iterates.
    pub time: f64,
    pub status: RootStatus,
}

/// A two-dimensional return map together with its lift to phase space.
///
/// The globalizer and the refiner only ever see this trait, so analytic maps
/// can stand in for the flow in tests.
pub trait ReturnMap {
    fn lift(&self, point: Point2) -> RtbpResult<PhaseState>;

    fn reduce(&self, state: &PhaseState) -> RtbpResult<Point2>;

    /// One iterate of the map (or of its inverse) in phase space.
    fn iterate(&mut self, state: &PhaseState, direction: TimeDirection) -> RtbpResult<MapImage>;

    /// Lifts `point` and applies `iterates` iterates in `direction`.
    fn apply(
        &mut self,
        point: Point2,
        direction: TimeDirection,
        iterates: usize,
    ) -> RtbpResult<MapImage> {
        let state = self.lift(point)?;
        let mut image = MapImage {
            state,
            point,
            time: 0.0,
            status: RootStatus::Converged,
        };
        for _ in 0..iterates {
            let next = self.iterate(&image.state, direction)?;
            image = MapImage {
                time: image.time + next.time,
                status: image.status.and(next.status),
                ..next
            };
        }
        Ok(image)
    }
}

/// Poincaré map of the RTBP on one energy level and one section.
pub struct PoincareMap<F: Flow = AdaptiveFlow> {
    model: Rtbp,
    section: Section,
    energy: f64,
    settings: SectionSettings,
    flow: F,
}

impl<F: Flow> PoincareMap<F> {
    pub fn new(model: Rtbp, section: Section, energy: f64, settings: SectionSettings, flow: F) -> Self {
        Self {
            model,
            section,
            energy,
            settings,
            flow,
        }
    }

    pub fn model(&self) -> &Rtbp {
        &self.model
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }
}

impl PoincareMap<AdaptiveFlow> {
    /// Map on `energy` with the model, section and tolerances of `config`.
    pub fn from_config(config: &RunConfig, energy: f64) -> RtbpResult<Self> {
        let model = Rtbp::new(config.mu)?;
        Ok(Self::new(
            model,
            config.section,
            energy,
            config.crossing,
            AdaptiveFlow::new(4, config.integrator),
        ))
    }
}

impl<F: Flow> ReturnMap for PoincareMap<F> {
    fn lift(&self, point: Point2) -> RtbpResult<PhaseState> {
        self.section.lift(&self.model, self.energy, point)
    }

    fn reduce(&self, state: &PhaseState) -> RtbpResult<Point2> {
        self.section.reduce(state)
    }

    fn iterate(&mut self, state: &PhaseState, direction: TimeDirection) -> RtbpResult<MapImage> {
        let hit = advance(
            &self.model,
            &mut self.flow,
            state,
            self.section,
            1,
            direction,
            &self.settings,
        )?;
        let point = self.section.reduce(&hit.state)?;
        debug!(u = point[0], v = point[1], time = hit.time, "map iterate");
        Ok(MapImage {
            state: hit.state,
            point,
            time: hit.time,
            status: hit.status,
        })
    }
}

/// Analytic maps shared by the unit tests of the globalizer and the refiner.
#[cfg(test)]
pub(crate) mod test_maps {
    use super::*;

    /// `(x, y) -> (2x, y/2 + c x^2 + offset)`; each iterate takes unit time.
    ///
    /// With `offset = 0` the origin is a saddle with unstable manifold
    /// `y = 2c x^2 / 7` and stable manifold `x = 0`.
    pub(crate) struct QuadraticSaddle {
        pub c: f64,
        pub offset: f64,
        pub iterations: usize,
    }

    impl QuadraticSaddle {
        pub(crate) fn new(c: f64) -> Self {
            Self {
                c,
                offset: 0.0,
                iterations: 0,
            }
        }
    }

    impl ReturnMap for QuadraticSaddle {
        fn lift(&self, point: Point2) -> RtbpResult<PhaseState> {
            Ok([point[0], point[1], 0.0, 0.0])
        }

        fn reduce(&self, state: &PhaseState) -> RtbpResult<Point2> {
            Ok([state[0], state[1]])
        }

        fn iterate(
            &mut self,
            state: &PhaseState,
            direction: TimeDirection,
        ) -> RtbpResult<MapImage> {
            self.iterations += 1;
            let [x, y, _, _] = *state;
            let point = match direction {
                TimeDirection::Forward => [2.0 * x, 0.5 * y + self.c * x * x + self.offset],
                TimeDirection::Backward => {
                    let x0 = 0.5 * x;
                    [x0, 2.0 * (y - self.c * x0 * x0 - self.offset)]
                }
            };
            Ok(MapImage {
                state: [point[0], point[1], 0.0, 0.0],
                point,
                time: direction.sign(),
                status: RootStatus::Converged,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_maps::QuadraticSaddle;
    use super::*;

    #[test]
    fn apply_accumulates_time_and_iterates() {
        let mut map = QuadraticSaddle::new(1.0);
        let image = map.apply([0.1, 0.0], TimeDirection::Forward, 3).unwrap();
        assert_eq!(image.time, 3.0);
        assert!((image.point[0] - 0.8).abs() < 1e-15);
        let back = map.apply(image.point, TimeDirection::Backward, 3).unwrap();
        assert_eq!(back.time, -3.0);
        assert!((back.point[0] - 0.1).abs() < 1e-15);
        assert!(back.point[1].abs() < 1e-15);
    }

    #[test]
    fn zero_iterates_is_the_lift() {
        let mut map = QuadraticSaddle::new(1.0);
        let image = map.apply([0.3, 0.4], TimeDirection::Forward, 0).unwrap();
        assert_eq!(image.state, [0.3, 0.4, 0.0, 0.0]);
        assert_eq!(image.time, 0.0);
        assert_eq!(map.iterations, 0);
    }

    #[test]
    fn rtbp_map_round_trip_on_descending_section() {
        let config = RunConfig::default();
        let mut map = PoincareMap::from_config(&config, -1.15).unwrap();
        let point = [-0.5, 0.05];
        let forward = map.apply(point, TimeDirection::Forward, 1).unwrap();
        assert!(forward.time > 0.0);
        assert_eq!(forward.state[1], 0.0);
        let lifted = map.lift(forward.point).unwrap();
        let back = map.iterate(&lifted, TimeDirection::Backward).unwrap();
        assert!((back.point[0] - point[0]).abs() < 1e-9);
        assert!((back.point[1] - point[1]).abs() < 1e-9);
        assert!((back.time + forward.time).abs() < 1e-9);
    }
}
