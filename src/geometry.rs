use std::f64::consts::PI;

use log::debug;

use crate::{
    datatypes::Vertex,
    error::{PappusError, Result},
    parameters::ParameterSet,
};

pub const LABEL_TOP_RIGHT: u32 = 11;
pub const LABEL_INNER_ARC: u32 = 12;
pub const LABEL_TOP_LEFT: u32 = 13;
pub const LABEL_LEFT: u32 = 2;
pub const LABEL_BOTTOM_LEFT: u32 = 31;
pub const LABEL_VASCULATURE_LEFT: u32 = 32;
pub const LABEL_VASCULATURE_RIGHT: u32 = 33;
pub const LABEL_BOTTOM_RIGHT: u32 = 34;
pub const LABEL_RIGHT: u32 = 4;
pub const LABEL_CAVITY_LEFT: u32 = 51;
pub const LABEL_CAVITY_ARC: u32 = 52;
pub const LABEL_CAVITY_RIGHT: u32 = 53;

/// A straight line `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub slope: f64,
    pub intercept: f64,
}

impl Line {
    /// Line through two points. Vertical lines cannot be expressed in
    /// slope/intercept form and are rejected.
    pub fn through(a: Vertex, b: Vertex) -> Result<Line> {
        let run = b.x - a.x;
        if run.abs() < f64::EPSILON {
            return Err(PappusError::Geometry(format!(
                "line through ({}, {}) and ({}, {}) is vertical",
                a.x, a.y, b.x, b.y
            )));
        }

        Ok(Line {
            slope: (b.y - a.y) / run,
            intercept: (a.y * b.x - b.y * a.x) / run,
        })
    }

    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurveKind {
    Line {
        start: Vertex,
        end: Vertex,
    },
    /// Circular arc swept from `t_start` to `t_end` (radians)
    Arc {
        center: Vertex,
        radius: f64,
        t_start: f64,
        t_end: f64,
    },
}

/// One labelled piece of the outer contour, parametrised over `t` in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryCurve {
    pub kind: CurveKind,
    pub label: u32,
    /// Length used to pick the number of segments when meshing
    pub characteristic_length: f64,
}

impl BoundaryCurve {
    fn line(start: Vertex, end: Vertex, label: u32, characteristic_length: f64) -> Self {
        BoundaryCurve {
            kind: CurveKind::Line { start, end },
            label,
            characteristic_length,
        }
    }

    fn arc(
        center: Vertex,
        radius: f64,
        (t_start, t_end): (f64, f64),
        label: u32,
        characteristic_length: f64,
    ) -> Self {
        BoundaryCurve {
            kind: CurveKind::Arc {
                center,
                radius,
                t_start,
                t_end,
            },
            label,
            characteristic_length,
        }
    }

    pub fn point(&self, t: f64) -> Vertex {
        match self.kind {
            CurveKind::Line { start, end } => Vertex::new(
                start.x + t * (end.x - start.x),
                start.y + t * (end.y - start.y),
            ),
            CurveKind::Arc {
                center,
                radius,
                t_start,
                t_end,
            } => {
                let angle = t_start + t * (t_end - t_start);
                Vertex::new(
                    center.x + radius * angle.cos(),
                    center.y + radius * angle.sin(),
                )
            }
        }
    }

    pub fn start(&self) -> Vertex {
        self.point(0.0)
    }

    pub fn end(&self) -> Vertex {
        self.point(1.0)
    }

    pub fn length(&self) -> f64 {
        match self.kind {
            CurveKind::Line { start, end } => start.distance(&end),
            CurveKind::Arc {
                radius,
                t_start,
                t_end,
                ..
            } => radius * (t_end - t_start).abs(),
        }
    }
}

/// Angle `t` in [0, π] with `cos(t) = adjacent / radius`
///
/// # Arguments
/// * `adjacent` - Horizontal distance from the arc center
/// * `radius` - The arc radius
fn tangency_angle(adjacent: f64, radius: f64) -> Result<f64> {
    let ratio = adjacent / radius;
    if !ratio.is_finite() || ratio.abs() > 1.0 {
        return Err(PappusError::Geometry(format!(
            "arc of radius {radius} cannot reach {adjacent} from its center \
            (cos = {ratio}); the dimensions are over-constrained"
        )));
    }
    Ok(ratio.acos())
}

/// Lower intersection of a line with a circle, picking the root with the
/// larger abscissa.
fn intersect_line_circle(line: &Line, center: Vertex, radius: f64) -> Result<Vertex> {
    let d = line.slope;
    let offset = line.at(center.x) - center.y;
    let discriminant =
        d * d * offset * offset - (1.0 + d * d) * (offset * offset - radius * radius);

    if discriminant < 0.0 {
        return Err(PappusError::Geometry(format!(
            "cavity line does not meet the podium arc (discriminant {discriminant}); \
            the input dimensions are incompatible"
        )));
    }

    let x = center.x + (-d * offset + discriminant.sqrt()) / (d * d + 1.0);
    Ok(Vertex::new(x, line.at(x)))
}

/// Every derived length, angle and line needed to build the outer contour
/// and to classify material zones.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryGeometry {
    pub lx: f64,
    pub ly: f64,
    pub hnect: f64,
    pub hside: f64,
    pub lside: f64,
    pub vthickness: f64,
    pub cwidth: f64,
    /// Half width of the inner arc opening
    pub rnect: f64,
    pub arc_center: Vertex,
    pub arc_radius: f64,
    /// Inner arc sweep, from right (`tb`) to left (`ta`)
    pub ta: f64,
    pub tb: f64,
    /// Left corner of the cavity where its slanted side meets the podium arc
    pub cavity_corner: Vertex,
    /// Cavity arc sweep, from left (`tm`) to right (`tn`)
    pub tm: f64,
    pub tn: f64,
    /// Abscissa of the vasculature insertion at depth `hnect`
    pub vposition: f64,
    /// Outer (exterior side) edge of the left vasculature band
    pub left_line: Line,
    /// Outer (exterior side) edge of the right vasculature band
    pub right_line: Line,
}

impl BoundaryGeometry {
    pub fn new(params: &ParameterSet) -> Result<BoundaryGeometry> {
        let lx = params.lx;
        let ly = params.ly;
        let hnect = params.hnect;
        let vthickness = params.vthickness;
        let cwidth = params.cwidth;
        let radius = params.arc_radius();

        let rnect = lx / 2.0 - vthickness;
        if rnect <= 0.0 {
            return Err(PappusError::Geometry(format!(
                "vasculature thickness {vthickness} leaves no room for the inner arc"
            )));
        }
        if cwidth / 2.0 + vthickness >= lx / 2.0 {
            return Err(PappusError::Geometry(format!(
                "cavity width {cwidth} and vasculature thickness {vthickness} exceed the actuator width {lx}"
            )));
        }
        if radius <= 0.0 {
            return Err(PappusError::Geometry(format!(
                "podium height {hnect} is larger than the outer radius {}",
                params.outer_radius
            )));
        }

        let half_angle = tangency_angle(rnect, radius)?;
        let tb = 2.0 * PI - half_angle;
        let ta = PI + half_angle;
        let arc_center = Vertex::new(0.0, f64::sqrt(radius * radius - rnect * rnect));

        // slanted cavity side from the arc opening down to the cavity mouth
        let cavity_line = Line::through(Vertex::new(-rnect, 0.0), Vertex::new(-cwidth / 2.0, -ly))?;
        let outer_radius = radius + hnect;
        let cavity_corner = intersect_line_circle(&cavity_line, arc_center, outer_radius)?;

        if !(cavity_corner.y > -ly && cavity_corner.y < 0.0)
            || !(cavity_corner.x > -rnect && cavity_corner.x < -cwidth / 2.0)
        {
            return Err(PappusError::Geometry(format!(
                "cavity corner ({}, {}) falls outside the actuator",
                cavity_corner.x, cavity_corner.y
            )));
        }
        if arc_center.y - outer_radius <= -ly {
            return Err(PappusError::Geometry(format!(
                "podium arc reaches depth {} below the actuator bottom {}",
                arc_center.y - outer_radius,
                -ly
            )));
        }

        let depth = f64::sqrt(outer_radius * outer_radius - cavity_corner.x * cavity_corner.x);
        let tn = 2.0 * PI + f64::asin(-depth / outer_radius);
        let tm = 3.0 * PI - tn;

        let vposition =
            lx / 2.0 - vthickness - hnect / ly * (lx / 2.0 - cwidth / 2.0 - vthickness);
        let left_line = Line::through(
            Vertex::new(-(vposition + vthickness), -hnect),
            Vertex::new(-cwidth / 2.0 - vthickness, -ly),
        )?;
        let right_line = Line::through(
            Vertex::new(vposition + vthickness, -hnect),
            Vertex::new(cwidth / 2.0 + vthickness, -ly),
        )?;

        debug!(
            "geometry: rnect={rnect:.4}, arc center y={:.4}, cavity corner=({:.4}, {:.4})",
            arc_center.y, cavity_corner.x, cavity_corner.y
        );

        Ok(BoundaryGeometry {
            lx,
            ly,
            hnect,
            hside: params.hside,
            lside: params.lside,
            vthickness,
            cwidth,
            rnect,
            arc_center,
            arc_radius: radius,
            ta,
            tb,
            cavity_corner,
            tm,
            tn,
            vposition,
            left_line,
            right_line,
        })
    }

    /// The closed outer contour in counter-clockwise order, starting at the
    /// top right corner.
    pub fn curves(&self) -> Vec<BoundaryCurve> {
        let (lx, ly, vt, cw) = (self.lx, self.ly, self.vthickness, self.cwidth);
        let m = self.cavity_corner;
        let cavity_radius = self.arc_radius + self.hnect;

        vec![
            BoundaryCurve::line(
                Vertex::new(lx / 2.0, 0.0),
                Vertex::new(self.rnect, 0.0),
                LABEL_TOP_RIGHT,
                vt,
            ),
            BoundaryCurve::arc(
                self.arc_center,
                self.arc_radius,
                (self.tb, self.ta),
                LABEL_INNER_ARC,
                2.0 * self.rnect,
            ),
            BoundaryCurve::line(
                Vertex::new(-self.rnect, 0.0),
                Vertex::new(-lx / 2.0, 0.0),
                LABEL_TOP_LEFT,
                vt,
            ),
            BoundaryCurve::line(
                Vertex::new(-lx / 2.0, 0.0),
                Vertex::new(-lx / 2.0, -ly),
                LABEL_LEFT,
                ly,
            ),
            BoundaryCurve::line(
                Vertex::new(-lx / 2.0, -ly),
                Vertex::new(-cw / 2.0 - vt, -ly),
                LABEL_BOTTOM_LEFT,
                lx / 2.0,
            ),
            BoundaryCurve::line(
                Vertex::new(-cw / 2.0 - vt, -ly),
                Vertex::new(-cw / 2.0, -ly),
                LABEL_VASCULATURE_LEFT,
                vt,
            ),
            BoundaryCurve::line(Vertex::new(-cw / 2.0, -ly), m, LABEL_CAVITY_LEFT, ly),
            BoundaryCurve::arc(
                self.arc_center,
                cavity_radius,
                (self.tm, self.tn),
                LABEL_CAVITY_ARC,
                lx - 2.0 * vt,
            ),
            BoundaryCurve::line(
                Vertex::new(-m.x, m.y),
                Vertex::new(cw / 2.0, -ly),
                LABEL_CAVITY_RIGHT,
                ly,
            ),
            BoundaryCurve::line(
                Vertex::new(cw / 2.0, -ly),
                Vertex::new(cw / 2.0 + vt, -ly),
                LABEL_VASCULATURE_RIGHT,
                vt,
            ),
            BoundaryCurve::line(
                Vertex::new(cw / 2.0 + vt, -ly),
                Vertex::new(lx / 2.0, -ly),
                LABEL_BOTTOM_RIGHT,
                lx / 2.0,
            ),
            BoundaryCurve::line(
                Vertex::new(lx / 2.0, -ly),
                Vertex::new(lx / 2.0, 0.0),
                LABEL_RIGHT,
                ly,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_line_through_points() {
        let line = Line::through(Vertex::new(0.0, 1.0), Vertex::new(2.0, 5.0)).unwrap();
        assert_relative_eq!(line.slope, 2.0);
        assert_relative_eq!(line.intercept, 1.0);
        assert_relative_eq!(line.at(1.0), 3.0);

        assert!(Line::through(Vertex::new(1.0, 0.0), Vertex::new(1.0, 3.0)).is_err());
    }

    #[test]
    fn test_arc_meets_top_edge() {
        let geometry = BoundaryGeometry::new(&ParameterSet::default()).unwrap();
        let curves = geometry.curves();
        let arc = curves[1];

        assert_relative_eq!(arc.start().x, geometry.rnect, epsilon = 1e-12);
        assert_relative_eq!(arc.start().y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(arc.end().x, -geometry.rnect, epsilon = 1e-12);
        // the arc dips into the actuator
        assert!(arc.point(0.5).y < 0.0);
    }

    #[test]
    fn test_cavity_corner_lies_on_line_and_circle() {
        let params = ParameterSet::default();
        let geometry = BoundaryGeometry::new(&params).unwrap();
        let m = geometry.cavity_corner;

        let cavity_line = Line::through(
            Vertex::new(-geometry.rnect, 0.0),
            Vertex::new(-params.cwidth / 2.0, -params.ly),
        )
        .unwrap();
        assert_relative_eq!(m.y, cavity_line.at(m.x), epsilon = 1e-12);
        assert_relative_eq!(
            m.distance(&geometry.arc_center),
            params.outer_radius,
            epsilon = 1e-12
        );
        assert!(m.y < geometry.arc_center.y);
    }

    #[test]
    fn test_contour_is_closed() {
        let geometry = BoundaryGeometry::new(&ParameterSet::default()).unwrap();
        let curves = geometry.curves();

        for (i, curve) in curves.iter().enumerate() {
            let next = &curves[(i + 1) % curves.len()];
            assert!(
                curve.end().distance(&next.start()) < 1e-12,
                "gap between labels {} and {}",
                curve.label,
                next.label
            );
        }
    }

    #[test]
    fn test_slanted_lines_are_mirror_images() {
        let geometry = BoundaryGeometry::new(&ParameterSet::default()).unwrap();
        assert_relative_eq!(geometry.left_line.slope, -geometry.right_line.slope);
        assert_relative_eq!(geometry.left_line.intercept, geometry.right_line.intercept);
        assert!(geometry.left_line.slope < 0.0);
    }

    #[test]
    fn test_small_radius_is_a_geometry_error() {
        let mut params = ParameterSet::default();
        params.outer_radius = 0.9 * (params.lx / 2.0 - params.vthickness);

        let err = BoundaryGeometry::new(&params).unwrap_err();
        assert!(matches!(err, PappusError::Geometry(_)));
    }

    #[test]
    fn test_wide_cavity_is_a_geometry_error() {
        let mut params = ParameterSet::default();
        params.cwidth = params.lx;
        assert!(matches!(
            BoundaryGeometry::new(&params),
            Err(PappusError::Geometry(_))
        ));
    }

    #[test]
    fn test_arc_length() {
        let curve = BoundaryCurve::arc(
            Vertex::new(0.0, 0.0),
            2.0,
            (0.0, PI / 2.0),
            LABEL_INNER_ARC,
            1.0,
        );
        assert_relative_eq!(curve.length(), PI);
        assert_relative_eq!(curve.end().y, 2.0);
    }
}
