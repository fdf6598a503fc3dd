use crate::error::{MpmError, MpmResult};
use crate::math::Real;

/// Per-axis node classification. The boundary variants select the polynomial
/// piece that keeps partition of unity on the particle side of the domain;
/// `Mid` tags the midpoint nodes of the Bernstein family's twice-refined grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum NodeType {
    Lower,
    Interior,
    Upper,
    Mid,
}

/// The four supported shape-function families.
///
/// All evaluations take `r`, the particle-to-node separation measured in
/// cells, and return 0 outside the support. Derivatives are the exact
/// piecewise derivatives of the primal, scaled by `inv_cellsize`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum ShapeFunction {
    Linear,
    QuadraticSpline,
    CubicSpline,
    BernsteinQuadratic,
}

impl ShapeFunction {
    pub fn parse(name: &str) -> MpmResult<Self> {
        match name {
            "linear" => Ok(Self::Linear),
            "quadratic-spline" => Ok(Self::QuadraticSpline),
            "cubic-spline" => Ok(Self::CubicSpline),
            "Bernstein-quadratic" => Ok(Self::BernsteinQuadratic),
            _ => Err(MpmError::Config(format!(
                "unknown shape function {:?}, expected one of: linear, \
                 cubic-spline, quadratic-spline, Bernstein-quadratic",
                name
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::QuadraticSpline => "quadratic-spline",
            Self::CubicSpline => "cubic-spline",
            Self::BernsteinQuadratic => "Bernstein-quadratic",
        }
    }

    /// Support radius in cells.
    pub fn support(&self) -> Real {
        match self {
            Self::Linear => 1.0,
            Self::QuadraticSpline => 1.5,
            Self::CubicSpline => 2.0,
            Self::BernsteinQuadratic => 1.0,
        }
    }

    /// Node-grid refinement along each axis: the Bernstein family places its
    /// nodes on a virtual grid of half the cell spacing.
    pub fn node_refinement(&self) -> usize {
        match self {
            Self::BernsteinQuadratic => 2,
            _ => 1,
        }
    }

    pub fn eval(&self, r: Real, ntype: NodeType) -> Real {
        match self {
            Self::Linear => linear(r),
            Self::QuadraticSpline => match ntype {
                NodeType::Lower => quadratic_spline(r) + quadratic_spline(r + 1.0),
                NodeType::Upper => quadratic_spline(r) + quadratic_spline(r - 1.0),
                _ => quadratic_spline(r),
            },
            Self::CubicSpline => match ntype {
                NodeType::Lower => cubic_spline(r) + cubic_spline(r + 1.0),
                NodeType::Upper => cubic_spline(r) + cubic_spline(r - 1.0),
                _ => cubic_spline(r),
            },
            Self::BernsteinQuadratic => match ntype {
                NodeType::Mid => bernstein_mid(r),
                _ => bernstein_corner(r),
            },
        }
    }

    pub fn eval_derivative(&self, r: Real, ntype: NodeType, inv_cellsize: Real) -> Real {
        let d = match self {
            Self::Linear => derivative_linear(r),
            Self::QuadraticSpline => match ntype {
                NodeType::Lower => {
                    derivative_quadratic_spline(r) + derivative_quadratic_spline(r + 1.0)
                }
                NodeType::Upper => {
                    derivative_quadratic_spline(r) + derivative_quadratic_spline(r - 1.0)
                }
                _ => derivative_quadratic_spline(r),
            },
            Self::CubicSpline => match ntype {
                NodeType::Lower => derivative_cubic_spline(r) + derivative_cubic_spline(r + 1.0),
                NodeType::Upper => derivative_cubic_spline(r) + derivative_cubic_spline(r - 1.0),
                _ => derivative_cubic_spline(r),
            },
            Self::BernsteinQuadratic => match ntype {
                NodeType::Mid => derivative_bernstein_mid(r),
                _ => derivative_bernstein_corner(r),
            },
        };
        d * inv_cellsize
    }
}

#[inline(always)]
fn linear(r: Real) -> Real {
    let r_abs = r.abs();
    if r_abs < 1.0 {
        1.0 - r_abs
    } else {
        0.0
    }
}

#[inline(always)]
fn derivative_linear(r: Real) -> Real {
    if r == 0.0 || r.abs() >= 1.0 {
        0.0
    } else if r > 0.0 {
        -1.0
    } else {
        1.0
    }
}

#[inline(always)]
fn quadratic_spline(r: Real) -> Real {
    let r_abs = r.abs();
    if r_abs < 0.5 {
        0.75 - r_abs * r_abs
    } else if r_abs < 1.5 {
        0.5 * (1.5 - r_abs) * (1.5 - r_abs)
    } else {
        0.0
    }
}

#[inline(always)]
fn derivative_quadratic_spline(r: Real) -> Real {
    let r_abs = r.abs();
    if r_abs < 0.5 {
        -2.0 * r
    } else if r_abs < 1.5 {
        -r.signum() * (1.5 - r_abs)
    } else {
        0.0
    }
}

#[inline(always)]
fn cubic_spline(r: Real) -> Real {
    let r_abs = r.abs();
    if r_abs < 1.0 {
        0.5 * r_abs * r_abs * r_abs - r_abs * r_abs + 2.0 / 3.0
    } else if r_abs < 2.0 {
        let t = 2.0 - r_abs;
        t * t * t / 6.0
    } else {
        0.0
    }
}

#[inline(always)]
fn derivative_cubic_spline(r: Real) -> Real {
    let r_abs = r.abs();
    if r_abs < 1.0 {
        r * (1.5 * r_abs - 2.0)
    } else if r_abs < 2.0 {
        let t = 2.0 - r_abs;
        -r.signum() * 0.5 * t * t
    } else {
        0.0
    }
}

// Bernstein-quadratic macro element over one cell: corner nodes sit on the
// cell boundaries, the midpoint node at the cell center, on a virtual grid of
// half the cell spacing. The three element functions sum to one on the cell.

#[inline(always)]
fn bernstein_corner(r: Real) -> Real {
    let r_abs = r.abs();
    if r_abs < 1.0 {
        (1.0 - r_abs) * (1.0 - r_abs)
    } else {
        0.0
    }
}

#[inline(always)]
fn derivative_bernstein_corner(r: Real) -> Real {
    let r_abs = r.abs();
    if r == 0.0 || r_abs >= 1.0 {
        0.0
    } else {
        -2.0 * r.signum() * (1.0 - r_abs)
    }
}

#[inline(always)]
fn bernstein_mid(r: Real) -> Real {
    if r.abs() < 0.5 {
        0.5 - 2.0 * r * r
    } else {
        0.0
    }
}

#[inline(always)]
fn derivative_bernstein_mid(r: Real) -> Real {
    if r.abs() < 0.5 {
        -4.0 * r
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITIONS: [Real; 7] = [0.0, 0.05, 0.2, 0.37, 0.5, 0.73, 0.99];

    fn interior_sums(shape: ShapeFunction, xp: Real) -> (Real, Real) {
        // Nodes at all integers; the particle sits far from any boundary.
        let mut wf = 0.0;
        let mut wfd = 0.0;
        for node in -3..=4 {
            let r = xp - node as Real;
            wf += shape.eval(r, NodeType::Interior);
            wfd += shape.eval_derivative(r, NodeType::Interior, 1.0);
        }
        (wf, wfd)
    }

    #[test]
    fn partition_of_unity_interior() {
        for shape in [
            ShapeFunction::Linear,
            ShapeFunction::QuadraticSpline,
            ShapeFunction::CubicSpline,
        ] {
            for &xp in &POSITIONS {
                let (wf, wfd) = interior_sums(shape, xp);
                assert!(
                    (wf - 1.0).abs() < 1.0e-12,
                    "{}: sum {} at {}",
                    shape.name(),
                    wf,
                    xp
                );
                assert!((wfd).abs() < 1.0e-10, "{}: gradient sum {}", shape.name(), wfd);
            }
        }
    }

    #[test]
    fn partition_of_unity_lower_boundary() {
        // Domain starts at node 0: the boundary node folds in the phantom
        // exterior weight, interior nodes are unchanged.
        for shape in [ShapeFunction::QuadraticSpline, ShapeFunction::CubicSpline] {
            for &xp in &[0.0, 0.01, 0.3, 0.49, 0.6, 0.99, 1.2] {
                let mut wf = 0.0;
                let mut wfd = 0.0;
                for node in 0..=4 {
                    let r = xp - node as Real;
                    let ntype = if node == 0 {
                        NodeType::Lower
                    } else {
                        NodeType::Interior
                    };
                    wf += shape.eval(r, ntype);
                    wfd += shape.eval_derivative(r, ntype, 1.0);
                }
                assert!(
                    (wf - 1.0).abs() < 1.0e-12,
                    "{}: boundary sum {} at {}",
                    shape.name(),
                    wf,
                    xp
                );
                assert!(wfd.abs() < 1.0e-10);
            }
        }
    }

    #[test]
    fn partition_of_unity_bernstein() {
        // Refined nodes spaced half a cell: corner, mid, corner.
        let shape = ShapeFunction::BernsteinQuadratic;
        for &xp in &POSITIONS {
            let mut wf = 0.0;
            let mut wfd = 0.0;
            for node in 0..3 {
                let xn = 0.5 * node as Real;
                let ntype = if node % 2 == 1 {
                    NodeType::Mid
                } else {
                    NodeType::Interior
                };
                wf += shape.eval(xp - xn, ntype);
                wfd += shape.eval_derivative(xp - xn, ntype, 1.0);
            }
            assert!((wf - 1.0).abs() < 1.0e-12, "bernstein sum {} at {}", wf, xp);
            assert!(wfd.abs() < 1.0e-10);
        }
    }

    #[test]
    fn bernstein_corner_particle_is_exact() {
        let shape = ShapeFunction::BernsteinQuadratic;
        // A particle exactly on a domain corner node: full weight there,
        // nothing anywhere else.
        assert_eq!(shape.eval(0.0, NodeType::Lower), 1.0);
        assert_eq!(shape.eval(0.5, NodeType::Mid), 0.0);
        assert_eq!(shape.eval(1.0, NodeType::Interior), 0.0);
    }

    #[test]
    fn zero_outside_support() {
        for shape in [
            ShapeFunction::Linear,
            ShapeFunction::QuadraticSpline,
            ShapeFunction::CubicSpline,
            ShapeFunction::BernsteinQuadratic,
        ] {
            let s = shape.support();
            for ntype in [NodeType::Interior, NodeType::Mid] {
                assert_eq!(shape.eval(s + 1.0e-9, ntype), 0.0);
                assert_eq!(shape.eval(-s - 1.0e-9, ntype), 0.0);
                assert_eq!(shape.eval_derivative(s + 1.0e-9, ntype, 1.0), 0.0);
            }
        }
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let h = 1.0e-6;
        for shape in [
            ShapeFunction::Linear,
            ShapeFunction::QuadraticSpline,
            ShapeFunction::CubicSpline,
            ShapeFunction::BernsteinQuadratic,
        ] {
            for &r in &[-1.3, -0.75, -0.3, 0.12, 0.4, 0.8, 1.4] {
                for ntype in [NodeType::Lower, NodeType::Interior, NodeType::Upper] {
                    let fd = (shape.eval(r + h, ntype) - shape.eval(r - h, ntype)) / (2.0 * h);
                    let exact = shape.eval_derivative(r, ntype, 1.0);
                    assert!(
                        (fd - exact).abs() < 1.0e-5,
                        "{} {:?} at {}: fd {} exact {}",
                        shape.name(),
                        ntype,
                        r,
                        fd,
                        exact
                    );
                }
            }
        }
    }

    #[test]
    fn parse_rejects_unknown_family() {
        assert!(ShapeFunction::parse("quartic").is_err());
        assert_eq!(
            ShapeFunction::parse("Bernstein-quadratic").unwrap(),
            ShapeFunction::BernsteinQuadratic
        );
    }
}
