pub use self::tlmpm::Tlmpm;
pub use self::ulmpm::Ulmpm;

use crate::basis::ShapeFunction;
use crate::domain::Domain;
use crate::error::{MpmError, MpmResult};
use crate::grid::Grid;
use crate::math::{Real, Vector};
use crate::simulation::State;
use crate::solid::Solid;

mod tlmpm;
mod ulmpm;

/// Particle-velocity reconstruction flavor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum VelocityTransfer {
    Pic,
    Flip(Real),
    Apic,
}

impl VelocityTransfer {
    pub fn flip_coefficient(&self) -> Real {
        match self {
            Self::Flip(alpha) => *alpha,
            _ => 0.0,
        }
    }
}

/// Parses the common method grammar `(style, PIC|FLIP|APIC, shape-function,
/// [flip-coefficient])`.
pub(crate) fn parse_method_args(
    args: &[&str],
) -> MpmResult<(VelocityTransfer, ShapeFunction)> {
    if args.len() < 3 {
        return Err(MpmError::Config(
            "method command: not enough arguments".to_string(),
        ));
    }
    let is_flip = args[1] == "FLIP";
    let expected = 3 + usize::from(is_flip);
    if args.len() != expected {
        return Err(MpmError::Config(format!(
            "method command: {} arguments expected, {} received",
            expected,
            args.len()
        )));
    }
    let shape = ShapeFunction::parse(args[2])?;
    let transfer = match args[1] {
        "PIC" => VelocityTransfer::Pic,
        "APIC" => VelocityTransfer::Apic,
        "FLIP" => {
            let alpha: Real = args[3].parse().map_err(|_| {
                MpmError::Config(format!("FLIP coefficient {:?} is not a number", args[3]))
            })?;
            if !(0.0..=1.0).contains(&alpha) {
                return Err(MpmError::Config(format!(
                    "FLIP coefficient must lie in [0, 1], got {}",
                    alpha
                )));
            }
            VelocityTransfer::Flip(alpha)
        }
        other => {
            return Err(MpmError::Config(format!(
                "method type {:?} not understood, expected PIC, FLIP or APIC",
                other
            )))
        }
    };
    Ok((transfer, shape))
}

/// One time-integration formulation. The scheme orders these stages; the
/// method owns their semantics.
pub trait Method: Send {
    fn style(&self) -> &'static str;
    fn shape_function(&self) -> ShapeFunction;
    fn is_total_lagrangian(&self) -> bool;

    fn compute_grid_weight_functions_and_gradients(&mut self, st: &mut State) -> MpmResult<()>;
    fn particles_to_grid(&mut self, st: &mut State) -> MpmResult<()>;
    fn update_grid_state(&mut self, st: &mut State) -> MpmResult<()>;
    fn grid_to_points(&mut self, st: &mut State) -> MpmResult<()>;
    fn advance_particles(&mut self, st: &mut State) -> MpmResult<()>;
    fn velocities_to_grid(&mut self, st: &mut State) -> MpmResult<()>;
    fn compute_rate_deformation_gradient(
        &mut self,
        st: &mut State,
        use_updated: bool,
    ) -> MpmResult<()>;
    fn update_deformation_gradient(&mut self, st: &mut State) -> MpmResult<()>;
    fn update_stress(&mut self, st: &mut State) -> MpmResult<()>;
    fn adjust_dt(&mut self, st: &mut State) -> MpmResult<()>;
    fn reset(&mut self, st: &mut State) -> MpmResult<()>;
    fn exchange_particles(&mut self, st: &mut State) -> MpmResult<()>;
}

type MethodConstructor = fn(&[&str]) -> MpmResult<Box<dyn Method>>;

fn make_ulmpm(args: &[&str]) -> MpmResult<Box<dyn Method>> {
    Ok(Box::new(Ulmpm::new(args)?))
}

fn make_tlmpm(args: &[&str]) -> MpmResult<Box<dyn Method>> {
    Ok(Box::new(Tlmpm::new(args)?))
}

/// Style registry: every method registers a constructor under its key.
fn registry() -> [(&'static str, MethodConstructor); 2] {
    [("ulmpm", make_ulmpm), ("tlmpm", make_tlmpm)]
}

pub fn create_method(args: &[&str]) -> MpmResult<Box<dyn Method>> {
    let style = *args
        .first()
        .ok_or_else(|| MpmError::Config("method command: not enough arguments".to_string()))?;
    for (key, constructor) in registry() {
        if key == style {
            return constructor(args);
        }
    }
    Err(MpmError::Config(format!("unknown method style {:?}", style)))
}

/// Rebuilds the particle/node neighbor lists and weights for one solid.
///
/// Cell anchors come from the particle position in cells; the per-family
/// stencil is walked, candidate tags are resolved through the grid's tag map
/// (a miss means the node lies outside this rank's slab and is skipped), and
/// each surviving pair lands in the pn and np lists simultaneously with
/// identical weight and gradient.
pub(crate) fn compute_weights(
    solid: &mut Solid,
    grid: &mut Grid,
    domain: &Domain,
    shape: ShapeFunction,
    reference: bool,
) {
    let nn = grid.nn;
    let inv_cellsize = 1.0 / grid.cellsize;
    let total = grid.nnodes_total();

    solid.neigh_np.resize(total, vec![]);
    solid.wf_np.resize(total, vec![]);
    solid.wfd_np.resize(total, vec![]);
    for in_ in 0..total {
        solid.neigh_np[in_].clear();
        solid.wf_np[in_].clear();
        solid.wfd_np[in_].clear();
    }

    for ip in 0..solid.np_local {
        solid.neigh_pn[ip].clear();
        solid.wf_pn[ip].clear();
        solid.wfd_pn[ip].clear();

        let xp = if reference { solid.x0[ip] } else { solid.x[ip] };

        let mut lo = [0i64; 3];
        let mut len = [1i64; 3];
        for d in 0..domain.dimension {
            let cell = ((xp[d] - domain.boxlo[d]) * inv_cellsize) as i64;
            let (start, count) = match shape {
                ShapeFunction::Linear => (cell, 2),
                ShapeFunction::QuadraticSpline | ShapeFunction::CubicSpline => (cell - 1, 4),
                ShapeFunction::BernsteinQuadratic => {
                    let mut i0 = 2 * cell;
                    if i0 >= 1 && i0 % 2 != 0 {
                        i0 -= 1;
                    }
                    (i0, 3)
                }
            };
            lo[d] = start;
            len[d] = count;
        }

        for i in lo[0]..lo[0] + len[0] {
            if i < 0 || i >= nn[0] as i64 {
                continue;
            }
            for j in lo[1]..lo[1] + len[1] {
                if j < 0 || j >= nn[1] as i64 {
                    continue;
                }
                for k in lo[2]..lo[2] + len[2] {
                    if k < 0 || k >= nn[2] as i64 {
                        continue;
                    }
                    let tag = (i as usize * nn[1] + j as usize) * nn[2] + k as usize;
                    let in_ = match grid.find(tag) {
                        Some(in_) => in_,
                        None => continue,
                    };

                    let mut s = [1.0; 3];
                    let mut r = [0.0; 3];
                    for d in 0..domain.dimension {
                        r[d] = (xp[d] - grid.x0[in_][d]) * inv_cellsize;
                        s[d] = shape.eval(r[d], grid.ntype[in_][d]);
                    }
                    if s[0] == 0.0 || s[1] == 0.0 || s[2] == 0.0 {
                        continue;
                    }

                    if solid.mat.rigid {
                        grid.rigid[in_] = true;
                    }

                    let mut sd = [0.0; 3];
                    for d in 0..domain.dimension {
                        sd[d] = shape.eval_derivative(r[d], grid.ntype[in_][d], inv_cellsize);
                    }

                    let wf = s[0] * s[1] * s[2];
                    let wfd = match domain.dimension {
                        1 => Vector::new(sd[0], 0.0, 0.0),
                        2 => Vector::new(sd[0] * s[1], s[0] * sd[1], 0.0),
                        _ => Vector::new(
                            sd[0] * s[1] * s[2],
                            s[0] * sd[1] * s[2],
                            s[0] * s[1] * sd[2],
                        ),
                    };

                    solid.neigh_pn[ip].push(in_);
                    solid.wf_pn[ip].push(wf);
                    solid.wfd_pn[ip].push(wfd);
                    solid.neigh_np[in_].push(ip);
                    solid.wf_np[in_].push(wf);
                    solid.wfd_np[in_].push(wfd);
                }
            }
        }
    }
}

/// Migrates departed particles to the ranks whose subdomains claim them.
///
/// The resident prefix is kept contiguous by swapping from the end while
/// packing leavers into a flat buffer, then every source rank in turn posts
/// sizes and payloads to all the others; receivers filter the records by
/// subdomain membership on the position slots. The total particle count is
/// conserved; a particle outside the global box is a fatal loss.
pub(crate) fn exchange_particles(st: &mut State) -> MpmResult<()> {
    let State {
        universe,
        domain,
        solids,
        ..
    } = st;
    let me = universe.rank;
    let nprocs = universe.nprocs;

    for solid in solids.iter_mut() {
        let mut buf_send: Vec<Real> = vec![];
        let np_local_old = solid.np_local;

        let mut ip = 0;
        while ip < solid.np_local {
            let x = solid.x[ip];
            if domain.inside_subdomain(x.x, x.y, x.z) {
                ip += 1;
                continue;
            }
            if !domain.inside_box(x.x, x.y, x.z) {
                return Err(MpmError::DomainLoss {
                    tag: solid.ptag[ip],
                    x: x.x,
                    y: x.y,
                    z: x.z,
                });
            }
            solid.pack_particle(ip, &mut buf_send);
            solid.copy_particle(solid.np_local - 1, ip);
            solid.np_local -= 1;
        }

        let departed = np_local_old - solid.np_local;
        if departed * solid.comm_n != buf_send.len() {
            return Err(MpmError::Distribution {
                rank: me,
                message: format!(
                    "send buffer holds {} values for {} departed particles of width {}",
                    buf_send.len(),
                    departed,
                    solid.comm_n
                ),
            });
        }
        if departed > 0 {
            debug!("solid {}: {} particles leaving rank {}", solid.id, departed, me);
        }

        for sproc in 0..nprocs {
            if sproc == me {
                for rproc in 0..nprocs {
                    if rproc == me {
                        continue;
                    }
                    universe.send(rproc, vec![buf_send.len() as Real])?;
                    if !buf_send.is_empty() {
                        universe.send(rproc, buf_send.clone())?;
                    }
                }
            } else {
                let size = universe.recv(sproc)?[0] as usize;
                if size == 0 {
                    continue;
                }
                let buf = universe.recv(sproc)?;
                if buf.len() != size {
                    return Err(MpmError::Distribution {
                        rank: me,
                        message: format!(
                            "expected {} values from rank {}, received {}",
                            size,
                            sproc,
                            buf.len()
                        ),
                    });
                }

                let mut unpack_list = vec![];
                let mut off = 0;
                while off < size {
                    if domain.inside_subdomain(buf[off + 1], buf[off + 2], buf[off + 3]) {
                        unpack_list.push(off);
                    }
                    off += solid.comm_n;
                }
                if !unpack_list.is_empty() {
                    solid.grow(solid.np_local + unpack_list.len());
                    solid.unpack_particle(&unpack_list, &buf);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_parsing() {
        let (transfer, shape) = parse_method_args(&["ulmpm", "PIC", "linear"]).unwrap();
        assert_eq!(transfer, VelocityTransfer::Pic);
        assert_eq!(shape, ShapeFunction::Linear);
        let (transfer, _) =
            parse_method_args(&["ulmpm", "FLIP", "cubic-spline", "0.99"]).unwrap();
        assert_eq!(transfer, VelocityTransfer::Flip(0.99));
        assert!(parse_method_args(&["ulmpm", "FLIP", "cubic-spline"]).is_err());
        assert!(parse_method_args(&["ulmpm", "FLIP", "cubic-spline", "1.5"]).is_err());
        assert!(parse_method_args(&["ulmpm", "XPIC", "linear"]).is_err());
        assert!(parse_method_args(&["ulmpm", "PIC", "linear", "extra"]).is_err());
    }

    #[test]
    fn registry_rejects_unknown_style() {
        assert!(create_method(&["mpm"]).is_err());
        assert!(create_method(&[]).is_err());
        assert!(create_method(&["ulmpm", "PIC", "linear"]).is_ok());
        assert!(create_method(&["tlmpm", "FLIP", "cubic-spline", "0.99"]).is_ok());
    }
}
