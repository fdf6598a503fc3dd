use super::{compute_weights, exchange_particles, parse_method_args, Method, VelocityTransfer};
use crate::basis::ShapeFunction;
use crate::error::{MpmError, MpmResult};
use crate::math::{Vector, DT_CFL_MAX};
use crate::simulation::State;

/// Updated-Lagrangian MPM: every solid scatters to the shared background
/// grid in the current configuration, and the neighbor lists are rebuilt
/// each step as the particles advect.
pub struct Ulmpm {
    transfer: VelocityTransfer,
    shape: ShapeFunction,
}

impl Ulmpm {
    pub fn new(args: &[&str]) -> MpmResult<Self> {
        let (transfer, shape) = parse_method_args(args)?;
        info!(
            "ulmpm: {:?} transfer with {} basis functions",
            transfer,
            shape.name()
        );
        Ok(Self { transfer, shape })
    }
}

impl Method for Ulmpm {
    fn style(&self) -> &'static str {
        "ulmpm"
    }

    fn shape_function(&self) -> ShapeFunction {
        self.shape
    }

    fn is_total_lagrangian(&self) -> bool {
        false
    }

    fn compute_grid_weight_functions_and_gradients(&mut self, st: &mut State) -> MpmResult<()> {
        let State {
            solids,
            grids,
            domain,
            ..
        } = st;
        if solids.is_empty() {
            return Ok(());
        }
        let grid = &mut grids[domain.grid];
        grid.reset_rigid();
        for solid in solids.iter_mut() {
            compute_weights(solid, grid, domain, self.shape, false);
            if self.transfer == VelocityTransfer::Apic {
                solid.compute_inertia_tensor(grid, domain.dimension, false)?;
            }
        }
        Ok(())
    }

    fn particles_to_grid(&mut self, st: &mut State) -> MpmResult<()> {
        let State {
            universe,
            solids,
            grids,
            domain,
            ..
        } = st;
        if solids.is_empty() {
            return Ok(());
        }
        let grid = &mut grids[domain.grid];

        for (isolid, solid) in solids.iter().enumerate() {
            solid.compute_mass_nodes(grid, isolid == 0);
        }
        grid.reduce_mass_ghost_nodes(universe)?;

        for (isolid, solid) in solids.iter().enumerate() {
            let reset = isolid == 0;
            if self.transfer == VelocityTransfer::Apic {
                solid.compute_velocity_nodes_apic(grid, reset, false);
            } else {
                solid.compute_velocity_nodes(grid, reset);
            }
            solid.compute_external_forces_nodes(grid, reset);
            solid.compute_internal_forces_nodes_ul(grid, reset);
        }
        grid.reduce_ghost_nodes(universe, false)
    }

    fn update_grid_state(&mut self, st: &mut State) -> MpmResult<()> {
        if st.grids.is_empty() {
            return Ok(());
        }
        st.grids[st.domain.grid].update_grid_velocities(st.update.dt);
        Ok(())
    }

    fn grid_to_points(&mut self, st: &mut State) -> MpmResult<()> {
        let State {
            solids,
            grids,
            domain,
            update,
            ..
        } = st;
        if solids.is_empty() {
            return Ok(());
        }
        let grid = &grids[domain.grid];
        for solid in solids.iter_mut() {
            solid.compute_particle_velocities_and_positions(grid, update.dt);
            solid.compute_particle_acceleration(grid, update.dt);
        }
        Ok(())
    }

    fn advance_particles(&mut self, st: &mut State) -> MpmResult<()> {
        let flip = self.transfer.flip_coefficient();
        let dt = st.update.dt;
        for solid in st.solids.iter_mut() {
            solid.update_particle_velocities(flip, dt);
        }
        Ok(())
    }

    fn velocities_to_grid(&mut self, st: &mut State) -> MpmResult<()> {
        if self.transfer == VelocityTransfer::Apic {
            return Ok(());
        }
        let State {
            universe,
            solids,
            grids,
            domain,
            ..
        } = st;
        if solids.is_empty() {
            return Ok(());
        }
        let grid = &mut grids[domain.grid];
        for (isolid, solid) in solids.iter().enumerate() {
            solid.compute_velocity_nodes(grid, isolid == 0);
        }
        grid.reduce_ghost_nodes(universe, true)
    }

    fn compute_rate_deformation_gradient(
        &mut self,
        st: &mut State,
        use_updated: bool,
    ) -> MpmResult<()> {
        let State {
            solids,
            grids,
            domain,
            ..
        } = st;
        if solids.is_empty() {
            return Ok(());
        }
        let grid = &grids[domain.grid];
        for solid in solids.iter_mut() {
            match self.transfer {
                VelocityTransfer::Apic => {
                    solid.compute_rate_deformation_gradient_apic(grid, false)
                }
                _ if use_updated => solid.compute_rate_deformation_gradient_usl(grid),
                _ => solid.compute_rate_deformation_gradient_musl(grid),
            }
        }
        Ok(())
    }

    fn update_deformation_gradient(&mut self, st: &mut State) -> MpmResult<()> {
        let dt = st.update.dt;
        let timestep = st.update.ntimestep;
        for solid in st.solids.iter_mut() {
            solid.update_deformation_gradient(dt, false, timestep)?;
        }
        Ok(())
    }

    fn update_stress(&mut self, st: &mut State) -> MpmResult<()> {
        if st.solids.is_empty() {
            return Ok(());
        }
        let dt = st.update.dt;
        let timestep = st.update.ntimestep;
        let cellsize = st.grids[st.domain.grid].cellsize;
        for solid in st.solids.iter_mut() {
            solid.update_stress(dt, cellsize, false, timestep)?;
        }
        Ok(())
    }

    fn adjust_dt(&mut self, st: &mut State) -> MpmResult<()> {
        adjust_dt_shared(st)
    }

    fn reset(&mut self, st: &mut State) -> MpmResult<()> {
        reset_shared(st)
    }

    fn exchange_particles(&mut self, st: &mut State) -> MpmResult<()> {
        exchange_particles(st)
    }
}

/// Validates the per-solid stable-step bounds, MIN-reduces them across all
/// ranks and rescales the timestep, unless the user pinned it.
pub(super) fn adjust_dt_shared(st: &mut State) -> MpmResult<()> {
    if st.update.dt_constant {
        return Ok(());
    }
    let mut dt_cfl = DT_CFL_MAX;
    for solid in &st.solids {
        let bound = solid.dt_cfl;
        if bound == 0.0 {
            return Err(MpmError::Numerical {
                timestep: st.update.ntimestep,
                message: format!("solid {}: stable-step bound is zero", solid.id),
            });
        }
        if bound.is_nan() {
            return Err(MpmError::Numerical {
                timestep: st.update.ntimestep,
                message: format!("solid {}: stable-step bound is NaN", solid.id),
            });
        }
        dt_cfl = dt_cfl.min(bound);
    }
    let reduced = st.universe.allreduce_min(dt_cfl)?;
    st.update.dt = reduced * st.update.dt_factor;
    st.vars.insert("dt".to_string(), st.update.dt);
    Ok(())
}

/// Clears the per-step accumulators: the stable-step bound and the particle
/// body-force buffers.
pub(super) fn reset_shared(st: &mut State) -> MpmResult<()> {
    for solid in st.solids.iter_mut() {
        solid.dt_cfl = DT_CFL_MAX;
        for ip in 0..solid.np_local {
            solid.mb[ip] = Vector::zeros();
        }
    }
    Ok(())
}
