use super::ulmpm::{adjust_dt_shared, reset_shared};
use super::{compute_weights, parse_method_args, Method, VelocityTransfer};
use crate::basis::ShapeFunction;
use crate::error::MpmResult;
use crate::simulation::State;

/// Total-Lagrangian MPM: each solid carries its own grid, weights are
/// evaluated against the reference configuration once, and internal forces
/// use the first Piola-Kirchhoff stress with reference volumes.
pub struct Tlmpm {
    transfer: VelocityTransfer,
    shape: ShapeFunction,
    update_wf: bool,
}

impl Tlmpm {
    pub fn new(args: &[&str]) -> MpmResult<Self> {
        let (transfer, shape) = parse_method_args(args)?;
        info!(
            "tlmpm: {:?} transfer with {} basis functions",
            transfer,
            shape.name()
        );
        Ok(Self {
            transfer,
            shape,
            update_wf: true,
        })
    }
}

impl Method for Tlmpm {
    fn style(&self) -> &'static str {
        "tlmpm"
    }

    fn shape_function(&self) -> ShapeFunction {
        self.shape
    }

    fn is_total_lagrangian(&self) -> bool {
        true
    }

    fn compute_grid_weight_functions_and_gradients(&mut self, st: &mut State) -> MpmResult<()> {
        // Reference-configuration weights never change; computed once.
        if !self.update_wf {
            return Ok(());
        }
        let State {
            solids,
            grids,
            domain,
            ..
        } = st;
        for solid in solids.iter_mut() {
            let grid = &mut grids[solid.grid];
            grid.reset_rigid();
            compute_weights(solid, grid, domain, self.shape, true);
            if self.transfer == VelocityTransfer::Apic {
                solid.compute_inertia_tensor(grid, domain.dimension, true)?;
            }
        }
        self.update_wf = false;
        Ok(())
    }

    fn particles_to_grid(&mut self, st: &mut State) -> MpmResult<()> {
        let State {
            universe,
            solids,
            grids,
            ..
        } = st;
        for solid in solids.iter() {
            let grid = &mut grids[solid.grid];
            solid.compute_mass_nodes(grid, true);
            grid.reduce_mass_ghost_nodes(universe)?;

            if self.transfer == VelocityTransfer::Apic {
                solid.compute_velocity_nodes_apic(grid, true, true);
            } else {
                solid.compute_velocity_nodes(grid, true);
            }
            solid.compute_external_forces_nodes(grid, true);
            solid.compute_internal_forces_nodes_tl(grid, true)?;
            grid.reduce_ghost_nodes(universe, false)?;
        }
        Ok(())
    }

    fn update_grid_state(&mut self, st: &mut State) -> MpmResult<()> {
        let dt = st.update.dt;
        for solid in st.solids.iter() {
            st.grids[solid.grid].update_grid_velocities(dt);
        }
        Ok(())
    }

    fn grid_to_points(&mut self, st: &mut State) -> MpmResult<()> {
        let State {
            solids,
            grids,
            update,
            ..
        } = st;
        for solid in solids.iter_mut() {
            let grid = &grids[solid.grid];
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
            ..
        } = st;
        for solid in solids.iter() {
            let grid = &mut grids[solid.grid];
            solid.compute_velocity_nodes(grid, true);
            grid.reduce_ghost_nodes(universe, true)?;
        }
        Ok(())
    }

    fn compute_rate_deformation_gradient(
        &mut self,
        st: &mut State,
        use_updated: bool,
    ) -> MpmResult<()> {
        let State { solids, grids, .. } = st;
        for solid in solids.iter_mut() {
            let grid = &grids[solid.grid];
            match self.transfer {
                VelocityTransfer::Apic => {
                    solid.compute_rate_deformation_gradient_apic(grid, true)
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
            solid.update_deformation_gradient(dt, true, timestep)?;
        }
        Ok(())
    }

    fn update_stress(&mut self, st: &mut State) -> MpmResult<()> {
        let dt = st.update.dt;
        let timestep = st.update.ntimestep;
        let State { solids, grids, .. } = st;
        for solid in solids.iter_mut() {
            let cellsize = grids[solid.grid].cellsize;
            solid.update_stress(dt, cellsize, true, timestep)?;
        }
        Ok(())
    }

    fn adjust_dt(&mut self, st: &mut State) -> MpmResult<()> {
        adjust_dt_shared(st)
    }

    fn reset(&mut self, st: &mut State) -> MpmResult<()> {
        reset_shared(st)
    }

    fn exchange_particles(&mut self, _st: &mut State) -> MpmResult<()> {
        // Ownership follows the reference configuration, which never moves.
        Ok(())
    }
}
