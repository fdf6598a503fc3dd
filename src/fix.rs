use crate::error::{MpmError, MpmResult};
use crate::group::{GroupKind, Groups};
use crate::math::{Real, Vector};
use crate::simulation::State;

bitflags::bitflags! {
    /// Stages a fix can attach to.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct FixStages: u32 {
        const POST_PARTICLES_TO_GRID = 1 << 0;
        const POST_UPDATE_GRID_STATE = 1 << 1;
    }
}

/// External per-step callback attached at well-defined stages. Hooks run
/// after every solid has completed the stage's core action; the
/// post-particles-to-grid hook in particular sees fully reduced nodes.
pub trait Fix: Send {
    fn id(&self) -> &str;
    fn stages(&self) -> FixStages;

    fn post_particles_to_grid(&mut self, _st: &mut State) -> MpmResult<()> {
        Ok(())
    }

    fn post_update_grid_state(&mut self, _st: &mut State) -> MpmResult<()> {
        Ok(())
    }
}

/// Per-axis evaluator over a node's reference position.
pub type NodalValue = Box<dyn Fn(Real, Real, Real) -> Real + Send + Sync>;

/// Constant shorthand for [`NodalValue`].
pub fn constant(value: Real) -> NodalValue {
    Box::new(move |_, _, _| value)
}

/// Adds a body force (per unit mass) to the grid's external forces after
/// the particle-to-grid reduction; the reduced total force is published as
/// `<id>_x`, `<id>_y`, `<id>_z`.
pub struct FixBodyforce {
    id: String,
    groupbit: u32,
    values: [Option<NodalValue>; 3],
}

impl FixBodyforce {
    pub fn new(
        id: &str,
        groups: &Groups,
        group: &str,
        values: [Option<NodalValue>; 3],
    ) -> MpmResult<Self> {
        let group = groups.find(group)?;
        if group.kind == GroupKind::Particles {
            return Err(MpmError::Config(format!(
                "fix {}: body force needs a group of nodes, {:?} is a group of particles",
                id, group.name
            )));
        }
        if values.iter().all(|v| v.is_none()) {
            return Err(MpmError::Config(format!(
                "fix {}: body force needs at least one component",
                id
            )));
        }
        info!("creating fix body force with id {}", id);
        Ok(Self {
            id: id.to_string(),
            groupbit: group.bit,
            values,
        })
    }
}

impl Fix for FixBodyforce {
    fn id(&self) -> &str {
        &self.id
    }

    fn stages(&self) -> FixStages {
        FixStages::POST_PARTICLES_TO_GRID
    }

    fn post_particles_to_grid(&mut self, st: &mut State) -> MpmResult<()> {
        let mut ftot = Vector::zeros();
        for grid in st.grids.iter_mut() {
            for in_ in 0..grid.nnodes_total() {
                if grid.mass[in_] <= 0.0 || grid.mask[in_] & self.groupbit == 0 {
                    continue;
                }
                let x0 = grid.x0[in_];
                let mut f = Vector::zeros();
                for d in 0..3 {
                    if let Some(value) = &self.values[d] {
                        f[d] = value(x0.x, x0.y, x0.z);
                    }
                }
                f *= grid.mass[in_];
                grid.mb[in_] += f;
                if !grid.is_ghost(in_) {
                    ftot += f;
                }
            }
        }

        let reduced = st.universe.allreduce_sum(ftot.as_slice())?;
        for (d, suffix) in ["_x", "_y", "_z"].iter().enumerate() {
            if self.values[d].is_some() {
                st.vars.insert(format!("{}{}", self.id, suffix), reduced[d]);
            }
        }
        Ok(())
    }
}

/// Dirichlet nodal velocities: overrides components of `v_update` on a node
/// group after the grid momenta have been advanced.
pub struct FixVelocityNodes {
    id: String,
    groupbit: u32,
    values: [Option<NodalValue>; 3],
}

impl FixVelocityNodes {
    pub fn new(
        id: &str,
        groups: &Groups,
        group: &str,
        values: [Option<NodalValue>; 3],
    ) -> MpmResult<Self> {
        let group = groups.find(group)?;
        if group.kind == GroupKind::Particles {
            return Err(MpmError::Config(format!(
                "fix {}: nodal velocities need a group of nodes, {:?} is a group of particles",
                id, group.name
            )));
        }
        info!("creating fix velocity nodes with id {}", id);
        Ok(Self {
            id: id.to_string(),
            groupbit: group.bit,
            values,
        })
    }
}

impl Fix for FixVelocityNodes {
    fn id(&self) -> &str {
        &self.id
    }

    fn stages(&self) -> FixStages {
        FixStages::POST_UPDATE_GRID_STATE
    }

    fn post_update_grid_state(&mut self, st: &mut State) -> MpmResult<()> {
        for grid in st.grids.iter_mut() {
            for in_ in 0..grid.nnodes_total() {
                if grid.mask[in_] & self.groupbit == 0 {
                    continue;
                }
                let x0 = grid.x0[in_];
                for d in 0..3 {
                    if let Some(value) = &self.values[d] {
                        grid.v_update[in_][d] = value(x0.x, x0.y, x0.z);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_force_rejects_particle_groups() {
        let mut groups = Groups::new();
        groups.create("pset", GroupKind::Particles).unwrap();
        let err = FixBodyforce::new(
            "grav",
            &groups,
            "pset",
            [None, Some(constant(-9.81)), None],
        );
        assert!(err.is_err());
        assert!(FixBodyforce::new("grav", &groups, "all", [None, None, None]).is_err());
        assert!(FixBodyforce::new(
            "grav",
            &groups,
            "all",
            [None, Some(constant(-9.81)), None]
        )
        .is_ok());
    }
}
