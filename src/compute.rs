use crate::error::{MpmError, MpmResult};
use crate::group::{GroupKind, Groups};
use crate::simulation::State;

/// Per-step reduced diagnostic published into the variable store.
pub trait Compute: Send {
    fn id(&self) -> &str;
    fn compute_value(&mut self, st: &mut State) -> MpmResult<()>;
}

/// Total kinetic energy `sum 1/2 m |v|^2` of a particle group, allreduced
/// and published under the compute's id.
pub struct ComputeKineticEnergy {
    id: String,
    groupbit: u32,
}

impl ComputeKineticEnergy {
    pub fn new(id: &str, groups: &Groups, group: &str) -> MpmResult<Self> {
        let group = groups.find(group)?;
        if group.kind == GroupKind::Nodes {
            return Err(MpmError::Config(format!(
                "compute {}: kinetic energy needs a group of particles, {:?} is a group of nodes",
                id, group.name
            )));
        }
        Ok(Self {
            id: id.to_string(),
            groupbit: group.bit,
        })
    }
}

impl Compute for ComputeKineticEnergy {
    fn id(&self) -> &str {
        &self.id
    }

    fn compute_value(&mut self, st: &mut State) -> MpmResult<()> {
        let mut ke = 0.0;
        for solid in &st.solids {
            for ip in 0..solid.np_local {
                if solid.mask[ip] & self.groupbit != 0 {
                    ke += 0.5 * solid.mass[ip] * solid.v[ip].norm_squared();
                }
            }
        }
        let reduced = st.universe.allreduce_sum(&[ke])?;
        st.vars.insert(self.id.clone(), reduced[0]);
        Ok(())
    }
}
