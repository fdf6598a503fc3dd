use crate::error::{MpmError, MpmResult};
use crate::math::Real;
use std::collections::HashMap;

/// Time-step counters and the dt policy. After every step the core
/// publishes `dt`, `time` and `timestep` into the variable store.
pub struct Update {
    pub ntimestep: u64,
    /// Elapsed simulation time, accumulated whenever the timestep size
    /// changes or a run ends.
    pub atime: Real,
    pub atimestep: u64,
    pub dt: Real,
    pub dt_constant: bool,
    pub dt_factor: Real,
}

impl Update {
    pub fn new() -> Self {
        Self {
            ntimestep: 0,
            atime: 0.0,
            atimestep: 0,
            dt: 1.0e-16,
            dt_constant: false,
            dt_factor: 0.9,
        }
    }

    /// Pins the timestep; the CFL adjustment becomes a no-op.
    pub fn set_dt(&mut self, dt: Real, vars: &mut HashMap<String, Real>) -> MpmResult<()> {
        if !(dt > 0.0) {
            return Err(MpmError::Config(format!(
                "dt must be positive, got {}",
                dt
            )));
        }
        self.dt = dt;
        self.dt_constant = true;
        vars.insert("dt".to_string(), dt);
        Ok(())
    }

    pub fn set_dt_factor(&mut self, dt_factor: Real) -> MpmResult<()> {
        if !(dt_factor > 0.0) {
            return Err(MpmError::Config(format!(
                "dt factor must be positive, got {}",
                dt_factor
            )));
        }
        self.dt_factor = dt_factor;
        Ok(())
    }

    pub fn update_time(&mut self, vars: &mut HashMap<String, Real>) {
        self.atime += (self.ntimestep - self.atimestep) as Real * self.dt;
        self.atimestep = self.ntimestep;
        vars.insert("time".to_string(), self.atime);
    }

    pub fn update_timestep(&mut self, vars: &mut HashMap<String, Real>) -> u64 {
        self.ntimestep += 1;
        vars.insert("timestep".to_string(), self.ntimestep as Real);
        self.ntimestep
    }
}

impl Default for Update {
    fn default() -> Self {
        Self::new()
    }
}
