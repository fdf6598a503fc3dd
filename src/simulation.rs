use crate::compute::Compute;
use crate::domain::Domain;
use crate::dump::Dump;
use crate::error::{MpmError, MpmResult};
use crate::fix::{Fix, FixStages};
use crate::grid::Grid;
use crate::group::Groups;
use crate::math::{Real, Vector};
use crate::method::{self, Method};
use crate::scheme::{self, Scheme, Stage};
use crate::solid::{Material, Solid};
use crate::universe::Universe;
use crate::update::Update;
use std::collections::HashMap;

/// Everything the kernels touch, gathered in one place so the cross
/// references between solids, grids and the domain collapse to arena
/// indices.
pub struct State {
    pub universe: Universe,
    pub domain: Domain,
    pub solids: Vec<Solid>,
    pub grids: Vec<Grid>,
    pub update: Update,
    pub groups: Groups,
    /// Values the core publishes after each step: `dt`, `time`, `timestep`,
    /// fix force components, compute results.
    pub vars: HashMap<String, Real>,
}

/// The simulation root: owns the state arena, the scheme and method, and
/// the attached fixes, computes and dumps. Drives the scheme's stage list
/// once per step.
pub struct Simulation {
    pub state: State,
    pub scheme: Scheme,
    method: Option<Box<dyn Method>>,
    fixes: Vec<Box<dyn Fix>>,
    computes: Vec<Box<dyn Compute>>,
    dumps: Vec<Dump>,
}

impl Simulation {
    pub fn new(universe: Universe, mut domain: Domain) -> MpmResult<Self> {
        domain.decompose(&universe)?;
        Ok(Self {
            state: State {
                universe,
                domain,
                solids: vec![],
                grids: vec![],
                update: Update::new(),
                groups: Groups::new(),
                vars: HashMap::new(),
            },
            scheme: Scheme::musl(),
            method: None,
            fixes: vec![],
            computes: vec![],
            dumps: vec![],
        })
    }

    /// Selects the stage ordering, e.g. `["musl"]`.
    pub fn create_scheme(&mut self, args: &[&str]) -> MpmResult<()> {
        self.scheme = scheme::create_scheme(args)?;
        Ok(())
    }

    /// Selects the formulation, transfer and shape function, e.g.
    /// `["ulmpm", "FLIP", "cubic-spline", "0.99"]`. Must run before solids
    /// are added: the shape function dictates the grid layout.
    pub fn create_method(&mut self, args: &[&str]) -> MpmResult<()> {
        if !self.state.solids.is_empty() {
            return Err(MpmError::Config(
                "the method must be defined before solids are created".to_string(),
            ));
        }
        self.method = Some(method::create_method(args)?);
        Ok(())
    }

    pub fn set_dt(&mut self, dt: Real) -> MpmResult<()> {
        self.state.update.set_dt(dt, &mut self.state.vars)
    }

    pub fn set_dt_factor(&mut self, dt_factor: Real) -> MpmResult<()> {
        self.state.update.set_dt_factor(dt_factor)
    }

    /// Creates a solid from the full seed list `(position, volume)`; every
    /// rank passes the same list and keeps its subdomain's particles. The
    /// updated-Lagrangian formulation shares one background grid between
    /// all solids; the total-Lagrangian one allocates a grid per solid.
    pub fn add_solid(
        &mut self,
        id: &str,
        mat: Material,
        particles: &[(Vector, Real)],
    ) -> MpmResult<usize> {
        let method = self.method.as_ref().ok_or_else(|| {
            MpmError::Config("a method must be defined before solids are created".to_string())
        })?;
        let shape = method.shape_function();

        let grid = if method.is_total_lagrangian() {
            self.state.grids.push(Grid::init(
                &self.state.domain,
                &self.state.universe,
                shape,
            )?);
            self.state.grids.len() - 1
        } else {
            if self.state.grids.is_empty() {
                self.state.grids.push(Grid::init(
                    &self.state.domain,
                    &self.state.universe,
                    shape,
                )?);
            }
            self.state.domain.grid
        };

        let solid = Solid::new(id, mat, grid, particles, &self.state.domain);
        info!(
            "solid {}: {} particles, {} on rank {}",
            id, solid.np, solid.np_local, self.state.universe.rank
        );
        self.state.solids.push(solid);
        Ok(self.state.solids.len() - 1)
    }

    pub fn add_fix(&mut self, fix: Box<dyn Fix>) {
        self.fixes.push(fix);
    }

    pub fn add_compute(&mut self, compute: Box<dyn Compute>) {
        self.computes.push(compute);
    }

    pub fn add_dump(&mut self, dump: Dump) {
        self.dumps.push(dump);
    }

    pub fn run(&mut self, nsteps: u64) -> MpmResult<()> {
        for _ in 0..nsteps {
            self.step()?;
        }
        // Fold the trailing steps into the elapsed time.
        let State { update, vars, .. } = &mut self.state;
        update.update_time(vars);
        Ok(())
    }

    pub fn step(&mut self) -> MpmResult<()> {
        let mut method = self
            .method
            .take()
            .ok_or_else(|| MpmError::Config("no method defined".to_string()))?;
        let result = self.run_stages(method.as_mut());
        self.method = Some(method);
        result?;

        for compute in &mut self.computes {
            compute.compute_value(&mut self.state)?;
        }
        for dump in &self.dumps {
            if dump.every > 0 && self.state.update.ntimestep % dump.every == 0 {
                dump.write(&self.state)?;
            }
        }
        Ok(())
    }

    fn run_stages(&mut self, method: &mut dyn Method) -> MpmResult<()> {
        let stages = self.scheme.stages.clone();
        for stage in stages {
            match stage {
                Stage::ExchangeParticles => method.exchange_particles(&mut self.state)?,
                Stage::ComputeWeights => {
                    method.compute_grid_weight_functions_and_gradients(&mut self.state)?
                }
                Stage::Reset => method.reset(&mut self.state)?,
                Stage::ParticlesToGrid => method.particles_to_grid(&mut self.state)?,
                Stage::PostParticlesToGridFixes => {
                    self.apply_fixes(FixStages::POST_PARTICLES_TO_GRID)?
                }
                Stage::UpdateGridState => {
                    method.update_grid_state(&mut self.state)?;
                    self.apply_fixes(FixStages::POST_UPDATE_GRID_STATE)?;
                }
                Stage::GridToPoints => method.grid_to_points(&mut self.state)?,
                Stage::AdvanceParticles => method.advance_particles(&mut self.state)?,
                Stage::VelocitiesToGrid => method.velocities_to_grid(&mut self.state)?,
                Stage::RateDeformationGradient { use_updated } => {
                    method.compute_rate_deformation_gradient(&mut self.state, use_updated)?
                }
                Stage::UpdateDeformationGradient => {
                    method.update_deformation_gradient(&mut self.state)?
                }
                Stage::UpdateStress => method.update_stress(&mut self.state)?,
                Stage::AdjustDt => method.adjust_dt(&mut self.state)?,
                Stage::UpdateTime => {
                    let State { update, vars, .. } = &mut self.state;
                    update.update_time(vars);
                }
                Stage::UpdateTimestep => {
                    let State { update, vars, .. } = &mut self.state;
                    update.update_timestep(vars);
                }
            }
        }
        Ok(())
    }

    fn apply_fixes(&mut self, stage: FixStages) -> MpmResult<()> {
        for fix in &mut self.fixes {
            if !fix.stages().contains(stage) {
                continue;
            }
            if stage == FixStages::POST_PARTICLES_TO_GRID {
                fix.post_particles_to_grid(&mut self.state)?;
            } else if stage == FixStages::POST_UPDATE_GRID_STATE {
                fix.post_update_grid_state(&mut self.state)?;
            }
        }
        Ok(())
    }

    /// Total particle mass held by this rank.
    pub fn local_mass(&self) -> Real {
        self.state
            .solids
            .iter()
            .map(|s| s.mass[..s.np_local].iter().sum::<Real>())
            .sum()
    }

    /// Local particle count across all solids.
    pub fn local_np(&self) -> usize {
        self.state.solids.iter().map(|s| s.np_local).sum()
    }
}
