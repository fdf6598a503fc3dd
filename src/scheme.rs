use crate::error::{MpmError, MpmResult};

/// One step stage; the driver maps each to the method operation or fix hook
/// of the same name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    ExchangeParticles,
    ComputeWeights,
    Reset,
    ParticlesToGrid,
    PostParticlesToGridFixes,
    UpdateGridState,
    GridToPoints,
    AdvanceParticles,
    VelocitiesToGrid,
    /// Velocity-gradient reconstruction; `use_updated` picks the
    /// force-updated nodal velocities over the (re-)scattered ones.
    RateDeformationGradient { use_updated: bool },
    UpdateDeformationGradient,
    UpdateStress,
    AdjustDt,
    UpdateTime,
    UpdateTimestep,
}

/// A declarative stage ordering. Adding a scheme means listing its stages.
pub struct Scheme {
    pub style: &'static str,
    pub stages: Vec<Stage>,
}

impl Scheme {
    /// Modified update-stress-last: particle velocities are scattered back
    /// to the grid a second time before the velocity gradient is formed.
    pub fn musl() -> Self {
        Self {
            style: "musl",
            stages: vec![
                Stage::ExchangeParticles,
                Stage::ComputeWeights,
                Stage::Reset,
                Stage::ParticlesToGrid,
                Stage::PostParticlesToGridFixes,
                Stage::UpdateGridState,
                Stage::GridToPoints,
                Stage::AdvanceParticles,
                Stage::VelocitiesToGrid,
                Stage::RateDeformationGradient { use_updated: false },
                Stage::UpdateDeformationGradient,
                Stage::UpdateStress,
                Stage::AdjustDt,
                Stage::UpdateTime,
                Stage::UpdateTimestep,
            ],
        }
    }

    /// Update-stress-last without the second scatter: the velocity gradient
    /// comes from the force-updated nodal velocities.
    pub fn usl() -> Self {
        Self {
            style: "usl",
            stages: vec![
                Stage::ExchangeParticles,
                Stage::ComputeWeights,
                Stage::Reset,
                Stage::ParticlesToGrid,
                Stage::PostParticlesToGridFixes,
                Stage::UpdateGridState,
                Stage::GridToPoints,
                Stage::AdvanceParticles,
                Stage::RateDeformationGradient { use_updated: true },
                Stage::UpdateDeformationGradient,
                Stage::UpdateStress,
                Stage::AdjustDt,
                Stage::UpdateTime,
                Stage::UpdateTimestep,
            ],
        }
    }

    /// Update-stress-first: the constitutive update runs on the freshly
    /// reduced nodal velocities, before the grid momenta advance.
    pub fn usf() -> Self {
        Self {
            style: "usf",
            stages: vec![
                Stage::ExchangeParticles,
                Stage::ComputeWeights,
                Stage::Reset,
                Stage::ParticlesToGrid,
                Stage::PostParticlesToGridFixes,
                Stage::RateDeformationGradient { use_updated: false },
                Stage::UpdateDeformationGradient,
                Stage::UpdateStress,
                Stage::UpdateGridState,
                Stage::GridToPoints,
                Stage::AdvanceParticles,
                Stage::AdjustDt,
                Stage::UpdateTime,
                Stage::UpdateTimestep,
            ],
        }
    }
}

type SchemeConstructor = fn() -> Scheme;

fn registry() -> [(&'static str, SchemeConstructor); 3] {
    [
        ("musl", Scheme::musl),
        ("usl", Scheme::usl),
        ("usf", Scheme::usf),
    ]
}

pub fn create_scheme(args: &[&str]) -> MpmResult<Scheme> {
    let style = *args
        .first()
        .ok_or_else(|| MpmError::Config("scheme command: not enough arguments".to_string()))?;
    if args.len() > 1 {
        return Err(MpmError::Config(format!(
            "scheme command: too many arguments ({})",
            args.len()
        )));
    }
    for (key, constructor) in registry() {
        if key == style {
            return Ok(constructor());
        }
    }
    Err(MpmError::Config(format!("unknown scheme style {:?}", style)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_all_styles() {
        for style in ["musl", "usl", "usf"] {
            let scheme = create_scheme(&[style]).unwrap();
            assert_eq!(scheme.style, style);
            assert!(scheme.stages.contains(&Stage::ParticlesToGrid));
            assert_eq!(scheme.stages.last(), Some(&Stage::UpdateTimestep));
        }
        assert!(create_scheme(&["leapfrog"]).is_err());
        assert!(create_scheme(&[]).is_err());
        assert!(create_scheme(&["musl", "extra"]).is_err());
    }

    #[test]
    fn musl_rescatters_before_the_gradient() {
        let stages = Scheme::musl().stages;
        let scatter = stages
            .iter()
            .position(|s| *s == Stage::VelocitiesToGrid)
            .unwrap();
        let gradient = stages
            .iter()
            .position(|s| matches!(s, Stage::RateDeformationGradient { .. }))
            .unwrap();
        assert!(scatter < gradient);
        assert!(!Scheme::usl().stages.contains(&Stage::VelocitiesToGrid));
    }

    #[test]
    fn usf_updates_stress_before_the_grid() {
        let stages = Scheme::usf().stages;
        let stress = stages.iter().position(|s| *s == Stage::UpdateStress).unwrap();
        let grid = stages
            .iter()
            .position(|s| *s == Stage::UpdateGridState)
            .unwrap();
        assert!(stress < grid);
    }
}
