use crate::math::Real;
use thiserror::Error;

/// Errors raised by the simulator core.
///
/// Setup-time errors are collective: every rank evaluates the same inputs and
/// raises the same variant. Step-time errors are rank-local and abort the run.
#[derive(Error, Debug)]
pub enum MpmError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("numerical error at timestep {timestep}: {message}")]
    Numerical { timestep: u64, message: String },

    #[error("distribution error on rank {rank}: {message}")]
    Distribution { rank: usize, message: String },

    #[error("particle {tag} at ({x}, {y}, {z}) is claimed by no subdomain")]
    DomainLoss { tag: usize, x: Real, y: Real, z: Real },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MpmResult<T> = Result<T, MpmError>;
