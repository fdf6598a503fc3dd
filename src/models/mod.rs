pub use self::damage::Damage;
pub use self::eos::{Eos, EosLinear};
pub use self::strength::{Strength, StrengthLinearElastic};

use crate::math::Real;

mod damage;
mod eos;
mod strength;

/// Computes the Lame parameters (lambda, mu) from the young modulus and poisson ratio.
pub fn lame_lambda_mu(young_modulus: Real, poisson_ratio: Real) -> (Real, Real) {
    (
        young_modulus * poisson_ratio / ((1.0 + poisson_ratio) * (1.0 - 2.0 * poisson_ratio)),
        shear_modulus(young_modulus, poisson_ratio),
    )
}

pub fn shear_modulus(young_modulus: Real, poisson_ratio: Real) -> Real {
    young_modulus / (2.0 * (1.0 + poisson_ratio))
}

pub fn bulk_modulus(young_modulus: Real, poisson_ratio: Real) -> Real {
    young_modulus / (3.0 * (1.0 - 2.0 * poisson_ratio))
}
