use crate::math::{Matrix, Real};

/// Deviatoric part of the constitutive update.
pub trait Strength: Send + Sync {
    fn shear_modulus(&self) -> Real;

    /// Advances the deviatoric stress under the given deviatoric strain rate
    /// and spin; returns the new deviator and the equivalent plastic strain
    /// rate.
    fn update_deviatoric(
        &self,
        sigma_dev: &Matrix,
        strain_rate_dev: &Matrix,
        spin: &Matrix,
        dt: Real,
        eff_plastic_strain: Real,
    ) -> (Matrix, Real);
}

/// Hypoelastic deviator with a Jaumann objective rate, no yield surface.
pub struct StrengthLinearElastic {
    g: Real,
}

impl StrengthLinearElastic {
    pub fn new(g: Real) -> Self {
        Self { g }
    }
}

impl Strength for StrengthLinearElastic {
    fn shear_modulus(&self) -> Real {
        self.g
    }

    fn update_deviatoric(
        &self,
        sigma_dev: &Matrix,
        strain_rate_dev: &Matrix,
        spin: &Matrix,
        dt: Real,
        _eff_plastic_strain: Real,
    ) -> (Matrix, Real) {
        let rotated = spin * sigma_dev - sigma_dev * spin;
        (
            sigma_dev + (strain_rate_dev * (2.0 * self.g) + rotated) * dt,
            0.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{deviatoric_part, strain_rate};

    #[test]
    fn pure_shear_rate_builds_shear_stress() {
        let strength = StrengthLinearElastic::new(80.0e9);
        let mut l = Matrix::zeros();
        l[(0, 1)] = 1.0e-3;
        let d = strain_rate(&l);
        let d_dev = deviatoric_part(&d);
        let (s, epdot) = strength.update_deviatoric(
            &Matrix::zeros(),
            &d_dev,
            &Matrix::zeros(),
            1.0e-6,
            0.0,
        );
        // ds = 2 G D dt on the shear component.
        let expected = 2.0 * 80.0e9 * 0.5e-3 * 1.0e-6;
        assert!((s[(0, 1)] - expected).abs() / expected < 1.0e-12);
        assert_eq!(epdot, 0.0);
        assert!(s.trace().abs() < 1.0e-9);
    }

    #[test]
    fn spin_rotates_without_growing() {
        let strength = StrengthLinearElastic::new(1.0);
        let mut s0 = Matrix::zeros();
        s0[(0, 0)] = 1.0;
        s0[(1, 1)] = -1.0;
        let mut w = Matrix::zeros();
        w[(0, 1)] = -1.0;
        w[(1, 0)] = 1.0;
        let (s, _) = strength.update_deviatoric(&s0, &Matrix::zeros(), &w, 1.0e-4, 0.0);
        // The Jaumann term is norm-preserving to first order.
        assert!((s.norm() - s0.norm()).abs() < 1.0e-6);
    }
}
