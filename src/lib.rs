pub extern crate nalgebra as na;

#[macro_use]
extern crate log;

#[cfg(feature = "serde-serialize")]
#[macro_use]
extern crate serde;

pub mod prelude {
    pub use crate::basis::{NodeType, ShapeFunction};
    pub use crate::compute::{Compute, ComputeKineticEnergy};
    pub use crate::domain::Domain;
    pub use crate::dump::{Dump, DumpStyle};
    pub use crate::error::{MpmError, MpmResult};
    pub use crate::fix::{constant, Fix, FixBodyforce, FixStages, FixVelocityNodes, NodalValue};
    pub use crate::grid::Grid;
    pub use crate::group::{Group, GroupKind, Groups};
    pub use crate::math::*;
    pub use crate::method::{Method, Tlmpm, Ulmpm, VelocityTransfer};
    pub use crate::models::*;
    pub use crate::scheme::{Scheme, Stage};
    pub use crate::simulation::{Simulation, State};
    pub use crate::solid::{Material, Solid, COMM_N};
    pub use crate::universe::Universe;
    pub use crate::update::Update;
}

pub mod math {
    pub type Real = f64;
    pub type Vector = crate::na::Vector3<Real>;
    pub type Matrix = crate::na::Matrix3<Real>;

    /// Largest admissible stable-step sentinel, reset at the start of every step.
    pub const DT_CFL_MAX: Real = 1.0e22;

    #[inline]
    pub fn inv_exact(e: Real) -> Real {
        // We don't want to use any threshold here.
        if e == 0.0 {
            0.0
        } else {
            1.0 / e
        }
    }

    #[inline]
    pub fn spherical_part(tensor: &Matrix) -> Real {
        tensor.trace() / 3.0
    }

    #[inline]
    pub fn deviatoric_part(tensor: &Matrix) -> Matrix {
        let mut dev = *tensor;
        let p = spherical_part(tensor);
        for i in 0..3 {
            dev[(i, i)] -= p;
        }
        dev
    }

    /// Von-Mises equivalent stress, `sqrt(3/2) * |dev(sigma)|`.
    #[inline]
    pub fn von_mises(sigma: &Matrix) -> Real {
        (3.0 / 2.0_f64).sqrt() * deviatoric_part(sigma).norm()
    }

    #[inline]
    pub fn strain_rate(velocity_gradient: &Matrix) -> Matrix {
        (velocity_gradient + velocity_gradient.transpose()) * 0.5
    }

    #[inline]
    pub fn spin_tensor(velocity_gradient: &Matrix) -> Matrix {
        (velocity_gradient - velocity_gradient.transpose()) * 0.5
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn deviator_is_traceless() {
            let t = Matrix::new(1.0, 2.0, 3.0, 2.0, 5.0, 4.0, 3.0, 4.0, 9.0);
            let dev = deviatoric_part(&t);
            assert!(dev.trace().abs() < 1.0e-14);
            let recomposed = dev + Matrix::identity() * spherical_part(&t);
            assert!((recomposed - t).norm() < 1.0e-14);
        }

        #[test]
        fn von_mises_uniaxial() {
            // Uniaxial tension: seq equals the axial stress.
            let mut sigma = Matrix::zeros();
            sigma[(0, 0)] = 250.0;
            assert!((von_mises(&sigma) - 250.0).abs() < 1.0e-9);
        }
    }
}

pub mod basis;
pub mod compute;
pub mod domain;
pub mod dump;
pub mod error;
pub mod fix;
pub mod grid;
pub mod group;
pub mod method;
pub mod models;
pub mod scheme;
pub mod simulation;
pub mod solid;
pub mod universe;
pub mod update;
