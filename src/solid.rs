use crate::domain::Domain;
use crate::error::{MpmError, MpmResult};
use crate::grid::Grid;
use crate::math::{
    deviatoric_part, spin_tensor, strain_rate, Matrix, Real, Vector, DT_CFL_MAX,
};
use crate::models::{Damage, Eos, Strength};
use ordered_float::NotNan;
use rayon::prelude::*;

/// Doubles per particle in the migration schema: tag, x, x0, v, the full
/// deformation gradient, the six independent stress components, volumes,
/// mass, plastic state, damage state, body force, and the group mask.
pub const COMM_N: usize = 36;

/// Constitutive bundle attached to a solid.
pub struct Material {
    pub eos: Box<dyn Eos>,
    pub strength: Option<Box<dyn Strength>>,
    pub damage: Option<Box<dyn Damage>>,
    pub rigid: bool,
}

impl Material {
    pub fn fluid(eos: impl Eos + 'static) -> Self {
        Self {
            eos: Box::new(eos),
            strength: None,
            damage: None,
            rigid: false,
        }
    }

    pub fn elastic(eos: impl Eos + 'static, strength: impl Strength + 'static) -> Self {
        Self {
            eos: Box::new(eos),
            strength: Some(Box::new(strength)),
            damage: None,
            rigid: false,
        }
    }

    pub fn with_damage(mut self, damage: impl Damage + 'static) -> Self {
        self.damage = Some(Box::new(damage));
        self
    }

    pub fn rigid(eos: impl Eos + 'static) -> Self {
        Self {
            eos: Box::new(eos),
            strength: None,
            damage: None,
            rigid: true,
        }
    }

    pub fn sound_speed(&self, density: Real) -> Real {
        if self.rigid {
            return 0.0;
        }
        let k = self.eos.bulk_modulus();
        let g = self.strength.as_ref().map_or(0.0, |s| s.shear_modulus());
        ((k + 4.0 / 3.0 * g) / density).sqrt()
    }
}

/// One body: particle state in parallel flat arrays indexed `0..np_local`,
/// its constitutive models, and the arena index of its background grid.
/// Particles are permuted freely by migration; ordering is not semantic.
pub struct Solid {
    pub id: String,
    /// Global particle count across all ranks.
    pub np: usize,
    pub np_local: usize,

    pub ptag: Vec<usize>,
    pub x0: Vec<Vector>,
    pub x: Vec<Vector>,
    pub v: Vec<Vector>,
    pub v_update: Vec<Vector>,
    pub a: Vec<Vector>,
    /// External body force on the particle.
    pub mb: Vec<Vector>,
    /// Internal force gathered back from the grid.
    pub f: Vec<Vector>,
    pub vol0: Vec<Real>,
    pub vol: Vec<Real>,
    pub mass: Vec<Real>,
    pub density: Vec<Real>,
    /// Deformation gradient.
    pub def_grad: Vec<Matrix>,
    /// Velocity gradient (or its material-rate counterpart in the
    /// total-Lagrangian formulation).
    pub rate_l: Vec<Matrix>,
    pub sigma: Vec<Matrix>,
    pub eff_plastic_strain: Vec<Real>,
    pub eff_plastic_strain_rate: Vec<Real>,
    pub damage: Vec<Real>,
    pub damage_init: Vec<Real>,
    pub mask: Vec<u32>,
    /// APIC affine-momentum matrix and cached inverse inertia tensor.
    pub apic_bp: Vec<Matrix>,
    pub apic_di: Vec<Matrix>,

    pub neigh_pn: Vec<Vec<usize>>,
    pub wf_pn: Vec<Vec<Real>>,
    pub wfd_pn: Vec<Vec<Vector>>,
    pub neigh_np: Vec<Vec<usize>>,
    pub wf_np: Vec<Vec<Real>>,
    pub wfd_np: Vec<Vec<Vector>>,

    pub dt_cfl: Real,
    pub comm_n: usize,
    pub mat: Material,
    /// Arena index of this solid's grid.
    pub grid: usize,
}

impl Solid {
    /// Builds a solid from the full particle seed list; every rank receives
    /// the same list and keeps the particles its subdomain claims. Tags are
    /// 1-based positions in the seed list, identical on every rank.
    pub fn new(
        id: &str,
        mat: Material,
        grid: usize,
        particles: &[(Vector, Real)],
        domain: &Domain,
    ) -> Self {
        let rho0 = mat.eos.rho0();
        let mut solid = Self {
            id: id.to_string(),
            np: particles.len(),
            np_local: 0,
            ptag: vec![],
            x0: vec![],
            x: vec![],
            v: vec![],
            v_update: vec![],
            a: vec![],
            mb: vec![],
            f: vec![],
            vol0: vec![],
            vol: vec![],
            mass: vec![],
            density: vec![],
            def_grad: vec![],
            rate_l: vec![],
            sigma: vec![],
            eff_plastic_strain: vec![],
            eff_plastic_strain_rate: vec![],
            damage: vec![],
            damage_init: vec![],
            mask: vec![],
            apic_bp: vec![],
            apic_di: vec![],
            neigh_pn: vec![],
            wf_pn: vec![],
            wfd_pn: vec![],
            neigh_np: vec![],
            wf_np: vec![],
            wfd_np: vec![],
            dt_cfl: DT_CFL_MAX,
            comm_n: COMM_N,
            mat,
            grid,
        };

        for (i, &(x, vol)) in particles.iter().enumerate() {
            if !domain.inside_subdomain(x.x, x.y, x.z) {
                continue;
            }
            let n = solid.np_local + 1;
            solid.grow(n);
            let ip = solid.np_local;
            solid.ptag[ip] = i + 1;
            solid.x0[ip] = x;
            solid.x[ip] = x;
            solid.vol0[ip] = vol;
            solid.vol[ip] = vol;
            solid.mass[ip] = rho0 * vol;
            solid.density[ip] = rho0;
            solid.np_local = n;
        }
        solid
    }

    /// Grows every particle array to at least `n` slots, preserving the
    /// resident prefix. Slots past `np_local` hold neutral defaults.
    pub fn grow(&mut self, n: usize) {
        if n <= self.ptag.len() {
            return;
        }
        self.ptag.resize(n, 0);
        self.x0.resize(n, Vector::zeros());
        self.x.resize(n, Vector::zeros());
        self.v.resize(n, Vector::zeros());
        self.v_update.resize(n, Vector::zeros());
        self.a.resize(n, Vector::zeros());
        self.mb.resize(n, Vector::zeros());
        self.f.resize(n, Vector::zeros());
        self.vol0.resize(n, 0.0);
        self.vol.resize(n, 0.0);
        self.mass.resize(n, 0.0);
        self.density.resize(n, 0.0);
        self.def_grad.resize(n, Matrix::identity());
        self.rate_l.resize(n, Matrix::zeros());
        self.sigma.resize(n, Matrix::zeros());
        self.eff_plastic_strain.resize(n, 0.0);
        self.eff_plastic_strain_rate.resize(n, 0.0);
        self.damage.resize(n, 0.0);
        self.damage_init.resize(n, 0.0);
        self.mask.resize(n, 1);
        self.apic_bp.resize(n, Matrix::zeros());
        self.apic_di.resize(n, Matrix::zeros());
        self.neigh_pn.resize(n, vec![]);
        self.wf_pn.resize(n, vec![]);
        self.wfd_pn.resize(n, vec![]);
    }

    pub fn copy_particle(&mut self, src: usize, dst: usize) {
        if src == dst {
            return;
        }
        self.ptag[dst] = self.ptag[src];
        self.x0[dst] = self.x0[src];
        self.x[dst] = self.x[src];
        self.v[dst] = self.v[src];
        self.v_update[dst] = self.v_update[src];
        self.a[dst] = self.a[src];
        self.mb[dst] = self.mb[src];
        self.f[dst] = self.f[src];
        self.vol0[dst] = self.vol0[src];
        self.vol[dst] = self.vol[src];
        self.mass[dst] = self.mass[src];
        self.density[dst] = self.density[src];
        self.def_grad[dst] = self.def_grad[src];
        self.rate_l[dst] = self.rate_l[src];
        self.sigma[dst] = self.sigma[src];
        self.eff_plastic_strain[dst] = self.eff_plastic_strain[src];
        self.eff_plastic_strain_rate[dst] = self.eff_plastic_strain_rate[src];
        self.damage[dst] = self.damage[src];
        self.damage_init[dst] = self.damage_init[src];
        self.mask[dst] = self.mask[src];
        self.apic_bp[dst] = self.apic_bp[src];
        self.apic_di[dst] = self.apic_di[src];
    }

    /*
     * Scatter kernels. The reset flag is set for the first solid sharing a
     * grid so later solids accumulate on top.
     */

    pub fn compute_mass_nodes(&self, grid: &mut Grid, reset: bool) {
        if reset {
            grid.mass.iter_mut().for_each(|m| *m = 0.0);
        }
        for ip in 0..self.np_local {
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                grid.mass[in_] += self.wf_pn[ip][j] * self.mass[ip];
            }
        }
    }

    pub fn compute_velocity_nodes(&self, grid: &mut Grid, reset: bool) {
        if reset {
            grid.v.iter_mut().for_each(|v| *v = Vector::zeros());
        }
        for ip in 0..self.np_local {
            let momentum = self.v[ip] * self.mass[ip];
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                grid.v[in_] += momentum * self.wf_pn[ip][j];
            }
        }
    }

    pub fn compute_velocity_nodes_apic(&self, grid: &mut Grid, reset: bool, reference: bool) {
        if reset {
            grid.v.iter_mut().for_each(|v| *v = Vector::zeros());
        }
        for ip in 0..self.np_local {
            let xp = if reference { self.x0[ip] } else { self.x[ip] };
            let affine = self.apic_bp[ip] * self.apic_di[ip];
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                let dx = grid.x0[in_] - xp;
                grid.v[in_] +=
                    (self.v[ip] + affine * dx) * (self.mass[ip] * self.wf_pn[ip][j]);
            }
        }
    }

    pub fn compute_external_forces_nodes(&self, grid: &mut Grid, reset: bool) {
        if reset {
            grid.mb.iter_mut().for_each(|f| *f = Vector::zeros());
        }
        for ip in 0..self.np_local {
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                grid.mb[in_] += self.mb[ip] * self.wf_pn[ip][j];
            }
        }
    }

    /// Internal forces in the current configuration, `-vol sigma grad(wf)`.
    pub fn compute_internal_forces_nodes_ul(&self, grid: &mut Grid, reset: bool) {
        if reset {
            grid.f.iter_mut().for_each(|f| *f = Vector::zeros());
        }
        for ip in 0..self.np_local {
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                grid.f[in_] -= (self.sigma[ip] * self.wfd_pn[ip][j]) * self.vol[ip];
            }
        }
    }

    /// Internal forces in the reference configuration: first Piola-Kirchhoff
    /// stress against reference volume and gradients.
    pub fn compute_internal_forces_nodes_tl(
        &self,
        grid: &mut Grid,
        reset: bool,
    ) -> MpmResult<()> {
        if reset {
            grid.f.iter_mut().for_each(|f| *f = Vector::zeros());
        }
        for ip in 0..self.np_local {
            let f_inv_t = self
                .def_grad[ip]
                .try_inverse()
                .ok_or_else(|| self.singular_def_grad(ip))?
                .transpose();
            let pk1 = self.sigma[ip] * f_inv_t * self.def_grad[ip].determinant();
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                grid.f[in_] -= (pk1 * self.wfd_pn[ip][j]) * self.vol0[ip];
            }
        }
        Ok(())
    }

    /*
     * Gather kernels.
     */

    pub fn compute_particle_velocities_and_positions(&mut self, grid: &Grid, dt: Real) {
        for ip in 0..self.np_local {
            let mut vu = Vector::zeros();
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                vu += grid.v_update[in_] * self.wf_pn[ip][j];
            }
            self.v_update[ip] = vu;
            self.x[ip] += vu * dt;
        }
    }

    pub fn compute_particle_acceleration(&mut self, grid: &Grid, dt: Real) {
        let inv_dt = 1.0 / dt;
        for ip in 0..self.np_local {
            let mut acc = Vector::zeros();
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                acc += (grid.v_update[in_] - grid.v[in_]) * self.wf_pn[ip][j];
            }
            acc *= inv_dt;
            self.a[ip] = acc;
            self.f[ip] = acc * self.mass[ip];
        }
    }

    /// Blends the gathered velocity with the particle delta; positions were
    /// already advanced with the gathered velocity alone.
    pub fn update_particle_velocities(&mut self, flip: Real, dt: Real) {
        for ip in 0..self.np_local {
            self.v[ip] =
                self.v_update[ip] * (1.0 - flip) + (self.v[ip] + self.a[ip] * dt) * flip;
        }
    }

    /*
     * Velocity-gradient reconstruction.
     */

    /// Velocity gradient from the re-scattered nodal velocities.
    pub fn compute_rate_deformation_gradient_musl(&mut self, grid: &Grid) {
        for ip in 0..self.np_local {
            let mut l = Matrix::zeros();
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                l += grid.v[in_] * self.wfd_pn[ip][j].transpose();
            }
            self.rate_l[ip] = l;
        }
    }

    /// Velocity gradient from the force-updated nodal velocities.
    pub fn compute_rate_deformation_gradient_usl(&mut self, grid: &Grid) {
        for ip in 0..self.np_local {
            let mut l = Matrix::zeros();
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                l += grid.v_update[in_] * self.wfd_pn[ip][j].transpose();
            }
            self.rate_l[ip] = l;
        }
    }

    /// Affine reconstruction: rebuilds the affine matrix from the updated
    /// nodal velocities and takes the velocity gradient as `Bp Dp^-1`.
    pub fn compute_rate_deformation_gradient_apic(&mut self, grid: &Grid, reference: bool) {
        for ip in 0..self.np_local {
            let xp = if reference { self.x0[ip] } else { self.x[ip] };
            let mut bp = Matrix::zeros();
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                let dx = grid.x0[in_] - xp;
                bp += grid.v_update[in_] * dx.transpose() * self.wf_pn[ip][j];
            }
            self.apic_bp[ip] = bp;
            self.rate_l[ip] = bp * self.apic_di[ip];
        }
    }

    /// `F <- (I + L dt) F` in the updated-Lagrangian formulation,
    /// `F <- F + Fdot dt` in the total-Lagrangian one; volumes and densities
    /// follow `det F`.
    pub fn update_deformation_gradient(
        &mut self,
        dt: Real,
        total_lagrangian: bool,
        timestep: u64,
    ) -> MpmResult<()> {
        for ip in 0..self.np_local {
            let f_new = if total_lagrangian {
                self.def_grad[ip] + self.rate_l[ip] * dt
            } else {
                (Matrix::identity() + self.rate_l[ip] * dt) * self.def_grad[ip]
            };
            let j = f_new.determinant();
            if !(j > 0.0) {
                return Err(MpmError::Numerical {
                    timestep,
                    message: format!(
                        "solid {}: det F = {} on particle {}",
                        self.id, j, self.ptag[ip]
                    ),
                });
            }
            self.def_grad[ip] = f_new;
            self.vol[ip] = j * self.vol0[ip];
            self.density[ip] = self.mass[ip] / self.vol[ip];
        }
        Ok(())
    }

    /// Constitutive update (EOS pressure, strength deviator, damage
    /// degradation) followed by the stable-step bound
    /// `cellsize / (c + |v|)`, min-reduced over the local particles.
    pub fn update_stress(
        &mut self,
        dt: Real,
        cellsize: Real,
        total_lagrangian: bool,
        timestep: u64,
    ) -> MpmResult<()> {
        if !self.mat.rigid {
            for ip in 0..self.np_local {
                let l = if total_lagrangian {
                    let f_inv = self
                        .def_grad[ip]
                        .try_inverse()
                        .ok_or_else(|| self.singular_def_grad(ip))?;
                    self.rate_l[ip] * f_inv
                } else {
                    self.rate_l[ip]
                };
                let d_dev = deviatoric_part(&strain_rate(&l));
                let spin = spin_tensor(&l);

                let p = self.mat.eos.pressure(self.density[ip]);
                let (mut dev, epdot) = match &self.mat.strength {
                    Some(strength) => strength.update_deviatoric(
                        &deviatoric_part(&self.sigma[ip]),
                        &d_dev,
                        &spin,
                        dt,
                        self.eff_plastic_strain[ip],
                    ),
                    None => (Matrix::zeros(), 0.0),
                };

                if let Some(damage) = &self.mat.damage {
                    let (d, d_init) = damage.update(
                        &self.sigma[ip],
                        self.eff_plastic_strain[ip],
                        self.damage[ip],
                        self.damage_init[ip],
                        dt,
                    );
                    self.damage[ip] = d;
                    self.damage_init[ip] = d_init;
                    dev *= 1.0 - self.damage[ip];
                }

                self.sigma[ip] = Matrix::identity() * (-p) + dev;
                self.eff_plastic_strain_rate[ip] = epdot;
                self.eff_plastic_strain[ip] += epdot * dt;
            }
        }

        let k = self.mat.eos.bulk_modulus();
        let g = self.mat.strength.as_ref().map_or(0.0, |s| s.shear_modulus());
        let rigid = self.mat.rigid;
        let density = &self.density;
        let v = &self.v;
        let bound = (0..self.np_local)
            .into_par_iter()
            .map(|ip| {
                let c = if rigid {
                    0.0
                } else {
                    ((k + 4.0 / 3.0 * g) / density[ip]).sqrt()
                };
                NotNan::new(cellsize / (c + v[ip].norm())).map_err(|_| ip)
            })
            .try_reduce(|| NotNan::new(DT_CFL_MAX).unwrap(), |a, b| Ok(a.min(b)));
        match bound {
            Ok(b) => self.dt_cfl = self.dt_cfl.min(b.into_inner()),
            Err(ip) => {
                return Err(MpmError::Numerical {
                    timestep,
                    message: format!(
                        "solid {}: stable-step bound is NaN on particle {}",
                        self.id, self.ptag[ip]
                    ),
                })
            }
        }
        Ok(())
    }

    /// Caches the inverse APIC inertia tensor `(sum wf dx dx^T)^-1` per
    /// particle; rebuilt with the neighbor lists.
    pub fn compute_inertia_tensor(
        &mut self,
        grid: &Grid,
        dimension: usize,
        reference: bool,
    ) -> MpmResult<()> {
        for ip in 0..self.np_local {
            let xp = if reference { self.x0[ip] } else { self.x[ip] };
            let mut dp = Matrix::zeros();
            for (j, &in_) in self.neigh_pn[ip].iter().enumerate() {
                let dx = grid.x0[in_] - xp;
                dp += dx * dx.transpose() * self.wf_pn[ip][j];
            }
            for d in dimension..3 {
                dp[(d, d)] = 1.0;
            }
            let mut di = dp.try_inverse().ok_or_else(|| {
                MpmError::Config(format!(
                    "solid {}: singular inertia tensor on particle {}; the affine \
                     transfer needs quadratic-spline, cubic-spline or \
                     Bernstein-quadratic shape functions",
                    self.id, self.ptag[ip]
                ))
            })?;
            for d in dimension..3 {
                di[(d, d)] = 0.0;
            }
            self.apic_di[ip] = di;
        }
        Ok(())
    }

    /*
     * Migration.
     */

    pub fn pack_particle(&self, ip: usize, buf: &mut Vec<Real>) {
        buf.push(self.ptag[ip] as Real);
        buf.extend(self.x[ip].iter());
        buf.extend(self.x0[ip].iter());
        buf.extend(self.v[ip].iter());
        for r in 0..3 {
            for c in 0..3 {
                buf.push(self.def_grad[ip][(r, c)]);
            }
        }
        let s = &self.sigma[ip];
        buf.extend([
            s[(0, 0)],
            s[(1, 1)],
            s[(2, 2)],
            s[(0, 1)],
            s[(0, 2)],
            s[(1, 2)],
        ]);
        buf.push(self.vol0[ip]);
        buf.push(self.vol[ip]);
        buf.push(self.mass[ip]);
        buf.push(self.eff_plastic_strain[ip]);
        buf.push(self.eff_plastic_strain_rate[ip]);
        buf.push(self.damage[ip]);
        buf.push(self.damage_init[ip]);
        buf.extend(self.mb[ip].iter());
        buf.push(self.mask[ip] as Real);
    }

    /// Appends the records at the given buffer offsets; the caller has grown
    /// the arrays to make room.
    pub fn unpack_particle(&mut self, offsets: &[usize], buf: &[Real]) {
        for &off in offsets {
            let ip = self.np_local;
            let rec = &buf[off..off + self.comm_n];
            self.ptag[ip] = rec[0] as usize;
            self.x[ip] = Vector::new(rec[1], rec[2], rec[3]);
            self.x0[ip] = Vector::new(rec[4], rec[5], rec[6]);
            self.v[ip] = Vector::new(rec[7], rec[8], rec[9]);
            let mut f = Matrix::zeros();
            for r in 0..3 {
                for c in 0..3 {
                    f[(r, c)] = rec[10 + 3 * r + c];
                }
            }
            self.def_grad[ip] = f;
            let mut s = Matrix::zeros();
            s[(0, 0)] = rec[19];
            s[(1, 1)] = rec[20];
            s[(2, 2)] = rec[21];
            s[(0, 1)] = rec[22];
            s[(1, 0)] = rec[22];
            s[(0, 2)] = rec[23];
            s[(2, 0)] = rec[23];
            s[(1, 2)] = rec[24];
            s[(2, 1)] = rec[24];
            self.sigma[ip] = s;
            self.vol0[ip] = rec[25];
            self.vol[ip] = rec[26];
            self.mass[ip] = rec[27];
            self.eff_plastic_strain[ip] = rec[28];
            self.eff_plastic_strain_rate[ip] = rec[29];
            self.damage[ip] = rec[30];
            self.damage_init[ip] = rec[31];
            self.mb[ip] = Vector::new(rec[32], rec[33], rec[34]);
            self.mask[ip] = rec[35] as u32;
            self.v_update[ip] = Vector::zeros();
            self.a[ip] = Vector::zeros();
            self.f[ip] = Vector::zeros();
            self.rate_l[ip] = Matrix::zeros();
            self.apic_bp[ip] = Matrix::zeros();
            self.apic_di[ip] = Matrix::zeros();
            self.density[ip] = if self.vol[ip] > 0.0 {
                self.mass[ip] / self.vol[ip]
            } else {
                0.0
            };
            self.np_local += 1;
        }
    }

    fn singular_def_grad(&self, ip: usize) -> MpmError {
        MpmError::Numerical {
            timestep: 0,
            message: format!(
                "solid {}: singular deformation gradient on particle {}",
                self.id, self.ptag[ip]
            ),
        }
    }
}
