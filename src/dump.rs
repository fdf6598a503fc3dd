use crate::error::MpmResult;
use crate::math::von_mises;
use crate::simulation::State;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DumpStyle {
    Particle,
    ParticleGz,
}

/// Text particle snapshot, one file per requested timestep. A `*` in the
/// filename template is replaced by the timestep; a template without one
/// names the file literally. The gz flavor wraps the same text in gzip.
pub struct Dump {
    pub id: String,
    pub style: DumpStyle,
    pub filename: String,
    pub every: u64,
}

impl Dump {
    pub fn new(id: &str, style: DumpStyle, filename: &str, every: u64) -> Self {
        Self {
            id: id.to_string(),
            style,
            filename: filename.to_string(),
            every,
        }
    }

    fn path(&self, ntimestep: u64) -> String {
        match self.filename.find('*') {
            Some(pos) => format!(
                "{}{}{}",
                &self.filename[..pos],
                ntimestep,
                &self.filename[pos + 1..]
            ),
            None => self.filename.clone(),
        }
    }

    pub fn write(&self, st: &State) -> MpmResult<()> {
        let path = self.path(st.update.ntimestep);
        debug!("dump {}: writing {}", self.id, path);

        let mut text = String::new();
        let total_np: usize = st.solids.iter().map(|s| s.np).sum();
        let _ = write!(
            text,
            "ITEM: TIMESTEP\n{}\nITEM: NUMBER OF ATOMS\n{}\nITEM: BOX BOUNDS sm sm sm\n",
            st.update.ntimestep, total_np
        );
        for d in 0..3 {
            let _ = writeln!(text, "{} {}", st.domain.boxlo[d], st.domain.boxhi[d]);
        }
        text.push_str(
            "ITEM: ATOMS id type x y z x0 y0 z0 vx vy vz s11 s22 s33 s12 s13 s23 seq \
             damage damage_init volume mass bx by bz ep epdot\n",
        );

        let mut id = 0u64;
        for (isolid, s) in st.solids.iter().enumerate() {
            for ip in 0..s.np_local {
                id += 1;
                let sig = &s.sigma[ip];
                let _ = writeln!(
                    text,
                    "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
                    id,
                    isolid + 1,
                    s.x[ip].x,
                    s.x[ip].y,
                    s.x[ip].z,
                    s.x0[ip].x,
                    s.x0[ip].y,
                    s.x0[ip].z,
                    s.v[ip].x,
                    s.v[ip].y,
                    s.v[ip].z,
                    sig[(0, 0)],
                    sig[(1, 1)],
                    sig[(2, 2)],
                    sig[(0, 1)],
                    sig[(0, 2)],
                    sig[(1, 2)],
                    von_mises(sig),
                    s.damage[ip],
                    s.damage_init[ip],
                    s.vol[ip],
                    s.mass[ip],
                    s.mb[ip].x,
                    s.mb[ip].y,
                    s.mb[ip].z,
                    s.eff_plastic_strain[ip],
                    s.eff_plastic_strain_rate[ip],
                );
            }
        }

        let file = File::create(&path)?;
        match self.style {
            DumpStyle::Particle => {
                let mut file = file;
                file.write_all(text.as_bytes())?;
            }
            DumpStyle::ParticleGz => {
                let mut encoder = GzEncoder::new(file, Compression::default());
                encoder.write_all(text.as_bytes())?;
                encoder.finish()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asterisk_is_replaced_by_the_timestep() {
        let dump = Dump::new("d1", DumpStyle::Particle, "out/dump_*.lmp", 10);
        assert_eq!(dump.path(250), "out/dump_250.lmp");
        // A literal filename stays literal.
        let plain = Dump::new("d2", DumpStyle::Particle, "final.lmp", 10);
        assert_eq!(plain.path(250), "final.lmp");
        // A trailing asterisk appends the timestep.
        let tail = Dump::new("d3", DumpStyle::Particle, "dump_*", 10);
        assert_eq!(tail.path(250), "dump_250");
    }
}
