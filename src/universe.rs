use crate::error::{MpmError, MpmResult};
use crate::math::Real;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Rank/size abstraction and the collective communicator.
///
/// All distributed protocols (ghost-node reduction, particle migration, the
/// stable-step reduction) are written against this surface only. Two
/// backends exist: the trivial single-rank world, and an in-process channel
/// mesh where every rank runs on its own thread and exchanges flat `f64`
/// payloads point-to-point, so the wire protocols are exercised unchanged.
pub struct Universe {
    pub rank: usize,
    pub nprocs: usize,
    comm: Comm,
}

enum Comm {
    Single,
    Mesh {
        /// `senders[peer]` posts to `peer`; the slot for this rank is `None`.
        senders: Vec<Option<Sender<Vec<Real>>>>,
        /// `receivers[peer]` drains messages posted by `peer`.
        receivers: Vec<Option<Receiver<Vec<Real>>>>,
    },
}

impl Universe {
    /// A world of one.
    pub fn single() -> Self {
        Self {
            rank: 0,
            nprocs: 1,
            comm: Comm::Single,
        }
    }

    /// Builds a fully connected world of `nprocs` ranks sharing one process;
    /// each returned universe is meant to move onto its own thread.
    pub fn cluster(nprocs: usize) -> Vec<Universe> {
        assert!(nprocs > 0);
        if nprocs == 1 {
            return vec![Self::single()];
        }

        let mut senders: Vec<Vec<Option<Sender<Vec<Real>>>>> =
            (0..nprocs).map(|_| (0..nprocs).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Vec<Real>>>>> =
            (0..nprocs).map(|_| (0..nprocs).map(|_| None).collect()).collect();

        for src in 0..nprocs {
            for dst in 0..nprocs {
                if src == dst {
                    continue;
                }
                let (tx, rx) = channel();
                senders[src][dst] = Some(tx);
                receivers[dst][src] = Some(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| Universe {
                rank,
                nprocs,
                comm: Comm::Mesh { senders, receivers },
            })
            .collect()
    }

    pub fn send(&self, dest: usize, buf: Vec<Real>) -> MpmResult<()> {
        match &self.comm {
            Comm::Single => Err(self.distribution_error("send in a single-rank world")),
            Comm::Mesh { senders, .. } => senders
                .get(dest)
                .and_then(|s| s.as_ref())
                .ok_or_else(|| self.distribution_error(&format!("no route to rank {}", dest)))?
                .send(buf)
                .map_err(|_| self.distribution_error(&format!("rank {} is gone", dest))),
        }
    }

    pub fn recv(&self, src: usize) -> MpmResult<Vec<Real>> {
        match &self.comm {
            Comm::Single => Err(self.distribution_error("recv in a single-rank world")),
            Comm::Mesh { receivers, .. } => receivers
                .get(src)
                .and_then(|r| r.as_ref())
                .ok_or_else(|| self.distribution_error(&format!("no route from rank {}", src)))?
                .recv()
                .map_err(|_| self.distribution_error(&format!("rank {} is gone", src))),
        }
    }

    /// MIN-reduction of a scalar across all ranks.
    pub fn allreduce_min(&self, x: Real) -> MpmResult<Real> {
        let out = self.allreduce(&[x], |acc, v| {
            acc[0] = acc[0].min(v[0]);
        })?;
        Ok(out[0])
    }

    /// Elementwise SUM-reduction of a vector across all ranks.
    pub fn allreduce_sum(&self, xs: &[Real]) -> MpmResult<Vec<Real>> {
        self.allreduce(xs, |acc, v| {
            for (a, b) in acc.iter_mut().zip(v) {
                *a += *b;
            }
        })
    }

    pub fn barrier(&self) -> MpmResult<()> {
        if self.nprocs > 1 {
            self.allreduce(&[0.0], |_, _| ())?;
        }
        Ok(())
    }

    /// Gather-to-root, reduce, broadcast.
    fn allreduce(
        &self,
        xs: &[Real],
        reduce: impl Fn(&mut [Real], &[Real]),
    ) -> MpmResult<Vec<Real>> {
        if self.nprocs == 1 {
            return Ok(xs.to_vec());
        }
        if self.rank == 0 {
            let mut acc = xs.to_vec();
            for src in 1..self.nprocs {
                let contrib = self.recv(src)?;
                if contrib.len() != acc.len() {
                    return Err(self.distribution_error(&format!(
                        "reduction length mismatch: {} != {}",
                        contrib.len(),
                        acc.len()
                    )));
                }
                reduce(&mut acc, &contrib);
            }
            for dst in 1..self.nprocs {
                self.send(dst, acc.clone())?;
            }
            Ok(acc)
        } else {
            self.send(0, xs.to_vec())?;
            self.recv(0)
        }
    }

    fn distribution_error(&self, message: &str) -> MpmError {
        MpmError::Distribution {
            rank: self.rank,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_rank_reductions_are_identity() {
        let uni = Universe::single();
        assert_eq!(uni.allreduce_min(3.5).unwrap(), 3.5);
        assert_eq!(uni.allreduce_sum(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn cluster_reduces_across_threads() {
        let universes = Universe::cluster(4);
        let handles: Vec<_> = universes
            .into_iter()
            .map(|uni| {
                thread::spawn(move || {
                    let mine = (uni.rank + 1) as Real;
                    let min = uni.allreduce_min(mine).unwrap();
                    let sum = uni.allreduce_sum(&[mine, 10.0 * mine]).unwrap();
                    (min, sum)
                })
            })
            .collect();
        for h in handles {
            let (min, sum) = h.join().unwrap();
            assert_eq!(min, 1.0);
            assert_eq!(sum, vec![10.0, 100.0]);
        }
    }

    #[test]
    fn point_to_point_preserves_order() {
        let mut universes = Universe::cluster(2);
        let u1 = universes.pop().unwrap();
        let u0 = universes.pop().unwrap();
        let sender = thread::spawn(move || {
            u0.send(1, vec![1.0]).unwrap();
            u0.send(1, vec![2.0, 3.0]).unwrap();
        });
        assert_eq!(u1.recv(0).unwrap(), vec![1.0]);
        assert_eq!(u1.recv(0).unwrap(), vec![2.0, 3.0]);
        sender.join().unwrap();
    }
}
