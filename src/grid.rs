use crate::basis::{NodeType, ShapeFunction};
use crate::domain::Domain;
use crate::error::{MpmError, MpmResult};
use crate::math::{inv_exact, Real, Vector};
use crate::universe::Universe;
use std::collections::HashMap;

/// Ghost halo width in node slots along the split axis.
const GHOST_HALO: usize = 2;

/// One neighbor rank's share of the ghost exchange. `ghost_locals` are this
/// rank's replicas of nodes the peer owns; `border_locals` are this rank's
/// owned nodes replicated on the peer. Both sides enumerate the same global
/// nodes in the same (i, j, k) order, so payloads need no tags.
struct GhostExchange {
    peer: usize,
    ghost_locals: Vec<usize>,
    border_locals: Vec<usize>,
}

/// Background Cartesian grid for one rank: owned nodes first, then read-only
/// ghost replicas of neighbor-owned nodes reachable by local particle
/// supports. Node identity is the dense global tag; `map_ntag` resolves a
/// tag to its local slot.
pub struct Grid {
    pub cellsize: Real,
    /// Node spacing; half the cell size for the Bernstein family.
    pub node_spacing: Real,
    /// Global node counts per axis (1 on inactive axes).
    pub nn: [usize; 3],
    pub nnodes: usize,
    pub nnodes_local: usize,
    pub nnodes_ghost: usize,

    pub ntag: Vec<usize>,
    pub x0: Vec<Vector>,
    pub mass: Vec<Real>,
    /// Momentum accumulator during scatter, nodal velocity after reduction.
    pub v: Vec<Vector>,
    pub v_update: Vec<Vector>,
    pub mb: Vec<Vector>,
    pub f: Vec<Vector>,
    pub mask: Vec<u32>,
    pub ntype: Vec<[NodeType; 3]>,
    pub rigid: Vec<bool>,

    map_ntag: HashMap<usize, usize>,
    exchanges: Vec<GhostExchange>,
}

impl Grid {
    pub fn init(domain: &Domain, universe: &Universe, shape: ShapeFunction) -> MpmResult<Self> {
        let refinement = shape.node_refinement();
        let cellsize = domain.cellsize;
        let node_spacing = cellsize / refinement as Real;

        let mut nn = [1usize; 3];
        for d in 0..domain.dimension {
            nn[d] = refinement * domain.ncells[d] + 1;
        }
        let nnodes = nn[0] * nn[1] * nn[2];

        let last_rank = universe.rank + 1 == universe.nprocs;
        let node_lo = refinement * domain.cell_lo;
        let node_hi = if last_rank {
            nn[0]
        } else {
            refinement * domain.cell_hi
        };

        let ghost_left = node_lo.saturating_sub(GHOST_HALO)..node_lo;
        let ghost_right = node_hi..(node_hi + GHOST_HALO).min(nn[0]);

        let mut grid = Self {
            cellsize,
            node_spacing,
            nn,
            nnodes,
            nnodes_local: 0,
            nnodes_ghost: 0,
            ntag: vec![],
            x0: vec![],
            mass: vec![],
            v: vec![],
            v_update: vec![],
            mb: vec![],
            f: vec![],
            mask: vec![],
            ntype: vec![],
            rigid: vec![],
            map_ntag: HashMap::new(),
            exchanges: vec![],
        };

        for i in node_lo..node_hi {
            grid.push_column(domain, shape, i);
        }
        grid.nnodes_local = grid.ntag.len();

        for i in ghost_left.clone() {
            grid.push_column(domain, shape, i);
        }
        for i in ghost_right.clone() {
            grid.push_column(domain, shape, i);
        }
        grid.nnodes_ghost = grid.ntag.len() - grid.nnodes_local;

        if universe.rank > 0 {
            let ghost_locals = grid.column_locals(ghost_left);
            let border_locals = grid.column_locals(node_lo..node_lo + GHOST_HALO);
            grid.exchanges.push(GhostExchange {
                peer: universe.rank - 1,
                ghost_locals,
                border_locals,
            });
        }
        if !last_rank {
            let ghost_locals = grid.column_locals(ghost_right);
            let border_locals = grid.column_locals(node_hi - GHOST_HALO..node_hi);
            grid.exchanges.push(GhostExchange {
                peer: universe.rank + 1,
                ghost_locals,
                border_locals,
            });
        }

        debug!(
            "grid: {} global nodes, {} local + {} ghost on rank {}",
            grid.nnodes, grid.nnodes_local, grid.nnodes_ghost, universe.rank
        );
        Ok(grid)
    }

    fn push_column(&mut self, domain: &Domain, shape: ShapeFunction, i: usize) {
        let nn = self.nn;
        for j in 0..nn[1] {
            for k in 0..nn[2] {
                let tag = (i * nn[1] + j) * nn[2] + k;
                let idx = [i, j, k];
                let mut x0 = Vector::zeros();
                let mut ntype = [NodeType::Interior; 3];
                for d in 0..domain.dimension {
                    x0[d] = domain.boxlo[d] + idx[d] as Real * self.node_spacing;
                    ntype[d] = Self::node_axis_type(shape, idx[d], nn[d]);
                }
                let local = self.ntag.len();
                self.ntag.push(tag);
                self.x0.push(x0);
                self.mass.push(0.0);
                self.v.push(Vector::zeros());
                self.v_update.push(Vector::zeros());
                self.mb.push(Vector::zeros());
                self.f.push(Vector::zeros());
                self.mask.push(1);
                self.ntype.push(ntype);
                self.rigid.push(false);
                self.map_ntag.insert(tag, local);
            }
        }
    }

    fn node_axis_type(shape: ShapeFunction, idx: usize, n: usize) -> NodeType {
        if shape == ShapeFunction::BernsteinQuadratic && idx % 2 == 1 {
            NodeType::Mid
        } else if idx == 0 {
            NodeType::Lower
        } else if idx + 1 == n {
            NodeType::Upper
        } else {
            NodeType::Interior
        }
    }

    /// Local indices of the nodes in a range of i-columns, in exchange order.
    fn column_locals(&self, cols: std::ops::Range<usize>) -> Vec<usize> {
        let mut locals = Vec::with_capacity(cols.len() * self.nn[1] * self.nn[2]);
        for i in cols {
            for j in 0..self.nn[1] {
                for k in 0..self.nn[2] {
                    let tag = (i * self.nn[1] + j) * self.nn[2] + k;
                    locals.push(self.map_ntag[&tag]);
                }
            }
        }
        locals
    }

    #[inline]
    pub fn find(&self, tag: usize) -> Option<usize> {
        self.map_ntag.get(&tag).copied()
    }

    pub fn nnodes_total(&self) -> usize {
        self.nnodes_local + self.nnodes_ghost
    }

    /// Whether the given local index belongs to a ghost slot.
    #[inline]
    pub fn is_ghost(&self, local: usize) -> bool {
        local >= self.nnodes_local
    }

    /// Folds ghost-node mass into the owners and publishes the totals back,
    /// so every replica of a node holds the global sum.
    pub fn reduce_mass_ghost_nodes(&mut self, universe: &Universe) -> MpmResult<()> {
        let exchanges = std::mem::take(&mut self.exchanges);
        let result = self.reduce_quantities(universe, &exchanges, &[Quantity::Mass]);
        self.exchanges = exchanges;
        result
    }

    /// Folds ghost-node momentum and forces into the owners, publishes the
    /// totals back, then normalizes momentum to velocity on every node that
    /// carries mass. With `reset` only momentum takes part (the second
    /// velocity pass re-scatters momentum alone; the forces already hold
    /// their reduced totals).
    pub fn reduce_ghost_nodes(&mut self, universe: &Universe, reset: bool) -> MpmResult<()> {
        let quantities: &[Quantity] = if reset {
            &[Quantity::Momentum]
        } else {
            &[Quantity::Momentum, Quantity::ExternalForce, Quantity::InternalForce]
        };
        let exchanges = std::mem::take(&mut self.exchanges);
        let result = self.reduce_quantities(universe, &exchanges, quantities);
        self.exchanges = exchanges;
        result?;

        for in_ in 0..self.nnodes_total() {
            let inv_mass = inv_exact(self.mass[in_]);
            self.v[in_] *= inv_mass;
        }
        Ok(())
    }

    fn reduce_quantities(
        &mut self,
        universe: &Universe,
        exchanges: &[GhostExchange],
        quantities: &[Quantity],
    ) -> MpmResult<()> {
        // Contributions accumulated on ghost replicas travel to the owner...
        for ex in exchanges {
            let mut buf = Vec::with_capacity(ex.ghost_locals.len() * 3);
            for &g in &ex.ghost_locals {
                self.pack_node(g, quantities, &mut buf);
            }
            universe.send(ex.peer, buf)?;
        }
        for ex in exchanges {
            let buf = universe.recv(ex.peer)?;
            self.apply_node_payload(&buf, &ex.border_locals, quantities, universe, true)?;
        }
        // ...and the owner's totals travel back to every replica.
        for ex in exchanges {
            let mut buf = Vec::with_capacity(ex.border_locals.len() * 3);
            for &b in &ex.border_locals {
                self.pack_node(b, quantities, &mut buf);
            }
            universe.send(ex.peer, buf)?;
        }
        for ex in exchanges {
            let buf = universe.recv(ex.peer)?;
            self.apply_node_payload(&buf, &ex.ghost_locals, quantities, universe, false)?;
        }
        Ok(())
    }

    fn pack_node(&self, in_: usize, quantities: &[Quantity], buf: &mut Vec<Real>) {
        for q in quantities {
            match q {
                Quantity::Mass => buf.push(self.mass[in_]),
                Quantity::Momentum => buf.extend(self.v[in_].iter()),
                Quantity::ExternalForce => buf.extend(self.mb[in_].iter()),
                Quantity::InternalForce => buf.extend(self.f[in_].iter()),
            }
        }
    }

    fn apply_node_payload(
        &mut self,
        buf: &[Real],
        locals: &[usize],
        quantities: &[Quantity],
        universe: &Universe,
        accumulate: bool,
    ) -> MpmResult<()> {
        let width: usize = quantities.iter().map(|q| q.width()).sum();
        if buf.len() != locals.len() * width {
            return Err(MpmError::Distribution {
                rank: universe.rank,
                message: format!(
                    "ghost payload size mismatch: {} values for {} nodes of width {}",
                    buf.len(),
                    locals.len(),
                    width
                ),
            });
        }
        let mut cursor = 0;
        for &in_ in locals {
            for q in quantities {
                match q {
                    Quantity::Mass => {
                        if accumulate {
                            self.mass[in_] += buf[cursor];
                        } else {
                            self.mass[in_] = buf[cursor];
                        }
                        cursor += 1;
                    }
                    Quantity::Momentum | Quantity::ExternalForce | Quantity::InternalForce => {
                        let value = Vector::new(buf[cursor], buf[cursor + 1], buf[cursor + 2]);
                        let target = match q {
                            Quantity::Momentum => &mut self.v[in_],
                            Quantity::ExternalForce => &mut self.mb[in_],
                            _ => &mut self.f[in_],
                        };
                        if accumulate {
                            *target += value;
                        } else {
                            *target = value;
                        }
                        cursor += 3;
                    }
                }
            }
        }
        Ok(())
    }

    /// Advances nodal velocities under the accumulated forces. Nodes backing
    /// a rigid solid keep their scattered velocity; massless nodes are
    /// skipped. Dirichlet overrides are applied afterwards by fixes.
    pub fn update_grid_velocities(&mut self, dt: Real) {
        for in_ in 0..self.nnodes_total() {
            if self.rigid[in_] {
                self.v_update[in_] = self.v[in_];
            } else if self.mass[in_] > 0.0 {
                self.v_update[in_] =
                    self.v[in_] + (self.f[in_] + self.mb[in_]) * (dt / self.mass[in_]);
            } else {
                self.v_update[in_] = self.v[in_];
            }
        }
    }

    /// Clears the rigid-support marks; they are rebuilt with the neighbor
    /// lists.
    pub fn reset_rigid(&mut self) {
        self.rigid.iter_mut().for_each(|r| *r = false);
    }
}

#[derive(Copy, Clone)]
enum Quantity {
    Mass,
    Momentum,
    ExternalForce,
    InternalForce,
}

impl Quantity {
    fn width(&self) -> usize {
        match self {
            Quantity::Mass => 1,
            _ => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn single_rank_grid(shape: ShapeFunction) -> Grid {
        let uni = Universe::single();
        let mut domain = Domain::new(2, [0.0; 3], [4.0, 2.0, 0.0], 1.0).unwrap();
        domain.decompose(&uni).unwrap();
        Grid::init(&domain, &uni, shape).unwrap()
    }

    #[test]
    fn node_counts_and_tags() {
        let grid = single_rank_grid(ShapeFunction::Linear);
        assert_eq!(grid.nn, [5, 3, 1]);
        assert_eq!(grid.nnodes_local, 15);
        assert_eq!(grid.nnodes_ghost, 0);
        // Tag of node (i=2, j=1): (2*3 + 1)*1 = 7.
        let local = grid.find(7).unwrap();
        assert_eq!(grid.ntag[local], 7);
        assert!((grid.x0[local] - Vector::new(2.0, 1.0, 0.0)).norm() < 1.0e-12);
        assert!(grid.find(grid.nnodes).is_none());
    }

    #[test]
    fn bernstein_grid_is_twice_refined() {
        let grid = single_rank_grid(ShapeFunction::BernsteinQuadratic);
        assert_eq!(grid.nn, [9, 5, 1]);
        assert_eq!(grid.node_spacing, 0.5);
        let corner = grid.find(0).unwrap();
        assert_eq!(grid.ntype[corner][0], NodeType::Lower);
        // Node (i=1, j=2) is a midpoint along x, interior along y.
        let mid = grid.find(1 * 5 + 2).unwrap();
        assert_eq!(grid.ntype[mid][0], NodeType::Mid);
        assert_eq!(grid.ntype[mid][1], NodeType::Interior);
    }

    #[test]
    fn boundary_node_types() {
        let grid = single_rank_grid(ShapeFunction::CubicSpline);
        let last = grid.find((4 * 3 + 2) * 1).unwrap();
        assert_eq!(grid.ntype[last][0], NodeType::Upper);
        assert_eq!(grid.ntype[last][1], NodeType::Upper);
        let inner = grid.find((2 * 3 + 1) * 1).unwrap();
        assert_eq!(grid.ntype[inner], [NodeType::Interior; 3]);
    }

    #[test]
    fn grid_velocity_update() {
        let mut grid = single_rank_grid(ShapeFunction::Linear);
        let in_ = grid.find(7).unwrap();
        grid.mass[in_] = 2.0;
        grid.v[in_] = Vector::new(1.0, 0.0, 0.0);
        grid.f[in_] = Vector::new(0.0, 4.0, 0.0);
        grid.mb[in_] = Vector::new(2.0, 0.0, 0.0);
        grid.update_grid_velocities(0.5);
        assert!((grid.v_update[in_] - Vector::new(1.5, 1.0, 0.0)).norm() < 1.0e-12);
        // Massless nodes are skipped.
        let other = grid.find(0).unwrap();
        assert_eq!(grid.v_update[other], Vector::zeros());
    }

    #[test]
    fn ghost_reduction_two_ranks() {
        let universes = Universe::cluster(2);
        let handles: Vec<_> = universes
            .into_iter()
            .map(|uni| {
                thread::spawn(move || {
                    let mut domain = Domain::new(1, [0.0; 3], [8.0, 0.0, 0.0], 1.0).unwrap();
                    domain.decompose(&uni).unwrap();
                    let mut grid = Grid::init(&domain, &uni, ShapeFunction::Linear).unwrap();

                    // Both ranks deposit mass on the shared node (tag 4):
                    // owned by rank 1, a ghost on rank 0.
                    let local = grid.find(4).unwrap();
                    grid.mass[local] = 1.0 + uni.rank as Real;
                    grid.reduce_mass_ghost_nodes(&uni).unwrap();
                    (uni.rank, grid.is_ghost(local), grid.mass[local])
                })
            })
            .collect();

        for h in handles {
            let (rank, ghost, mass) = h.join().unwrap();
            assert_eq!(ghost, rank == 0);
            assert_eq!(mass, 3.0, "rank {} sees reduced mass {}", rank, mass);
        }
    }

    #[test]
    fn momentum_reduction_normalizes_to_velocity() {
        let universes = Universe::cluster(2);
        let handles: Vec<_> = universes
            .into_iter()
            .map(|uni| {
                thread::spawn(move || {
                    let mut domain = Domain::new(1, [0.0; 3], [8.0, 0.0, 0.0], 1.0).unwrap();
                    domain.decompose(&uni).unwrap();
                    let mut grid = Grid::init(&domain, &uni, ShapeFunction::Linear).unwrap();

                    let local = grid.find(4).unwrap();
                    grid.mass[local] = 2.0;
                    grid.v[local] = Vector::new(2.0 * (1.0 + uni.rank as Real), 0.0, 0.0);
                    grid.reduce_mass_ghost_nodes(&uni).unwrap();
                    grid.reduce_ghost_nodes(&uni, false).unwrap();
                    grid.v[local]
                })
            })
            .collect();

        for h in handles {
            let v = h.join().unwrap();
            // Total momentum 6 over total mass 4.
            assert!((v - Vector::new(1.5, 0.0, 0.0)).norm() < 1.0e-12);
        }
    }
}
