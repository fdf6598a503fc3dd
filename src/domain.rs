use crate::error::{MpmError, MpmResult};
use crate::math::Real;
use crate::universe::Universe;

/// The global simulation box, its dimensionality, and this rank's subdomain.
///
/// Ranks split the box into slabs along x, each slab owning a half-open cell
/// range; the last rank's slab is closed at the global upper face. Cells are
/// distributed with a base + remainder rule so any cell count maps onto any
/// rank count that leaves at least a halo's worth of cells per rank.
pub struct Domain {
    pub dimension: usize,
    pub boxlo: [Real; 3],
    pub boxhi: [Real; 3],
    pub cellsize: Real,
    /// Global cell counts per axis (1 on inactive axes).
    pub ncells: [usize; 3],
    pub sublo: [Real; 3],
    pub subhi: [Real; 3],
    /// Owned cell range along the split axis.
    pub cell_lo: usize,
    pub cell_hi: usize,
    /// Arena index of the shared background grid.
    pub grid: usize,
    last_rank: bool,
}

/// Minimum owned cells per rank along the split axis, matching the widest
/// shape-function halo.
const MIN_CELLS_PER_RANK: usize = 2;

impl Domain {
    pub fn new(
        dimension: usize,
        boxlo: [Real; 3],
        boxhi: [Real; 3],
        cellsize: Real,
    ) -> MpmResult<Self> {
        if !(1..=3).contains(&dimension) {
            return Err(MpmError::Config(format!(
                "dimension must be 1, 2 or 3, got {}",
                dimension
            )));
        }
        if !(cellsize > 0.0) {
            return Err(MpmError::Config(format!(
                "cell size must be positive, got {}",
                cellsize
            )));
        }

        let mut ncells = [1usize; 3];
        for d in 0..dimension {
            let extent = boxhi[d] - boxlo[d];
            if !(extent > 0.0) {
                return Err(MpmError::Config(format!(
                    "box extent along axis {} is not positive",
                    d
                )));
            }
            let n = (extent / cellsize).round();
            if n < 1.0 || ((extent - n * cellsize) / cellsize).abs() > 1.0e-9 {
                return Err(MpmError::Config(format!(
                    "box extent {} along axis {} is not a whole number of cells of size {}",
                    extent, d, cellsize
                )));
            }
            ncells[d] = n as usize;
        }

        Ok(Self {
            dimension,
            boxlo,
            boxhi,
            cellsize,
            ncells,
            sublo: boxlo,
            subhi: boxhi,
            cell_lo: 0,
            cell_hi: ncells[0],
            grid: 0,
            last_rank: true,
        })
    }

    /// Assigns this rank its slab of the box.
    pub fn decompose(&mut self, universe: &Universe) -> MpmResult<()> {
        let nprocs = universe.nprocs;
        let nx = self.ncells[0];
        if nx < MIN_CELLS_PER_RANK * nprocs {
            return Err(MpmError::Config(format!(
                "cannot split {} cells across {} ranks: each rank needs at least {} cells",
                nx, nprocs, MIN_CELLS_PER_RANK
            )));
        }

        let base = nx / nprocs;
        let rem = nx % nprocs;
        let mut cursor = 0;
        for rank in 0..=universe.rank {
            let local = base + usize::from(rank < rem);
            self.cell_lo = cursor;
            cursor += local;
            self.cell_hi = cursor;
        }
        self.last_rank = universe.rank + 1 == nprocs;

        self.sublo = self.boxlo;
        self.subhi = self.boxhi;
        self.sublo[0] = self.boxlo[0] + self.cell_lo as Real * self.cellsize;
        self.subhi[0] = if self.last_rank {
            self.boxhi[0]
        } else {
            self.boxlo[0] + self.cell_hi as Real * self.cellsize
        };

        info!(
            "rank {}: subdomain cells [{}, {}), x in [{}, {})",
            universe.rank, self.cell_lo, self.cell_hi, self.sublo[0], self.subhi[0]
        );
        Ok(())
    }

    pub fn inside_box(&self, x: Real, y: Real, z: Real) -> bool {
        let p = [x, y, z];
        for d in 0..self.dimension {
            if p[d] < self.boxlo[d] || p[d] > self.boxhi[d] {
                return false;
            }
        }
        true
    }

    /// Whether this rank's subdomain claims the given position. The split
    /// axis is half-open except on the last rank, so every in-box position
    /// belongs to exactly one rank.
    pub fn inside_subdomain(&self, x: Real, y: Real, z: Real) -> bool {
        let p = [x, y, z];
        for d in 1..self.dimension {
            if p[d] < self.boxlo[d] || p[d] > self.boxhi[d] {
                return false;
            }
        }
        if p[0] < self.sublo[0] {
            return false;
        }
        if self.last_rank {
            p[0] <= self.subhi[0]
        } else {
            p[0] < self.subhi[0]
        }
    }
}
