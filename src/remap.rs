//! Index permutation that scatters consecutive ring positions across
//! distinct cache lines.
//!
//! With dense cells, neighbouring tickets land in the same cache line and
//! every producer invalidates the line its successor is about to touch. The
//! remap sends position `i` to `i % lines * cells_per_line + i / lines`,
//! which walks one cell per line before reusing a line.

use crate::pad::CACHE_LINE;

#[derive(Debug, Clone, Copy)]
pub struct CacheRemap {
    cells_per_line: usize,
    lines: usize,
}

impl CacheRemap {
    /// Builds the permutation for a ring of `cells` cells of `cell_size`
    /// bytes each. Falls back to the identity map when the cell size does
    /// not evenly tile a cache line or the ring does not fill whole lines.
    pub fn new(cells: usize, cell_size: usize) -> Self {
        assert!(cells > 0);
        assert!(cell_size > 0);

        let cells_per_line = if CACHE_LINE % cell_size == 0 {
            CACHE_LINE / cell_size
        } else {
            1
        };

        if cells_per_line <= 1 || cells % cells_per_line != 0 {
            // Identity: one cell per "line" makes the formula collapse to i.
            return Self {
                cells_per_line: 1,
                lines: cells,
            };
        }

        Self {
            cells_per_line,
            lines: cells / cells_per_line,
        }
    }

    /// Maps a ring position (already reduced modulo the ring size) to the
    /// physical array index.
    #[inline(always)]
    pub fn index(&self, i: usize) -> usize {
        i % self.lines * self.cells_per_line + i / self.lines
    }
}
