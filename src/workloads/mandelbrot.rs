//! Mandelbrot escape counts over a square image, tiled by halving.

use serde::{Deserialize, Serialize};

use crate::task::{Decomposition, Task, TaskContext};

/// Escape counts of a rectangle of pixels, row-major, positioned by its
/// absolute offset in the full image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub counts: Vec<u32>,
}

impl Tile {
    pub fn count_at(&self, px: usize, py: usize) -> u32 {
        self.counts[py * self.width + px]
    }

    fn blank(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            counts: vec![0; width * height],
        }
    }

    fn paste(&mut self, child: &Tile) {
        let dx = child.x - self.x;
        let dy = child.y - self.y;
        for row in 0..child.height {
            let dst = (dy + row) * self.width + dx;
            let src = row * child.width;
            self.counts[dst..dst + child.width]
                .copy_from_slice(&child.counts[src..src + child.width]);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MandelbrotTask {
    /// Complex coordinate of pixel (0, 0)
    pub lower_x: f64,
    pub lower_y: f64,
    /// Complex distance between neighbouring pixels
    pub delta: f64,
    pub iteration_limit: u32,
    /// Tiles no larger than this on both sides are computed directly
    pub leaf_size: usize,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl MandelbrotTask {
    /// The whole `pixels` x `pixels` image of the square with lower left
    /// corner `(lower_x, lower_y)` and side `edge_length`
    pub fn new(
        lower_x: f64,
        lower_y: f64,
        edge_length: f64,
        pixels: usize,
        iteration_limit: u32,
        leaf_size: usize,
    ) -> Self {
        Self {
            lower_x,
            lower_y,
            delta: edge_length / pixels.max(1) as f64,
            iteration_limit,
            leaf_size: leaf_size.max(1),
            x: 0,
            y: 0,
            width: pixels,
            height: pixels,
        }
    }

    fn spans(start: usize, len: usize, leaf: usize) -> Vec<(usize, usize)> {
        if len > leaf {
            let half = len / 2;
            vec![(start, half), (start + half, len - half)]
        } else {
            vec![(start, len)]
        }
    }

    fn quadrants(&self) -> Vec<MandelbrotTask> {
        let columns = Self::spans(self.x, self.width, self.leaf_size);
        let rows = Self::spans(self.y, self.height, self.leaf_size);
        rows.iter()
            .flat_map(|&(y, height)| {
                columns.iter().map(move |&(x, width)| MandelbrotTask {
                    x,
                    y,
                    width,
                    height,
                    ..*self
                })
            })
            .collect()
    }

    fn is_leaf(&self) -> bool {
        self.width <= self.leaf_size && self.height <= self.leaf_size
    }

    pub fn escape_count(&self, px: usize, py: usize) -> u32 {
        let cx = self.lower_x + px as f64 * self.delta;
        let cy = self.lower_y + py as f64 * self.delta;
        let (mut zx, mut zy) = (0.0f64, 0.0f64);
        let mut count = 0;
        while count < self.iteration_limit && zx * zx + zy * zy <= 4.0 {
            let next = zx * zx - zy * zy + cx;
            zy = 2.0 * zx * zy + cy;
            zx = next;
            count += 1;
        }
        count
    }

    fn compute(&self) -> Tile {
        let mut tile = Tile::blank(self.x, self.y, self.width, self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                tile.counts[row * self.width + col] = self.escape_count(self.x + col, self.y + row);
            }
        }
        tile
    }
}

impl Task for MandelbrotTask {
    type Value = Tile;
    type Shared = ();

    fn decomposition_size(&self) -> usize {
        if self.is_leaf() {
            0
        } else {
            self.quadrants().len()
        }
    }

    fn decompose(&self, _ctx: &TaskContext<()>) -> Decomposition<Self> {
        if self.is_leaf() {
            Decomposition::Value(self.compute())
        } else {
            Decomposition::Split(self.quadrants())
        }
    }

    fn compose(&self, values: Vec<Tile>, _ctx: &TaskContext<()>) -> Option<Tile> {
        let mut tile = Tile::blank(self.x, self.y, self.width, self.height);
        for child in &values {
            tile.paste(child);
        }
        Some(tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workloads::solve_sequential;

    #[test]
    fn test_tiled_matches_direct() {
        let ctx = TaskContext::detached(());
        let tiled = MandelbrotTask::new(-2.0, -1.5, 3.0, 13, 64, 4);
        let direct = MandelbrotTask { leaf_size: 13, ..tiled };

        let a = solve_sequential(tiled, &ctx).unwrap();
        let b = solve_sequential(direct, &ctx).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.counts.len(), 169);
    }

    #[test]
    fn test_quadrants_carry_absolute_offsets() {
        let task = MandelbrotTask::new(-2.0, -1.5, 3.0, 9, 16, 4);
        let quads = task.quadrants();
        assert_eq!(task.decomposition_size(), 4);
        let offsets: Vec<(usize, usize, usize, usize)> =
            quads.iter().map(|q| (q.x, q.y, q.width, q.height)).collect();
        assert_eq!(
            offsets,
            vec![(0, 0, 4, 4), (4, 0, 5, 4), (0, 4, 4, 5), (4, 4, 5, 5)]
        );

        let inner = quads[3].quadrants();
        assert_eq!(inner[0].x, 4);
        assert_eq!(inner[3].x, 6);
        assert_eq!(inner[3].y, 6);
    }

    #[test]
    fn test_known_points() {
        let task = MandelbrotTask::new(-1.0, 0.0, 2.0, 2, 100, 1);
        // c = -1 + 0i stays bounded, c = 0 + 0i too
        assert_eq!(task.escape_count(0, 0), 100);
        assert_eq!(task.escape_count(1, 0), 100);
        // c = 1 + 1i escapes on the second step
        let far = MandelbrotTask::new(1.0, 1.0, 1.0, 1, 100, 1);
        assert!(far.escape_count(0, 0) < 5);
    }
}
