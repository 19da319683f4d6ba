//! Block grid - how an image is divided into the blocks handed to the engine

use crate::error::{ImsError, Result};
use crate::types::{Dimension, Index5D, Size5D};
use std::ops::Range;

/// Division of an image into equally sized blocks.
///
/// Blocks at the upper edge of an axis may extend past the image when the
/// block size does not evenly divide the image size; they are still copied
/// with a full block buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    image_size: Size5D,
    block_size: Size5D,
    num_blocks: Size5D,
}

impl BlockGrid {
    /// Create a grid; every axis of both sizes must be non-zero
    pub fn new(image_size: Size5D, block_size: Size5D) -> Result<Self> {
        if !image_size.is_non_empty() {
            return Err(ImsError::InvalidDimensions(format!(
                "Image size must be positive along every axis, got {}",
                image_size
            )));
        }
        if !block_size.is_non_empty() {
            return Err(ImsError::InvalidDimensions(format!(
                "Block size must be positive along every axis, got {}",
                block_size
            )));
        }

        for (what, size) in [("Image", &image_size), ("Block", &block_size)] {
            if size.checked_voxel_count().is_none() {
                return Err(ImsError::InvalidDimensions(format!(
                    "{} size {} has more voxels than fit in memory",
                    what, size
                )));
            }
        }

        let num_blocks = image_size.div_ceil(&block_size)?;
        Ok(Self {
            image_size,
            block_size,
            num_blocks,
        })
    }

    pub fn image_size(&self) -> &Size5D {
        &self.image_size
    }

    pub fn block_size(&self) -> &Size5D {
        &self.block_size
    }

    /// Number of blocks along each axis
    pub fn num_blocks(&self) -> &Size5D {
        &self.num_blocks
    }

    /// Total number of blocks
    pub fn total_blocks(&self) -> usize {
        self.num_blocks.voxel_count()
    }

    /// Samples in every block buffer
    pub fn block_voxel_count(&self) -> usize {
        self.block_size.voxel_count()
    }

    /// Does this block index cover at least part of the image?
    pub fn contains(&self, index: &Index5D) -> bool {
        Dimension::ALL
            .iter()
            .all(|&d| index.get(d) < self.num_blocks.get(d))
    }

    /// Voxel range covered by a block along each axis (x, y, z, c, t), clamped to the image
    pub fn block_region(&self, index: &Index5D) -> Option<[Range<u32>; 5]> {
        if !self.contains(index) {
            return None;
        }

        Some(Dimension::ALL.map(|d| {
            let block_dim = self.block_size.get(d);
            let start = index.get(d) * block_dim;
            let end = start.saturating_add(block_dim).min(self.image_size.get(d));
            start..end
        }))
    }

    /// Iterate over all block indices.
    ///
    /// Order is channel outermost, then time, z, y, with x varying fastest.
    pub fn iter(&self) -> BlockIter {
        BlockIter {
            num_blocks: self.num_blocks,
            next: Some(Index5D::default()),
        }
    }

    /// Convert a linear position in the iteration order to a block index
    pub fn linear_to_index(&self, linear: usize) -> Option<Index5D> {
        if linear >= self.total_blocks() {
            return None;
        }

        let n = &self.num_blocks;
        let mut remaining = linear;
        let mut take = |count: u32| {
            let value = remaining % count as usize;
            remaining /= count as usize;
            value as u32
        };

        let x = take(n.x);
        let y = take(n.y);
        let z = take(n.z);
        let t = take(n.t);
        let c = take(n.c);
        Some(Index5D { x, y, z, c, t })
    }

    /// Position of a block index in the iteration order
    pub fn index_to_linear(&self, index: &Index5D) -> Option<usize> {
        if !self.contains(index) {
            return None;
        }

        let n = &self.num_blocks;
        let linear = index.c as usize;
        let linear = linear * n.t as usize + index.t as usize;
        let linear = linear * n.z as usize + index.z as usize;
        let linear = linear * n.y as usize + index.y as usize;
        let linear = linear * n.x as usize + index.x as usize;
        Some(linear)
    }

    /// Fail unless the index lies inside the grid
    pub fn check_index(&self, index: &Index5D) -> Result<()> {
        if self.contains(index) {
            Ok(())
        } else {
            Err(ImsError::BlockOutOfRange(format!(
                "Block {} outside grid of {} blocks",
                index, self.num_blocks
            )))
        }
    }

    /// Short human-readable description for logs
    pub fn summary(&self) -> String {
        format!(
            "image {} in blocks of {}: {} blocks ({})",
            self.image_size,
            self.block_size,
            self.total_blocks(),
            self.num_blocks
        )
    }
}

/// Iterator over block indices in C, T, Z, Y, X order
#[derive(Debug, Clone)]
pub struct BlockIter {
    num_blocks: Size5D,
    next: Option<Index5D>,
}

impl Iterator for BlockIter {
    type Item = Index5D;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;

        let mut following = current;
        self.next = None;
        // Odometer increment, x fastest, c slowest.
        for dim in [Dimension::X, Dimension::Y, Dimension::Z, Dimension::T, Dimension::C] {
            let value = following.get_mut(dim);
            *value += 1;
            if *value < self.num_blocks.get(dim) {
                self.next = Some(following);
                break;
            }
            *value = 0;
        }

        Some(current)
    }
}

impl IntoIterator for &BlockGrid {
    type Item = Index5D;
    type IntoIter = BlockIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn create_test_grid() -> BlockGrid {
        BlockGrid::new(
            Size5D {
                x: 512,
                y: 512,
                z: 32,
                c: 2,
                t: 4,
            },
            Size5D {
                x: 256,
                y: 256,
                z: 8,
                c: 1,
                t: 1,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_num_blocks() {
        let grid = create_test_grid();
        assert_eq!(
            *grid.num_blocks(),
            Size5D {
                x: 2,
                y: 2,
                z: 4,
                c: 2,
                t: 4
            }
        );
        assert_eq!(grid.total_blocks(), 128);
        assert_eq!(grid.block_voxel_count(), 256 * 256 * 8);
    }

    #[test]
    fn test_iteration_order() {
        let grid = create_test_grid();
        let indices: Vec<Index5D> = grid.iter().collect();
        assert_eq!(indices.len(), 128);

        assert_eq!(indices[0], Index5D::default());
        assert_eq!(indices[1], Index5D { x: 1, ..Default::default() });
        assert_eq!(indices[2], Index5D { y: 1, ..Default::default() });
        assert_eq!(indices[4], Index5D { z: 1, ..Default::default() });
        assert_eq!(indices[16], Index5D { t: 1, ..Default::default() });
        assert_eq!(indices[64], Index5D { c: 1, ..Default::default() });
        assert_eq!(
            indices[127],
            Index5D {
                x: 1,
                y: 1,
                z: 3,
                c: 1,
                t: 3
            }
        );

        let unique: HashSet<Index5D> = indices.iter().copied().collect();
        assert_eq!(unique.len(), 128);
        assert!(indices.iter().all(|i| grid.contains(i)));
    }

    #[test]
    fn test_linear_conversion() {
        let grid = create_test_grid();
        for (linear, index) in grid.iter().enumerate() {
            assert_eq!(grid.linear_to_index(linear), Some(index));
            assert_eq!(grid.index_to_linear(&index), Some(linear));
        }
        assert_eq!(grid.linear_to_index(128), None);
    }

    #[test]
    fn test_contains() {
        let grid = create_test_grid();
        assert!(grid.contains(&Index5D {
            x: 1,
            y: 1,
            z: 3,
            c: 1,
            t: 3
        }));
        assert!(!grid.contains(&Index5D { x: 2, ..Default::default() }));
        assert!(!grid.contains(&Index5D { c: 2, ..Default::default() }));
        assert!(grid.check_index(&Index5D { t: 4, ..Default::default() }).is_err());
    }

    #[test]
    fn test_uneven_grid_regions() {
        let grid = BlockGrid::new(
            Size5D {
                x: 600,
                y: 400,
                z: 5,
                c: 1,
                t: 1,
            },
            Size5D {
                x: 256,
                y: 256,
                z: 2,
                c: 1,
                t: 1,
            },
        )
        .unwrap();
        assert_eq!(grid.total_blocks(), 3 * 2 * 3);

        let region = grid.block_region(&Index5D::default()).unwrap();
        assert_eq!(region[0], 0..256);

        // Last block is trimmed to the image
        let region = grid
            .block_region(&Index5D {
                x: 2,
                y: 1,
                z: 2,
                c: 0,
                t: 0,
            })
            .unwrap();
        assert_eq!(region[0], 512..600);
        assert_eq!(region[1], 256..400);
        assert_eq!(region[2], 4..5);
        assert_eq!(region[3], 0..1);
    }

    #[test]
    fn test_regions_cover_image_once() {
        let grid = BlockGrid::new(
            Size5D {
                x: 5,
                y: 3,
                z: 2,
                c: 2,
                t: 1,
            },
            Size5D {
                x: 2,
                y: 2,
                z: 1,
                c: 1,
                t: 1,
            },
        )
        .unwrap();

        let mut covered = vec![0u32; 5 * 3 * 2 * 2];
        for index in &grid {
            let [rx, ry, rz, rc, _] = grid.block_region(&index).unwrap();
            for c in rc.clone() {
                for z in rz.clone() {
                    for y in ry.clone() {
                        for x in rx.clone() {
                            covered[(((c * 2 + z) * 3 + y) * 5 + x) as usize] += 1;
                        }
                    }
                }
            }
        }
        assert!(covered.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let image = Size5D {
            x: 10,
            y: 10,
            z: 1,
            c: 1,
            t: 0,
        };
        assert!(BlockGrid::new(image, Size5D::ONE).is_err());
        let image = Size5D { t: 1, ..image };
        assert!(BlockGrid::new(image, Size5D { x: 0, ..Size5D::ONE }).is_err());
    }

    #[test]
    fn test_extreme_geometry() {
        let huge = Size5D {
            x: u32::MAX,
            y: u32::MAX,
            z: u32::MAX,
            c: u32::MAX,
            t: u32::MAX,
        };
        assert!(matches!(
            BlockGrid::new(huge, Size5D::ONE),
            Err(ImsError::InvalidDimensions(_))
        ));

        // Last block along x would end past u32::MAX
        let image = Size5D { x: u32::MAX, ..Size5D::ONE };
        let block = Size5D { x: 1 << 31, ..Size5D::ONE };
        let grid = BlockGrid::new(image, block).unwrap();
        assert_eq!(grid.num_blocks().x, 2);
        let region = grid.block_region(&Index5D { x: 1, ..Default::default() }).unwrap();
        assert_eq!(region[0], (1 << 31)..u32::MAX);
    }
}
