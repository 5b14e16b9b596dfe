//! Normal map computation for intensity volumes.

use std::time::Instant;

use glam::{UVec3, Vec3};

use crate::errors::{Result, VolumetraError};
use crate::volume::grid::VolumeGrid;
use crate::volume::voxel::{IntensityVoxel, Normal};

/// Fills the normals buffers of `grid` from its intensities.
///
/// Voxels on the outer faces of the volume get the outward axis normal (the
/// `z` faces take precedence over `y`, `y` over `x`). Inner voxels get the
/// negated central-difference gradient, normalized, so the normal points away
/// from the steepest ascent. Neighbours are sampled through global
/// coordinates, which keeps segment borders seamless. Flat regions get the
/// zero normal.
pub fn compute_normals<I: IntensityVoxel>(grid: &VolumeGrid<I, Normal>) -> Result<()> {
    if !grid.has_normals() {
        return Err(VolumetraError::Configuration(
            "cannot compute normals for a volume grid without normals".into(),
        ));
    }
    let started = Instant::now();
    let size = grid.size();

    let intensities: Vec<_> = grid.segments().map(|segment| segment.intensities().read()).collect();
    let sample = |global: UVec3| -> Result<f32> {
        let (segment, local) = grid.locate(global)?;
        let voxel = intensities[grid.segment_index(segment)?].get(local)?;
        Ok(voxel.intensity())
    };

    for segment in grid.segments() {
        let Some(normals) = segment.normals() else {
            continue;
        };
        let mut normals = normals.write();
        let mut voxels = normals.voxels_mut();
        let extent = segment.size();
        let mut index = 0;
        for z in 0..extent.z {
            for y in 0..extent.y {
                for x in 0..extent.x {
                    let global = segment.offset() + UVec3::new(x, y, z);
                    voxels[index] = match face_normal(global, size) {
                        Some(normal) => normal,
                        None => {
                            let gradient = Vec3::new(
                                sample(global - UVec3::X)? - sample(global + UVec3::X)?,
                                sample(global - UVec3::Y)? - sample(global + UVec3::Y)?,
                                sample(global - UVec3::Z)? - sample(global + UVec3::Z)?,
                            ) / 2.0;
                            Normal::from_vec3(gradient.normalize_or_zero())
                        }
                    };
                    index += 1;
                }
            }
        }
    }

    log::debug!(
        "Computed normals for {} voxels in {:.2?}",
        grid.total_voxel_count(),
        started.elapsed()
    );
    Ok(())
}

fn face_normal(global: UVec3, size: UVec3) -> Option<Normal> {
    let axes = [
        (global.z, size.z, Vec3::Z),
        (global.y, size.y, Vec3::Y),
        (global.x, size.x, Vec3::X),
    ];
    axes.into_iter().find_map(|(c, n, axis)| {
        if c + 1 == n {
            Some(Normal::from_vec3(axis))
        } else if c == 0 {
            Some(Normal::from_vec3(-axis))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faces_prefer_z_then_y_then_x() {
        let size = UVec3::splat(4);
        assert_eq!(face_normal(UVec3::new(0, 0, 0), size), Some(Normal::from_vec3(-Vec3::Z)));
        assert_eq!(face_normal(UVec3::new(3, 3, 1), size), Some(Normal::from_vec3(Vec3::Y)));
        assert_eq!(face_normal(UVec3::new(0, 2, 1), size), Some(Normal::from_vec3(-Vec3::X)));
        assert_eq!(face_normal(UVec3::new(1, 2, 1), size), None);
    }

    #[test]
    fn inner_normals_point_down_the_gradient() {
        let grid = VolumeGrid::<f32, Normal>::new(UVec3::splat(6), UVec3::splat(4), true).unwrap();
        for segment in grid.segments() {
            let offset = segment.offset();
            let mut buffer = segment.intensities().write();
            let extent = buffer.size();
            let mut voxels = buffer.voxels_mut();
            let mut index = 0;
            for _z in 0..extent.z {
                for _y in 0..extent.y {
                    for x in 0..extent.x {
                        voxels[index] = (offset.x + x) as f32 / 10.0;
                        index += 1;
                    }
                }
            }
        }
        compute_normals(&grid).unwrap();

        // Across the segment border at x = 4.
        for x in 1..5 {
            let normal = grid.normal(UVec3::new(x, 2, 2)).unwrap();
            assert_eq!(normal, Normal::from_vec3(-Vec3::X));
        }
    }

    #[test]
    fn flat_regions_get_zero_normals() {
        let grid = VolumeGrid::<u8, Normal>::new(UVec3::splat(3), UVec3::splat(3), true).unwrap();
        compute_normals(&grid).unwrap();
        assert!(grid.normal(UVec3::ONE).unwrap().is_zero());
    }
}
