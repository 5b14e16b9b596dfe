//! Output Framebuffer & Viewport

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VolumetraError};

/// The host-supplied render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    size: UVec2,
}

impl Framebuffer {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: UVec2::new(width, height),
        }
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.size.x
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.size.y
    }

    /// Fails with [`VolumetraError::Framebuffer`] if nothing can be rendered into it.
    pub fn validate(&self) -> Result<()> {
        if self.size.x == 0 || self.size.y == 0 {
            return Err(VolumetraError::Framebuffer(format!(
                "framebuffer has zero area ({}x{})",
                self.size.x, self.size.y
            )));
        }
        Ok(())
    }
}

/// Rectangular sub-region of a [`Framebuffer`], in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Covers the whole framebuffer.
    #[must_use]
    pub fn full(framebuffer: &Framebuffer) -> Self {
        Self::new(0, 0, framebuffer.width(), framebuffer.height())
    }

    /// Largest square centered in the framebuffer.
    #[must_use]
    pub fn fit_square(framebuffer: &Framebuffer) -> Self {
        let side = framebuffer.width().min(framebuffer.height());
        Self::new(
            (framebuffer.width() - side) / 2,
            (framebuffer.height() - side) / 2,
            side,
            side,
        )
    }

    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Checks that the viewport is non-empty and lies inside `framebuffer`.
    pub fn validate(&self, framebuffer: &Framebuffer) -> Result<()> {
        framebuffer.validate()?;
        let fits = u64::from(self.x) + u64::from(self.width) <= u64::from(framebuffer.width())
            && u64::from(self.y) + u64::from(self.height) <= u64::from(framebuffer.height());
        if self.width == 0 || self.height == 0 || !fits {
            return Err(VolumetraError::Framebuffer(format!(
                "viewport {}x{} at ({}, {}) does not fit into the {}x{} framebuffer",
                self.width,
                self.height,
                self.x,
                self.y,
                framebuffer.width(),
                framebuffer.height()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_square_centers_the_shorter_side() {
        let fb = Framebuffer::new(800, 600);
        assert_eq!(Viewport::fit_square(&fb), Viewport::new(100, 0, 600, 600));
    }

    #[test]
    fn viewport_outside_framebuffer_is_rejected() {
        let fb = Framebuffer::new(100, 100);
        assert!(Viewport::new(50, 50, 60, 10).validate(&fb).is_err());
        assert!(Viewport::full(&fb).validate(&fb).is_ok());
        assert!(Viewport::full(&Framebuffer::new(0, 10)).validate(&Framebuffer::new(0, 10)).is_err());
    }
}
