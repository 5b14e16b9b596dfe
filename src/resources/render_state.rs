use bitflags::bitflags;

bitflags! {
    /// Fixed-function state a draw call runs with.
    ///
    /// Every draw call carries its complete state, so no stage depends on
    /// state left behind by another.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RenderState: u32 {
        const DEPTH_TEST      = 1 << 0;
        const DEPTH_WRITE     = 1 << 1;
        /// Premultiplied "over" alpha blending.
        const BLEND           = 1 << 2;
        const CULL_BACK_FACE  = 1 << 3;
        /// Additive blending; takes precedence over `BLEND`.
        const BLEND_ADDITIVE  = 1 << 4;
        /// Keeps the per-channel maximum; takes precedence over the other blend modes.
        const BLEND_MAX       = 1 << 5;
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::DEPTH_TEST | Self::DEPTH_WRITE | Self::CULL_BACK_FACE
    }
}

impl RenderState {
    /// State for translucent geometry: tested against but not written to depth.
    #[must_use]
    pub fn translucent() -> Self {
        Self::DEPTH_TEST | Self::BLEND
    }

    #[must_use]
    pub fn is_blending(self) -> bool {
        self.intersects(Self::BLEND | Self::BLEND_ADDITIVE | Self::BLEND_MAX)
    }
}
