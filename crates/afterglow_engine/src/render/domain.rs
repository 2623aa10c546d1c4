//! Frame pipeline stages

/// Named stage of the frame; declaration order is visitation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    /// Not attached to any stage
    Undefined,
    /// Depth-only prepass
    DepthPrepass,
    /// Shadow map rendering
    Shadow,
    /// Geometry buffer fill
    DeferredGeometry,
    /// Projected decals
    Decal,
    /// Deferred lighting resolve
    DeferredLighting,
    /// Opaque forward rendering
    Forward,
    /// Blended geometry
    Transparency,
    /// Screen-space effects and tonemapping
    PostProcess,
    /// Interface overlay
    UserInterface,
}

impl Domain {
    /// Name shared by the stage and its fixed pass
    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::DepthPrepass => "DepthPrepass",
            Self::Shadow => "Shadow",
            Self::DeferredGeometry => "DeferredGeometry",
            Self::Decal => "Decal",
            Self::DeferredLighting => "DeferredLighting",
            Self::Forward => "Forward",
            Self::Transparency => "Transparency",
            Self::PostProcess => "PostProcess",
            Self::UserInterface => "UserInterface",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
