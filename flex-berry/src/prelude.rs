//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;
pub use crate::{FlexError, FlexResult};

pub use crate::animation::{warp_sequence, ChimeraScript, DeformedVolumeSequence};
pub use crate::config::FlexConfig;
pub use crate::consts::{files, FlowAxis};
pub use crate::dataset::{self, home_flex_dir_with, RunPaths};
pub use crate::embedding::{parse_axes, Embedding, Histogram, ReducedPoint};
pub use crate::flow::{CachePolicy, FlowBank, FlowField, FlowFieldLoader};
pub use crate::linalg::pseudo_inverse;
pub use crate::pipeline::{load_animation, run_animation, RunContext};
pub use crate::reconstruct::{reconstruct_deformations, Projector, ReconstructionMode};
pub use crate::trajectory::Trajectory;
pub use crate::volume::{ImgWritePreview, Volume, VoxelGrid};

#[cfg(feature = "rayon")]
pub use crate::animation::par_warp_sequence;
