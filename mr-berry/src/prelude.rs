//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{ImgWriteRaw, ImgWriteVis, LabelSlice, MrLabel, NiftiHeaderAttr};

pub use crate::consts::label::{is_background, is_tissue, BACKGROUND};
pub use crate::consts::{ADULT_AGE, SENIOR_AGE, TOTAL_BRAIN_NAME, UNKNOWN_LABEL_NAME};

pub use crate::aggregate::{VolumeEntry, VolumeReport};
pub use crate::catalog::LabelCatalog;
pub use crate::cohort::{resolve_subject_id, Cohort, SubjectTable};
pub use crate::compare::{CompareError, OverlapEntry, OverlapReport};
pub use crate::fuse::{fuse, repair, vote, FuseError, Voted};
pub use crate::stats::{CohortAccumulator, CohortStats, LabelStats, StatKey};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{self, generic};
