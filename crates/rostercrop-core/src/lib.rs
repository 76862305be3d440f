//! rostercrop-core — Best-face cropping and roster identity resolution.
//!
//! Picks one face per photo from detector output, crops it with padding,
//! and maps crop filenames to employee roster records and their new names.

pub mod crop;
pub mod detector;
pub mod evaluator;
pub mod rename;
pub mod resolver;
pub mod roster;
pub mod types;

pub use crop::{crop_face, FaceCrop};
pub use detector::{DetectionParams, Detector, DetectorError, ScrfdDetector, ScrfdEyeDetector};
pub use evaluator::{evaluate, find_best_face, EvaluatorConfig};
pub use rename::synthesize;
pub use resolver::{IdentityResolver, MatchLayer, PrefixTieBreak, Resolution};
pub use roster::{RosterIndex, RosterStats};
pub use types::{FaceCandidate, IdentityRecord, Rectangle};
