use std::path::PathBuf;

const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// Run configuration, loaded from environment variables.
///
/// Command-line flags override individual fields after loading.
#[derive(Debug, Clone)]
pub struct Config {
    /// Source photos (default: photos).
    pub photos_dir: PathBuf,
    /// Face crops are written here (default: cropped).
    pub cropped_dir: PathBuf,
    /// Renamed copies are written here (default: rename).
    pub rename_dir: PathBuf,
    /// Semicolon-delimited employee roster (default: employees.txt).
    pub roster_path: PathBuf,
    /// Directory containing the SCRFD ONNX model.
    pub model_dir: PathBuf,
    /// Skip faces smaller than this fraction of the photo.
    pub min_area_ratio: Option<f64>,
    /// Also write annotated full frames.
    pub annotate: bool,
    /// Score candidates by eyes found inside them.
    pub eyes_enabled: bool,
}

impl Config {
    /// Load configuration from `ROSTERCROP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            photos_dir: env_path("ROSTERCROP_PHOTOS_DIR", "photos"),
            cropped_dir: env_path("ROSTERCROP_CROPPED_DIR", "cropped"),
            rename_dir: env_path("ROSTERCROP_RENAME_DIR", "rename"),
            roster_path: env_path("ROSTERCROP_ROSTER_PATH", "employees.txt"),
            model_dir: env_path("ROSTERCROP_MODEL_DIR", "models"),
            min_area_ratio: std::env::var("ROSTERCROP_MIN_AREA")
                .ok()
                .and_then(|v| v.parse().ok()),
            annotate: env_flag("ROSTERCROP_ANNOTATE", false),
            eyes_enabled: env_flag("ROSTERCROP_EYES_ENABLED", true),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }

    /// Where annotated frames go.
    pub fn annotated_dir(&self) -> PathBuf {
        self.cropped_dir.join("annotated")
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_and_annotated_paths() {
        let config = Config {
            photos_dir: "p".into(),
            cropped_dir: "out".into(),
            rename_dir: "r".into(),
            roster_path: "e.txt".into(),
            model_dir: "/opt/models".into(),
            min_area_ratio: None,
            annotate: false,
            eyes_enabled: true,
        };
        assert_eq!(config.scrfd_model_path(), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(config.annotated_dir(), PathBuf::from("out/annotated"));
    }

    #[test]
    fn test_env_flag_parsing() {
        std::env::set_var("ROSTERCROP_TEST_FLAG_OFF", "0");
        std::env::set_var("ROSTERCROP_TEST_FLAG_ON", "yes");
        assert!(!env_flag("ROSTERCROP_TEST_FLAG_OFF", true));
        assert!(env_flag("ROSTERCROP_TEST_FLAG_ON", false));
        assert!(env_flag("ROSTERCROP_TEST_FLAG_UNSET", true));
    }
}
