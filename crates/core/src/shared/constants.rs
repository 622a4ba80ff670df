/// Nearest-neighbor distance strictly below which an observation matches.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.3;

/// Maximum gallery entries kept per identity.
pub const DEFAULT_GALLERY_CAP: usize = 5;

/// Gallery refresh runs on every Nth frame of a scan.
pub const DEFAULT_REFRESH_INTERVAL: usize = 10;

/// Minimum person-detection confidence passed to the tracker.
pub const DEFAULT_DETECTION_CONFIDENCE: f64 = 0.7;

/// Consecutive store failures after which a scan reports degraded mode.
pub const DEFAULT_DEGRADED_AFTER_STORE_FAILURES: usize = 3;

/// Max frames a track can be lost before removal (~1 second at 30 fps).
pub const TRACKER_MAX_LOST: usize = 30;

/// Directory name used under the platform data/cache directories.
pub const APP_DIR_NAME: &str = "GalleryReid";

pub const LIVE_CROPS_DIR: &str = "huid_crops";
pub const ARCHIVED_CROPS_DIR: &str = "trash_crops";
pub const GALLERY_SNAPSHOT_FILE: &str = "gallery.json";
