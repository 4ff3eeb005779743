/// Project file that marks a directory as buildable.
pub const PROJECT_FILENAME: &str = "wasmdist.json";

/// Default library manifest written inside the library directory.
pub const LIB_MANIFEST_FILENAME: &str = "lib_manifest.json";

/// Captured compiler output, relative to the project root.
pub const BUILD_LOG_FILENAME: &str = "build_log.txt";

/// Directory (under the project root) that receives archives.
pub const DIST_DIR: &str = "dist";

pub const ARCHIVE_EXTENSION: &str = "zip";

/// Marker file standing in for each user-data placeholder directory.
pub const PLACEHOLDER_MARKER: &str = ".gitkeep";
