//! Default configuration values

use std::time::Duration;

/// Version written into a dependency's package.json while it is being built
pub const MARKER_VERSION: &str = "6.6.6-node-pi";

/// Extension of packed artifacts
pub const ARTIFACT_EXTENSION: &str = "tgz";

/// Directories searched (in order) for a packed artifact, relative to the package root
pub const ARTIFACT_DIRS: &[&str] = &["", "dist", ".dist", "build", ".build", "out", ".out"];

/// Delay after a process exit notification before the outcome is settled,
/// so output still in flight is not lost
pub const EXIT_GRACE_PERIOD: Duration = Duration::from_millis(1000);

/// Case-insensitive stderr fragments that mark a line as fatal
pub const FATAL_PATTERNS: &[&str] = &[
    "fatal: ",
    "error ",
    "error: ",
    "command not found",
    "no such file or directory",
    "is not a directory",
];

/// Attempts made when reading the current git branch
pub const BRANCH_READ_ATTEMPTS: u32 = 3;

/// Fixed delay between branch read attempts
pub const BRANCH_READ_BACKOFF: Duration = Duration::from_millis(500);

/// Attempts made when restoring a package's original version
pub const VERSION_RESTORE_ATTEMPTS: u32 = 3;

/// Delay between version restore attempts
pub const VERSION_RESTORE_DELAY: Duration = Duration::from_millis(100);

/// Prefix of the per-session marker carried by every spawned shell
pub const SESSION_MARKER_PREFIX: &str = "localpack-session";

/// Project manifest file name
pub const MANIFEST_FILE: &str = "localpack.toml";

/// Package metadata file name
pub const PACKAGE_FILE: &str = "package.json";

/// Name of the folder packages are installed into
pub const DEPENDENCY_FOLDER: &str = "node_modules";

/// Directories never mirrored in sync mode
pub const SYNC_IGNORED_DIRS: &[&str] = &["node_modules", ".git"];

/// Capacity of the live output broadcast channel
pub const OUTPUT_CHANNEL_CAPACITY: usize = 1024;
