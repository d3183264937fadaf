//! Fixed names shared by the build engine and the CLI.

/// Declared-dependency file searched for in the build tree.
pub const MANIFEST_FILENAME: &str = "requirements.in";

/// Locked output written next to the manifest by the resolver.
pub const RESOLVED_FILENAME: &str = "requirements.txt";

/// Hidden top-level directory holding one package directory per manifest.
pub const OVERLAY_DIR_NAME: &str = ".pip-overlay";

/// Hidden top-level directory holding the shared isolated runtime.
pub const RUNTIME_DIR_NAME: &str = ".venv";

/// Environment variable overriding the default build root.
pub const BUILD_ROOT_ENV: &str = "BUILD_ROOTDIR";

pub const DEFAULT_BUILD_ROOT: &str = ".build";

/// Name used when a stack directory's basename sanitizes to nothing.
pub const DEFAULT_STACK_NAME: &str = "local";
