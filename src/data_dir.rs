use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "DOCKET_DATA_DIR";

/// Where the data directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirSource {
    /// `--data-dir` on the command line.
    Explicit,
    /// The `DOCKET_DATA_DIR` variable.
    Environment,
    /// `$XDG_DATA_HOME/docket`.
    Xdg,
}

impl fmt::Display for DataDirSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Explicit => "--data-dir",
            Self::Environment => DATA_DIR_ENV,
            Self::Xdg => "xdg",
        })
    }
}

/// Root holding `docket.toml` and, unless configured elsewhere, the
/// `index/` directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    source: DataDirSource,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The DOCKET_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/docket/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, std::env::var_os(DATA_DIR_ENV))
    }

    fn resolve_with(
        explicit: Option<&Path>,
        env: Option<OsString>,
    ) -> Result<Self> {
        let (root, source) = match (explicit, env) {
            (Some(path), _) => (path.to_path_buf(), DataDirSource::Explicit),
            (None, Some(val)) if !val.is_empty() => {
                (PathBuf::from(val), DataDirSource::Environment)
            }
            _ => {
                let home = xdg::BaseDirectories::with_prefix("docket")
                    .get_data_home()
                    .ok_or_else(|| {
                        Error::Config(
                            "could not determine XDG data home directory"
                                .into(),
                        )
                    })?;
                (home, DataDirSource::Xdg)
            }
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        tracing::debug!(root = %root.display(), %source, "resolved data directory");

        Ok(Self { root, source })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> DataDirSource {
        self.source
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("docket.toml")
    }

    /// The config file, if one has been written.
    pub fn existing_config_file(&self) -> Option<PathBuf> {
        Some(self.config_file()).filter(|path| path.is_file())
    }

    /// Default index location. Not created here: read-only handles must
    /// be able to report a missing index.
    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }
}
