//! Settings loaded from `docket.toml` and `DOCKET_*` environment variables.
//!
//! ```toml
//! [index]
//! path = "/var/lib/docket/index"
//! access = "read-only"
//! stem_language = "english"
//! stopword_language = "english"
//! stopwords = ["via"]
//!
//! [prefixes.text]
//! title = "S"
//!
//! [prefixes.boolean]
//! colour = "XC"
//!
//! [[prefixes.slots]]
//! slot = 0
//! prefix = "price:"
//! kind = "numeric"
//! ```
//!
//! Environment variables use `__` between sections, for example
//! `DOCKET_INDEX__STEM_LANGUAGE=french`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    data_dir::DataDir,
    error::Result,
    handle::AccessMode,
    stopper::Stopper,
    tantivy_index::StemLanguage,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub index: IndexSettings,
    #[serde(default)]
    pub prefixes: PrefixConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub path: PathBuf,
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default = "default_stem_language")]
    pub stem_language: String,
    /// Language whose published stop list is loaded; `none` for no list.
    #[serde(default = "default_stopword_language")]
    pub stopword_language: String,
    /// Extra stop-words, added on top of the language list.
    #[serde(default)]
    pub stopwords: Vec<String>,
}

impl IndexSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            access: AccessMode::default(),
            stem_language: default_stem_language(),
            stopword_language: default_stopword_language(),
            stopwords: Vec::new(),
        }
    }

    pub fn stopper(&self) -> Result<Stopper> {
        let language: StemLanguage = self.stopword_language.parse()?;
        let mut stopper = Stopper::for_language(language);
        for word in &self.stopwords {
            stopper.add(word);
        }
        Ok(stopper)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrefixConfig {
    #[serde(default)]
    pub text: BTreeMap<String, String>,
    #[serde(default)]
    pub boolean: BTreeMap<String, String>,
    #[serde(default)]
    pub slots: Vec<SlotConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub slot: u32,
    pub prefix: String,
    #[serde(default = "default_slot_kind")]
    pub kind: String,
}

fn default_stem_language() -> String {
    "english".to_string()
}

fn default_stopword_language() -> String {
    "none".to_string()
}

fn default_slot_kind() -> String {
    "numeric".to_string()
}

impl Settings {
    /// Defaults rooted in `data_dir`: the index lives in `index/` and no
    /// prefixes are registered.
    pub fn defaults(data_dir: &DataDir) -> Self {
        Self {
            index: IndexSettings::new(data_dir.index_dir()),
            prefixes: PrefixConfig::default(),
        }
    }

    /// Load settings, merging defaults, the config file (explicit or
    /// `docket.toml` in the data directory) and `DOCKET_*` variables.
    pub fn load(data_dir: &DataDir, file: Option<&Path>) -> Result<Self> {
        let file = match file {
            Some(path) => Some(path.to_path_buf()),
            None => data_dir.existing_config_file(),
        };

        let mut figment = Self::base(data_dir);
        if let Some(path) = &file {
            figment = figment.merge(Toml::file(path));
        }
        let figment = figment.merge(Env::prefixed("DOCKET_").split("__"));

        let settings: Settings = figment.extract()?;
        tracing::debug!(
            config = ?file,
            data_dir = %data_dir.root().display(),
            data_dir_source = %data_dir.source(),
            index = %settings.index.path.display(),
            "loaded settings"
        );
        Ok(settings)
    }

    /// Parse settings from a TOML string on top of the defaults.
    pub fn from_toml_str(data_dir: &DataDir, toml: &str) -> Result<Self> {
        Ok(Self::base(data_dir).merge(Toml::string(toml)).extract()?)
    }

    fn base(data_dir: &DataDir) -> Figment {
        Figment::from(Serialized::defaults(Self::defaults(data_dir)))
    }
}
