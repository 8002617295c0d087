use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher};

use crate::{
    config::IndexSettings,
    error::{Error, Result},
    stopper::Stopper,
    tantivy_index::{self, IndexFields, StemLanguage, TermGenerator},
};

/// Memory budget handed to the tantivy writer.
const WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// How a handle opens its index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum AccessMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

impl FromStr for AccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ro" | "read-only" | "read_only" | "readonly" => {
                Ok(AccessMode::ReadOnly)
            }
            "rw" | "read-write" | "read_write" | "readwrite" => {
                Ok(AccessMode::ReadWrite)
            }
            _ => Err(Error::UnsupportedAccessMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for AccessMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AccessMode> for String {
    fn from(mode: AccessMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadOnly => f.write_str("read-only"),
            AccessMode::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// An open index plus the reader and (for read-write handles) the writer.
pub struct Connection {
    index: Index,
    fields: IndexFields,
    reader: IndexReader,
    writer: Option<IndexWriter>,
    access: AccessMode,
}

impl Connection {
    fn open(path: &Path, access: AccessMode) -> Result<Self> {
        let index = match access {
            AccessMode::ReadOnly => tantivy_index::open_existing(path)?,
            AccessMode::ReadWrite => tantivy_index::open_or_create(path)?,
        };
        let fields = IndexFields::resolve(&index.schema())?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            fields,
            reader,
            writer: None,
            access,
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn fields(&self) -> &IndexFields {
        &self.fields
    }

    /// A searcher over the most recent commit.
    pub fn searcher(&self) -> Result<Searcher> {
        self.reader.reload()?;
        Ok(self.reader.searcher())
    }

    /// The index writer, created on first use. Tantivy allows a single
    /// writer per index, so the lock is only taken once a write happens.
    pub fn writer(&mut self) -> Result<&mut IndexWriter> {
        if self.access != AccessMode::ReadWrite {
            return Err(Error::ReadOnlyHandle);
        }
        if self.writer.is_none() {
            self.writer = Some(self.index.writer(WRITER_MEMORY_BUDGET)?);
        }
        self.writer.as_mut().ok_or(Error::ReadOnlyHandle)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("access", &self.access)
            .field("writer", &self.writer.is_some())
            .finish_non_exhaustive()
    }
}

/// A lazily connected handle on one index directory.
///
/// Access mode, stemming language and stopper are configured before the
/// first [`connect`](IndexHandle::connect); once connected the handle
/// refuses further configuration with [`Error::AlreadyConnected`].
#[derive(Debug)]
pub struct IndexHandle {
    path: PathBuf,
    access: AccessMode,
    stem_language: StemLanguage,
    stopper: Stopper,
    connection: Option<Connection>,
}

impl IndexHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            access: AccessMode::ReadOnly,
            stem_language: StemLanguage::default(),
            stopper: Stopper::default(),
            connection: None,
        }
    }

    pub fn from_config(settings: &IndexSettings) -> Result<Self> {
        let mut handle = Self::new(&settings.path);
        handle
            .set_access_mode(settings.access)?
            .set_stem_language(settings.stem_language.parse()?)?
            .set_stopper(settings.stopper()?)?;
        Ok(handle)
    }

    pub fn set_read_write(&mut self) -> Result<&mut Self> {
        self.set_access_mode(AccessMode::ReadWrite)
    }

    pub fn set_read_only(&mut self) -> Result<&mut Self> {
        self.set_access_mode(AccessMode::ReadOnly)
    }

    pub fn set_access_mode(&mut self, access: AccessMode) -> Result<&mut Self> {
        self.ensure_unconnected()?;
        self.access = access;
        Ok(self)
    }

    pub fn set_stem_language(
        &mut self,
        language: StemLanguage,
    ) -> Result<&mut Self> {
        self.ensure_unconnected()?;
        self.stem_language = language;
        Ok(self)
    }

    pub fn set_stopper(&mut self, stopper: Stopper) -> Result<&mut Self> {
        self.ensure_unconnected()?;
        self.stopper = stopper;
        Ok(self)
    }

    /// Open the index on first call; later calls return the same
    /// connection.
    pub fn connect(&mut self) -> Result<&mut Connection> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let connection = Connection::open(&self.path, self.access)?;
                tracing::info!(
                    path = %self.path.display(),
                    access = %self.access,
                    stem_language = %self.stem_language,
                    "connected to index"
                );
                connection
            }
        };
        Ok(self.connection.insert(connection))
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access
    }

    pub fn stem_language(&self) -> StemLanguage {
        self.stem_language
    }

    pub fn stopper(&self) -> &Stopper {
        &self.stopper
    }

    /// A term generator matching this handle's stemming language.
    pub fn term_generator(&self) -> TermGenerator {
        TermGenerator::new(self.stem_language)
    }

    /// Number of live documents in the latest commit.
    pub fn doc_count(&mut self) -> Result<u64> {
        let searcher = self.connect()?.searcher()?;
        Ok(searcher.num_docs())
    }

    fn ensure_unconnected(&self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        Ok(())
    }
}
