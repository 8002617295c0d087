use std::{path::PathBuf, sync::Arc};

use tantivy::{
    DocAddress,
    Searcher,
    TantivyDocument,
    collector::{Count, TopDocs},
    query::Query,
};

use crate::{
    error::{Error, Result},
    handle::IndexHandle,
    prefix::PrefixRegistry,
    query_parser::{QueryParser, StemStrategy},
    tantivy_index::{self, StoredRecord},
};

/// Which slice of the ranked results to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub num_to_fetch: usize,
    pub offset: usize,
    /// Minimum number of candidates to inspect before estimating the total.
    /// Every candidate is counted, so any value is always satisfied.
    pub check_at_least: Option<usize>,
}

impl Default for FetchWindow {
    fn default() -> Self {
        Self {
            num_to_fetch: 100,
            offset: 0,
            check_at_least: None,
        }
    }
}

/// One hit in a [`MatchSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub docid: u64,
    /// Position in the full ranking, counting from 0.
    pub rank: usize,
    pub score: f32,
    pub record: StoredRecord,
    pub data: Option<Vec<u8>>,
    pub address: DocAddress,
}

/// The result window of one search, plus what produced it.
pub struct MatchSet {
    offset: usize,
    estimated: usize,
    matches: Vec<Match>,
    searcher: Searcher,
    query: Box<dyn Query>,
}

impl MatchSet {
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Estimated total number of matches across every window.
    pub fn estimated(&self) -> usize {
        self.estimated
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.matches.iter()
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// The searcher the window was read from, for snippets or
    /// explanations.
    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn query(&self) -> &dyn Query {
        self.query.as_ref()
    }
}

impl<'a> IntoIterator for &'a MatchSet {
    type Item = &'a Match;
    type IntoIter = std::slice::Iter<'a, Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}

impl std::fmt::Debug for MatchSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchSet")
            .field("offset", &self.offset)
            .field("estimated", &self.estimated)
            .field("matches", &self.matches)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    NotStarted,
    Positioned(usize),
    Exhausted,
}

/// Parses queries against the prefix registry and walks the results.
///
/// ```no_run
/// use docket::query::QueryExecutor;
///
/// let mut executor = QueryExecutor::new("/var/lib/docket/index");
/// executor.execute("title:bicycle")?;
/// println!("about {} matches", executor.matches_estimated()?);
/// while let Some(hit) = executor.get_next()? {
///     println!("{} {:.3}", hit.docid, hit.score);
/// }
/// # Ok::<(), docket::Error>(())
/// ```
#[derive(Debug)]
pub struct QueryExecutor {
    handle: IndexHandle,
    registry: Arc<PrefixRegistry>,
    results: Option<MatchSet>,
    cursor: Cursor,
}

impl QueryExecutor {
    /// An executor over `path` using the process-wide registry as it is
    /// right now.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_registry(path, PrefixRegistry::global())
    }

    pub fn with_registry(
        path: impl Into<PathBuf>,
        registry: Arc<PrefixRegistry>,
    ) -> Self {
        Self::with_handle(IndexHandle::new(path), registry)
    }

    pub fn with_handle(
        handle: IndexHandle,
        registry: Arc<PrefixRegistry>,
    ) -> Self {
        Self {
            handle,
            registry,
            results: None,
            cursor: Cursor::NotStarted,
        }
    }

    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut IndexHandle {
        &mut self.handle
    }

    pub fn registry(&self) -> &Arc<PrefixRegistry> {
        &self.registry
    }

    /// Run `query` for the first 100 matches.
    pub fn execute(&mut self, query: &str) -> Result<&mut Self> {
        self.execute_window(query, FetchWindow::default())
    }

    /// Run `query` and keep the requested window of matches.
    ///
    /// The previous match set survives any failure.
    pub fn execute_window(
        &mut self,
        query: &str,
        window: FetchWindow,
    ) -> Result<&mut Self> {
        if query.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }

        let stem_language = self.handle.stem_language();
        let stopper = self.handle.stopper().clone();
        let connection = self.handle.connect()?;
        let searcher = connection.searcher()?;
        let fields = *connection.fields();

        let mut parser = QueryParser::for_index(connection.index())?;
        parser
            .set_stemmer(stem_language)
            .set_stopper(stopper)
            .set_stemming_strategy(StemStrategy::Some);
        self.registry.configure(&mut parser);
        let parsed = parser.parse_query(query)?;

        // Clamp the window to the matches that exist, so offset + limit
        // never exceeds the match count.
        let estimated = searcher.search(parsed.as_ref(), &Count)?;
        let limit = window
            .num_to_fetch
            .min(estimated.saturating_sub(window.offset));
        let hits = if limit == 0 {
            Vec::new()
        } else {
            let top = TopDocs::with_limit(limit).and_offset(window.offset);
            searcher.search(parsed.as_ref(), &top)?
        };

        let mut matches = Vec::with_capacity(hits.len());
        for (i, (score, address)) in hits.into_iter().enumerate() {
            let doc: TantivyDocument = searcher.doc(address)?;
            let (docid, record, data) =
                tantivy_index::read_stored(&doc, &fields)?;
            matches.push(Match {
                docid,
                rank: window.offset + i,
                score,
                record,
                data,
                address,
            });
        }

        tracing::debug!(
            query,
            estimated,
            returned = matches.len(),
            offset = window.offset,
            check_at_least = ?window.check_at_least,
            "executed query"
        );

        self.results = Some(MatchSet {
            offset: window.offset,
            estimated,
            matches,
            searcher,
            query: parsed,
        });
        self.cursor = Cursor::NotStarted;
        Ok(self)
    }

    /// Estimated number of matches for the last query.
    pub fn matches_estimated(&self) -> Result<usize> {
        self.match_set().map(MatchSet::estimated)
    }

    /// Advance the cursor and return the match under it, or `None` once the
    /// window is exhausted.
    pub fn get_next(&mut self) -> Result<Option<&Match>> {
        let results = self.results.as_ref().ok_or(Error::NoResultSet)?;
        if results.estimated == 0 {
            self.cursor = Cursor::Exhausted;
            return Ok(None);
        }

        let next = match self.cursor {
            Cursor::NotStarted => 0,
            Cursor::Positioned(i) => i + 1,
            Cursor::Exhausted => return Ok(None),
        };

        if next < results.matches.len() {
            self.cursor = Cursor::Positioned(next);
            Ok(results.matches.get(next))
        } else {
            self.cursor = Cursor::Exhausted;
            Ok(None)
        }
    }

    pub fn match_set(&self) -> Result<&MatchSet> {
        self.results.as_ref().ok_or(Error::NoResultSet)
    }

    /// Drop the match set and cursor. The index stays connected.
    pub fn reset(&mut self) -> &mut Self {
        self.results = None;
        self.cursor = Cursor::NotStarted;
        self
    }
}
