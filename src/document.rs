use std::{collections::BTreeMap, path::PathBuf};

use tantivy::Term;

use crate::{
    error::{Error, Result},
    handle::IndexHandle,
    tantivy_index::{self, StoredRecord, TextField},
};

/// The record accumulated by a [`DocumentBuilder`] and not yet committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingDocument {
    pub id: Option<u64>,
    /// Text keyed by prefix; `None` holds the unprefixed text.
    pub text: BTreeMap<Option<String>, String>,
    pub boolean_terms: Vec<String>,
    pub slots: BTreeMap<u32, f64>,
    pub data: Option<Vec<u8>>,
}

impl PendingDocument {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
            && self.boolean_terms.is_empty()
            && self.slots.is_empty()
    }

    fn to_stored(&self) -> StoredRecord {
        StoredRecord {
            text: self
                .text
                .iter()
                .map(|(prefix, value)| TextField {
                    prefix: prefix.clone(),
                    value: value.clone(),
                })
                .collect(),
            boolean_terms: self.boolean_terms.clone(),
            slots: self.slots.iter().map(|(s, v)| (*s, *v)).collect(),
        }
    }
}

/// Builds one record at a time and commits it to the index.
///
/// ```no_run
/// use docket::document::DocumentBuilder;
///
/// let mut builder = DocumentBuilder::new("/var/lib/docket/index")?;
/// builder
///     .set_id(1)?
///     .add_prefixed_text("red bicycle", "S")
///     .add_boolean_term("XCred")
///     .add_to_slot(0, 120.0)
///     .execute()?;
/// # Ok::<(), docket::Error>(())
/// ```
#[derive(Debug)]
pub struct DocumentBuilder {
    handle: IndexHandle,
    pending: PendingDocument,
}

impl DocumentBuilder {
    /// A builder writing to the index at `path`, created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let mut handle = IndexHandle::new(path);
        handle.set_read_write()?;
        Ok(Self::with_handle(handle))
    }

    /// A builder over a preconfigured handle. The handle must be
    /// read-write for [`execute`](Self::execute) to succeed.
    pub fn with_handle(handle: IndexHandle) -> Self {
        Self {
            handle,
            pending: PendingDocument::default(),
        }
    }

    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut IndexHandle {
        &mut self.handle
    }

    pub fn pending(&self) -> &PendingDocument {
        &self.pending
    }

    /// Set the record id. Committing a record with an id already in the
    /// index replaces the earlier record.
    pub fn set_id(&mut self, id: u64) -> Result<&mut Self> {
        if id == 0 {
            return Err(Error::InvalidId {
                reason: "record ids start at 1",
            });
        }
        self.pending.id = Some(id);
        Ok(self)
    }

    /// Set the unprefixed text, replacing any earlier value.
    pub fn add_text(&mut self, value: impl Into<String>) -> &mut Self {
        self.pending.text.insert(None, value.into());
        self
    }

    /// Set the text under `prefix`, replacing any earlier value.
    pub fn add_prefixed_text(
        &mut self,
        value: impl Into<String>,
        prefix: impl Into<String>,
    ) -> &mut Self {
        let prefix = prefix.into();
        let key = (!prefix.is_empty()).then_some(prefix);
        self.pending.text.insert(key, value.into());
        self
    }

    pub fn add_boolean_term(&mut self, term: impl Into<String>) -> &mut Self {
        self.pending.boolean_terms.push(term.into());
        self
    }

    pub fn add_to_slot(&mut self, slot: u32, value: f64) -> &mut Self {
        self.pending.slots.insert(slot, value);
        self
    }

    /// Attach an opaque payload returned with every match.
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.pending.data = Some(data.into());
        self
    }

    /// Commit the pending record, replacing any record with the same id.
    ///
    /// The builder is reset on success. On failure nothing is written and
    /// the pending record is kept.
    pub fn execute(&mut self) -> Result<&mut Self> {
        let id = self.pending.id.ok_or(Error::InvalidId {
            reason: "a record cannot be indexed without an id",
        })?;
        if self.pending.is_empty() {
            return Err(Error::EmptyRecord);
        }

        let mut generator = self.handle.term_generator();
        let record = self.pending.to_stored();
        let data = self.pending.data.as_deref();

        let connection = self.handle.connect()?;
        let fields = *connection.fields();
        let doc = tantivy_index::stage_document(
            &fields,
            &mut generator,
            id,
            &record,
            data,
        )?;

        let writer = connection.writer()?;
        writer.delete_term(Term::from_field_u64(fields.docid, id));
        let committed = writer
            .add_document(doc)
            .and_then(|_| writer.commit());
        if let Err(e) = committed {
            tracing::warn!(id, error = %e, "commit failed, rolling back");
            writer.rollback()?;
            return Err(e.into());
        }

        tracing::debug!(
            id,
            text_fields = record.text.len(),
            boolean_terms = record.boolean_terms.len(),
            slots = record.slots.len(),
            "committed record"
        );
        self.pending = PendingDocument::default();
        Ok(self)
    }

    /// Remove the record with `id`. Removing an absent id is not an error.
    pub fn delete(&mut self, id: u64) -> Result<&mut Self> {
        let connection = self.handle.connect()?;
        let docid = connection.fields().docid;
        let writer = connection.writer()?;
        writer.delete_term(Term::from_field_u64(docid, id));
        if let Err(e) = writer.commit() {
            writer.rollback()?;
            return Err(e.into());
        }
        tracing::debug!(id, "deleted record");
        Ok(self)
    }

    /// Discard the pending record without committing it.
    pub fn clear(&mut self) -> &mut Self {
        self.pending = PendingDocument::default();
        self
    }
}

#[cfg(test)]
mod tests {
    use tantivy::{TantivyDocument, collector::TopDocs, query::TermQuery};

    use super::*;
    use crate::handle::AccessMode;

    fn builder() -> (tempfile::TempDir, DocumentBuilder) {
        let tmp = tempfile::tempdir().unwrap();
        let builder = DocumentBuilder::new(tmp.path().join("index")).unwrap();
        (tmp, builder)
    }

    fn stored(builder: &mut DocumentBuilder, id: u64) -> Vec<StoredRecord> {
        let connection = builder.handle_mut().connect().unwrap();
        let fields = *connection.fields();
        let searcher = connection.searcher().unwrap();
        let query = TermQuery::new(
            Term::from_field_u64(fields.docid, id),
            tantivy::schema::IndexRecordOption::Basic,
        );
        searcher
            .search(&query, &TopDocs::with_limit(10))
            .unwrap()
            .into_iter()
            .map(|(_, addr)| {
                let doc: TantivyDocument = searcher.doc(addr).unwrap();
                tantivy_index::read_stored(&doc, &fields).unwrap().1
            })
            .collect()
    }

    #[test]
    fn zero_id_is_rejected() {
        let (_tmp, mut builder) = builder();
        assert!(matches!(builder.set_id(0), Err(Error::InvalidId { .. })));
        assert_eq!(builder.pending().id, None);
    }

    #[test]
    fn missing_id_is_rejected() {
        let (_tmp, mut builder) = builder();
        builder.add_text("red bicycle");
        let err = builder.execute().unwrap_err();
        assert!(matches!(err, Error::InvalidId { .. }));
        assert_eq!(builder.pending().text.len(), 1);
    }

    #[test]
    fn empty_record_is_rejected() {
        let (_tmp, mut builder) = builder();
        builder.set_id(1).unwrap().set_data("payload only");
        assert!(matches!(builder.execute(), Err(Error::EmptyRecord)));
        assert!(!builder.handle().is_connected());
    }

    #[test]
    fn last_write_wins() {
        let (_tmp, mut builder) = builder();
        builder
            .set_id(7)
            .unwrap()
            .add_text("first")
            .add_text("second")
            .add_prefixed_text("old title", "S")
            .add_prefixed_text("new title", "S")
            .add_to_slot(0, 1.0)
            .add_to_slot(0, 2.0)
            .add_boolean_term("XCred")
            .add_boolean_term("XCred");

        builder.execute().unwrap();
        let records = stored(&mut builder, 7);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.text(None), Some("second"));
        assert_eq!(record.text(Some("S")), Some("new title"));
        assert_eq!(record.slot(0), Some(2.0));
        assert_eq!(record.boolean_terms, vec!["XCred", "XCred"]);
    }

    #[test]
    fn execute_resets_the_builder() {
        let (_tmp, mut builder) = builder();
        builder.set_id(1).unwrap().add_text("red").execute().unwrap();
        assert_eq!(builder.pending(), &PendingDocument::default());
    }

    #[test]
    fn same_id_overwrites() {
        let (_tmp, mut builder) = builder();
        builder.set_id(3).unwrap().add_text("one").execute().unwrap();
        builder.set_id(3).unwrap().add_text("two").execute().unwrap();

        let records = stored(&mut builder, 3);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text(None), Some("two"));
        assert_eq!(builder.handle_mut().doc_count().unwrap(), 1);
    }

    #[test]
    fn delete_removes_record() {
        let (_tmp, mut builder) = builder();
        builder.set_id(1).unwrap().add_text("a").execute().unwrap();
        builder.set_id(2).unwrap().add_text("b").execute().unwrap();
        builder.delete(1).unwrap();

        assert!(stored(&mut builder, 1).is_empty());
        assert_eq!(builder.handle_mut().doc_count().unwrap(), 1);
    }

    #[test]
    fn read_only_handle_cannot_commit() {
        let tmp = tempfile::tempdir().unwrap();
        DocumentBuilder::new(tmp.path())
            .unwrap()
            .set_id(1)
            .unwrap()
            .add_text("seed")
            .execute()
            .unwrap();

        let mut handle = IndexHandle::new(tmp.path());
        handle.set_access_mode(AccessMode::ReadOnly).unwrap();
        let mut builder = DocumentBuilder::with_handle(handle);
        builder.set_id(2).unwrap().add_text("nope");
        assert!(matches!(builder.execute(), Err(Error::ReadOnlyHandle)));
        assert_eq!(builder.pending().id, Some(2));
    }

    #[test]
    fn nan_slot_value_keeps_pending_record() {
        let (_tmp, mut builder) = builder();
        builder.set_id(1).unwrap().add_to_slot(4, f64::NAN);
        assert!(matches!(
            builder.execute(),
            Err(Error::InvalidSlotValue { slot: 4, .. })
        ));
        assert_eq!(builder.pending().slots.len(), 1);
        assert_eq!(builder.handle_mut().doc_count().unwrap(), 0);
    }
}
