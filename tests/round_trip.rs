use std::{path::Path, sync::Arc};

use docket::{
    DocumentBuilder,
    Error,
    FetchWindow,
    PrefixRegistry,
    QueryExecutor,
    RangeProcessorKind,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn registry() -> Result<Arc<PrefixRegistry>, Box<dyn std::error::Error>> {
    let mut registry = PrefixRegistry::new();
    registry
        .add_text_prefix("S", "S")?
        .add_text_prefix("title", "S")?
        .add_boolean_prefix("colour", "XC")?
        .add_slot_prefix(1, "year:", RangeProcessorKind::NumericRange);
    Ok(Arc::new(registry))
}

fn ids(executor: &QueryExecutor) -> Result<Vec<u64>, Error> {
    Ok(executor.match_set()?.iter().map(|m| m.docid).collect())
}

fn seed_many(path: &Path, count: u64) -> TestResult {
    let mut builder = DocumentBuilder::new(path)?;
    for id in 1..=count {
        let body = "bicycle ".repeat(id as usize % 7 + 1);
        builder
            .set_id(id)?
            .add_prefixed_text(body, "S")
            .add_to_slot(1, 1990.0 + id as f64)
            .execute()?;
    }
    Ok(())
}

#[test]
fn red_bicycle_scenario() -> TestResult {
    let tmp = tempfile::tempdir()?;
    DocumentBuilder::new(tmp.path())?
        .set_id(1)?
        .add_prefixed_text("red bicycle", "S")
        .add_boolean_term("XCred")
        .execute()?;

    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);
    executor.execute("S:bicycle")?;
    assert!(executor.matches_estimated()? >= 1);

    let hit = executor.get_next()?.ok_or("expected a match")?;
    assert_eq!(hit.docid, 1);
    assert_eq!(hit.rank, 0);
    assert_eq!(hit.record.text(Some("S")), Some("red bicycle"));
    assert_eq!(hit.record.boolean_terms, vec!["XCred"]);
    Ok(())
}

#[test]
fn committed_fields_round_trip() -> TestResult {
    let tmp = tempfile::tempdir()?;
    DocumentBuilder::new(tmp.path())?
        .set_id(42)?
        .add_text("an unprefixed note")
        .add_prefixed_text("Touring Bicycle", "S")
        .add_boolean_term("XCgreen")
        .add_to_slot(1, 2011.0)
        .set_data(vec![0u8, 159, 146, 150])
        .execute()?;

    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);
    executor.execute("title:touring")?;
    let hit = executor.get_next()?.ok_or("expected a match")?;

    assert_eq!(hit.docid, 42);
    assert_eq!(hit.record.text(None), Some("an unprefixed note"));
    assert_eq!(hit.record.text(Some("S")), Some("Touring Bicycle"));
    assert_eq!(hit.record.boolean_terms, vec!["XCgreen"]);
    assert_eq!(hit.record.slot(1), Some(2011.0));
    assert_eq!(hit.data.as_deref(), Some(&[0u8, 159, 146, 150][..]));
    assert!(executor.get_next()?.is_none());
    Ok(())
}

#[test]
fn recommitting_an_id_replaces_the_record() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let mut builder = DocumentBuilder::new(tmp.path())?;
    builder.set_id(5)?.add_prefixed_text("old bicycle", "S").execute()?;
    builder.set_id(5)?.add_prefixed_text("new bicycle", "S").execute()?;
    drop(builder);

    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);
    executor.execute("title:bicycle")?;
    assert_eq!(executor.matches_estimated()?, 1);
    let hit = executor.get_next()?.ok_or("expected a match")?;
    assert_eq!(hit.record.text(Some("S")), Some("new bicycle"));

    executor.execute("title:old")?;
    assert_eq!(executor.matches_estimated()?, 0);
    Ok(())
}

#[test]
fn invalid_records_are_rejected() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let mut builder = DocumentBuilder::new(tmp.path())?;

    builder.add_text("no id");
    assert!(matches!(builder.execute(), Err(Error::InvalidId { .. })));

    builder.clear().set_id(1)?;
    assert!(matches!(builder.execute(), Err(Error::EmptyRecord)));
    Ok(())
}

#[test]
fn cursor_before_execute_fails() -> TestResult {
    let tmp = tempfile::tempdir()?;
    seed_many(tmp.path(), 1)?;
    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);
    assert!(matches!(executor.get_next(), Err(Error::NoResultSet)));
    Ok(())
}

#[test]
fn zero_matches_end_immediately() -> TestResult {
    let tmp = tempfile::tempdir()?;
    seed_many(tmp.path(), 3)?;
    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);
    executor.execute("title:tricycle")?;
    assert_eq!(executor.matches_estimated()?, 0);
    assert!(executor.get_next()?.is_none());
    assert!(executor.get_next()?.is_none());
    Ok(())
}

#[test]
fn fetching_nothing_still_counts() -> TestResult {
    let tmp = tempfile::tempdir()?;
    seed_many(tmp.path(), 4)?;
    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);
    executor.execute_window("title:bicycle", FetchWindow {
        num_to_fetch: 0,
        offset: 0,
        check_at_least: Some(1000),
    })?;
    assert_eq!(executor.matches_estimated()?, 4);
    assert!(executor.get_next()?.is_none());
    Ok(())
}

#[test]
fn pagination_windows_are_disjoint_and_consistent() -> TestResult {
    let tmp = tempfile::tempdir()?;
    seed_many(tmp.path(), 25)?;
    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);

    let window = |num_to_fetch, offset| FetchWindow {
        num_to_fetch,
        offset,
        check_at_least: None,
    };

    executor.execute_window("title:bicycle", window(10, 0))?;
    let first = ids(&executor)?;
    executor.execute_window("title:bicycle", window(10, 10))?;
    let second = ids(&executor)?;
    assert_eq!(executor.match_set()?.iter().next().map(|m| m.rank), Some(10));
    executor.execute_window("title:bicycle", window(20, 0))?;
    let both = ids(&executor)?;

    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 10);
    assert!(first.iter().all(|id| !second.contains(id)));
    assert_eq!([first, second].concat(), both);
    Ok(())
}

#[test]
fn ranges_and_filters_combine() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let mut builder = DocumentBuilder::new(tmp.path())?;
    let rows = [
        (1, "road bicycle", "XCred", 1995.0),
        (2, "mountain bicycle", "XCblue", 2005.0),
        (3, "folding bicycle", "XCred", 2015.0),
        (4, "cargo bicycle", "XCgreen", 2020.0),
    ];
    for (id, title, colour, year) in rows {
        builder
            .set_id(id)?
            .add_prefixed_text(title, "S")
            .add_boolean_term(colour)
            .add_to_slot(1, year)
            .execute()?;
    }
    drop(builder);

    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);

    let mut sorted = |query: &str| -> Result<Vec<u64>, Error> {
        executor.execute(query)?;
        let mut ids = ids(&executor)?;
        ids.sort_unstable();
        Ok(ids)
    };

    assert_eq!(sorted("year:2000..2016")?, vec![2, 3]);
    assert_eq!(sorted("year:2000..")?, vec![2, 3, 4]);
    assert_eq!(sorted("colour:red year:2000..")?, vec![3]);
    assert_eq!(sorted("colour:red colour:green")?, vec![1, 3, 4]);
    assert_eq!(sorted("bicycle NOT colour:red")?, Vec::<u64>::new());
    assert_eq!(sorted("title:bicycle NOT colour:red")?, vec![2, 4]);
    assert_eq!(sorted("title:\"folding bicycle\"")?, vec![3]);
    Ok(())
}

#[test]
fn filters_do_not_change_scores() -> TestResult {
    let tmp = tempfile::tempdir()?;
    seed_many(tmp.path(), 6)?;
    let mut executor = QueryExecutor::with_registry(tmp.path(), registry()?);

    executor.execute("title:bicycle")?;
    let plain: Vec<(u64, f32)> = executor
        .match_set()?
        .iter()
        .map(|m| (m.docid, m.score))
        .collect();

    executor.execute("title:bicycle year:..3000")?;
    let filtered: Vec<(u64, f32)> = executor
        .match_set()?
        .iter()
        .map(|m| (m.docid, m.score))
        .collect();

    assert_eq!(plain, filtered);
    Ok(())
}

#[test]
fn unknown_slot_kind_leaves_registry_untouched() {
    let mut registry = PrefixRegistry::new();
    let before = registry.clone();
    assert!(matches!(
        registry.try_add_slot_prefix(3, "size:", "geo"),
        Err(Error::InvalidRangeProcessorKind(kind)) if kind == "geo"
    ));
    assert_eq!(registry, before);
}
