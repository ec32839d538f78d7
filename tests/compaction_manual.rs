mod common;

use common::{add_table, level_ids, options, read_level, value};
use lsm_compaction::{
    compaction::{worker, Leveled, Strategy},
    table::MemoryTableFactory,
    Config, VersionSet,
};
use std::sync::Arc;
use test_log::test;

#[test]
fn manual_compact_range() -> lsm_compaction::Result<()> {
    let version_set = Arc::new(VersionSet::new(Config::default().level_count(4)));
    let factory = Arc::new(MemoryTableFactory::default());

    let left = add_table(
        &version_set,
        &factory,
        1,
        vec![value("a", "1", 1), value("c", "1", 1)],
    )?;
    add_table(
        &version_set,
        &factory,
        1,
        vec![value("d", "1", 2), value("f", "1", 2)],
    )?;
    let right = add_table(
        &version_set,
        &factory,
        1,
        vec![value("g", "1", 3), value("i", "1", 3)],
    )?;
    add_table(
        &version_set,
        &factory,
        2,
        vec![value("b", "0", 0), value("e", "0", 0)],
    )?;

    let strategy = Strategy::Leveled(Leveled::default());

    let compaction = version_set
        .compact_range(&strategy, 1, 2, Some(b"d".as_slice()), Some(b"e".as_slice()))?
        .expect("should compact");

    assert!(compaction.is_manual_compaction());
    assert!(compaction.bottommost_level());
    assert_eq!(1, compaction.num_input_files(0));
    assert_eq!(1, compaction.num_input_files(1));

    // Range is already being compacted
    assert!(matches!(
        version_set.compact_range(&strategy, 1, 2, Some(b"e".as_slice()), None),
        Err(lsm_compaction::Error::CompactionConflict)
    ));

    let opts = options(&version_set, factory.clone(), strategy.clone());

    assert_eq!(
        worker::CompactionOutcome::Merged { created: 1 },
        worker::run_compaction(&opts, compaction)?
    );

    assert_eq!(vec![left, right], level_ids(&version_set, 1));
    assert_eq!(
        vec![vec![
            ("b".into(), 0, Some("0".into())),
            ("d".into(), 0, Some("1".into())),
            ("e".into(), 0, Some("0".into())),
            ("f".into(), 0, Some("1".into())),
        ]],
        read_level(&version_set, &*factory, 2)?,
    );

    // Nothing overlaps the range anymore
    assert!(version_set
        .compact_range(&strategy, 1, 2, Some(b"d".as_slice()), Some(b"f".as_slice()))?
        .is_none());

    // Only the next level can be targeted
    assert!(matches!(
        version_set.compact_range(&strategy, 1, 3, None, None),
        Err(lsm_compaction::Error::InvalidCompaction(_))
    ));

    Ok(())
}
