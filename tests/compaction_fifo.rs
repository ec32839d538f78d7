mod common;

use common::{add_table, level_ids, options, value};
use lsm_compaction::{
    compaction::{worker, Fifo, Strategy},
    table::MemoryTableFactory,
    Config, VersionSet,
};
use std::sync::Arc;
use test_log::test;

#[test]
fn fifo_drops_oldest_files() -> lsm_compaction::Result<()> {
    let version_set = Arc::new(VersionSet::new(Config::default()));
    let factory = Arc::new(MemoryTableFactory::default());

    let payload = "x".repeat(100);

    let mut ids = vec![];
    for seqno in 0..4 {
        ids.push(add_table(
            &version_set,
            &factory,
            0,
            vec![value(&format!("k{seqno}"), &payload, seqno)],
        )?);
    }

    // Every file is 111 bytes
    let opts = options(
        &version_set,
        factory.clone(),
        Strategy::Fifo(Fifo::new(250, None)),
    );

    assert_eq!(
        worker::CompactionOutcome::Dropped { deleted: 2 },
        worker::do_compaction(&opts)?
    );

    // Files were dropped without being read
    assert_eq!(0, factory.open_count());
    assert_eq!(ids.get(2..).unwrap_or_default(), level_ids(&version_set, 0));

    assert_eq!(2, worker::delete_obsolete_files(&version_set, &*factory)?);
    assert_eq!(2, factory.table_count());

    assert_eq!(
        worker::CompactionOutcome::DoNothing,
        worker::do_compaction(&opts)?
    );

    Ok(())
}
