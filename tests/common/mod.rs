#![allow(dead_code)]

use lsm_compaction::{
    compaction::{worker, Strategy},
    table::{MemoryTableFactory, TableFactory},
    FileId, InternalValue, SeqNo, StopSignal, ValueType, VersionEdit, VersionSet,
};
use std::sync::Arc;

pub fn value(key: &str, value: &str, seqno: SeqNo) -> InternalValue {
    InternalValue::from_components(key, value, seqno, ValueType::Value)
}

pub fn tombstone(key: &str, seqno: SeqNo) -> InternalValue {
    InternalValue::new_tombstone(key, seqno)
}

/// Writes a table and installs it into the given level.
pub fn add_table(
    version_set: &VersionSet,
    factory: &MemoryTableFactory,
    level: usize,
    items: Vec<InternalValue>,
) -> lsm_compaction::Result<FileId> {
    let id = version_set.next_file_id();

    let file = factory
        .write_table(id, level, items)?
        .expect("table should not be empty");

    let mut edit = VersionEdit::new();
    edit.add_file(level, file);
    version_set.log_and_apply(&edit)?;

    Ok(id)
}

pub fn options(
    version_set: &Arc<VersionSet>,
    factory: Arc<dyn TableFactory>,
    strategy: Strategy,
) -> worker::Options {
    worker::Options {
        version_set: version_set.clone(),
        table_factory: factory,
        strategy,
        stop_signal: StopSignal::default(),
        smallest_snapshot: SeqNo::MAX,
    }
}

pub fn level_ids(version_set: &VersionSet, level: usize) -> Vec<FileId> {
    let mut ids = version_set
        .current()
        .level(level)
        .map(|files| files.iter().map(|f| f.id).collect::<Vec<_>>())
        .unwrap_or_default();

    ids.sort_unstable();
    ids
}

/// (user key, seqno, value), tombstones have no value
pub type Item = (String, SeqNo, Option<String>);

fn to_item(item: &InternalValue) -> Item {
    (
        String::from_utf8_lossy(&item.key.user_key).into_owned(),
        item.key.seqno,
        (!item.is_tombstone()).then(|| String::from_utf8_lossy(&item.value).into_owned()),
    )
}

/// Reads every file of a level, one item list per file, in file order.
pub fn read_level(
    version_set: &VersionSet,
    factory: &dyn TableFactory,
    level: usize,
) -> lsm_compaction::Result<Vec<Vec<Item>>> {
    let current = version_set.current();
    let mut files = vec![];

    for file in current.level(level).map(|l| l.iter()).into_iter().flatten() {
        let items = factory
            .open_table(file)?
            .scan()
            .collect::<lsm_compaction::Result<Vec<_>>>()?;

        files.push(items.iter().map(to_item).collect());
    }

    Ok(files)
}
