mod common;

use common::{add_table, level_ids, options, read_level, value};
use lsm_compaction::{
    compaction::{worker, Leveled, Strategy},
    table::MemoryTableFactory,
    Config, FileId, HashMap, VersionSet,
};
use rand::Rng;
use std::sync::{Arc, Barrier};
use test_log::test;

const KEY_COUNT: usize = 80;
const THREADS: usize = 4;

fn key(idx: usize) -> String {
    format!("{idx:03}")
}

/// L1 holds new versions of the even keys, L2 holds old versions of all keys
fn setup() -> lsm_compaction::Result<(Arc<VersionSet>, Arc<MemoryTableFactory>)> {
    let version_set = Arc::new(VersionSet::new(Config::default().level_count(4)));
    let factory = Arc::new(MemoryTableFactory::default());

    let mut rng = rand::rng();

    for chunk in (0..KEY_COUNT).collect::<Vec<_>>().chunks(10) {
        let items = chunk
            .iter()
            .map(|&idx| value(&key(idx), &"o".repeat(rng.random_range(1..50)), 1))
            .collect();

        add_table(&version_set, &factory, 2, items)?;
    }

    let even = (0..KEY_COUNT).step_by(2).collect::<Vec<_>>();

    for chunk in even.chunks(8) {
        let items = chunk
            .iter()
            .map(|&idx| value(&key(idx), &"n".repeat(rng.random_range(1..50)), 2))
            .collect();

        add_table(&version_set, &factory, 1, items)?;
    }

    Ok((version_set, factory))
}

fn strategy() -> Strategy {
    Strategy::Leveled(Leveled::default().with_level_base_size(1))
}

#[test]
fn compaction_concurrent_picks_are_disjoint() -> lsm_compaction::Result<()> {
    let (version_set, _) = setup()?;
    let barrier = Barrier::new(THREADS);

    let mut picked = std::thread::scope(|s| {
        let handles = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    version_set.pick_compaction(&strategy())
                })
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .filter_map(|h| h.join().expect("thread should not panic"))
            .collect::<Vec<_>>()
    });

    assert!(!picked.is_empty());
    assert_eq!(picked.len(), version_set.compactions_in_progress());

    let mut seen = HashMap::<FileId, usize>::default();

    for compaction in &picked {
        for id in compaction.input_ids() {
            *seen.entry(id).or_default() += 1;
            assert!(version_set.is_being_compacted(id));
        }
    }

    assert!(seen.values().all(|&count| count == 1), "{seen:?}");

    for compaction in &mut picked {
        let result =
            version_set.install_compaction_results(compaction, Err(lsm_compaction::Error::Stopped));
        assert!(result.is_err());
    }

    assert_eq!(0, version_set.compactions_in_progress());
    assert!(seen.keys().all(|&id| !version_set.is_being_compacted(id)));

    Ok(())
}

#[test]
fn compaction_concurrent_workers() -> lsm_compaction::Result<()> {
    let (version_set, factory) = setup()?;
    let opts = options(&version_set, factory.clone(), strategy());

    std::thread::scope(|s| {
        let handles = (0..THREADS)
            .map(|_| {
                s.spawn(|| -> lsm_compaction::Result<()> {
                    while worker::do_compaction(&opts)? != worker::CompactionOutcome::DoNothing {}
                    Ok(())
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().expect("thread should not panic")?;
        }

        Ok::<_, lsm_compaction::Error>(())
    })?;

    // Other workers may have held files back, so finish up
    for _ in 0..1_000 {
        if worker::do_compaction(&opts)? == worker::CompactionOutcome::DoNothing {
            break;
        }
    }

    assert_eq!(0, version_set.compactions_in_progress());
    assert!(level_ids(&version_set, 1).is_empty());
    assert!(level_ids(&version_set, 2).is_empty());

    let items = read_level(&version_set, &*factory, 3)?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    assert_eq!(KEY_COUNT, items.len());

    for (idx, (user_key, _, value)) in items.into_iter().enumerate() {
        assert_eq!(key(idx), user_key);

        let expected = if idx % 2 == 0 { 'n' } else { 'o' };
        assert!(value.is_some_and(|v| v.chars().all(|c| c == expected)));
    }

    worker::delete_obsolete_files(&version_set, &*factory)?;
    assert_eq!(level_ids(&version_set, 3).len(), factory.table_count());

    Ok(())
}
