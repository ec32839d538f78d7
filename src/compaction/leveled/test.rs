use super::Strategy;
use crate::{
    compaction::{state::CompactionState, CompactionStrategy},
    config::{Config, DataPath},
    file::{FileId, FileMetaData, FileRef},
    key::InternalKey,
    version::Version,
    ValueType,
};
use std::sync::Arc;
use test_log::test;

fn f(id: FileId, min: &str, max: &str, size: u64) -> FileRef {
    Arc::new(FileMetaData::new(
        id,
        InternalKey::new(min, id, ValueType::Value),
        InternalKey::new(max, id, ValueType::Value),
        size,
    ))
}

fn input_ids(compaction: &crate::compaction::Compaction, which: usize) -> Vec<FileId> {
    compaction.inputs(which).iter().map(|f| f.id).collect()
}

fn small_strategy() -> Strategy {
    Strategy::default()
        .with_l0_threshold(4)
        .with_table_target_size(100)
        .with_level_base_size(100)
}

#[test]
fn leveled_empty_levels() -> crate::Result<()> {
    let version = Version::new(0, 7);
    let mut state = CompactionState::default();

    assert!(Strategy::default()
        .pick(&version, &Config::default(), &mut state)
        .is_none());

    Ok(())
}

#[test]
fn leveled_l0_below_limit() -> crate::Result<()> {
    let version = Version::from_levels(
        0,
        vec![
            vec![f(1, "a", "c", 1), f(2, "b", "d", 1), f(3, "c", "e", 1)],
            vec![],
            vec![],
        ],
    )?;
    let mut state = CompactionState::default();

    assert!(small_strategy()
        .pick(&version, &Config::default(), &mut state)
        .is_none());

    Ok(())
}

#[test]
fn leveled_l0_reached_limit() -> crate::Result<()> {
    let version = Version::from_levels(
        0,
        vec![
            vec![
                f(1, "a", "c", 1),
                f(2, "b", "d", 1),
                f(3, "c", "e", 1),
                f(4, "d", "f", 1),
            ],
            vec![f(5, "a", "b", 1), f(6, "x", "z", 1)],
            vec![],
        ],
    )?;
    let mut state = CompactionState::default();

    let compaction = small_strategy()
        .pick(&version, &Config::default(), &mut state)
        .expect("should compact");

    assert_eq!(0, compaction.base_level());
    assert_eq!(1, compaction.output_level());
    assert_eq!(vec![1, 2, 3, 4], input_ids(&compaction, 0));
    assert_eq!(vec![5], input_ids(&compaction, 1));
    assert!((compaction.score() - 1.0).abs() < f64::EPSILON);
    assert_eq!(5, state.hidden_set().len());
    assert_eq!(1, state.in_progress(0));

    Ok(())
}

#[test]
fn leveled_one_l0_compaction_at_a_time() -> crate::Result<()> {
    let version = Version::from_levels(
        0,
        vec![
            vec![
                f(1, "a", "a", 1),
                f(2, "b", "b", 1),
                f(3, "c", "c", 1),
                f(4, "d", "d", 1),
                f(5, "e", "e", 1),
                f(6, "f", "f", 1),
            ],
            vec![],
            vec![],
        ],
    )?;
    let mut state = CompactionState::default();
    let strategy = small_strategy().with_l0_threshold(2);

    let mut compaction = strategy
        .pick(&version, &Config::default(), &mut state)
        .expect("should compact");

    // L0 files do not overlap, so only the oldest file is picked
    assert_eq!(vec![1], input_ids(&compaction, 0));

    assert!(strategy
        .pick(&version, &Config::default(), &mut state)
        .is_none());

    compaction.release_compaction_files(&mut state, &Ok(()));

    let next = strategy
        .pick(&version, &Config::default(), &mut state)
        .expect("should compact");
    assert_eq!(vec![1], input_ids(&next, 0));

    Ok(())
}

#[test]
fn leveled_largest_file_first_with_cursor() -> crate::Result<()> {
    let version = Version::from_levels(
        0,
        vec![
            vec![],
            vec![f(1, "a", "b", 200), f(2, "c", "d", 150), f(3, "e", "f", 300)],
            vec![],
            vec![],
        ],
    )?;
    let mut state = CompactionState::default();
    let strategy = small_strategy();
    let config = Config::default();

    let first = strategy.pick(&version, &config, &mut state).expect("should compact");
    assert_eq!(1, first.base_level());
    assert_eq!(2, first.output_level());
    assert_eq!(vec![3], input_ids(&first, 0));
    assert_eq!(Some(0), first.base_index());
    assert_eq!(1, state.next_compaction_index(1));
    assert!(first.is_trivial_move());

    let second = strategy.pick(&version, &config, &mut state).expect("should compact");
    assert_eq!(vec![1], input_ids(&second, 0));
    assert_eq!(Some(1), second.base_index());

    let third = strategy.pick(&version, &config, &mut state).expect("should compact");
    assert_eq!(vec![2], input_ids(&third, 0));
    assert_eq!(3, state.in_progress(1));

    // Everything is being compacted
    assert!(strategy.pick(&version, &config, &mut state).is_none());

    Ok(())
}

#[test]
fn leveled_skips_busy_output_files() -> crate::Result<()> {
    let version = Version::from_levels(
        0,
        vec![
            vec![],
            vec![f(1, "a", "c", 200), f(2, "x", "y", 100)],
            vec![f(5, "a", "d", 100)],
            vec![],
        ],
    )?;
    let mut state = CompactionState::default();
    state.hidden_set_mut().hide([5]);

    let compaction = small_strategy()
        .pick(&version, &Config::default(), &mut state)
        .expect("should compact");

    assert_eq!(vec![2], input_ids(&compaction, 0));
    assert_eq!(0, compaction.num_input_files(1));
    assert_eq!(None, compaction.parent_index());

    Ok(())
}

#[test]
fn leveled_parent_index() -> crate::Result<()> {
    let version = Version::from_levels(
        0,
        vec![
            vec![],
            vec![f(1, "k", "m", 500)],
            vec![f(5, "a", "d", 100), f(6, "j", "l", 100), f(7, "m", "n", 100)],
            vec![],
        ],
    )?;
    let mut state = CompactionState::default();

    let compaction = small_strategy()
        .pick(&version, &Config::default(), &mut state)
        .expect("should compact");

    assert_eq!(vec![6, 7], input_ids(&compaction, 1));
    assert_eq!(Some(1), compaction.parent_index());
    assert!(!compaction.is_trivial_move());

    Ok(())
}

#[test]
fn leveled_never_scores_last_level() -> crate::Result<()> {
    let version = Version::from_levels(
        0,
        vec![vec![], vec![], vec![f(1, "a", "z", 1_000_000)]],
    )?;
    let mut state = CompactionState::default();
    let strategy = small_strategy();

    assert_eq!(vec![0.0, 0.0, 0.0], strategy.level_scores(&version, &state));
    assert!(strategy
        .pick(&version, &Config::default(), &mut state)
        .is_none());

    Ok(())
}

#[test]
fn leveled_seek_compaction() -> crate::Result<()> {
    let version = Version::from_levels(
        0,
        vec![vec![], vec![f(1, "a", "c", 10)], vec![f(2, "b", "d", 10)], vec![]],
    )?;
    let mut state = CompactionState::default();
    let strategy = small_strategy();

    assert!(strategy
        .pick(&version, &Config::default(), &mut state)
        .is_none());

    while !state.charge_seek(1, 1, 10) {}

    let compaction = strategy
        .pick(&version, &Config::default(), &mut state)
        .expect("should compact");

    assert!(compaction.is_seek_compaction());
    assert_eq!(vec![1], input_ids(&compaction, 0));
    assert_eq!(vec![2], input_ids(&compaction, 1));
    assert_eq!(None, state.file_to_compact());

    Ok(())
}

#[test]
fn leveled_level_target_size() {
    let strategy = small_strategy();
    assert_eq!(100, strategy.level_target_size(1));
    assert_eq!(1_000, strategy.level_target_size(2));
    assert_eq!(10_000, strategy.level_target_size(3));

    let strategy = small_strategy().with_level_ratio_policy(vec![2.0, 3.0]);
    assert_eq!(200, strategy.level_target_size(2));
    assert_eq!(600, strategy.level_target_size(3));
    assert_eq!(1_800, strategy.level_target_size(4));

    // Base size defaults to the L0 threshold times the file size
    let strategy = Strategy::default()
        .with_l0_threshold(4)
        .with_table_target_size(10);
    assert_eq!(40, strategy.level_target_size(1));
}

#[test]
fn leveled_output_path() -> crate::Result<()> {
    let config = Config::default().data_paths(vec![
        DataPath::new("fast", 250),
        DataPath::new("slow", u64::MAX),
    ]);
    let strategy = small_strategy();

    assert_eq!(0, strategy.output_path_id(&config, 1));
    assert_eq!(1, strategy.output_path_id(&config, 2));
    assert_eq!(1, strategy.output_path_id(&config, 5));

    let version = Version::from_levels(
        0,
        vec![vec![], vec![f(1, "a", "c", 500)], vec![], vec![]],
    )?;
    let mut state = CompactionState::default();

    let compaction = strategy
        .pick(&version, &config, &mut state)
        .expect("should compact");
    assert_eq!(1, compaction.output_path_id());
    assert_eq!(100, compaction.max_output_file_size());
    assert_eq!(1_000, compaction.max_grandparent_overlap_bytes());

    Ok(())
}

#[test]
fn leveled_compacted_files_lose_seek_budget() -> crate::Result<()> {
    let strategy = small_strategy();
    let mut state = CompactionState::default();

    for id in 0..1_000 {
        let version = Version::from_levels(0, vec![vec![], vec![f(id, "a", "z", 1_000)], vec![]])?;

        assert!(!state.charge_seek(1, id, 1_000));

        let mut compaction = strategy
            .pick(&version, &Config::default(), &mut state)
            .expect("should compact");
        assert_eq!(vec![id], input_ids(&compaction, 0));

        compaction.release_inputs();
        compaction.release_compaction_files(&mut state, &Ok(()));
    }

    assert_eq!(0, state.tracked_seek_count());
    assert_eq!(None, state.file_to_compact());
    assert_eq!(0, state.total_in_progress());

    Ok(())
}
