use barwatch_aggregator::aggregator::ObserveOutcome;
use barwatch_aggregator::registry::{AggregatorFactory, AggregatorRegistry};
use barwatch_core::bar::entity::Observation;
use barwatch_core::bar::error::ConfigError;
use barwatch_core::common::{BarInterval, PartitionKey};
use barwatch_core::config::AggregatorConfig;
use barwatch_sink::view::LatestBarView;
use barwatch_timer::manual::ManualScheduler;
use std::sync::Arc;
use std::thread;

fn setup() -> (AggregatorRegistry, Arc<ManualScheduler>, Arc<LatestBarView>) {
    let scheduler = Arc::new(ManualScheduler::starting_at(0));
    let view = Arc::new(LatestBarView::new(16));
    let factory =
        AggregatorFactory::new(&AggregatorConfig::default(), scheduler.clone(), view.clone())
            .unwrap();
    (AggregatorRegistry::new(factory), scheduler, view)
}

fn obs(key: &str, ts: i64, value: f64) -> Observation {
    Observation::new(ts, value, Some(PartitionKey::new(key)), BarInterval::MINUTE1).unwrap()
}

#[test]
fn test_factory_rejects_invalid_config() {
    let scheduler = Arc::new(ManualScheduler::starting_at(0));
    let view = Arc::new(LatestBarView::new(4));
    let config = AggregatorConfig {
        late_slack_seconds: -1,
        ..AggregatorConfig::default()
    };
    let res = AggregatorFactory::new(&config, scheduler.clone(), view.clone());
    assert!(matches!(res, Err(ConfigError::NegativeSlack(-1))));

    // 过大的宽限期会让看门狗时刻溢出，必须在构造时拒绝
    let config = AggregatorConfig {
        late_slack_seconds: i64::MAX / 1_000,
        ..AggregatorConfig::default()
    };
    let res = AggregatorFactory::new(&config, scheduler, view);
    assert!(matches!(res, Err(ConfigError::SlackTooLarge(_))));
}

#[test]
fn test_partitions_do_not_interfere() {
    let (registry, _, view) = setup();
    registry.observe(&obs("A", 0, 1.0)).unwrap();
    registry.observe(&obs("B", 0, 100.0)).unwrap();

    // B 进入新桶不会影响 A 的打开桶
    assert!(matches!(
        registry.observe(&obs("B", 61_000, 101.0)).unwrap(),
        ObserveOutcome::Rolled(_)
    ));
    let a = registry.get(Some(&PartitionKey::new("A"))).unwrap();
    assert_eq!(a.forming_bar().unwrap().bucket_start, 0);
    assert_eq!(a.cutoff(), None);

    // A 在桶 0 仍然可以继续累积
    assert_eq!(
        registry.observe(&obs("A", 30_000, 2.0)).unwrap(),
        ObserveOutcome::Accumulated
    );
    assert_eq!(view.len(), 1);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_concurrent_partitions() {
    let (registry, _, view) = setup();
    let keys = ["A", "B", "C", "D"];

    thread::scope(|s| {
        for (i, key) in keys.iter().enumerate() {
            let registry = &registry;
            s.spawn(move || {
                let base = f64::from(u32::try_from(i).unwrap()) * 100.0;
                for sec in 0..180_i32 {
                    let ts = i64::from(sec) * 1_000;
                    registry.observe(&obs(key, ts, base + f64::from(sec))).unwrap();
                }
            });
        }
    });
    assert_eq!(registry.flush_all(), keys.len());
    assert_eq!(registry.open_buckets(), 0);

    for (i, key) in keys.iter().enumerate() {
        let base = f64::from(u32::try_from(i).unwrap()) * 100.0;
        let history = view.history(Some(&PartitionKey::new(*key)));
        let summary: Vec<(i64, f64, f64)> = history
            .iter()
            .map(|b| (b.bucket_start, b.open, b.close))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, base, base + 59.0),
                (60_000, base + 60.0, base + 119.0),
                (120_000, base + 120.0, base + 179.0),
            ]
        );
    }
}

#[test]
fn test_default_partition_without_key() {
    let (registry, scheduler, view) = setup();
    let unkeyed = Observation::new(0, 3.0, None, BarInterval::MINUTE1).unwrap();
    registry.observe(&unkeyed).unwrap();
    assert_eq!(registry.partitions(), vec![None]);

    scheduler.advance_to(65_000);
    assert_eq!(view.latest(None).unwrap().close, 3.0);
}

#[test]
fn test_evict_cancels_watchdog_without_publishing() {
    let (registry, scheduler, view) = setup();
    registry.observe(&obs("A", 0, 1.0)).unwrap();
    assert_eq!(scheduler.pending(), 1);

    let evicted = registry.evict(Some(&PartitionKey::new("A"))).unwrap();
    assert!(!evicted.has_pending_watchdog());
    assert_eq!(scheduler.pending(), 0);
    assert!(registry.is_empty());
    assert!(view.is_empty());
    assert!(registry.evict(Some(&PartitionKey::new("A"))).is_none());
}

#[test]
fn test_flush_all_skips_idle_partitions() {
    let (registry, _, view) = setup();
    registry.observe(&obs("A", 0, 1.0)).unwrap();
    registry.observe(&obs("B", 0, 2.0)).unwrap();
    assert_eq!(registry.flush_all(), 2);
    assert_eq!(registry.flush_all(), 0);
    assert_eq!(view.snapshot().len(), 2);
}
