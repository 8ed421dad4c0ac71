use approx::assert_abs_diff_eq;

use striate::scheduler::SmoothScheduler;
use striate::train::{BatchStats, TestRecord, TrainingHistory};
use striate::{Scheduler, SchedulerKind, StriateError, TrainConfig};

fn config(kind: SchedulerKind) -> TrainConfig {
    TrainConfig::new(10, 8, kind).with_test_freq(5)
}

fn push_test(history: &mut TrainingHistory, accuracy: f64) {
    let batch = history.test_outputs.len() * 5;
    history.test_outputs.push(TestRecord {
        epoch: 0,
        batch,
        logprob: BatchStats { cost: 1.0, error: 1.0 - accuracy, num_cases: 8 },
    });
}

#[test]
fn smooth_stops_once_the_trailing_average_drops() {
    let mut scheduler = Scheduler::new(SchedulerKind::Smooth, &config(SchedulerKind::Smooth)).unwrap();
    let mut history = TrainingHistory::new();

    for accuracy in [0.10, 0.12, 0.15, 0.17, 0.20] {
        push_test(&mut history, accuracy);
        assert!(scheduler.check_save_checkpoint(&history));
        assert!(scheduler.check_continue_training());
    }

    // The window for the sixth sample is the first five, whose mean beats 0.
    push_test(&mut history, 0.05);
    assert!(scheduler.check_save_checkpoint(&history));
    let Scheduler::Smooth(smooth) = &scheduler else { panic!("expected the smooth variant") };
    assert_abs_diff_eq!(smooth.previous_average(), 0.148, epsilon = 1e-9);

    // (0.12 + 0.15 + 0.17 + 0.20 + 0.05) / 5 = 0.138 < 0.148
    push_test(&mut history, 0.05);
    assert!(!scheduler.check_save_checkpoint(&history));
    assert!(!scheduler.check_continue_training());
}

#[test]
fn smooth_ignores_polls_without_a_new_validation_round() {
    let mut scheduler = Scheduler::new(SchedulerKind::Smooth, &config(SchedulerKind::Smooth)).unwrap();
    let mut history = TrainingHistory::new();
    assert!(scheduler.check_save_checkpoint(&history));

    push_test(&mut history, 0.5);
    for _ in 0..3 {
        scheduler.check_save_checkpoint(&history);
    }
    let Scheduler::Smooth(smooth) = &scheduler else { panic!("expected the smooth variant") };
    assert_eq!(smooth.accuracies(), &[0.5]);
}

#[test]
fn smooth_stop_is_sticky_until_reset() {
    let mut smooth = SmoothScheduler::new();
    for accuracy in [0.9, 0.9, 0.9, 0.9, 0.9, 0.9] {
        assert!(smooth.record_accuracy(accuracy));
    }
    assert!(smooth.record_accuracy(0.1));
    assert!(!smooth.record_accuracy(0.1));
    assert!(!smooth.record_accuracy(1.0));
    assert!(!smooth.is_continuing());

    let mut scheduler = Scheduler::Smooth(smooth);
    scheduler.reset();
    assert!(scheduler.check_continue_training());
}

#[test]
fn increment_always_continues() {
    let mut scheduler = Scheduler::new(SchedulerKind::Increment, &config(SchedulerKind::Increment)).unwrap();
    let mut history = TrainingHistory::new();
    for accuracy in [0.9, 0.5, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0] {
        push_test(&mut history, accuracy);
        assert!(scheduler.check_test_data());
        assert!(scheduler.check_save_checkpoint(&history));
        assert!(scheduler.check_continue_training());
    }
    assert_eq!(scheduler.kind(), SchedulerKind::Increment);
}

#[test]
fn construction_requires_matching_frequencies() {
    let mut config = config(SchedulerKind::Smooth);
    config.save_freq = 10;
    for kind in [SchedulerKind::Smooth, SchedulerKind::Increment] {
        let err = Scheduler::new(kind, &config).unwrap_err();
        assert!(matches!(err, StriateError::SchedulerPrecondition(_)));
    }
}

#[test]
fn construction_requires_a_single_test_batch() {
    let mut config = config(SchedulerKind::Smooth);
    config.test_range = vec![0, 1];
    let err = Scheduler::new(SchedulerKind::Smooth, &config).unwrap_err();
    assert!(matches!(err, StriateError::SchedulerPrecondition(ref msg) if msg.contains("one batch")));
}

#[test]
fn unknown_scheduler_name_is_rejected() {
    let err = "cosine".parse::<SchedulerKind>().unwrap_err();
    assert!(matches!(err, StriateError::UnknownScheduler(ref name) if name == "cosine"));
    assert_eq!(SchedulerKind::Smooth.to_string(), "smooth");
}

#[test]
fn construction_requires_a_positive_test_frequency() {
    let config = TrainConfig::new(1, 2, SchedulerKind::Smooth).with_test_freq(0);
    for kind in [SchedulerKind::Smooth, SchedulerKind::Increment] {
        let err = Scheduler::new(kind, &config).unwrap_err();
        assert!(matches!(err, StriateError::SchedulerPrecondition(ref msg) if msg.contains("positive")));
    }
}
