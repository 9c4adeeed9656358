use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use resource_gantt::board::{BoardPhase, DragMode, PointerGesture};
use resource_gantt::error::{BoardError, CommitFailure, RejectReason};
use resource_gantt::model::{Operation, OperationId, Resource, ResourceId, ScheduleState, TimeAxis};
use resource_gantt::port::{BatchFailure, CommitRequest, SequenceRequest};
use resource_gantt::{
    BoardConfig, BoardObserver, MemoryBackend, Notice, ReschedulePort, ScheduleBoard, SnapshotSource, Strategy,
    Submission,
};

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
}

/// 08:00 to 18:00 over 600 px: one pixel per minute.
fn axis() -> TimeAxis {
    TimeAxis::layout(at(8, 0), at(18, 0), 1.0, 600.0)
}

fn x_of(h: u32, m: u32) -> f32 {
    axis().to_x(at(h, m))
}

fn id(s: &str) -> OperationId {
    OperationId::new(s)
}

fn rid(s: &str) -> ResourceId {
    ResourceId::new(s)
}

/// Counts every call before handing it to the in-memory backend.
struct CountingPort {
    inner: MemoryBackend,
    calls: AtomicUsize,
}

impl CountingPort {
    fn new(operations: Vec<Operation>, resources: Vec<Resource>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(operations, resources),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReschedulePort for CountingPort {
    async fn commit(&self, request: CommitRequest) -> Result<(), CommitFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(request).await
    }

    async fn commit_batch(&self, requests: Vec<CommitRequest>) -> Result<(), Vec<BatchFailure>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.commit_batch(requests).await
    }

    async fn commit_sequence(&self, request: SequenceRequest) -> Result<(), CommitFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.commit_sequence(request).await
    }
}

/// Backend that refuses everything.
struct RefusingPort;

#[async_trait]
impl ReschedulePort for RefusingPort {
    async fn commit(&self, _request: CommitRequest) -> Result<(), CommitFailure> {
        Err(CommitFailure::Rejected("locked by planner".into()))
    }

    async fn commit_batch(&self, requests: Vec<CommitRequest>) -> Result<(), Vec<BatchFailure>> {
        Err(requests
            .into_iter()
            .map(|r| BatchFailure {
                operation_id: r.operation_id,
                failure: CommitFailure::Network("connection reset".into()),
            })
            .collect())
    }

    async fn commit_sequence(&self, _request: SequenceRequest) -> Result<(), CommitFailure> {
        Err(CommitFailure::Network("connection reset".into()))
    }
}

/// Backend that never answers in time.
struct StalledPort;

#[async_trait]
impl ReschedulePort for StalledPort {
    async fn commit(&self, _request: CommitRequest) -> Result<(), CommitFailure> {
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        Ok(())
    }

    async fn commit_batch(&self, _requests: Vec<CommitRequest>) -> Result<(), Vec<BatchFailure>> {
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        Ok(())
    }

    async fn commit_sequence(&self, _request: SequenceRequest) -> Result<(), CommitFailure> {
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    moved: Mutex<Vec<(OperationId, Option<ResourceId>, DateTime<Utc>)>>,
    sequences: Mutex<Vec<Vec<OperationId>>>,
    notices: Mutex<Vec<Notice>>,
}

impl BoardObserver for Recorder {
    fn operation_moved(&self, operation: &OperationId, resource: Option<&ResourceId>, start: DateTime<Utc>) {
        self.moved
            .lock()
            .unwrap()
            .push((operation.clone(), resource.cloned(), start));
    }

    fn sequence_changed(&self, ordered: &[OperationId]) {
        self.sequences.lock().unwrap().push(ordered.to_vec());
    }

    fn notice(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

fn shop() -> (Vec<Operation>, Vec<Resource>) {
    (
        vec![
            Operation::new("op1", "Cut", 60).on("R1").starting_at(at(9, 0)),
            Operation::new("op2", "Weld", 60).on("R1").starting_at(at(10, 0)),
            Operation::new("tray", "Deburr", 45),
        ],
        vec![
            Resource::new("R1", "Saw"),
            Resource::new("R2", "Lathe"),
            Resource::new("R3", "Old mill").inactive(),
        ],
    )
}

async fn board_on(
    port: Arc<dyn ReschedulePort>,
    source: &dyn SnapshotSource,
    observer: Arc<Recorder>,
) -> ScheduleBoard {
    let mut board = ScheduleBoard::new(BoardConfig::default(), port, observer);
    board.load(source).await.unwrap();
    board
}

/// Start, hover and drop in one go, grabbing the block at `grab_x`.
fn drag(
    board: &mut ScheduleBoard,
    operation: &str,
    grab_x: f32,
    drop_x: f32,
    lane: &str,
) -> Result<Option<Submission>, BoardError> {
    let axis = axis();
    board.pointer(
        PointerGesture::Start {
            operation: id(operation),
            pointer_x: grab_x,
            mode: DragMode::Move,
        },
        &axis,
    )?;
    board.pointer(
        PointerGesture::Move {
            pointer_x: drop_x,
            lane: Some(rid(lane)),
        },
        &axis,
    )?;
    board.pointer(
        PointerGesture::End {
            pointer_x: drop_x,
            lane: Some(rid(lane)),
        },
        &axis,
    )
}

#[tokio::test]
async fn small_shift_on_same_lane_is_ignored() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(port.clone(), &port.inner, recorder.clone()).await;
    let before = board.state().clone();

    let submission = drag(&mut board, "op1", x_of(9, 0), x_of(9, 10), "R1").unwrap();

    assert!(submission.is_none());
    assert_eq!(board.state(), &before);
    assert_eq!(board.phase(), BoardPhase::Idle);
    assert_eq!(port.calls(), 0);
    assert!(!matches!(board.last_notice(), Some(Notice::Rejected { .. })));
}

#[tokio::test]
async fn overlapping_drop_is_rejected_without_a_commit() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    let submission = drag(&mut board, "op2", x_of(10, 0), x_of(9, 30), "R1").unwrap();

    assert!(submission.is_none());
    assert_eq!(port.calls(), 0);
    assert_eq!(board.state().operation(&id("op2")).unwrap().start, Some(at(10, 0)));
    assert_eq!(
        board.last_notice(),
        Some(&Notice::Rejected {
            operation: id("op2"),
            reason: RejectReason::Overlap {
                with: id("op1"),
                name: "Cut".into(),
            },
        })
    );
}

#[tokio::test]
async fn drops_on_inactive_lanes_and_outside_hours_are_rejected() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    drag(&mut board, "op2", x_of(10, 0), x_of(13, 0), "R3").unwrap();
    assert!(matches!(
        board.last_notice(),
        Some(Notice::Rejected {
            reason: RejectReason::InactiveResource(_),
            ..
        })
    ));

    // 06:00 is left of the axis origin.
    drag(&mut board, "op2", x_of(10, 0), -120.0, "R2").unwrap();
    assert!(matches!(
        board.last_notice(),
        Some(Notice::Rejected {
            reason: RejectReason::OutsideWorkingHours,
            ..
        })
    ));
    assert_eq!(port.calls(), 0);
}

#[tokio::test]
async fn accepted_drop_is_applied_then_confirmed() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(port.clone(), &port.inner, recorder.clone()).await;

    let submission = drag(&mut board, "op2", x_of(10, 0), x_of(13, 0), "R2")
        .unwrap()
        .expect("valid drop");

    // Optimistic: visible before the backend answers.
    let op2 = board.state().operation(&id("op2")).unwrap();
    assert_eq!(op2.resource_id, Some(rid("R2")));
    assert_eq!(op2.start, Some(at(13, 0)));
    assert!(board.state().is_dirty(&id("op2")));
    assert_eq!(board.phase(), BoardPhase::Committing);
    match &submission {
        Submission::Single(request) => {
            assert_eq!(request.start_time, at(13, 0));
            assert_eq!(request.end_time, at(14, 0));
        }
        other => panic!("unexpected submission {other:?}"),
    }

    board.run(submission).await;

    assert_eq!(board.phase(), BoardPhase::Idle);
    assert!(!board.state().is_dirty(&id("op2")));
    assert_eq!(port.calls(), 1);
    let stored = port.inner.operation(&id("op2")).unwrap();
    assert_eq!(stored.resource_id, Some(rid("R2")));
    assert_eq!(stored.start, Some(at(13, 0)));
    assert_eq!(
        recorder.moved.lock().unwrap().as_slice(),
        &[(id("op2"), Some(rid("R2")), at(13, 0))]
    );
    assert_eq!(board.last_notice(), Some(&Notice::Committed { operation: id("op2") }));
}

#[tokio::test]
async fn failed_commit_rolls_back_to_the_original_slot() {
    let (ops, resources) = shop();
    let source = MemoryBackend::new(ops, resources);
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(Arc::new(RefusingPort), &source, recorder.clone()).await;
    let before = board.state().clone();

    let submission = drag(&mut board, "op1", x_of(9, 0), x_of(14, 0), "R2").unwrap().unwrap();
    board.run(submission).await;

    assert_eq!(board.state(), &before);
    let op1 = board.state().operation(&id("op1")).unwrap();
    assert_eq!(op1.resource_id, Some(rid("R1")));
    assert_eq!(op1.start, Some(at(9, 0)));
    assert!(recorder.moved.lock().unwrap().is_empty());
    assert!(matches!(
        board.last_notice(),
        Some(Notice::CommitFailed {
            failure: CommitFailure::Rejected(_),
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn silent_backend_times_out_and_rolls_back() {
    let (ops, resources) = shop();
    let source = MemoryBackend::new(ops, resources);
    let mut board = board_on(Arc::new(StalledPort), &source, Arc::new(Recorder::default())).await;
    let before = board.state().clone();

    let submission = drag(&mut board, "op2", x_of(10, 0), x_of(15, 0), "R1").unwrap().unwrap();
    board.run(submission).await;

    assert_eq!(board.state(), &before);
    let limit = BoardConfig::default().commit_timeout();
    match board.last_notice() {
        Some(Notice::CommitFailed { failure, .. }) => {
            assert_eq!(failure, &CommitFailure::Timeout(limit));
            assert_ne!(failure, &CommitFailure::Rejected(String::new()));
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn board_is_busy_until_the_commit_settles() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    let submission = drag(&mut board, "op2", x_of(10, 0), x_of(13, 0), "R2").unwrap().unwrap();

    let second = board.pointer(
        PointerGesture::Start {
            operation: id("op1"),
            pointer_x: x_of(9, 0),
            mode: DragMode::Move,
        },
        &axis(),
    );
    assert_eq!(second, Err(BoardError::Busy));
    assert_eq!(board.reorder_lane(&rid("R1"), 0, 0), Err(BoardError::Busy));
    assert_eq!(board.reset_sequence(), Err(BoardError::Busy));

    board.run(submission).await;
    assert_eq!(board.phase(), BoardPhase::Idle);
}

#[tokio::test]
async fn cancel_leaves_no_trace() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;
    let before = board.state().clone();
    let axis = axis();

    board
        .pointer(
            PointerGesture::Start {
                operation: id("op1"),
                pointer_x: x_of(9, 0),
                mode: DragMode::Move,
            },
            &axis,
        )
        .unwrap();
    board
        .pointer(
            PointerGesture::Move {
                pointer_x: x_of(15, 0),
                lane: Some(rid("R2")),
            },
            &axis,
        )
        .unwrap();
    assert!(board.drag().and_then(|d| d.preview.as_ref()).is_some());

    board.pointer(PointerGesture::Cancel, &axis).unwrap();

    assert_eq!(board.phase(), BoardPhase::Idle);
    assert_eq!(board.state(), &before);
    assert_eq!(port.calls(), 0);
    assert_eq!(
        board.pointer(
            PointerGesture::End {
                pointer_x: 0.0,
                lane: None
            },
            &axis
        ),
        Err(BoardError::NotDragging)
    );
}

#[tokio::test]
async fn unscheduled_operation_can_be_dropped_from_the_tray() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;
    assert_eq!(board.state().unscheduled().len(), 1);

    let submission = drag(&mut board, "tray", 0.0, x_of(12, 0), "R1").unwrap().unwrap();
    board.run(submission).await;

    let stored = port.inner.operation(&id("tray")).unwrap();
    assert_eq!(stored.start, Some(at(12, 0)));
    assert_eq!(stored.duration_minutes, 45);
    assert!(board.state().unscheduled().is_empty());
}

#[tokio::test]
async fn resizing_changes_only_the_duration() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;
    let axis = axis();

    // op2 is 10:00-11:00; pull its end to 11:30.
    board
        .pointer(
            PointerGesture::Start {
                operation: id("op2"),
                pointer_x: x_of(10, 58),
                mode: DragMode::ResizeEnd,
            },
            &axis,
        )
        .unwrap();
    let submission = board
        .pointer(
            PointerGesture::End {
                pointer_x: x_of(11, 30),
                lane: Some(rid("R2")),
            },
            &axis,
        )
        .unwrap()
        .unwrap();
    board.run(submission).await;

    let stored = port.inner.operation(&id("op2")).unwrap();
    assert_eq!(stored.resource_id, Some(rid("R1")));
    assert_eq!(stored.start, Some(at(10, 0)));
    assert_eq!(stored.duration_minutes, 90);
}

#[tokio::test]
async fn dropping_ahead_of_a_neighbour_reorders_the_sequence() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(port.clone(), &port.inner, recorder.clone()).await;

    let submission = drag(&mut board, "op2", x_of(10, 0), x_of(8, 0), "R1").unwrap().unwrap();

    assert_eq!(board.state().lane(&rid("R1")), &[id("op2"), id("op1")]);
    assert_eq!(
        recorder.sequences.lock().unwrap().as_slice(),
        &[vec![id("op2"), id("op1"), id("tray")]]
    );

    board.run(submission).await;
    assert_eq!(board.state().ordered_ids(), &[id("op2"), id("op1"), id("tray")]);
    assert_eq!(recorder.sequences.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rolled_back_drop_restores_and_reports_the_sequence() {
    let (ops, resources) = shop();
    let source = MemoryBackend::new(ops, resources);
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(Arc::new(RefusingPort), &source, recorder.clone()).await;
    let before = board.state().clone();

    let submission = drag(&mut board, "op2", x_of(10, 0), x_of(8, 0), "R1").unwrap().unwrap();
    board.run(submission).await;

    assert_eq!(board.state(), &before);
    assert_eq!(
        recorder.sequences.lock().unwrap().as_slice(),
        &[
            vec![id("op2"), id("op1"), id("tray")],
            vec![id("op1"), id("op2"), id("tray")],
        ]
    );
}

#[tokio::test]
async fn moves_within_a_lane_keep_the_sequence_quiet() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(port.clone(), &port.inner, recorder.clone()).await;

    let submission = drag(&mut board, "op2", x_of(10, 0), x_of(15, 0), "R1").unwrap().unwrap();
    board.run(submission).await;

    assert!(recorder.sequences.lock().unwrap().is_empty());
}

#[tokio::test]
async fn a_run_of_drops_never_leaves_an_overlap() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    // (operation, grab, drop, lane, accepted)
    let steps = [
        ("op2", x_of(10, 0), x_of(13, 0), "R2", true),
        ("op1", x_of(9, 0), x_of(13, 30), "R2", false),
        ("op1", x_of(9, 0), x_of(14, 0), "R2", true),
        ("tray", 0.0, x_of(9, 30), "R1", true),
        ("op2", x_of(13, 0), x_of(10, 0), "R1", false),
        ("op2", x_of(13, 0), x_of(10, 30), "R1", true),
    ];
    for (operation, grab, drop, lane, accepted) in steps {
        match drag(&mut board, operation, grab, drop, lane).unwrap() {
            Some(submission) => {
                assert!(accepted, "{operation} onto {lane}");
                board.run(submission).await;
            }
            None => assert!(!accepted, "{operation} onto {lane}"),
        }
        assert!(board.state().conflicts().is_empty(), "{operation} onto {lane}");
    }

    assert_eq!(port.calls(), 4);
    let stored = ScheduleState::new(port.inner.operations(), port.inner.resources());
    assert!(stored.conflicts().is_empty());
    assert_eq!(stored.lane(&rid("R1")), &[id("tray"), id("op2")]);
    assert_eq!(stored.lane(&rid("R2")), &[id("op1")]);
}

#[tokio::test]
async fn loading_the_same_snapshot_twice_gives_the_same_state() {
    let (ops, resources) = shop();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;
    let first = board.state().clone();

    board.load(&port.inner).await.unwrap();

    assert_eq!(board.state(), &first);
    assert!(matches!(board.last_notice(), Some(Notice::Loaded { operations: 3, resources: 3, .. })));
}

#[tokio::test]
async fn asap_outcome_is_committed_as_one_batch() {
    let port = CountingPort::new(
        vec![
            Operation::new("later", "Later", 60).on("R1").with_priority(2),
            Operation::new("urgent", "Urgent", 60).on("R1").with_priority(1),
        ],
        vec![Resource::new("R1", "Press")],
    );
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    let outcome = board.apply_strategy(Strategy::Asap, at(8, 0)).unwrap();
    // Proposals leave the board alone.
    assert!(board.state().operation(&id("urgent")).unwrap().start.is_none());

    let submission = board.commit_outcome(&outcome).unwrap().unwrap();
    assert!(matches!(&submission, Submission::Batch(requests) if requests.len() == 2));
    board.run(submission).await;

    assert_eq!(port.calls(), 1);
    assert_eq!(port.inner.operation(&id("urgent")).unwrap().start, Some(at(8, 0)));
    assert_eq!(port.inner.operation(&id("later")).unwrap().start, Some(at(9, 0)));
    assert_eq!(board.last_notice(), Some(&Notice::BatchCommitted { count: 2 }));
}

#[tokio::test]
async fn leveling_outcome_reaches_the_backend() {
    let port = CountingPort::new(
        vec![
            Operation::new("a", "A", 30).on("R1").starting_at(at(8, 0)),
            Operation::new("b", "B", 30).on("R1").starting_at(at(8, 10)),
            Operation::new("c", "C", 30).on("R1").starting_at(at(8, 20)),
        ],
        vec![Resource::new("R1", "Press")],
    );
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    let outcome = board.apply_strategy(Strategy::ResourceLeveling, at(8, 0)).unwrap();
    let submission = board.commit_outcome(&outcome).unwrap().unwrap();
    board.run(submission).await;

    let starts: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|o| port.inner.operation(&id(o)).unwrap().start)
        .collect();
    assert_eq!(starts, vec![Some(at(8, 0)), Some(at(8, 30)), Some(at(9, 0))]);
    assert!(board.state().conflicts().is_empty());
}

#[tokio::test]
async fn alap_outcome_lands_on_the_due_dates() {
    let port = CountingPort::new(
        vec![
            Operation::new("a", "A", 60).on("R1").due_by(at(16, 0)),
            Operation::new("b", "B", 60).on("R2").after("a").due_by(at(17, 0)),
        ],
        vec![Resource::new("R1", "Saw"), Resource::new("R2", "Paint")],
    );
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    let outcome = board.apply_strategy(Strategy::Alap, at(8, 0)).unwrap();
    let submission = board.commit_outcome(&outcome).unwrap().unwrap();
    board.run(submission).await;

    assert_eq!(port.inner.operation(&id("a")).unwrap().start, Some(at(15, 0)));
    assert_eq!(port.inner.operation(&id("b")).unwrap().start, Some(at(16, 0)));
    assert_eq!(board.last_notice(), Some(&Notice::BatchCommitted { count: 2 }));
}

#[tokio::test]
async fn drum_outcome_buffers_the_bottleneck() {
    let port = CountingPort::new(
        vec![
            Operation::new("prep", "Prep", 60).on("R0"),
            Operation::new("press", "Press", 60).on("Drum").after("prep"),
            Operation::new("pack", "Pack", 30).on("R2").after("press"),
        ],
        vec![
            Resource::new("R0", "Prep bench"),
            Resource::new("Drum", "Press").bottleneck(),
            Resource::new("R2", "Packing"),
        ],
    );
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    let outcome = board.apply_strategy(Strategy::Drum, at(8, 0)).unwrap();
    let submission = board.commit_outcome(&outcome).unwrap().unwrap();
    board.run(submission).await;

    for (op, start) in [("prep", at(8, 0)), ("press", at(10, 0)), ("pack", at(11, 30))] {
        assert_eq!(port.inner.operation(&id(op)).unwrap().start, Some(start), "{op}");
        assert_eq!(board.state().operation(&id(op)).unwrap().start, Some(start), "{op}");
    }
    assert!(board.state().conflicts().is_empty());
}

#[tokio::test]
async fn partial_batch_keeps_the_successes_and_rolls_back_the_rest() {
    let ops: Vec<Operation> = (1..=5)
        .map(|n| Operation::new(format!("op{n}"), format!("Step {n}"), 60).on("R1").with_priority(n))
        .collect();
    let port = CountingPort::new(ops, vec![Resource::new("R1", "Press")]);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    let outcome = board.apply_strategy(Strategy::Asap, at(8, 0)).unwrap();
    assert_eq!(outcome.changed.len(), 5);

    // Another client takes 10:00-11:00 on the press in the meantime.
    port.inner
        .upsert(Operation::new("intruder", "Rush job", 60).on("R1").starting_at(at(10, 0)));

    let submission = board.commit_outcome(&outcome).unwrap().unwrap();
    board.run(submission).await;

    for (op, start) in [("op1", at(8, 0)), ("op2", at(9, 0)), ("op4", at(11, 0)), ("op5", at(12, 0))] {
        assert_eq!(board.state().operation(&id(op)).unwrap().start, Some(start), "{op}");
        assert_eq!(port.inner.operation(&id(op)).unwrap().start, Some(start), "{op}");
    }
    assert!(board.state().operation(&id("op3")).unwrap().start.is_none());
    assert!(port.inner.operation(&id("op3")).unwrap().start.is_none());
    assert_eq!(board.state().dirty_ids().count(), 0);

    match board.last_notice() {
        Some(Notice::PartialBatch { committed, failed }) => {
            assert_eq!(*committed, 4);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].operation_id, id("op3"));
            assert_eq!(failed[0].failure, CommitFailure::Conflict { with: id("intruder") });
        }
        other => panic!("expected a partial batch, got {other:?}"),
    }
}

#[tokio::test]
async fn infeasible_strategy_is_reported_and_nothing_moves() {
    let port = CountingPort::new(
        vec![
            Operation::new("a", "A", 30).on("R1").after("b"),
            Operation::new("b", "B", 30).on("R1").after("a"),
        ],
        vec![Resource::new("R1", "Press")],
    );
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;
    let before = board.state().clone();

    assert!(board.apply_strategy(Strategy::Asap, at(8, 0)).is_err());
    assert!(matches!(board.last_notice(), Some(Notice::Infeasible(_))));
    assert_eq!(board.state(), &before);
    assert_eq!(port.calls(), 0);
}

fn chained_lane() -> (Vec<Operation>, Vec<Resource>) {
    (
        vec![
            Operation::new("a", "A", 60).on("R1").starting_at(at(8, 0)),
            Operation::new("b", "B", 60).on("R1").starting_at(at(9, 0)),
            Operation::new("c", "C", 60).on("R1").starting_at(at(10, 0)),
        ],
        vec![Resource::new("R1", "Press")],
    )
}

#[tokio::test]
async fn reordering_a_chained_lane_repacks_it() {
    let (ops, resources) = chained_lane();
    let port = CountingPort::new(ops, resources);
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(port.clone(), &port.inner, recorder.clone()).await;

    let submission = board.reorder_lane(&rid("R1"), 0, 2).unwrap().unwrap();
    match &submission {
        Submission::Sequence(request) => {
            assert_eq!(request.ordered, vec![id("b"), id("c"), id("a")]);
            assert_eq!(request.moves.len(), 3);
        }
        other => panic!("unexpected submission {other:?}"),
    }
    assert_eq!(board.state().lane(&rid("R1")), &[id("b"), id("c"), id("a")]);
    board.run(submission).await;

    assert_eq!(port.inner.sequence(&rid("R1")), Some(vec![id("b"), id("c"), id("a")]));
    assert_eq!(port.inner.operation(&id("b")).unwrap().start, Some(at(8, 0)));
    assert_eq!(port.inner.operation(&id("a")).unwrap().start, Some(at(10, 0)));
    assert_eq!(board.last_notice(), Some(&Notice::SequenceSaved { resource: rid("R1") }));

    // Confirmed, so there is nothing to reset to.
    let confirmed = board.state().ordered_ids().to_vec();
    board.reset_sequence().unwrap();
    assert_eq!(board.state().ordered_ids(), confirmed.as_slice());
    assert_eq!(recorder.sequences.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reordering_a_lane_with_gaps_keeps_the_times() {
    let port = CountingPort::new(
        vec![
            Operation::new("a", "A", 60).on("R1").starting_at(at(8, 0)),
            Operation::new("b", "B", 60).on("R1").starting_at(at(10, 0)),
            Operation::new("c", "C", 60).on("R1").starting_at(at(12, 0)),
        ],
        vec![Resource::new("R1", "Press")],
    );
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(port.clone(), &port.inner, recorder.clone()).await;

    let submission = board.reorder_lane(&rid("R1"), 0, 2).unwrap().unwrap();
    match &submission {
        Submission::Sequence(request) => {
            assert_eq!(request.ordered, vec![id("b"), id("c"), id("a")]);
            assert!(request.moves.is_empty());
        }
        other => panic!("unexpected submission {other:?}"),
    }
    assert_eq!(board.state().ordered_ids(), &[id("b"), id("c"), id("a")]);
    assert_eq!(board.state().dirty_ids().count(), 0);
    board.run(submission).await;

    assert_eq!(port.inner.sequence(&rid("R1")), Some(vec![id("b"), id("c"), id("a")]));
    for (op, start) in [("a", at(8, 0)), ("b", at(10, 0)), ("c", at(12, 0))] {
        assert_eq!(port.inner.operation(&id(op)).unwrap().start, Some(start), "{op}");
        assert_eq!(board.state().operation(&id(op)).unwrap().start, Some(start), "{op}");
    }
    assert_eq!(recorder.sequences.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_sequence_restores_order_and_times() {
    let (ops, resources) = chained_lane();
    let source = MemoryBackend::new(ops, resources);
    let recorder = Arc::new(Recorder::default());
    let mut board = board_on(Arc::new(RefusingPort), &source, recorder.clone()).await;
    let before = board.state().clone();

    let submission = board.reorder_lane(&rid("R1"), 2, 0).unwrap().unwrap();
    board.run(submission).await;

    assert_eq!(board.state(), &before);
    assert_eq!(board.state().lane(&rid("R1")), &[id("a"), id("b"), id("c")]);
    // Once for the optimistic order, once for the rollback.
    assert_eq!(recorder.sequences.lock().unwrap().len(), 2);
    assert!(matches!(board.last_notice(), Some(Notice::SequenceFailed { .. })));
}

#[tokio::test]
async fn reordering_validates_its_arguments() {
    let (ops, resources) = chained_lane();
    let port = CountingPort::new(ops, resources);
    let mut board = board_on(port.clone(), &port.inner, Arc::new(Recorder::default())).await;

    assert_eq!(
        board.reorder_lane(&rid("R1"), 0, 7),
        Err(BoardError::OutOfRange {
            resource: rid("R1"),
            index: 7
        })
    );
    assert_eq!(
        board.reorder_lane(&rid("nope"), 0, 1),
        Err(BoardError::UnknownResource(rid("nope")))
    );
    assert_eq!(board.reorder_lane(&rid("R1"), 1, 1), Ok(None));
    assert_eq!(port.calls(), 0);
}
