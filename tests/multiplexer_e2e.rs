use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use livemux::{
    ChangeCallbacks, ChangeEvent, FieldChanges, Fields, MultiplexerConfig, MultiplexerState, MuxError,
    ObserveCallbacks, ObserveHandle, ObserveMultiplexer, ProtocolError, QueryError, Value,
};

const WAIT: Duration = Duration::from_secs(5);

fn doc(n: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("n".to_string(), Value::Int(n));
    fields
}

fn query_error(msg: &str) -> QueryError {
    Arc::new(io::Error::new(io::ErrorKind::Other, msg.to_string()))
}

/// Blocks until everything enqueued so far has been delivered.
fn flush(mux: &ObserveMultiplexer) {
    let (tx, rx) = bounded(1);
    mux.on_flush(move || {
        let _ = tx.send(());
    })
    .unwrap();
    rx.recv_timeout(WAIT).unwrap();
}

fn recorder(tx: Sender<String>) -> ChangeCallbacks {
    let (a, ab, c, m) = (tx.clone(), tx.clone(), tx.clone(), tx.clone());
    ChangeCallbacks::new()
        .on_added(move |id, _| {
            let _ = a.send(format!("added {id}"));
        })
        .on_added_before(move |id, _, before| {
            let _ = ab.send(format!("added_before {id} {}", before.as_deref().unwrap_or("-")));
        })
        .on_changed(move |id, _| {
            let _ = c.send(format!("changed {id}"));
        })
        .on_moved_before(move |id, before| {
            let _ = m.send(format!("moved_before {id} {}", before.as_deref().unwrap_or("-")));
        })
        .on_removed(move |id| {
            let _ = tx.send(format!("removed {id}"));
        })
}

fn stop_counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let stops = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&stops);
    (stops, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn drain(rx: &Receiver<String>) -> Vec<String> {
    rx.try_iter().collect()
}

#[test]
fn late_joiner_replays_cache_in_order() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();
    mux.added("a", doc(1)).unwrap();
    mux.added("b", doc(2)).unwrap();
    mux.ready().unwrap();

    let (tx, rx) = unbounded();
    let _handle = mux.observe(recorder(tx)).unwrap();
    assert_eq!(drain(&rx), ["added a", "added b"]);

    mux.changed("a", FieldChanges::new()).unwrap();
    mux.removed("b").unwrap();
    flush(&mux);
    assert_eq!(drain(&rx), ["changed a", "removed b"]);
    assert_eq!(mux.cached_len(), 1);
}

#[test]
fn ordered_replay_and_moves() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::ordered(), || {}).unwrap();
    mux.ready().unwrap();

    let (tx, rx) = unbounded();
    let _first = mux.observe(recorder(tx)).unwrap();
    mux.added("a", doc(1)).unwrap();
    mux.added_before("b", doc(2), None).unwrap();
    mux.moved_before("b", Some("a".into())).unwrap();
    flush(&mux);
    assert_eq!(drain(&rx), ["added_before a -", "added_before b -", "moved_before b a"]);

    let (tx, rx) = unbounded();
    let _second = mux.observe(recorder(tx)).unwrap();
    assert_eq!(drain(&rx), ["added_before b -", "added_before a -"]);
}

#[test]
fn unordered_multiplexer_rejects_positional_events() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();
    mux.ready().unwrap();
    assert!(mux.added_before("a", doc(1), None).unwrap_err().is_validation());
    assert!(mux.moved_before("a", None).unwrap_err().is_validation());
}

#[test]
fn join_waits_for_ready() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();
    mux.added("a", doc(1)).unwrap();

    let (done_tx, done_rx) = bounded(1);
    let m = mux.clone();
    let joiner = thread::spawn(move || {
        let handle = m.observe(ChangeCallbacks::new());
        let _ = done_tx.send(handle.is_ok());
        handle
    });

    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
    mux.ready().unwrap();
    assert!(done_rx.recv_timeout(WAIT).unwrap());
    let _handle = joiner.join().unwrap().unwrap();
    assert_eq!(mux.state(), MultiplexerState::Ready);
}

#[test]
fn protocol_misuse_is_reported() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();

    let err = mux.on_flush(|| {}).unwrap_err();
    assert!(matches!(err, MuxError::Protocol(ProtocolError::NotReadyFlush)));

    let handle = ObserveHandle::new(&mux, ChangeCallbacks::new().into()).unwrap();
    let err = mux.remove_handle(handle.id()).unwrap_err();
    assert!(matches!(err, MuxError::Protocol(ProtocolError::NotReadyRemoval)));

    let err = mux.changed("a", FieldChanges::new()).unwrap_err();
    assert!(matches!(err, MuxError::Protocol(ProtocolError::PrematureEvent { .. })));

    mux.ready().unwrap();
    let err = mux.ready().unwrap_err();
    assert!(matches!(err, MuxError::Protocol(ProtocolError::DoubleReady)));

    let err = mux.query_error(query_error("late")).unwrap_err();
    assert!(matches!(err, MuxError::Protocol(ProtocolError::PostReadyError)));
}

#[test]
fn query_failure_reaches_every_joiner() {
    let (stops, on_stop) = stop_counter();
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), on_stop).unwrap();

    let m = mux.clone();
    let waiting = thread::spawn(move || m.observe(ChangeCallbacks::new()).map(|_handle| ()));
    thread::sleep(Duration::from_millis(50));

    let err = query_error("bad selector");
    mux.query_error(Arc::clone(&err)).unwrap();

    let got = waiting.join().unwrap().unwrap_err();
    assert!(got.is_query_failure());
    assert!(Arc::ptr_eq(got.query_error().unwrap(), &err));

    let later = mux.observe(ChangeCallbacks::new()).unwrap_err();
    assert!(Arc::ptr_eq(later.query_error().unwrap(), &err));

    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(mux.state(), MultiplexerState::Stopped);
    assert!(matches!(
        mux.ready().unwrap_err(),
        MuxError::Protocol(ProtocolError::Stopped)
    ));
}

#[test]
fn last_handle_leaving_stops_exactly_once() {
    let (stops, on_stop) = stop_counter();
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), on_stop).unwrap();
    mux.ready().unwrap();

    let a = mux.observe(ChangeCallbacks::new()).unwrap();
    let b = mux.observe(ChangeCallbacks::new()).unwrap();
    assert_eq!(mux.handle_count(), 2);

    a.stop().unwrap();
    assert_eq!(mux.state(), MultiplexerState::Ready);
    b.stop().unwrap();
    b.stop().unwrap();
    drop(a);
    drop(b);

    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(mux.state(), MultiplexerState::Stopped);
    assert_eq!(mux.handle_count(), 0);

    let err = mux.observe(ChangeCallbacks::new()).unwrap_err();
    assert!(matches!(err, MuxError::Protocol(ProtocolError::Stopped)));
}

/// Parks the multiplexer's queue until the returned sender fires.
fn park_queue(mux: &ObserveMultiplexer) -> Sender<()> {
    let (release_tx, release_rx) = bounded::<()>(1);
    let (parked_tx, parked_rx) = bounded(1);
    mux.on_flush(move || {
        let _ = parked_tx.send(());
        let _ = release_rx.recv();
    })
    .unwrap();
    parked_rx.recv_timeout(WAIT).unwrap();
    release_tx
}

#[test]
fn stop_refused_before_ready_can_be_retried() {
    let (stops, on_stop) = stop_counter();
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), on_stop).unwrap();

    let handle = Arc::new(ObserveHandle::new(&mux, ChangeCallbacks::new().into()).unwrap());
    let (m, joining) = (mux.clone(), Arc::clone(&handle));
    let joiner = thread::spawn(move || m.add_handle_and_send_initial_adds(&joining));
    thread::sleep(Duration::from_millis(100));

    let err = handle.stop().unwrap_err();
    assert!(matches!(err, MuxError::Protocol(ProtocolError::NotReadyRemoval)));
    assert!(!handle.is_stopped());

    mux.ready().unwrap();
    joiner.join().unwrap().unwrap();
    assert_eq!(mux.handle_count(), 1);

    handle.stop().unwrap();
    assert!(handle.is_stopped());
    assert_eq!(mux.handle_count(), 0);
    assert_eq!(mux.state(), MultiplexerState::Stopped);
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    drop(handle);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[test]
fn events_the_cache_rejects_are_still_delivered() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();
    mux.ready().unwrap();

    let (tx, rx) = unbounded();
    let _handle = mux.observe(recorder(tx)).unwrap();

    mux.added("a", doc(1)).unwrap();
    mux.added("a", doc(2)).unwrap();
    mux.removed("ghost").unwrap();
    flush(&mux);

    assert_eq!(drain(&rx), ["added a", "added a", "removed ghost"]);
    assert_eq!(mux.cached_len(), 1);
}

#[test]
fn pending_join_keeps_multiplexer_alive() {
    let (stops, on_stop) = stop_counter();
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), on_stop).unwrap();
    mux.ready().unwrap();
    let a = mux.observe(ChangeCallbacks::new()).unwrap();

    let release = park_queue(&mux);
    let m = mux.clone();
    let joiner = thread::spawn(move || m.observe(ChangeCallbacks::new()));
    thread::sleep(Duration::from_millis(100));

    a.stop().unwrap();
    assert_eq!(mux.state(), MultiplexerState::Ready);
    assert_eq!(stops.load(Ordering::SeqCst), 0);

    release.send(()).unwrap();
    let b = joiner.join().unwrap().unwrap();
    assert_eq!(mux.handle_count(), 1);

    b.stop().unwrap();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(mux.state(), MultiplexerState::Stopped);
}

#[test]
fn handle_stopped_before_its_join_runs_is_never_registered() {
    let (stops, on_stop) = stop_counter();
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), on_stop).unwrap();
    mux.ready().unwrap();
    let a = mux.observe(ChangeCallbacks::new()).unwrap();

    let release = park_queue(&mux);
    let b = Arc::new(ObserveHandle::new(&mux, ChangeCallbacks::new().into()).unwrap());
    let (m, joining) = (mux.clone(), Arc::clone(&b));
    let joiner = thread::spawn(move || m.add_handle_and_send_initial_adds(&joining));
    thread::sleep(Duration::from_millis(100));

    b.stop().unwrap();
    a.stop().unwrap();
    assert_eq!(stops.load(Ordering::SeqCst), 0);

    release.send(()).unwrap();
    let err = joiner.join().unwrap().unwrap_err();
    assert!(matches!(err, MuxError::Protocol(ProtocolError::Stopped)));
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(mux.state(), MultiplexerState::Stopped);
}

#[test]
fn observe_from_a_callback_is_rejected() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();
    mux.ready().unwrap();

    let (tx, rx) = bounded(1);
    let m = mux.clone();
    let _handle = mux
        .observe(ChangeCallbacks::new().on_added(move |_, _| {
            let reentrant = m.observe(ChangeCallbacks::new());
            let _ = tx.send(matches!(
                reentrant,
                Err(MuxError::Protocol(ProtocolError::ReentrantObserve))
            ));
        }))
        .unwrap();

    mux.added("a", doc(1)).unwrap();
    assert!(rx.recv_timeout(WAIT).unwrap());
    assert_eq!(mux.handle_count(), 1);
}

#[test]
fn handle_removed_by_earlier_callback_is_skipped() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();
    mux.ready().unwrap();

    let victim: Arc<Mutex<Option<ObserveHandle>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&victim);
    let _killer = mux
        .observe(ChangeCallbacks::new().on_changed(move |_, _| {
            if let Some(handle) = slot.lock().unwrap().as_ref() {
                handle.stop().unwrap();
            }
        }))
        .unwrap();

    let (tx, rx) = unbounded();
    *victim.lock().unwrap() = Some(mux.observe(recorder(tx)).unwrap());

    mux.added("x", doc(1)).unwrap();
    mux.changed("x", FieldChanges::new()).unwrap();
    flush(&mux);

    assert_eq!(drain(&rx), ["added x"]);
    assert_eq!(mux.handle_count(), 1);
}

#[test]
fn dropping_the_last_handle_inside_its_callback_stops() {
    let (stop_tx, stop_rx) = bounded(1);
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), move || {
        let _ = stop_tx.send(());
    })
    .unwrap();
    mux.ready().unwrap();

    let own: Arc<Mutex<Option<ObserveHandle>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&own);
    let handle = mux
        .observe(ChangeCallbacks::new().on_removed(move |_| {
            drop(slot.lock().unwrap().take());
        }))
        .unwrap();
    *own.lock().unwrap() = Some(handle);

    mux.added("a", doc(1)).unwrap();
    mux.removed("a").unwrap();
    stop_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(mux.state(), MultiplexerState::Stopped);

    // Producers may keep talking; nobody is listening.
    mux.added("b", doc(2)).unwrap();
}

#[test]
fn every_handle_gets_its_own_copy() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();
    mux.ready().unwrap();

    let _vandal = mux
        .observe(ChangeCallbacks::new().on_added(|_, mut fields| {
            fields.insert("n".to_string(), Value::Int(-1));
            fields.insert("extra".to_string(), Value::Bool(true));
        }))
        .unwrap();

    let (tx, rx) = unbounded();
    let _reader = mux
        .observe(ChangeCallbacks::new().on_added(move |_, fields| {
            let _ = tx.send(fields);
        }))
        .unwrap();

    mux.added("a", doc(1)).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), doc(1));

    let (tx, rx) = unbounded();
    let _late = mux
        .observe(ChangeCallbacks::new().on_added(move |_, fields| {
            let _ = tx.send(fields);
        }))
        .unwrap();
    assert_eq!(rx.try_recv().unwrap(), doc(1));
}

fn batch_ids(events: &[ChangeEvent]) -> Vec<String> {
    events.iter().map(|event| event.id().to_string()).collect()
}

fn batched(tx: Sender<Vec<ChangeEvent>>) -> ObserveCallbacks {
    ObserveCallbacks::batched(move |events| {
        let _ = tx.send(events);
    })
}

#[test]
fn batching_mode_requires_batch_callback() {
    let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered().with_batching(), || {}).unwrap();
    mux.ready().unwrap();
    let err = mux.observe(ChangeCallbacks::new()).unwrap_err();
    assert!(err.is_validation());

    let plain = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {}).unwrap();
    plain.ready().unwrap();
    let err = plain.observe(ObserveCallbacks::batched(|_| {})).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn quick_events_arrive_as_one_batch() {
    let config = MultiplexerConfig::unordered()
        .with_batching()
        .with_batch_interval(Duration::from_millis(50))
        .with_batch_max_age(Duration::from_secs(1));
    let mux = ObserveMultiplexer::new(config, || {}).unwrap();
    mux.ready().unwrap();

    let (tx, rx) = unbounded();
    let _handle = mux.observe(batched(tx)).unwrap();

    mux.added("e1", doc(1)).unwrap();
    mux.added("e2", doc(2)).unwrap();
    mux.removed("e1").unwrap();

    let batch = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(batch_ids(&batch), ["e1", "e2", "e1"]);
    assert!(matches!(batch[2], ChangeEvent::Removed { .. }));
    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    assert_eq!(mux.cached_len(), 1);

    // A batched late joiner gets the cache as a single batch of adds.
    let (tx, rx) = unbounded();
    let _late = mux.observe(batched(tx)).unwrap();
    let replay = rx.try_recv().unwrap();
    assert_eq!(
        replay,
        vec![ChangeEvent::Added {
            id: "e2".to_string(),
            fields: doc(2),
        }]
    );
}

#[test]
fn steady_stream_is_cut_at_max_age() {
    let config = MultiplexerConfig::unordered()
        .with_batching()
        .with_batch_interval(Duration::from_millis(40))
        .with_batch_max_age(Duration::from_millis(80));
    let mux = ObserveMultiplexer::new(config, || {}).unwrap();
    mux.ready().unwrap();

    let (tx, rx) = unbounded();
    let _handle = mux.observe(batched(tx)).unwrap();

    let expected: Vec<String> = (0..30).map(|i| format!("d{i}")).collect();
    for (i, id) in expected.iter().enumerate() {
        mux.added(id.as_str(), doc(i64::try_from(i).unwrap())).unwrap();
        thread::sleep(Duration::from_millis(10));
    }
    let (done_tx, done_rx) = bounded(1);
    mux.on_flush(move || {
        let _ = done_tx.send(());
    })
    .unwrap();
    done_rx.recv_timeout(WAIT).unwrap();

    let batches: Vec<Vec<ChangeEvent>> = rx.try_iter().collect();
    assert!(batches.len() >= 3, "expected the stream to be cut, got {} batches", batches.len());
    assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= 10));

    let delivered: Vec<String> = batches.iter().flat_map(|batch| batch_ids(batch)).collect();
    assert_eq!(delivered, expected);
}

#[test]
fn batched_events_the_cache_rejects_are_still_delivered() {
    let config = MultiplexerConfig::unordered()
        .with_batching()
        .with_batch_interval(Duration::from_secs(2))
        .with_batch_max_age(Duration::from_secs(5));
    let mux = ObserveMultiplexer::new(config, || {}).unwrap();
    mux.ready().unwrap();

    let (tx, rx) = unbounded();
    let _handle = mux.observe(batched(tx)).unwrap();

    mux.added("a", doc(1)).unwrap();
    mux.added("a", doc(2)).unwrap();
    mux.removed("ghost").unwrap();
    flush(&mux);

    let batches: Vec<Vec<ChangeEvent>> = rx.try_iter().collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batch_ids(&batches[0]), ["a", "a", "ghost"]);
    assert_eq!(mux.cached_len(), 1);
}

#[test]
fn unbounded_batch_age_still_flushes_on_inactivity() {
    let config = MultiplexerConfig::unordered()
        .with_batching()
        .with_batch_interval(Duration::from_millis(20))
        .with_batch_max_age(Duration::MAX);
    let mux = ObserveMultiplexer::new(config, || {}).unwrap();
    mux.ready().unwrap();

    let (tx, rx) = unbounded();
    let _handle = mux.observe(batched(tx)).unwrap();

    mux.added("a", doc(1)).unwrap();
    mux.added("b", doc(2)).unwrap();

    let batch = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(batch_ids(&batch), ["a", "b"]);
}
