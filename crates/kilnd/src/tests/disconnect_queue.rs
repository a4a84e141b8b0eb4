//! Unit tests for the latched disconnect notifier.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use rstest::{fixture, rstest};

use super::support::{FailMode, Gate};
use crate::connection::DisconnectQueue;
use crate::{ConnectionError, DisconnectAction, HandlerKind};

#[fixture]
fn notifier() -> Arc<DisconnectQueue> {
    Arc::new(DisconnectQueue::new())
}

#[fixture]
fn fired() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn counting(fired: &Arc<AtomicUsize>) -> DisconnectAction {
    let fired = Arc::clone(fired);
    Box::new(move || -> anyhow::Result<()> {
        fired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[rstest]
fn registered_action_fires_once_on_the_disconnecting_thread(
    notifier: Arc<DisconnectQueue>,
    fired: Arc<AtomicUsize>,
) {
    notifier
        .set_handler(Some(counting(&fired)))
        .expect("register action");
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    notifier.disconnect();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    notifier.disconnect();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[rstest]
fn late_registration_replays_latched_disconnect(
    notifier: Arc<DisconnectQueue>,
    fired: Arc<AtomicUsize>,
) {
    notifier.disconnect();
    assert!(notifier.is_latched());

    notifier
        .set_handler(Some(counting(&fired)))
        .expect("register action");
    assert_eq!(
        fired.load(Ordering::SeqCst),
        1,
        "action should run before registration returns"
    );
}

#[rstest]
#[case::armed(false)]
#[case::already_fired(true)]
fn second_action_is_rejected(
    notifier: Arc<DisconnectQueue>,
    fired: Arc<AtomicUsize>,
    #[case] disconnect_first: bool,
) {
    if disconnect_first {
        notifier.disconnect();
    }
    notifier
        .set_handler(Some(counting(&fired)))
        .expect("register first");

    let error = notifier
        .set_handler(Some(counting(&fired)))
        .expect_err("second registration");
    assert!(matches!(
        error,
        ConnectionError::MultipleHandlers {
            kind: HandlerKind::Disconnect
        }
    ));
}

#[rstest]
fn latch_survives_removal(notifier: Arc<DisconnectQueue>, fired: Arc<AtomicUsize>) {
    notifier
        .set_handler(Some(counting(&fired)))
        .expect("register first");
    notifier.disconnect();
    notifier.set_handler(None).expect("remove first");
    assert!(notifier.is_latched());

    notifier
        .set_handler(Some(counting(&fired)))
        .expect("register second");
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[rstest]
fn removed_action_never_fires(notifier: Arc<DisconnectQueue>, fired: Arc<AtomicUsize>) {
    notifier
        .set_handler(Some(counting(&fired)))
        .expect("register action");
    notifier.set_handler(None).expect("remove action");
    notifier.disconnect();

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(notifier.is_latched());
}

#[rstest]
#[case::error(FailMode::Error)]
#[case::panic(FailMode::Panic)]
fn failing_action_is_contained(
    notifier: Arc<DisconnectQueue>,
    fired: Arc<AtomicUsize>,
    #[case] mode: FailMode,
) {
    notifier
        .set_handler(Some(Box::new(move || -> anyhow::Result<()> {
            match mode {
                FailMode::Error => Err(anyhow!("cleanup failed")),
                FailMode::Panic => panic!("cleanup exploded"),
            }
        })))
        .expect("register failing action");
    notifier.disconnect();

    notifier.shutdown();
    notifier
        .set_handler(Some(counting(&fired)))
        .expect("register after failure");
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[rstest]
fn removal_waits_for_running_action(notifier: Arc<DisconnectQueue>) {
    let gate = Gate::default();
    let passing = gate.clone();
    notifier
        .set_handler(Some(Box::new(move || -> anyhow::Result<()> {
            passing.pass();
            Ok(())
        })))
        .expect("register gated action");

    let disconnecting = Arc::clone(&notifier);
    let disconnector = thread::spawn(move || disconnecting.disconnect());
    assert!(gate.wait_entered(), "action should start running");

    let (done_tx, done_rx) = mpsc::channel();
    let removing = Arc::clone(&notifier);
    let remover = thread::spawn(move || {
        let outcome = removing.set_handler(None);
        done_tx.send(()).expect("signal removal");
        outcome
    });

    assert!(
        done_rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "removal should wait for the running action"
    );
    gate.open();
    done_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("removal should finish once the action returns");
    remover.join().expect("join remover").expect("remove");
    disconnector.join().expect("join disconnector");
}

#[rstest]
fn action_may_remove_itself(notifier: Arc<DisconnectQueue>, fired: Arc<AtomicUsize>) {
    let removing = Arc::clone(&notifier);
    notifier
        .set_handler(Some(Box::new(move || -> anyhow::Result<()> {
            removing.set_handler(None)?;
            Ok(())
        })))
        .expect("register self-removing action");
    notifier.disconnect();

    notifier
        .set_handler(Some(counting(&fired)))
        .expect("slot should be free again");
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
