//! Process shutdown: OS signal handling and interruptible sleeps.
//!
//! Every loop holds a `watch::Receiver<bool>`; `true` (or a dropped sender)
//! means stop.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::{signal, time};
use tracing::{error, info};

pub type ShutdownRx = watch::Receiver<bool>;

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
pub async fn signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

/// Why the control loops are being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Signal,
    /// A loop returned or panicked on its own.
    LoopEnded,
}

/// Wait for `signal` or for any loop in `loops` to end, whichever is first.
/// The loops are meant to run until told to stop, so an early end is logged
/// as an error and the caller takes the shutdown path anyway.
pub async fn wait_for_stop<F>(loops: &mut JoinSet<()>, signal: F) -> StopCause
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = signal => StopCause::Signal,
        res = loops.join_next() => {
            match res {
                Some(Err(e)) => error!(error = %e, "control loop died, shutting down"),
                Some(Ok(())) => error!("control loop returned early, shutting down"),
                None => error!("no control loop running, shutting down"),
            }
            StopCause::LoopEnded
        }
    }
}

/// Far enough ahead to never fire; tokio rounds larger deadlines the same way.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Sleep for `dur` unless shutdown comes first. Returns `true` when the
/// caller should stop. Durations too large for the clock sleep until
/// shutdown.
pub async fn sleep_or_shutdown(dur: Duration, shutdown: &mut ShutdownRx) -> bool {
    let now = time::Instant::now();
    let deadline = now
        .checked_add(dur)
        .unwrap_or_else(|| now + FAR_FUTURE);
    loop {
        if *shutdown.borrow_and_update() {
            return true;
        }
        tokio::select! {
            _ = time::sleep_until(deadline) => return false,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return true;
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleeps_full_duration_without_signal() {
        let (_tx, mut rx) = watch::channel(false);
        let start = time::Instant::now();
        assert!(!sleep_or_shutdown(Duration::from_secs(60), &mut rx).await);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_immediately_when_already_shut_down() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        let start = time::Instant::now();
        assert!(sleep_or_shutdown(Duration::from_secs(60), &mut rx).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_interrupts_sleep() {
        let (tx, mut rx) = watch::channel(false);
        let start = time::Instant::now();
        let sleeper =
            tokio::spawn(async move { sleep_or_shutdown(Duration::from_secs(3600), &mut rx).await });

        time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();

        assert!(sleeper.await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn spurious_false_does_not_cut_sleep_short() {
        let (tx, mut rx) = watch::channel(false);
        let start = time::Instant::now();
        let sleeper =
            tokio::spawn(async move { sleep_or_shutdown(Duration::from_secs(30), &mut rx).await });

        time::sleep(Duration::from_secs(5)).await;
        tx.send(false).unwrap();

        assert!(!sleeper.await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_duration_waits_for_signal() {
        let (tx, mut rx) = watch::channel(false);
        let start = time::Instant::now();
        let sleeper = tokio::spawn(async move { sleep_or_shutdown(Duration::MAX, &mut rx).await });

        time::sleep(Duration::from_secs(90)).await;
        tx.send(true).unwrap();

        assert!(sleeper.await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn panicking_loop_ends_the_wait() {
        let mut loops = JoinSet::new();
        loops.spawn(std::future::pending::<()>());
        loops.spawn(async { panic!("light loop blew up") });

        let cause = wait_for_stop(&mut loops, std::future::pending()).await;

        assert_eq!(cause, StopCause::LoopEnded);
        assert_eq!(loops.len(), 1);
    }

    #[tokio::test]
    async fn signal_ends_the_wait() {
        let mut loops = JoinSet::new();
        loops.spawn(std::future::pending::<()>());

        let cause = wait_for_stop(&mut loops, async {}).await;

        assert_eq!(cause, StopCause::Signal);
        assert_eq!(loops.len(), 1);
    }

    #[tokio::test]
    async fn dropped_sender_means_stop() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(sleep_or_shutdown(Duration::from_secs(3600), &mut rx).await);
    }
}
