use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { remaining_secs: u32 },
    Expired,
}

/// One-second-resolution countdown.
///
/// `start` spawns the ticking task and returns its event feed: a `Tick` per
/// second with the remaining time, then `Expired` exactly once at zero.
/// Starting while running restarts from the new duration; `cancel` aborts the
/// task and is idempotent. Timers do not fail.
#[derive(Debug, Default)]
pub struct Countdown {
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, duration_secs: u32) -> mpsc::Receiver<TimerEvent> {
        self.cancel();
        let (tx, rx) = mpsc::channel(8);
        self.task = Some(tokio::spawn(run(duration_secs, tx)));
        rx
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run(duration_secs: u32, tx: mpsc::Sender<TimerEvent>) {
    let mut remaining = duration_secs;
    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately.
    interval.tick().await;

    while remaining > 0 {
        interval.tick().await;
        remaining -= 1;
        let tick = TimerEvent::Tick {
            remaining_secs: remaining,
        };
        if tx.send(tick).await.is_err() {
            return;
        }
    }

    let _ = tx.send(TimerEvent::Expired).await;
}
