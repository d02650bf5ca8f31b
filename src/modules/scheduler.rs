use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::modules::api::{DonationApi, StatsVersion, TopDonors, WidgetStats};
use crate::modules::donors::Donor;
use crate::modules::notifications::Notification;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FetchSource {
    Donors,
    Stats,
    TopDonors,
}

impl FetchSource {
    pub fn as_str(&self) -> &str {
        match self {
            FetchSource::Donors => "donors",
            FetchSource::Stats => "stats",
            FetchSource::TopDonors => "top donors",
        }
    }
}

/// Messages from background tasks to the UI loop, which owns all state.
#[derive(Debug)]
pub enum PollEvent {
    Donors(Vec<Donor>),
    Stats(WidgetStats),
    TopDonors(Vec<Notification>),
    FetchFailed { source: FetchSource, message: String },
}

/// Shared "keep the donor ticker in sync" switch. The donor poller skips
/// fetching while it is off; the alert presenter turns it off during alerts.
#[derive(Debug, Clone)]
pub struct SyncFlag(Arc<AtomicBool>);

impl SyncFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

/// Owns every spawned background task; all of them are aborted on
/// [`TaskSet::shutdown`] or when the set is dropped.
#[derive(Default)]
pub struct TaskSet {
    handles: Vec<JoinHandle<()>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(future));
    }

    pub fn len(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn failure(source: FetchSource, err: anyhow::Error) -> PollEvent {
    log::warn!("Fetching {} failed: {:#}", source.as_str(), err);
    PollEvent::FetchFailed {
        source,
        message: format!("{:#}", err),
    }
}

fn report<T>(
    tx: &UnboundedSender<PollEvent>,
    source: FetchSource,
    result: Result<T>,
    wrap: impl FnOnce(T) -> PollEvent,
) -> bool {
    let event = match result {
        Ok(value) => wrap(value),
        Err(e) => failure(source, e),
    };
    tx.send(event).is_ok()
}

/// Fetches the recent-donor list now and then every `interval`, skipping
/// fetches while `sync` is off. Stops when the receiver is gone.
pub async fn poll_donors<A: DonationApi>(
    api: A,
    interval: Duration,
    sync: SyncFlag,
    tx: UnboundedSender<PollEvent>,
) {
    let mut next = Instant::now();
    loop {
        sleep_until(next).await;
        if sync.is_enabled() {
            let result = api.recent_donors().await;
            if !report(&tx, FetchSource::Donors, result, PollEvent::Donors) {
                break;
            }
        } else {
            log::debug!("Donor sync paused, skipping fetch");
        }
        next = Instant::now() + interval;
    }
}

/// Fetches aggregate counts now and then every `interval`.
pub async fn poll_stats<A: DonationApi>(
    api: A,
    version: StatsVersion,
    interval: Duration,
    tx: UnboundedSender<PollEvent>,
) {
    let mut next = Instant::now();
    loop {
        sleep_until(next).await;
        let result = api.widget_stats(version).await;
        if !report(&tx, FetchSource::Stats, result, PollEvent::Stats) {
            break;
        }
        next = Instant::now() + interval;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerState {
    Idle,
    Fetching,
}

/// Periodically turns the leaderboard into a batch of top-donor alerts.
///
/// The next run is scheduled `interval` after the previous one completed, so a
/// slow fetch pushes the cycle back instead of overlapping it.
#[derive(Debug)]
pub struct TopDonorScheduler {
    state: SchedulerState,
    interval: Duration,
    display_duration: Duration,
    next_due: Instant,
}

impl TopDonorScheduler {
    pub fn new(interval: Duration, display_duration: Duration, now: Instant) -> Self {
        Self {
            state: SchedulerState::Idle,
            interval,
            display_duration,
            next_due: now,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Idle -> Fetching if the cycle is due. Returns `false` while a fetch is
    /// outstanding or before the due time.
    pub fn begin(&mut self, now: Instant) -> bool {
        if self.state == SchedulerState::Fetching || now < self.next_due {
            return false;
        }
        self.state = SchedulerState::Fetching;
        true
    }

    /// Fetching -> Idle. Returns the alerts to enqueue as one batch; a failed
    /// fetch yields none.
    pub fn complete(&mut self, now: Instant, result: &Result<WidgetStats>) -> Vec<Notification> {
        self.state = SchedulerState::Idle;
        self.next_due = now + self.interval;
        match result {
            Ok(stats) => stats
                .top_donors
                .as_ref()
                .map(|top| top_donor_notifications(top, self.display_duration))
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Runs one full cycle against `api` if due.
    pub async fn run_once<A: DonationApi>(&mut self, api: &A) -> Option<Result<Vec<Notification>>> {
        if !self.begin(Instant::now()) {
            return None;
        }
        let result = api.widget_stats(StatsVersion::V2).await;
        let batch = self.complete(Instant::now(), &result);
        Some(result.map(|_| batch))
    }
}

/// Leaderboard slots with a named donor, mapped to alerts in display order.
pub fn top_donor_notifications(top: &TopDonors, display_duration: Duration) -> Vec<Notification> {
    top.labelled()
        .into_iter()
        .filter_map(|(label, slot)| {
            let slot = slot?;
            let name = slot.name.as_deref().filter(|n| !n.trim().is_empty())?;
            let donor = Donor {
                id: format!("top:{}", label),
                name: name.to_string(),
                amount: slot.amount,
                date: None,
            };
            Some(Notification::top_donor(label, donor, display_duration))
        })
        .collect()
}

pub async fn cycle_top_donors<A: DonationApi>(
    api: A,
    mut scheduler: TopDonorScheduler,
    tx: UnboundedSender<PollEvent>,
) {
    loop {
        sleep_until(scheduler.next_due()).await;
        let Some(result) = scheduler.run_once(&api).await else {
            continue;
        };
        let sent = match result {
            Ok(batch) if batch.is_empty() => {
                log::debug!("Leaderboard has no named donors");
                true
            }
            Ok(batch) => {
                log::info!("Queueing {} top donor alerts", batch.len());
                tx.send(PollEvent::TopDonors(batch)).is_ok()
            }
            Err(e) => tx.send(failure(FetchSource::TopDonors, e)).is_ok(),
        };
        if !sent {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::api::TopDonorSlot;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    #[derive(Clone, Default)]
    struct FakeApi {
        donors: Arc<Mutex<Vec<Result<Vec<Donor>, String>>>>,
        stats: Arc<Mutex<Vec<Result<WidgetStats, String>>>>,
        donor_calls: Arc<AtomicUsize>,
    }

    impl FakeApi {
        fn with_stats(responses: Vec<Result<WidgetStats, String>>) -> Self {
            let api = Self::default();
            *api.stats.lock().unwrap() = responses;
            api
        }
    }

    impl DonationApi for FakeApi {
        fn recent_donors(&self) -> impl Future<Output = Result<Vec<Donor>>> + Send {
            self.donor_calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut queue = self.donors.lock().unwrap();
                if queue.is_empty() { Ok(Vec::new()) } else { queue.remove(0) }
            };
            async move { next.map_err(|e| anyhow!(e)) }
        }

        fn widget_stats(
            &self,
            _version: StatsVersion,
        ) -> impl Future<Output = Result<WidgetStats>> + Send {
            let next = {
                let mut queue = self.stats.lock().unwrap();
                if queue.is_empty() { Ok(WidgetStats::default()) } else { queue.remove(0) }
            };
            async move { next.map_err(|e| anyhow!(e)) }
        }
    }

    fn slot(name: &str, amount: f64) -> Option<TopDonorSlot> {
        Some(TopDonorSlot {
            name: Some(name.to_string()),
            amount,
        })
    }

    fn weekly_only() -> WidgetStats {
        WidgetStats {
            top_donors: Some(TopDonors {
                weekly: slot("Z", 5000.0),
                ..TopDonors::default()
            }),
            ..WidgetStats::default()
        }
    }

    #[test]
    fn only_named_slots_become_alerts() {
        let top = TopDonors {
            today: Some(TopDonorSlot { name: None, amount: 0.0 }),
            weekly: slot("Z", 5000.0),
            monthly: None,
            all_time: slot("  ", 10.0),
        };
        let batch = top_donor_notifications(&top, Duration::from_secs(4));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].title(), "Weekly Top");
        assert_eq!(batch[0].donor().name, "Z");
        assert_eq!(batch[0].display_duration(), Duration::from_secs(4));
    }

    #[test]
    fn leaderboard_order_is_all_time_first() {
        let top = TopDonors {
            today: slot("T", 1.0),
            weekly: slot("W", 2.0),
            monthly: slot("M", 3.0),
            all_time: slot("A", 4.0),
        };
        let titles: Vec<_> = top_donor_notifications(&top, Duration::from_secs(1))
            .iter()
            .map(|n| n.title().to_string())
            .collect();
        assert_eq!(titles, ["All-Time Top", "Monthly Top", "Weekly Top", "Today's Top"]);
    }

    #[test]
    fn no_overlapping_fetches() {
        let t0 = Instant::now();
        let mut scheduler =
            TopDonorScheduler::new(Duration::from_secs(60), Duration::from_secs(4), t0);
        assert!(scheduler.begin(t0));
        assert_eq!(scheduler.state(), SchedulerState::Fetching);
        assert!(!scheduler.begin(t0 + Duration::from_secs(120)));

        let done = t0 + Duration::from_secs(7);
        scheduler.complete(done, &Ok(weekly_only()));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.next_due(), done + Duration::from_secs(60));
        assert!(!scheduler.begin(t0 + Duration::from_secs(60)));
        assert!(scheduler.begin(done + Duration::from_secs(60)));
    }

    #[test]
    fn failed_fetch_keeps_schedule() {
        let t0 = Instant::now();
        let mut scheduler =
            TopDonorScheduler::new(Duration::from_secs(30), Duration::from_secs(4), t0);
        scheduler.begin(t0);
        let batch = scheduler.complete(t0, &Err(anyhow!("connection refused")));
        assert!(batch.is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.next_due(), t0 + Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_builds_a_single_batch() {
        let api = FakeApi::with_stats(vec![Ok(weekly_only())]);
        let mut scheduler =
            TopDonorScheduler::new(Duration::from_secs(60), Duration::from_secs(4), Instant::now());
        let batch = scheduler.run_once(&api).await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].title(), "Weekly Top");
        assert!(scheduler.run_once(&api).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn top_donor_cycle_survives_failures() {
        let api = FakeApi::with_stats(vec![Err("boom".to_string()), Ok(weekly_only())]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler =
            TopDonorScheduler::new(Duration::from_secs(60), Duration::from_secs(4), Instant::now());
        let mut tasks = TaskSet::new();
        tasks.spawn(cycle_top_donors(api, scheduler, tx));

        match rx.recv().await {
            Some(PollEvent::FetchFailed { source, .. }) => assert_eq!(source, FetchSource::TopDonors),
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await {
            Some(PollEvent::TopDonors(batch)) => assert_eq!(batch.len(), 1),
            other => panic!("unexpected event {:?}", other),
        }
        tasks.shutdown();
        assert_eq!(tasks.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_poller_keeps_its_schedule_after_a_failure() {
        let api = FakeApi::with_stats(vec![Err("502".to_string()), Ok(weekly_only())]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = TaskSet::new();
        tasks.spawn(poll_stats(api, StatsVersion::V2, Duration::from_secs(10), tx));

        assert!(matches!(
            rx.recv().await,
            Some(PollEvent::FetchFailed { source: FetchSource::Stats, .. })
        ));
        let failed_at = Instant::now();

        match rx.recv().await {
            Some(PollEvent::Stats(stats)) => assert!(stats.top_donors.is_some()),
            other => panic!("unexpected event {:?}", other),
        }
        let waited = Instant::now() - failed_at;
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
        tasks.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn donor_poller_respects_sync_flag() {
        let api = FakeApi::default();
        api.donors
            .lock()
            .unwrap()
            .extend([Ok(vec![]), Err("timeout".to_string())]);
        let sync = SyncFlag::new(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = TaskSet::new();
        tasks.spawn(poll_donors(api.clone(), Duration::from_secs(5), sync.clone(), tx));

        assert!(matches!(rx.recv().await, Some(PollEvent::Donors(_))));
        assert!(matches!(
            rx.recv().await,
            Some(PollEvent::FetchFailed { source: FetchSource::Donors, .. })
        ));
        let calls = api.donor_calls.load(Ordering::SeqCst);

        sync.set(false);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.donor_calls.load(Ordering::SeqCst), calls);

        sync.set(true);
        assert!(matches!(rx.recv().await, Some(PollEvent::Donors(_))));
        tasks.shutdown();
    }
}
