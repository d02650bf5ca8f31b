use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::Config;
use crate::modules::{
    activity::{ActivityLog, Level},
    api::{DonationApi, WidgetStats},
    donors::{Donor, NewDonorDetector, VisibleDonor, format_amount},
    notifications::{Notification, NotificationQueue, Transition},
    presenter::{AlertPresenter, AlertSink},
    scheduler::{self, PollEvent, SyncFlag, TaskSet, TopDonorScheduler},
};

pub struct App {
    pub config: Config,
    pub status_message: String,
    pub show_help: bool,

    pub stats: Option<WidgetStats>,
    pub visible: VisibleDonor,
    pub queue: NotificationQueue,
    pub presenter: AlertPresenter,
    pub sync: SyncFlag,
    pub activity: ActivityLog,

    detector: NewDonorDetector,
    tx: UnboundedSender<PollEvent>,
    events: UnboundedReceiver<PollEvent>,
    tasks: TaskSet,
}

impl App {
    pub fn new(config: Config, sink: Box<dyn AlertSink>) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let sync = SyncFlag::new(true);
        let presenter = AlertPresenter::new(sync.clone(), sink, config.audio_enabled);
        let queue = NotificationQueue::with_check_interval(config.alert_check_interval);

        Self {
            config,
            status_message: String::from("Watching for donations. Press '?' for help"),
            show_help: false,
            stats: None,
            visible: VisibleDonor::default(),
            queue,
            presenter,
            sync,
            activity: ActivityLog::new(),
            detector: NewDonorDetector::new(),
            tx,
            events,
            tasks: TaskSet::new(),
        }
    }

    /// Spawns the donor poller, the stats poller and the top donor cycle.
    pub fn start<A: DonationApi>(&mut self, api: A) {
        self.tasks.spawn(scheduler::poll_donors(
            api.clone(),
            self.config.donor_poll_interval,
            self.sync.clone(),
            self.tx.clone(),
        ));
        self.tasks.spawn(scheduler::poll_stats(
            api.clone(),
            self.config.stats_version,
            self.config.stats_poll_interval,
            self.tx.clone(),
        ));
        let top = TopDonorScheduler::new(
            self.config.top_donor_interval,
            self.config.top_donor_display,
            tokio::time::Instant::now(),
        );
        self.tasks
            .spawn(scheduler::cycle_top_donors(api, top, self.tx.clone()));
        log::info!("Started {} background tasks against {}", self.tasks.len(), self.config.api_base_url);
    }

    pub fn shutdown(&mut self) {
        self.tasks.shutdown();
        self.queue.clear();
        log::info!("Stopped background tasks");
    }

    pub fn snapshot(&self) -> &[Donor] {
        self.detector.snapshot()
    }

    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: PollEvent) {
        match event {
            PollEvent::Donors(snapshot) => self.on_snapshot(snapshot),
            PollEvent::Stats(stats) => self.stats = Some(stats),
            PollEvent::TopDonors(batch) => {
                log::debug!("Enqueueing {} top donor alerts", batch.len());
                self.queue.enqueue_all(batch);
            }
            PollEvent::FetchFailed { source, message } => {
                self.status_message = format!("Fetching {} failed: {}", source.as_str(), message);
                self.activity
                    .push("Fetch failed", self.status_message.clone(), Level::Warning);
            }
        }
    }

    fn on_snapshot(&mut self, snapshot: Vec<Donor>) {
        // A response that was in flight when sync got paused is dropped; the
        // next diff after resuming still catches every addition.
        if !self.sync.is_enabled() {
            log::debug!("Ignoring donor snapshot while sync is paused");
            return;
        }
        let added = self.detector.observe(&snapshot);
        self.visible = VisibleDonor::latest(self.detector.snapshot());
        if !added.is_empty() {
            log::info!("{} new donor(s)", added.len());
            let display = self.config.alert_display;
            self.queue
                .enqueue_all(added.into_iter().map(|d| Notification::new_donor(d, display)));
        }
    }

    /// Expires the on-screen alert and, every alert-check interval, promotes
    /// the next queued one.
    pub fn tick(&mut self, now: Instant) -> Transition {
        let transition = self.queue.tick(now);
        self.on_transition(&transition);
        transition
    }

    fn on_transition(&mut self, transition: &Transition) {
        if transition.is_idle() {
            return;
        }
        self.presenter.apply(transition);
        if let Some(n) = &transition.started {
            let donor = n.donor();
            self.activity.push(
                n.title().to_string(),
                format!("{} - {}", donor.name, format_amount(donor.amount)),
                Level::Info,
            );
        }
        if transition.finished.is_some() {
            if self.queue.is_empty() {
                log::debug!("Alert queue drained");
            }
            if self.sync.is_enabled() {
                self.visible = VisibleDonor::latest(self.detector.snapshot());
            }
        }
    }

    pub fn toggle_audio(&mut self) {
        let on = self.presenter.toggle_audio();
        self.status_message = if on { "Audio enabled" } else { "Audio disabled" }.to_string();
    }

    /// Re-enables donor sync and jumps back to the latest donor.
    pub fn reset_sync(&mut self) {
        self.presenter.reset_sync();
        if self.sync.is_enabled() {
            self.visible = VisibleDonor::latest(self.detector.snapshot());
            self.status_message = "Synced to latest donor".to_string();
        } else {
            self.status_message = "Sync resumes after the current alert".to_string();
        }
    }

    /// Queues an alert for the latest donor; duplicates are allowed.
    pub fn trigger_test_alert(&mut self) {
        match self.detector.snapshot().first() {
            Some(donor) => {
                self.queue
                    .enqueue(Notification::new_donor(donor.clone(), self.config.alert_display));
                self.status_message = format!("Queued test alert for {}", donor.name);
            }
            None => self.status_message = "No donors loaded yet".to_string(),
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.tasks.shutdown();
    }
}
