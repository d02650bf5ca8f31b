use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::modules::donors::Donor;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NewDonor {
        donor: Donor,
        display_duration: Duration,
    },
    TopDonor {
        label: String,
        donor: Donor,
        display_duration: Duration,
    },
}

impl Notification {
    pub fn new_donor(donor: Donor, display_duration: Duration) -> Self {
        Notification::NewDonor {
            donor,
            display_duration,
        }
    }

    pub fn top_donor(label: impl Into<String>, donor: Donor, display_duration: Duration) -> Self {
        Notification::TopDonor {
            label: label.into(),
            donor,
            display_duration,
        }
    }

    pub fn donor(&self) -> &Donor {
        match self {
            Notification::NewDonor { donor, .. } | Notification::TopDonor { donor, .. } => donor,
        }
    }

    pub fn display_duration(&self) -> Duration {
        match self {
            Notification::NewDonor {
                display_duration, ..
            }
            | Notification::TopDonor {
                display_duration, ..
            } => *display_duration,
        }
    }

    pub fn is_new_donor(&self) -> bool {
        matches!(self, Notification::NewDonor { .. })
    }

    pub fn title(&self) -> &str {
        match self {
            Notification::NewDonor { donor, .. } => &donor.name,
            Notification::TopDonor { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone)]
struct Active {
    notification: Notification,
    started: Instant,
}

/// What a call to [`NotificationQueue::tick`] changed.
#[derive(Debug, Default, PartialEq)]
pub struct Transition {
    /// The notification whose display time ran out on this tick.
    pub finished: Option<Notification>,
    /// The notification that moved from the queue head into the current slot.
    pub started: Option<Notification>,
}

impl Transition {
    pub fn is_idle(&self) -> bool {
        self.finished.is_none() && self.started.is_none()
    }
}

/// FIFO of pending alerts with a single visible slot.
///
/// The current slot is only refilled while it is empty, and only emptied once
/// the current alert has been shown for its full duration, so any number of
/// ticks during a display is a no-op. The head is promoted at most once per
/// `check_interval`; expiry is checked on every tick.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: VecDeque<Notification>,
    current: Option<Active>,
    check_interval: Duration,
    last_check: Option<Instant>,
}

impl NotificationQueue {
    /// A queue that looks for the next alert on every tick.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check_interval(check_interval: Duration) -> Self {
        Self {
            check_interval,
            ..Self::default()
        }
    }

    pub fn enqueue(&mut self, notification: Notification) {
        self.pending.push_back(notification);
    }

    pub fn enqueue_all(&mut self, notifications: impl IntoIterator<Item = Notification>) {
        self.pending.extend(notifications);
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref().map(|a| &a.notification)
    }

    /// Number of alerts waiting behind the current one.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.current.is_none()
    }

    /// Expires the current alert, then promotes the queue head if the slot is
    /// free and a check is due.
    pub fn tick(&mut self, now: Instant) -> Transition {
        let finished = self.expire(now);
        let started = if self.check_due(now) {
            self.last_check = Some(now);
            self.advance(now)
        } else {
            None
        };
        Transition { finished, started }
    }

    fn check_due(&self, now: Instant) -> bool {
        self.last_check
            .is_none_or(|last| now.saturating_duration_since(last) >= self.check_interval)
    }

    /// Clears the current slot once its display duration has elapsed.
    fn expire(&mut self, now: Instant) -> Option<Notification> {
        let done = self.current.as_ref().is_some_and(|a| {
            now.saturating_duration_since(a.started) >= a.notification.display_duration()
        });
        if done {
            self.current.take().map(|a| a.notification)
        } else {
            None
        }
    }

    /// Moves the queue head into the current slot. Returns `None` while an
    /// alert is still showing, so the pop happens once per vacancy.
    fn advance(&mut self, now: Instant) -> Option<Notification> {
        if self.current.is_some() {
            return None;
        }
        let notification = self.pending.pop_front()?;
        self.current = Some(Active {
            notification: notification.clone(),
            started: now,
        });
        Some(notification)
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.current
            .as_ref()
            .map(|a| now.saturating_duration_since(a.started))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}
