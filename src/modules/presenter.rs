use std::time::Duration;

use crate::modules::donors::format_amount;
use crate::modules::notifications::{Notification, Transition};
use crate::modules::scheduler::SyncFlag;

/// How long the overlay takes to slide into view.
pub const SLIDE_IN: Duration = Duration::from_secs(1);

/// Receives the audible side effect of a new-donation alert.
pub trait AlertSink {
    fn play_donation_sound(&mut self, notification: &Notification);
}

/// Plays the donation sound through a desktop notification carrying a sound hint.
#[cfg(feature = "desktop-alerts")]
pub struct DesktopAlerts {
    sound_name: String,
}

#[cfg(feature = "desktop-alerts")]
impl DesktopAlerts {
    pub fn new(sound_name: impl Into<String>) -> Self {
        Self {
            sound_name: sound_name.into(),
        }
    }
}

#[cfg(feature = "desktop-alerts")]
impl AlertSink for DesktopAlerts {
    fn play_donation_sound(&mut self, notification: &Notification) {
        let donor = notification.donor();
        let result = notify_rust::Notification::new()
            .summary("New donation")
            .body(&format!("{} - {}", donor.name, format_amount(donor.amount)))
            .sound_name(&self.sound_name)
            .timeout(notify_rust::Timeout::Milliseconds(
                notification.display_duration().as_millis() as u32,
            ))
            .show();
        if let Err(e) = result {
            log::warn!("Could not play donation sound: {}", e);
        }
    }
}

/// Sink used when desktop notifications are compiled out.
#[cfg(any(test, not(feature = "desktop-alerts")))]
pub struct LogAlerts;

#[cfg(any(test, not(feature = "desktop-alerts")))]
impl AlertSink for LogAlerts {
    fn play_donation_sound(&mut self, notification: &Notification) {
        let donor = notification.donor();
        log::info!("Donation sound for {} ({})", donor.name, format_amount(donor.amount));
    }
}

#[cfg(feature = "desktop-alerts")]
pub fn default_sink(sound_name: &str) -> Box<dyn AlertSink> {
    Box::new(DesktopAlerts::new(sound_name))
}

#[cfg(not(feature = "desktop-alerts"))]
pub fn default_sink(_sound_name: &str) -> Box<dyn AlertSink> {
    Box::new(LogAlerts)
}

/// Applies the side effects of queue transitions: the donation sound, and
/// pausing donor sync while an alert is on screen.
pub struct AlertPresenter {
    pub audio_enabled: bool,
    sync: SyncFlag,
    sink: Box<dyn AlertSink>,
    sync_before_alert: Option<bool>,
}

impl AlertPresenter {
    pub fn new(sync: SyncFlag, sink: Box<dyn AlertSink>, audio_enabled: bool) -> Self {
        Self {
            audio_enabled,
            sync,
            sink,
            sync_before_alert: None,
        }
    }

    pub fn toggle_audio(&mut self) -> bool {
        self.audio_enabled = !self.audio_enabled;
        self.audio_enabled
    }

    pub fn apply(&mut self, transition: &Transition) {
        if transition.finished.is_some() {
            if let Some(previous) = self.sync_before_alert.take() {
                self.sync.set(previous);
            }
        }
        if let Some(started) = &transition.started {
            self.sync_before_alert = Some(self.sync.is_enabled());
            self.sync.set(false);
            if started.is_new_donor() && self.audio_enabled {
                self.sink.play_donation_sound(started);
            }
        }
    }

    /// Forgets the saved sync state so a manual reset wins over the restore.
    pub fn reset_sync(&mut self) {
        if self.sync_before_alert.is_some() {
            self.sync_before_alert = Some(true);
        } else {
            self.sync.set(true);
        }
    }
}

/// Fraction of the overlay that is visible, easing in over [`SLIDE_IN`].
pub fn reveal(elapsed: Duration) -> f32 {
    let t = (elapsed.as_secs_f32() / SLIDE_IN.as_secs_f32()).clamp(0.0, 1.0);
    // ease-in-out
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}
