use chrono::{DateTime, Local};

const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Level {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ActivityItem {
    pub title: String,
    pub message: String,
    pub level: Level,
    pub timestamp: DateTime<Local>,
}

/// Operator-facing log of shown alerts and fetch problems, newest first.
pub struct ActivityLog {
    pub entries: Vec<ActivityItem>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, title: impl Into<String>, message: impl Into<String>, level: Level) {
        self.entries.insert(
            0,
            ActivityItem {
                title: title.into(),
                message: message.into(),
                level,
                timestamp: Local::now(),
            },
        );
        if self.entries.len() > MAX_ENTRIES {
            self.entries.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first_and_capped() {
        let mut log = ActivityLog::new();
        for i in 0..(MAX_ENTRIES + 5) {
            log.push("Alert", format!("#{}", i), Level::Info);
        }
        assert_eq!(log.entries.len(), MAX_ENTRIES);
        assert_eq!(log.entries[0].message, format!("#{}", MAX_ENTRIES + 4));
        assert_eq!(log.entries[0].level, Level::Info);
    }
}
