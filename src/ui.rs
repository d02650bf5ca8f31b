use chrono::Utc;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use std::time::Instant;

use crate::app::App;
use crate::modules::activity::Level;
use crate::modules::donors::{LOADING, format_amount, time_ago, truncate_name};
use crate::modules::notifications::Notification;
use crate::modules::presenter::reveal;

const ALERT_BG: Color = Color::Rgb(0x95, 0xbd, 0xff);
const ACCENT: Color = Color::Rgb(0xeb, 0xc4, 0x9f);

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_stats(f, chunks[0], app);
    draw_ticker(f, chunks[1], app);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[2]);

    draw_top_donors(f, app, main_chunks[0]);
    draw_activity(f, app, main_chunks[1]);
    draw_status(f, app, chunks[3]);

    if let Some(current) = app.queue.current() {
        let elapsed = app.queue.elapsed(Instant::now()).unwrap_or_default();
        draw_alert(f, current, reveal(elapsed), app.config.name_char_limit);
    }
    if app.show_help {
        draw_help_popup(f);
    }
}

fn draw_stats(f: &mut Frame, area: Rect, app: &App) {
    let (believers, big) = match &app.stats {
        Some(s) => (s.believers_count.to_string(), s.big_believers_count.to_string()),
        None => (LOADING.to_string(), LOADING.to_string()),
    };
    let line = Line::from(vec![
        Span::styled("Helpchess.org", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
        Span::raw("   "),
        Span::styled(believers, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" Believers   "),
        Span::styled(big, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" Big Believers"),
    ]);
    let stats = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(stats, area);
}

fn draw_ticker(f: &mut Frame, area: Rect, app: &App) {
    let visible = &app.visible;
    let name = truncate_name(visible.name(), app.config.name_char_limit);
    let text = match &visible.donor {
        Some(d) => {
            let when = d
                .donated_at()
                .map(|t| time_ago(t, Utc::now()))
                .unwrap_or_else(|| LOADING.to_string());
            format!(
                "{} - {}  {}   {}/{}",
                name,
                format_amount(d.amount),
                when,
                visible.index + 1,
                app.snapshot().len()
            )
        }
        None => name,
    };
    let ticker = Paragraph::new(text)
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().title("Latest Donor").borders(Borders::ALL));
    f.render_widget(ticker, area);
}

fn draw_top_donors(f: &mut Frame, app: &App, area: Rect) {
    let Some(top) = app.stats.as_ref().and_then(|s| s.top_donors.as_ref()) else {
        let empty = Paragraph::new("No leaderboard data")
            .block(Block::default().title("Top Donors").borders(Borders::ALL));
        f.render_widget(empty, area);
        return;
    };

    let items: Vec<ListItem> = top
        .labelled()
        .into_iter()
        .map(|(label, slot)| {
            let value = match slot.and_then(|s| s.name.as_deref().map(|n| (n, s.amount))) {
                Some((name, amount)) => format!(
                    "{} - {}",
                    truncate_name(name, app.config.name_char_limit),
                    format_amount(amount)
                ),
                None => "-".to_string(),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<14}", label), Style::default().fg(Color::Yellow)),
                Span::raw(value),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().title("Top Donors").borders(Borders::ALL));
    f.render_widget(list, area);
}

fn draw_activity(f: &mut Frame, app: &App, area: Rect) {
    if app.activity.entries.is_empty() {
        let empty = Paragraph::new("No alerts yet")
            .block(Block::default().title("Recent Activity").borders(Borders::ALL));
        f.render_widget(empty, area);
        return;
    }

    let height = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .activity
        .entries
        .iter()
        .take(height)
        .map(|n| {
            let color = match n.level {
                Level::Info => Color::White,
                Level::Warning => Color::Yellow,
            };
            ListItem::new(format!(
                "[{}] {} - {}",
                n.timestamp.format("%H:%M:%S"),
                n.title,
                n.message
            ))
            .style(Style::default().fg(color))
        })
        .collect();

    let list = List::new(items).block(Block::default().title("Recent Activity").borders(Borders::ALL));
    f.render_widget(list, area);
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let (sync_text, sync_color) = if app.sync.is_enabled() {
        ("✓ Actively Syncing Donors", Color::Green)
    } else {
        ("✕ Not Syncing - press r to reset", Color::Red)
    };
    let audio = if app.presenter.audio_enabled { "audio on" } else { "audio off" };
    let line = Line::from(vec![
        Span::styled(sync_text, Style::default().fg(sync_color)),
        Span::raw(format!(" | {} | queued: {} | ", audio, app.queue.len())),
        Span::raw(app.status_message.as_str()),
    ]);
    let status = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(status, area);
}

fn draw_alert(f: &mut Frame, notification: &Notification, shown: f32, name_limit: usize) {
    let full = centered_rect(50, 30, f.area());
    if full.height == 0 {
        return;
    }
    // Slide up from the bottom edge of the box as `shown` goes 0 -> 1.
    let height = (((full.height as f32) * shown).round() as u16).clamp(1, full.height);
    let area = Rect {
        y: full.y + full.height - height,
        height,
        ..full
    };

    let donor = notification.donor();
    let dark = Style::default().fg(Color::Rgb(0x21, 0x21, 0x21));
    let (title, subtext) = match notification {
        Notification::NewDonor { .. } => (
            truncate_name(&donor.name, name_limit).to_uppercase(),
            "Thank you for your contribution towards growing Chess in India!".to_string(),
        ),
        Notification::TopDonor { label, .. } => (
            label.to_uppercase(),
            truncate_name(&donor.name, name_limit),
        ),
    };
    let text = vec![
        Line::from(Span::styled(title, dark.add_modifier(Modifier::BOLD))),
        Line::from(Span::styled(format_amount(donor.amount), dark.add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(Span::styled(subtext, dark)),
    ];

    f.render_widget(Clear, area);
    let popup = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .style(Style::default().bg(ALERT_BG))
        .block(Block::default().borders(Borders::ALL).border_style(dark));
    f.render_widget(popup, area);
}

fn draw_help_popup(f: &mut Frame) {
    let area = centered_rect(50, 40, f.area());
    let text = vec![
        Line::from("q / Ctrl-C  quit"),
        Line::from("a           toggle donation sound"),
        Line::from("r           reset sync to the latest donor"),
        Line::from("t           queue a test alert for the latest donor"),
        Line::from("?           toggle this help"),
    ];
    f.render_widget(Clear, area);
    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::modules::donors::donor;
    use crate::modules::presenter::LogAlerts;
    use crate::modules::scheduler::PollEvent;
    use ratatui::{Terminal, backend::TestBackend};

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn shows_placeholders_before_first_fetch() {
        let app = App::new(Config::defaults(), Box::new(LogAlerts));
        let screen = render(&app);
        assert!(screen.contains("loading..."));
        assert!(screen.contains("Actively Syncing Donors"));
    }

    #[test]
    fn shows_latest_donor_and_alert_overlay() {
        let mut app = App::new(Config::defaults(), Box::new(LogAlerts));
        app.handle_event(PollEvent::Donors(vec![donor("a", "Anand", 5000.0)]));
        let screen = render(&app);
        assert!(screen.contains("Anand - ₹5,000"));

        app.trigger_test_alert();
        app.tick(Instant::now());
        let screen = render(&app);
        assert!(screen.contains("Not Syncing"));
    }
}
