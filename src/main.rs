use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::fs::OpenOptions;
use std::io;
use std::time::{Duration, Instant};

mod app;
mod config;
mod modules;
mod ui;

use app::App;
use config::Config;
use modules::{api::ApiClient, presenter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let config = Config::load()?;
    log::info!("Loaded configuration from {:?}", config.location());
    let api = ApiClient::new(&config.api_base_url)?;

    let mut app = App::new(config.clone(), presenter::default_sink(&config.sound_name));
    app.start(api);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;
    app.shutdown();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("{:?}", err);
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

/// Sends log records to a file, since the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let dir = dirs::data_local_dir()
        .context("Could not determine data directory")?
        .join("donorwatch");
    std::fs::create_dir_all(&dir).with_context(|| format!("Creating {:?}", &dir))?;
    let path = dir.join("donorwatch.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Opening {:?}", &path))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(KeyEvent { code, modifiers, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press { continue; }
                match code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(())
                    }
                    KeyCode::Char('?') => { app.show_help = !app.show_help; }
                    KeyCode::Esc => app.show_help = false,
                    KeyCode::Char('a') => app.toggle_audio(),
                    KeyCode::Char('r') => app.reset_sync(),
                    KeyCode::Char('t') => app.trigger_test_alert(),
                    _ => {}
                }
            }
        }

        // Let the pollers make progress between frames.
        tokio::task::yield_now().await;
        app.drain_events();
        app.tick(Instant::now());
    }
}
