// src/main.rs
use std::env;
use std::error::Error;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CEvent, KeyEvent, KeyEventKind};
use crossterm::{execute, terminal::{EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter, prelude::*, Registry};

mod api;
mod app;
mod auth;
mod config;
mod controller;
mod error;
mod model;
mod resource;
mod ui;

use api::ApiClient;
use app::App;
use auth::{AuthContext, SessionFile};
use config::Config;
use model::{AppEvent, AppScreen};
use ui::draw_ui;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::load(env::args().skip(1))?;

    // initialize tracing to file only when --debug is passed
    if config.debug {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open("unidesk.log")?;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let fmt_layer = fmt::layer().with_writer(Mutex::new(file)).with_target(false);
        Registry::default().with(filter).with(fmt_layer).init();
        info!("Tracing initialized to unidesk.log (debug)");
    }

    info!(
        "Starting Unidesk as {} against {} (session: {})",
        config.role,
        config.api_url,
        config.session_file.display()
    );

    let auth = AuthContext::new(SessionFile::new(&config.session_file, &config.token_key));
    let client = Arc::new(ApiClient::new(&config.api_url, auth, config.delete_timeout));
    let mut app = App::new(config.role, client);

    // Terminal setup
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    crossterm::terminal::enable_raw_mode()?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Channel for background tasks -> UI
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();

    // Bound concurrent list requests while the dashboard counts load
    let preload_concurrency = Arc::new(Semaphore::new(4));
    app.preload_all(&tx, preload_concurrency);

    let tick_rate = Duration::from_millis(50);
    let mut last_tick = Instant::now();

    loop {
        // Advance spinner + redraw periodically
        if last_tick.elapsed() >= tick_rate {
            if app.busy() {
                app.throbber_state.calc_next();
            }
            terminal.draw(|f| draw_ui(f, &mut app)).ok();
            last_tick = Instant::now();
        }

        // Auto-dismiss welcome screen after 1.5s
        if app.screen == AppScreen::Welcome
            && app.welcome_shown_at.elapsed() >= Duration::from_millis(1500)
        {
            app.screen = AppScreen::Menu;
        }

        // Drain background events
        while let Ok(ev) = rx.try_recv() {
            app.handle_event(ev, &tx);
        }

        // Input handling
        if event::poll(Duration::from_millis(20))? {
            if let CEvent::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press {
                    continue;
                }
                debug!("Key {:?} on {:?}", code, app.screen);
                if app.handle_key(code, &tx) {
                    break;
                }
            }
        }
    }

    // Cleanup
    crossterm::terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!("Exiting Unidesk");
    Ok(())
}
