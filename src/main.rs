use anyhow::{Context, Result};
use courtmap::app::{App, AppMessage, NoticeLevel};
use courtmap::map::pin_drop::PinDropMode;
use courtmap::map::resource::{MapResourceManager, SurfaceRegistry};
use courtmap::map::tiles::TileLayerProvider;
use courtmap::services::{ConfiguredLocation, Gazetteer, JsonVenueStore};
use courtmap::session::MapSession;
use courtmap::{config, data, paths, ui};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use ratatui::layout::Rect;
use ratatui::DefaultTerminal;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Set up file logging. The terminal is in raw mode, so nothing goes to stdout.
fn setup_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use tracing_subscriber::prelude::*;

    let logs_dir = paths::logs_dir();
    if std::fs::create_dir_all(&logs_dir).is_err() {
        return None;
    }

    let log_file_path = logs_dir.join("courtmap.log");

    // Append session separator to existing log file
    if let Ok(mut file) = OpenOptions::new().append(true).open(&log_file_path) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let separator = "=".repeat(80);
        let _ = writeln!(
            file,
            "\n\n{}\n=== New Session Started at {} ===\n{}\n",
            separator, timestamp, separator
        );
    }

    let file_appender = tracing_appender::rolling::never(&logs_dir, "courtmap.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,courtmap=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    Some(guard)
}

fn main() -> Result<()> {
    // Keep the guard alive for the duration of the program
    let _log_guard = setup_logging();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    let local = tokio::task::LocalSet::new();
    let result = local.block_on(&runtime, run());

    // The terminal reader may still be parked in a blocking read
    runtime.shutdown_background();

    if let Err(e) = &result {
        error!("courtmap exited with error: {:#}", e);
    }
    result
}

async fn run() -> Result<()> {
    if let Err(e) = paths::ensure_directories() {
        warn!("Could not create app directories: {}", e);
    }

    let loaded = config::load();
    let config = loaded.config.clone();

    let geodata_dir = config.geodata_dir();
    let geodata = tokio::task::spawn_blocking(move || data::load(&geodata_dir))
        .await
        .context("load map data")?;

    let registry = Rc::new(SurfaceRegistry::new());
    let resources = MapResourceManager::new(
        registry.clone(),
        TileLayerProvider::new(&config.tiles),
        config.acquire_settings(),
    );
    let session = MapSession::new(
        resources,
        Rc::new(JsonVenueStore::new(config.venues_file())),
        Rc::new(Gazetteer::new(geodata.places)),
        Rc::new(ConfiguredLocation::new(config.home)),
        config.viewer(),
        config.tile_layer,
    );

    let (tx, mut rx) = mpsc::channel::<AppMessage>(256);
    let mut app = App::new(session, geodata.renderer, registry, config, loaded.path, tx.clone());
    if let Some(reason) = loaded.reset_reason {
        app.notify(NoticeLevel::Error, reason);
    }

    // Terminal input on a blocking thread, forwarded into the event loop
    tokio::task::spawn_blocking(move || loop {
        if tx.is_closed() {
            break;
        }
        match event::poll(Duration::from_millis(250)) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(_) => break,
        }
        match event::read() {
            Ok(ev) => {
                if tx.blocking_send(AppMessage::Terminal(ev)).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });

    let mut terminal = ratatui::init();
    terminal.clear()?;
    execute!(std::io::stdout(), EnableMouseCapture)?;
    info!("courtmap started");

    let result = event_loop(&mut terminal, &mut app, &mut rx).await;

    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    // Releases the canvas before the runtime goes away
    drop(app);
    info!("courtmap stopped");
    result
}

fn draw(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    let mut map_area = Rect::default();
    terminal.draw(|frame| map_area = ui::render(frame, app))?;
    // A new map size changes the viewport, so draw once more at the new size
    if app.set_map_area(map_area) {
        terminal.draw(|frame| {
            ui::render(frame, app);
        })?;
    }
    Ok(())
}

async fn event_loop(
    terminal: &mut DefaultTerminal,
    app: &mut App,
    rx: &mut mpsc::Receiver<AppMessage>,
) -> Result<()> {
    app.start();

    // Notice expiry, and pin addresses that arrive from background lookups
    let mut tick = tokio::time::interval(Duration::from_millis(100));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut needs_redraw = true;
    loop {
        if needs_redraw {
            draw(terminal, app)?;
        }
        needs_redraw = false;

        if app.should_quit {
            break;
        }

        tokio::select! {
            Some(msg) = rx.recv() => {
                const MAX_DRAIN: usize = 256;
                needs_redraw = app.handle_message(msg);
                for _ in 0..MAX_DRAIN {
                    match rx.try_recv() {
                        Ok(msg) => needs_redraw |= app.handle_message(msg),
                        Err(_) => break,
                    }
                }
            }
            _ = tick.tick() => {
                needs_redraw = app.tick() || app.session.pin_drop_mode() == PinDropMode::Previewing;
            }
        }
    }

    Ok(())
}
