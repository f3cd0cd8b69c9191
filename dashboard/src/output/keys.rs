//! Keyboard controls for the live view

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use speedlog::Shutdown;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Mbps added or removed per key press
pub const THRESHOLD_STEP: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyCommand {
    Quit,
    Refresh,
    CycleChart,
    AdjustDownload(f64),
    AdjustUpload(f64),
}

pub fn map_key(key: KeyEvent) -> Option<KeyCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(KeyCommand::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyCommand::Quit),
        KeyCode::Char('r') => Some(KeyCommand::Refresh),
        KeyCode::Char('c') => Some(KeyCommand::CycleChart),
        KeyCode::Char('d') => Some(KeyCommand::AdjustDownload(-THRESHOLD_STEP)),
        KeyCode::Char('D') => Some(KeyCommand::AdjustDownload(THRESHOLD_STEP)),
        KeyCode::Char('u') => Some(KeyCommand::AdjustUpload(-THRESHOLD_STEP)),
        KeyCode::Char('U') => Some(KeyCommand::AdjustUpload(THRESHOLD_STEP)),
        _ => None,
    }
}

/// Read terminal key events on a dedicated thread until shutdown or the receiver goes away
pub fn spawn_key_reader(shutdown: Shutdown) -> mpsc::Receiver<KeyCommand> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::spawn(move || {
        while !shutdown.is_triggered() {
            match event::poll(Duration::from_millis(200)) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    warn!("Failed to poll terminal events: {}", e);
                    break;
                }
            }

            let command = match event::read() {
                Ok(Event::Key(key)) => map_key(key),
                Ok(_) => None,
                Err(e) => {
                    warn!("Failed to read terminal event: {}", e);
                    break;
                }
            };

            if let Some(command) = command {
                debug!("Key command {:?}", command);
                if tx.blocking_send(command).is_err() {
                    break;
                }
            }
        }
    });

    rx
}
