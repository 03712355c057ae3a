use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// How long the input thread blocks before checking whether the UI is gone
const INPUT_POLL_MS: u64 = 250;

/// Terminal events forwarded to the UI loop
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Key press
    Input(KeyEvent),
    /// Terminal resized; redraw
    Resize,
}

impl AppEvent {
    fn from_terminal(event: Event) -> Option<Self> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Input(key)),
            Event::Resize(_, _) => Some(AppEvent::Resize),
            _ => None,
        }
    }
}

/// Read terminal input on a blocking thread and forward it to `tx`.
///
/// The thread exits once the receiving side has been dropped.
pub fn spawn_input_reader(tx: UnboundedSender<AppEvent>) {
    std::thread::spawn(move || loop {
        match event::poll(Duration::from_millis(INPUT_POLL_MS)) {
            Ok(true) => {
                let Ok(raw) = event::read() else { break };
                if let Some(event) = AppEvent::from_terminal(raw) {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            }
            Ok(false) => {
                if tx.is_closed() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}
