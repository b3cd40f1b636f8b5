//! Keyboard dispatch, keyed off the current navigation mode.
//!
//! Reading happens on a dedicated blocking thread — `crossterm::event::read`
//! blocks the calling thread, so it can't run on the async controller —
//! forwarding into the same `tokio::mpsc` channel worker events flow
//! through, mirroring the reference dashboard's `spawn_keyboard_worker`.

use crossterm::event::{Event, KeyCode, KeyEvent};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    HostNav,
    LogScroll,
    FullScreen,
    Menu,
}

/// The effect a keystroke should have on controller state. Kept data-only
/// so `dispatch` stays a pure function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleHelp,
    PrevVisibleHost,
    NextVisibleHost,
    PrevHost,
    NextHost,
    ScrollUp(u16),
    ScrollDown(u16),
    ScrollTop,
    ScrollBottom,
    EnterFullScreen,
    ExitFullScreen,
    OpenMenu,
    CloseMenu,
    LeaveLogScroll,
    MenuPrevEntry,
    MenuNextEntry,
    MenuSelectEntry,
    MenuJumpToEntry(u8),
    ToggleMinimizedBand,
    None,
}

const PAGE_SIZE: u16 = 10;

/// Maps one keystroke to an [`Action`] given the current mode. Global
/// keys (`q`, `h`) are checked first and apply in every mode.
pub fn dispatch(key: KeyEvent, mode: NavigationMode) -> Action {
    match key.code {
        KeyCode::Char('q') => return Action::Quit,
        KeyCode::Char('h') => return Action::ToggleHelp,
        _ => {}
    }

    match mode {
        NavigationMode::HostNav => match key.code {
            KeyCode::Up => Action::PrevVisibleHost,
            KeyCode::Down => Action::NextVisibleHost,
            KeyCode::Left => Action::PrevHost,
            KeyCode::Right => Action::NextHost,
            KeyCode::Enter => Action::EnterFullScreen,
            KeyCode::Tab => Action::OpenMenu,
            KeyCode::Char('m') => Action::ToggleMinimizedBand,
            _ => Action::None,
        },
        NavigationMode::LogScroll => match key.code {
            KeyCode::Up => Action::ScrollUp(1),
            KeyCode::Down => Action::ScrollDown(1),
            KeyCode::PageUp => Action::ScrollUp(PAGE_SIZE),
            KeyCode::PageDown => Action::ScrollDown(PAGE_SIZE),
            KeyCode::Home => Action::ScrollTop,
            KeyCode::End => Action::ScrollBottom,
            KeyCode::Esc => Action::LeaveLogScroll,
            _ => Action::None,
        },
        NavigationMode::FullScreen => match key.code {
            KeyCode::PageUp => Action::ScrollUp(PAGE_SIZE),
            KeyCode::PageDown => Action::ScrollDown(PAGE_SIZE),
            KeyCode::Home => Action::ScrollTop,
            KeyCode::End => Action::ScrollBottom,
            KeyCode::Enter | KeyCode::Esc => Action::ExitFullScreen,
            _ => Action::None,
        },
        NavigationMode::Menu => match key.code {
            KeyCode::Up => Action::MenuPrevEntry,
            KeyCode::Down => Action::MenuNextEntry,
            KeyCode::Enter => Action::MenuSelectEntry,
            KeyCode::Esc => Action::CloseMenu,
            KeyCode::Char(c) if c.is_ascii_digit() && c != '0' => {
                Action::MenuJumpToEntry(c as u8 - b'0')
            }
            _ => Action::None,
        },
    }
}

/// Spawns a blocking thread reading terminal events and forwarding key
/// presses (resize events are forwarded too, as `InputMessage::Resize`,
/// the idiomatic-Rust stand-in for a SIGWINCH handler) into `tx`.
pub fn spawn_keyboard_worker(tx: mpsc::Sender<InputMessage>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            match crossterm::event::read() {
                Ok(Event::Key(key)) => {
                    if tx.blocking_send(InputMessage::Key(key)).is_err() {
                        return;
                    }
                }
                Ok(Event::Resize(width, height)) => {
                    if tx.blocking_send(InputMessage::Resize(width, height)).is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
    })
}

#[derive(Debug, Clone, Copy)]
pub enum InputMessage {
    Key(KeyEvent),
    Resize(u16, u16),
}
