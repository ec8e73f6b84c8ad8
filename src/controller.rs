use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, RVConfig, RVError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &RVConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, RVError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Ok(Some(Message::RawKey(key)))
                } else {
                    Ok(Self::handle_key(key))
                }
            }
            Event::Resize(width, height) => Ok(Some(Message::Resize(width as usize, height as usize))),
            _ => Ok(None),
        }
    }

    pub fn handle_key(key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Left, _) => Some(Message::MoveLeft),
            (KeyCode::Right, _) | (KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::PageDown, _) | (KeyCode::Char('n'), _) => Some(Message::NextPage),
            (KeyCode::PageUp, _) | (KeyCode::Char('p'), _) => Some(Message::PrevPage),
            (KeyCode::Char('g'), _) | (KeyCode::Home, _) => Some(Message::FirstPage),
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => Some(Message::LastPage),
            (KeyCode::Char('s'), _) => Some(Message::SortColumn),
            (KeyCode::Char('S'), _) => Some(Message::ClearSort),
            (KeyCode::Char('/'), _) => Some(Message::Filter),
            (KeyCode::Char('='), _) => Some(Message::FilterExact),
            (KeyCode::Char('c'), _) => Some(Message::ClearFilter),
            (KeyCode::Char('v'), _) => Some(Message::ColumnSelector),
            (KeyCode::Char(' '), _) => Some(Message::ToggleColumn),
            (KeyCode::Char('a'), _) => Some(Message::ToggleAllColumns),
            (KeyCode::Char('h'), _) => Some(Message::Histogram),
            (KeyCode::Char('e'), _) => Some(Message::Export),
            (KeyCode::Char('y'), _) => Some(Message::CopyCell),
            (KeyCode::Char('Y'), _) => Some(Message::CopyRow),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
