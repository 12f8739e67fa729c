use std::time::Duration;
use tracing::trace;

use crate::dataset::DatasetId;
use crate::domain::{Message, NGConfig, NGError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &NGConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    /// Wait up to the poll time for a terminal event and map it to a message.
    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, NGError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        let message = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Some(Message::RawKey(key))
                } else {
                    self.handle_key(key)
                }
            }
            Event::Resize(width, height) => Some(Message::Resize(width as usize, height as usize)),
            _ => None,
        };
        Ok(message)
    }

    fn handle_key(&self, key: KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Up | KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down | KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Left, _) => Some(Message::MoveLeft),
            (KeyCode::Right, _) => Some(Message::MoveRight),
            (KeyCode::PageDown | KeyCode::Char('n'), _) => Some(Message::NextPage),
            (KeyCode::PageUp | KeyCode::Char('p'), _) => Some(Message::PrevPage),
            (KeyCode::Home, _) => Some(Message::FirstPage),
            (KeyCode::End, _) => Some(Message::LastPage),
            (KeyCode::Char('s'), _) => Some(Message::SortColumn),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char('h'), _) => Some(Message::HideColumn),
            (KeyCode::Char('a'), _) => Some(Message::ShowAllColumns),
            (KeyCode::Char('+'), _) => Some(Message::WidenColumn),
            (KeyCode::Char('-'), _) => Some(Message::NarrowColumn),
            (KeyCode::Char('m'), _) => Some(Message::SelectDataset(DatasetId::Boys)),
            (KeyCode::Char('f'), _) => Some(Message::SelectDataset(DatasetId::Girls)),
            (KeyCode::Char('g'), _) => Some(Message::ToggleDataset),
            (KeyCode::Char('r'), _) => Some(Message::Reload),
            (KeyCode::Char('c'), _) => Some(Message::CopyCell),
            (KeyCode::Char('C'), _) => Some(Message::CopyRow),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
