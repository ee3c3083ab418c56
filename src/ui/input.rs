use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

const PAGE: i32 = 10;

/// User intent decoded from a terminal event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    Quit,
    Refresh,
    Scroll(i32),
    Top,
    Bottom,
    Resize,
}

impl Input {
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => Self::from_key(key),
            Event::Resize(_, _) => Some(Input::Resize),
            _ => None,
        }
    }

    fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Some(Input::Quit),
                _ => None,
            };
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Input::Quit),
            KeyCode::Char('r') => Some(Input::Refresh),
            KeyCode::Char('j') | KeyCode::Down => Some(Input::Scroll(1)),
            KeyCode::Char('k') | KeyCode::Up => Some(Input::Scroll(-1)),
            KeyCode::PageDown => Some(Input::Scroll(PAGE)),
            KeyCode::PageUp => Some(Input::Scroll(-PAGE)),
            KeyCode::Char('g') | KeyCode::Home => Some(Input::Top),
            KeyCode::Char('G') | KeyCode::End => Some(Input::Bottom),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn maps_bindings() {
        let none = KeyModifiers::NONE;
        assert_eq!(Input::from_event(&key(KeyCode::Char('q'), none)), Some(Input::Quit));
        assert_eq!(Input::from_event(&key(KeyCode::Esc, none)), Some(Input::Quit));
        assert_eq!(
            Input::from_event(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Input::Quit)
        );
        assert_eq!(Input::from_event(&key(KeyCode::Char('r'), none)), Some(Input::Refresh));
        assert_eq!(Input::from_event(&key(KeyCode::Down, none)), Some(Input::Scroll(1)));
        assert_eq!(Input::from_event(&key(KeyCode::PageUp, none)), Some(Input::Scroll(-10)));
        assert_eq!(
            Input::from_event(&key(KeyCode::Char('G'), KeyModifiers::SHIFT)),
            Some(Input::Bottom)
        );
        assert_eq!(Input::from_event(&Event::Resize(80, 24)), Some(Input::Resize));
    }

    #[test]
    fn ignores_releases_and_unbound_keys() {
        let mut release = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(Input::from_event(&Event::Key(release)), None);
        assert_eq!(
            Input::from_event(&key(KeyCode::Char('x'), KeyModifiers::NONE)),
            None
        );
        assert_eq!(Input::from_event(&Event::FocusGained), None);
    }
}
