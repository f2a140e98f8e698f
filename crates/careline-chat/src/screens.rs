//! Launcher panel and topic selection screen.

use std::fmt;

use careline_core::config::CarelineConfig;
use careline_core::error::{CarelineError, Result};
use careline_core::types::Topic;

/// Which surface of the widget is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Only the floating launcher button.
    Launcher,
    /// Expanded panel with the topic menu.
    TopicMenu,
    /// Expanded panel with a topic's thread.
    Thread,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screen::Launcher => write!(f, "Launcher"),
            Screen::TopicMenu => write!(f, "TopicMenu"),
            Screen::Thread => write!(f, "Thread"),
        }
    }
}

/// Open/closed state of the chat panel.
///
/// The thread screen is only reachable through the topic menu, and closing
/// the panel remembers nothing about which screen was showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    screen: Screen,
}

impl Panel {
    pub fn new(start_expanded: bool) -> Self {
        Self {
            screen: if start_expanded {
                Screen::TopicMenu
            } else {
                Screen::Launcher
            },
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn is_expanded(&self) -> bool {
        self.screen != Screen::Launcher
    }

    /// Launcher click: open on the topic menu, or close.
    pub fn toggle(&mut self) {
        self.screen = match self.screen {
            Screen::Launcher => Screen::TopicMenu,
            _ => Screen::Launcher,
        };
        tracing::debug!(screen = %self.screen, "Panel toggled");
    }

    pub fn close(&mut self) {
        self.screen = Screen::Launcher;
    }

    /// A topic was chosen from the menu.
    pub fn open_thread(&mut self) {
        self.screen = Screen::Thread;
    }

    /// Back button in the thread header.
    pub fn back_to_menu(&mut self) {
        if self.screen == Screen::Thread {
            self.screen = Screen::TopicMenu;
        }
    }
}

/// One selectable topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicEntry {
    pub icon: &'static str,
    pub label: &'static str,
    pub topic: Topic,
}

impl From<Topic> for TopicEntry {
    fn from(topic: Topic) -> Self {
        Self {
            icon: topic.icon(),
            label: topic.label(),
            topic,
        }
    }
}

/// The topic selection list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMenu {
    entries: Vec<TopicEntry>,
}

impl Default for TopicMenu {
    fn default() -> Self {
        Self::new(&Topic::ALL)
    }
}

impl TopicMenu {
    pub fn new(topics: &[Topic]) -> Self {
        let mut entries: Vec<TopicEntry> = Vec::with_capacity(topics.len());
        for topic in topics {
            if !entries.iter().any(|e| e.topic == *topic) {
                entries.push(TopicEntry::from(*topic));
            }
        }
        Self { entries }
    }

    pub fn from_config(config: &CarelineConfig) -> Self {
        Self::new(&config.topics.enabled)
    }

    pub fn entries(&self) -> &[TopicEntry] {
        &self.entries
    }

    /// Zero-based selection.
    pub fn select_index(&self, index: usize) -> Result<Topic> {
        self.entries
            .get(index)
            .map(|e| e.topic)
            .ok_or_else(|| CarelineError::UnknownTopic(format!("#{}", index + 1)))
    }

    /// Selection by topic identifier, e.g. `"apply"`.
    pub fn select_id(&self, id: &str) -> Result<Topic> {
        let topic: Topic = id.parse()?;
        if self.entries.iter().any(|e| e.topic == topic) {
            Ok(topic)
        } else {
            Err(CarelineError::UnknownTopic(id.to_string()))
        }
    }

    /// Accepts either a 1-based menu number or a topic identifier.
    pub fn select(&self, input: &str) -> Result<Topic> {
        let input = input.trim();
        match input.parse::<usize>() {
            Ok(n) if n >= 1 => self.select_index(n - 1),
            Ok(_) => Err(CarelineError::UnknownTopic(input.to_string())),
            Err(_) => self.select_id(input),
        }
    }

    /// Numbered menu for a terminal.
    pub fn render_text(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| format!("  {}. [{}] {}\n", i + 1, e.icon, e.label))
            .collect()
    }
}

/// Panel header: the current topic's label, or the back label on the menu.
pub fn header_title(current: Option<Topic>, back_label: &str) -> String {
    match current {
        Some(topic) => topic.label().to_string(),
        None => back_label.to_string(),
    }
}
