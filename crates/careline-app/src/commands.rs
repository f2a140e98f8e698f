//! Parsing terminal input into widget actions.

use std::path::PathBuf;

use careline_chat::Screen;

/// One line of user input, interpreted for the screen it was typed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Nothing to do.
    Empty,
    /// Open or close the panel.
    Toggle,
    /// Menu number or topic identifier.
    SelectTopic(String),
    /// Free text for the current topic.
    Send(String),
    /// Zero-based quick reply index.
    QuickReply(usize),
    Clear,
    Back,
    /// Optional format argument (`md`, `txt`).
    Export(Option<String>),
    /// Send an audio file as a voice message.
    VoiceFile(PathBuf),
    Record,
    Pause,
    Resume,
    Stop,
    Play,
    SendRecording,
    CancelRecording,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str, screen: Screen) -> Self {
        let input = line.trim();

        if let Some(rest) = input.strip_prefix('/') {
            let (name, arg) = match rest.split_once(char::is_whitespace) {
                Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
                None => (rest, None),
            };
            match name {
                "quit" | "q" => return Command::Quit,
                "help" | "h" | "?" => return Command::Help,
                "close" | "open" => return Command::Toggle,
                _ => {}
            }
            if screen != Screen::Thread {
                return Command::Unknown(input.to_string());
            }
            if let Ok(n) = name.parse::<usize>() {
                return match n.checked_sub(1) {
                    Some(index) => Command::QuickReply(index),
                    None => Command::Unknown(input.to_string()),
                };
            }
            return match (name, arg) {
                ("clear", _) => Command::Clear,
                ("back", _) => Command::Back,
                ("export", arg) => Command::Export(arg.map(str::to_string)),
                ("voice", Some(path)) => Command::VoiceFile(PathBuf::from(path)),
                ("record", _) => Command::Record,
                ("pause", _) => Command::Pause,
                ("resume", _) => Command::Resume,
                ("stop", _) => Command::Stop,
                ("play", _) => Command::Play,
                ("send", _) => Command::SendRecording,
                ("cancel", _) => Command::CancelRecording,
                _ => Command::Unknown(input.to_string()),
            };
        }

        match screen {
            Screen::Launcher => Command::Toggle,
            _ if input.is_empty() => Command::Empty,
            Screen::TopicMenu => Command::SelectTopic(input.to_string()),
            Screen::Thread => Command::Send(input.to_string()),
        }
    }

    /// Whether handling this command waits on the backend.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Command::SelectTopic(_)
                | Command::Send(_)
                | Command::QuickReply(_)
                | Command::VoiceFile(_)
                | Command::SendRecording
        )
    }
}

/// Help text for a screen.
pub fn help_text(screen: Screen) -> &'static str {
    match screen {
        Screen::Launcher => "Tryck Enter för att öppna chatten. /quit avslutar.\n",
        Screen::TopicMenu => {
            "Välj ett ämne med nummer eller namn. /close stänger, /quit avslutar.\n"
        }
        Screen::Thread => concat!(
            "Skriv ett meddelande och tryck Enter.\n",
            "  /1, /2 ...       välj ett snabbsvar\n",
            "  /record          spela in (mikrofon-simulering)\n",
            "  /pause /resume   pausa eller fortsätt inspelningen\n",
            "  /stop /play      stoppa, spela upp\n",
            "  /send /cancel    skicka eller kasta inspelningen\n",
            "  /voice <fil>     skicka en ljudfil\n",
            "  /export [md|txt] spara konversationen\n",
            "  /clear           rensa historiken\n",
            "  /back            tillbaka till ämnen\n",
            "  /close /quit     stäng panelen, avsluta\n",
        ),
    }
}
