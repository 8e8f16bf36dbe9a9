use std::io;

use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use elmos_core::queue::WILDCARD;

use super::theme::styles;
use crate::commands::module::ModuleAction;

/// What the operator picked from the menu
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuChoice {
    Module(ModuleAction),
    Doctor,
}

struct MenuItem {
    label: &'static str,
    hint: &'static str,
    // None quits
    choice: Option<MenuChoice>,
}

fn menu_items() -> Vec<MenuItem> {
    let module = |action| Some(MenuChoice::Module(action));
    vec![
        MenuItem {
            label: "Build all",
            hint: "make modules for every module",
            choice: module(ModuleAction::Build { name: None }),
        },
        MenuItem {
            label: "Clean all",
            hint: "make clean for every module",
            choice: module(ModuleAction::Clean { name: None }),
        },
        MenuItem {
            label: "Status",
            hint: "build and queue state per module",
            choice: module(ModuleAction::Status { json: false }),
        },
        MenuItem {
            label: "List",
            hint: "available modules",
            choice: module(ModuleAction::List),
        },
        MenuItem {
            label: "Prepare headers",
            hint: "make modules_prepare in the kernel tree",
            choice: module(ModuleAction::Headers),
        },
        MenuItem {
            label: "Queue all for insmod",
            hint: "load every module on next boot",
            choice: module(ModuleAction::Insmod {
                name: WILDCARD.to_string(),
            }),
        },
        MenuItem {
            label: "Queue all for rmmod",
            hint: "unload every module on next boot",
            choice: module(ModuleAction::Rmmod {
                name: WILDCARD.to_string(),
            }),
        },
        MenuItem {
            label: "Reset queue",
            hint: "clear both queues",
            choice: module(ModuleAction::Reset),
        },
        MenuItem {
            label: "Doctor",
            hint: "check toolchain and paths",
            choice: Some(MenuChoice::Doctor),
        },
        MenuItem {
            label: "Help",
            hint: "module command usage",
            choice: module(ModuleAction::Help),
        },
        MenuItem {
            label: "Quit",
            hint: "",
            choice: None,
        },
    ]
}

#[derive(Debug, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Selected(MenuChoice),
    Quit,
}

struct Menu {
    items: Vec<MenuItem>,
    state: ListState,
}

impl Menu {
    fn new() -> Self {
        let mut state = ListState::default();
        state.select(Some(0));
        Self {
            items: menu_items(),
            state,
        }
    }

    fn selected(&self) -> usize {
        self.state.selected().unwrap_or(0)
    }

    fn next(&mut self) {
        let i = (self.selected() + 1) % self.items.len();
        self.state.select(Some(i));
    }

    fn previous(&mut self) {
        let i = match self.selected() {
            0 => self.items.len() - 1,
            i => i - 1,
        };
        self.state.select(Some(i));
    }

    fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => KeyOutcome::Quit,
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => KeyOutcome::Quit,
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => {
                self.next();
                KeyOutcome::Continue
            }
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => {
                self.previous();
                KeyOutcome::Continue
            }
            (KeyCode::Enter, _) => match &self.items[self.selected()].choice {
                Some(choice) => KeyOutcome::Selected(choice.clone()),
                None => KeyOutcome::Quit,
            },
            _ => KeyOutcome::Continue,
        }
    }

    fn draw(&mut self, f: &mut Frame, subtitle: &str) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(f.area());

        let header = Paragraph::new(Line::from(vec![
            Span::styled("elmos", styles::title()),
            Span::raw("  "),
            Span::styled(subtitle.to_string(), styles::text_dim()),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(styles::border()),
        );
        f.render_widget(header, chunks[0]);

        let items: Vec<ListItem> = self
            .items
            .iter()
            .map(|item| {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{:<22}", item.label), styles::text()),
                    Span::styled(item.hint, styles::text_dim()),
                ]))
            })
            .collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Actions ")
                    .borders(Borders::ALL)
                    .border_style(styles::border()),
            )
            .highlight_style(styles::selection())
            .highlight_symbol("▶ ");
        f.render_stateful_widget(list, chunks[1], &mut self.state);

        let footer = Line::from(vec![
            Span::styled(" ↑/↓ j/k", styles::key_hint()),
            Span::styled(" move  ", styles::text_dim()),
            Span::styled("Enter", styles::key_hint()),
            Span::styled(" select  ", styles::text_dim()),
            Span::styled("q/Esc", styles::key_hint()),
            Span::styled(" quit", styles::text_dim()),
        ]);
        f.render_widget(Paragraph::new(footer), chunks[2]);
    }
}

/// Draw the menu until the operator selects an action or quits
pub fn select<B: Backend>(
    terminal: &mut Terminal<B>,
    subtitle: &str,
) -> io::Result<Option<MenuChoice>> {
    let mut menu = Menu::new();
    loop {
        terminal.draw(|f| menu.draw(f, subtitle))?;

        if let CEvent::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match menu.handle_key(key) {
                KeyOutcome::Continue => {}
                KeyOutcome::Selected(choice) => return Ok(Some(choice)),
                KeyOutcome::Quit => return Ok(None),
            }
        }
    }
}
