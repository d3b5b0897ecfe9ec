use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table},
};
use throbber_widgets_tui::{BRAILLE_SIX, Throbber, WhichUse};

use crate::app::App;
use crate::controller::{ControllerState, ResourceController};
use crate::model::{AppScreen, FormDraft, NoticeLevel, PendingAction, PendingKind};
use crate::resource::FieldKind;

/// Draw router
pub fn draw_ui(f: &mut Frame<'_>, app: &mut App) {
    match app.screen {
        AppScreen::Welcome => draw_welcome_screen(f, app),
        AppScreen::Menu => draw_menu_screen(f, app),
        AppScreen::Records => draw_records_screen(f, app),
    }
}

/// Welcome ASCII art screen (centered)
fn draw_welcome_screen(f: &mut Frame<'_>, app: &App) {
    let area = f.area();
    let art = r#"
 _   _       _     _           _
| | | |_ __ (_) __| | ___  ___| | __
| | | | '_ \| |/ _` |/ _ \/ __| |/ /
| |_| | | | | | (_| |  __/\__ \   <
 \___/|_| |_|_|\__,_|\___||___/_|\_\
                                      "#;

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Unidesk: {}", app.role.title()))
        .title_alignment(Alignment::Center);

    let paragraph = Paragraph::new(art)
        .alignment(Alignment::Center)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .block(block);

    f.render_widget(paragraph, area);
}

fn draw_menu_screen(f: &mut Frame<'_>, app: &mut App) {
    let area = f.area();

    let block = Block::default()
        .title(format!(
            "{} [Enter: open] [r: refresh] [q: quit]",
            app.role.title()
        ))
        .borders(Borders::ALL)
        .title_alignment(Alignment::Center);

    let items: Vec<ListItem> = app
        .role
        .resources()
        .iter()
        .map(|kind| {
            let spec = kind.spec();
            let count = match app.controllers.get(kind) {
                Some(c) if c.is_loaded() => c.records().len().to_string(),
                Some(c) if c.is_loading() => "…".to_string(),
                _ => "—".to_string(),
            };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{:<24}", spec.title)),
                Span::styled(count, Style::default().fg(Color::Yellow)),
            ]))
        })
        .collect();

    let list_area = Rect {
        height: area.height.saturating_sub(3),
        ..area
    };
    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    f.render_stateful_widget(list, list_area, &mut app.menu_state);

    if app.busy() {
        let throbber = Throbber::default()
            .label(" Loading...")
            .style(Style::default().fg(Color::Yellow))
            .throbber_set(BRAILLE_SIX)
            .use_type(WhichUse::Spin);
        let spinner_area = Rect {
            x: list_area.x + 2,
            y: list_area.bottom().saturating_sub(2),
            width: 20,
            height: 1,
        };
        f.render_stateful_widget(throbber, spinner_area, &mut app.throbber_state);
    }

    let footer_area = Rect {
        x: area.x,
        y: area.bottom().saturating_sub(3),
        width: area.width,
        height: 3.min(area.height),
    };
    draw_message(f, app, footer_area);
}

fn draw_records_screen(f: &mut Frame<'_>, app: &mut App) {
    let area = f.area();
    let Some(controller) = app.controller() else {
        return;
    };
    let spec = controller.spec();

    let outer_block = Block::default().borders(Borders::ALL).title(Span::styled(
        format!("{}: {}", app.role.title(), spec.title),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ));
    f.render_widget(outer_block, area);
    let inner = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(inner);

    let header_text = if app.search_mode {
        format!("Search: {}_", app.search_query)
    } else {
        key_hints(controller)
    };
    let header = Paragraph::new(header_text)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(header, chunks[0]);

    let header_row = Row::new(
        spec.columns
            .iter()
            .map(|c| Cell::from(c.title))
            .collect::<Vec<_>>(),
    )
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = if app.displayed.is_empty() {
        let text = if !controller.records().is_empty() {
            "No matching records."
        } else if let Some(msg) = controller.empty_message() {
            msg
        } else if controller.is_loaded() {
            "No records yet."
        } else {
            ""
        };
        vec![Row::new(vec![Cell::from(text.to_string())])
            .style(Style::default().fg(Color::DarkGray))]
    } else {
        app.displayed
            .iter()
            .filter_map(|i| controller.records().get(*i))
            .map(|r| {
                Row::new(
                    spec.columns
                        .iter()
                        .map(|c| Cell::from(r.display(c.path)))
                        .collect::<Vec<_>>(),
                )
            })
            .collect()
    };

    let widths = vec![Constraint::Fill(1); spec.columns.len().max(1)];
    let mut title = format!("{} ({})", spec.title, controller.records().len());
    if let Some(at) = controller.refreshed_at() {
        title.push_str(&format!(
            " updated {:02}:{:02}:{:02}",
            at.hour(),
            at.minute(),
            at.second()
        ));
    }
    for (filter, value) in spec.filters.iter().zip(&app.filters) {
        if let Some(value) = value {
            title.push_str(&format!(" [{}: {}]", filter.title, value));
        }
    }
    if controller.is_stale() {
        title.push_str(" [stale]");
    }
    let table = Table::new(rows, widths)
        .header(header_row)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    let mut table_state = app.table_state.clone();
    f.render_stateful_widget(table, chunks[1], &mut table_state);
    app.table_state = table_state;

    draw_message(f, app, chunks[2]);

    if app.busy() {
        let label = if app.controller().is_some_and(ResourceController::is_submitting) {
            " Saving..."
        } else {
            " Loading..."
        };
        let throbber = Throbber::default()
            .label(label)
            .style(Style::default().fg(Color::Yellow))
            .throbber_set(BRAILLE_SIX)
            .use_type(WhichUse::Spin);
        f.render_stateful_widget(throbber, chunks[3], &mut app.throbber_state);
    }

    if let Some(controller) = app.controller() {
        match controller.state() {
            ControllerState::Idle => {}
            ControllerState::Adding(draft) | ControllerState::Editing { draft, .. } => {
                draw_form(f, draft, controller.is_submitting())
            }
            ControllerState::Confirming(pending) => draw_confirm(f, pending),
            ControllerState::Importing(path) => draw_import(f, controller.spec().title, path),
        }
    }
}

fn key_hints(controller: &ResourceController) -> String {
    let caps = &controller.spec().capabilities;
    let mut hints = String::from("[q: quit] [m: menu] [/: search] [r: refresh]");
    if caps.create {
        hints.push_str(" [a: add]");
    }
    if caps.update {
        hints.push_str(" [e: edit]");
    }
    if caps.delete {
        hints.push_str(" [d: delete]");
    }
    if caps.import_path.is_some() {
        hints.push_str(" [i: import]");
    }
    for filter in controller.spec().filters {
        hints.push_str(&format!(" [{}: {}]", filter.key, filter.title.to_lowercase()));
    }
    for action in caps.actions {
        hints.push_str(&format!(" [{}: {}]", action.key, action.label.to_lowercase()));
    }
    if controller.spec().copy_column.is_some() {
        hints.push_str(" [Enter: copy]");
    }
    hints
}

fn draw_message(f: &mut Frame<'_>, app: &App, area: Rect) {
    let (text, color) = match &app.message {
        Some(notice) => (
            notice.text.clone(),
            match notice.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Success => Color::Green,
                NoticeLevel::Error => Color::Red,
                NoticeLevel::Auth => Color::Magenta,
            },
        ),
        None => (String::new(), Color::Cyan),
    };
    let footer = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Message"));
    f.render_widget(footer, area);
}

fn draw_form(f: &mut Frame<'_>, draft: &FormDraft, submitting: bool) {
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);

    let spec = draft.spec();
    let title = if draft.is_editing() {
        format!("Edit {}", spec.singular)
    } else {
        format!("Add {}", spec.singular)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_alignment(Alignment::Center)
        .style(Style::default().bg(Color::Black));
    f.render_widget(block, area);

    let fields: Vec<_> = draft.visible_fields().collect();
    let mut constraints: Vec<Constraint> = fields.iter().map(|_| Constraint::Length(3)).collect();
    constraints.push(Constraint::Min(1));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints(constraints)
        .split(area);

    for (slot, (idx, field, value)) in fields.iter().enumerate() {
        let read_only = draft.is_read_only(field);
        let mut label = field.label.to_string();
        if field.is_required(draft.is_editing()) && !read_only {
            label.push_str(" *");
        }
        if read_only {
            label.push_str(" (read-only)");
        }
        let shown = match field.kind {
            FieldKind::Secret => "*".repeat(value.chars().count()),
            FieldKind::Text | FieldKind::File => value.to_string(),
        };
        let style = if read_only {
            Style::default().fg(Color::DarkGray)
        } else if *idx == draft.focus() {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::White)
        };
        let p = Paragraph::new(shown)
            .block(Block::default().borders(Borders::ALL).title(label))
            .style(style);
        f.render_widget(p, chunks[slot]);
    }

    let help_text = if submitting {
        "Saving..."
    } else {
        "Tab: Next field | Enter: Submit | Esc: Cancel"
    };
    let p_help = Paragraph::new(help_text)
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(p_help, chunks[fields.len()]);
}

fn draw_confirm(f: &mut Frame<'_>, pending: &PendingAction) {
    let area = centered_rect(40, 20, f.area());
    f.render_widget(Clear, area);
    let (title, verb) = match pending.kind {
        PendingKind::Delete => ("Confirm Delete".to_string(), "delete".to_string()),
        PendingKind::Action(action) => (
            format!("Confirm {}", action.label),
            action.label.to_lowercase(),
        ),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().bg(Color::Red));
    let text = format!(
        "\nAre you sure you want to {}\n'{}'?\n\n(y) Yes / (n) No",
        verb, pending.label
    );
    let p = Paragraph::new(text)
        .block(block)
        .alignment(Alignment::Center)
        .style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(p, area);
}

fn draw_import(f: &mut Frame<'_>, title: &str, path: &str) {
    let area = centered_rect(60, 25, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Import {}", title))
        .title_alignment(Alignment::Center)
        .style(Style::default().bg(Color::Black));
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);
    let p_path = Paragraph::new(path)
        .block(Block::default().borders(Borders::ALL).title("File path"))
        .style(Style::default().fg(Color::Yellow));
    f.render_widget(p_path, chunks[0]);
    let p_help = Paragraph::new("Enter: Upload | Esc: Cancel")
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(p_help, chunks[1]);
}

/// Helper to center a rect
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
