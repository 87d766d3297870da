// Handles the rendering of widgets to the terminal frame.

use super::model::{ACTIVE_DIRECTORY, ACTIVE_DIRECTORY_NOTE, RowStatus, is_configurable};
use super::state::ViewState;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

/// Main render function called after every state transition.
pub fn render(f: &mut Frame, state: &ViewState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_service_table(f, chunks[0], state);
    render_details(f, chunks[1], state);
    render_footer(f, chunks[2], state.popup().is_some());

    if let Some(name) = state.popup() {
        render_error_popup(f, name, state.popup_message().unwrap_or_default());
    }
}

fn render_service_table(f: &mut Frame, area: Rect, state: &ViewState) {
    let view = state.page();

    let rows: Vec<Row> = view
        .rows
        .iter()
        .map(|service| {
            let switch = if service.status {
                Span::styled("[ ON  ]", Style::default().fg(Color::Black).bg(Color::Green))
            } else {
                Span::styled("[ OFF ]", Style::default().fg(Color::White).bg(Color::Red))
            };

            let indicator = match state.indicator(&service.name) {
                Some(RowStatus::Loading) => Span::styled("…", Style::default().fg(Color::Yellow)),
                Some(RowStatus::Error(_)) => Span::styled(
                    "✖ (e)",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ),
                _ => Span::raw(""),
            };

            let mut name = vec![Span::raw(service.label().to_string())];
            if service.name == ACTIVE_DIRECTORY {
                name.push(Span::styled(" (i)", Style::default().fg(Color::Cyan)));
            }

            let configure = if is_configurable(&service.name) {
                Span::styled("configure", Style::default().fg(Color::Cyan))
            } else {
                Span::raw("")
            };

            Row::new(vec![
                Cell::from(Line::from(name)),
                Cell::from(Span::styled(
                    service.name.clone(),
                    Style::default().fg(Color::Gray),
                )),
                Cell::from(switch),
                Cell::from(indicator),
                Cell::from(configure),
            ])
        })
        .collect();

    let header = Row::new(vec!["Service", "Unit", "Status", "", ""])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let title = format!(
        " Services | page {}/{} | {} per page | sort: {} ",
        view.page + 1,
        view.page_count,
        state.page_size().label(),
        state.sort().label(),
    );

    let table = Table::new(
        rows,
        [
            Constraint::Min(24),
            Constraint::Length(20),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .row_highlight_style(
        Style::default()
            .add_modifier(Modifier::BOLD)
            .bg(Color::DarkGray),
    )
    .highlight_symbol(">> ");

    let mut table_state = TableState::default().with_selected(view.selected);
    f.render_stateful_widget(table, area, &mut table_state);
}

fn render_details(f: &mut Frame, area: Rect, state: &ViewState) {
    let selected = state.selected_service();

    let line = if let Some(flash) = state.flash() {
        Line::from(Span::styled(flash.to_string(), Style::default().fg(Color::Green)))
    } else if let Some(service) = selected {
        match state.indicator(&service.name) {
            Some(RowStatus::Error(_)) => Line::from(Span::styled(
                format!("{} failed, press e for details", service.label()),
                Style::default().fg(Color::Red),
            )),
            _ if service.name == ACTIVE_DIRECTORY => Line::from(ACTIVE_DIRECTORY_NOTE),
            _ => Line::from(""),
        }
    } else {
        Line::from("")
    };

    let paragraph = Paragraph::new(line)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));

    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect, showing_popup: bool) {
    let help_text = if showing_popup {
        Line::from(vec![
            Span::raw("Close: "),
            Span::styled("Esc/Enter/q ", Style::default().fg(Color::Red)),
        ])
    } else {
        Line::from(vec![
            Span::raw("Nav: "),
            Span::styled("j/k ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Page: "),
            Span::styled("[/] p ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Sort: "),
            Span::styled("o ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Action: "),
            Span::styled(
                "space(toggle) s(start) x(stop) r(restart) c(configure) e(error) ",
                Style::default().fg(Color::Cyan),
            ),
            Span::raw("| Quit: "),
            Span::styled("q", Style::default().fg(Color::Red)),
        ])
    };

    let paragraph =
        Paragraph::new(help_text).block(Block::default().borders(Borders::ALL).title(" Controls "));

    f.render_widget(paragraph, area);
}

fn render_error_popup(f: &mut Frame, name: &str, message: &str) {
    let area = centered_rect(60, 30, f.area());

    f.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(format!(" {} error ", name));

    let paragraph = Paragraph::new(message.to_string())
        .wrap(Wrap { trim: false })
        .block(block);

    f.render_widget(paragraph, area);
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::model::{Service, ServiceAction, ServiceCollection};
    use crate::app::state::Action;
    use ratatui::{Terminal, backend::TestBackend};

    fn draw(state: &ViewState) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| render(f, state)).unwrap();

        let buffer = terminal.backend().buffer();
        (0..buffer.area.height)
            .map(|y| {
                (0..buffer.area.width)
                    .map(|x| buffer[(x, y)].symbol())
                    .collect::<String>()
            })
            .collect()
    }

    fn state() -> ViewState {
        ViewState::new(ServiceCollection::new([
            Service::new("nis", "NIS", false),
            Service::new("ntpd", "NTP", true),
            Service::new("rockstor", "Rockstor", true),
        ]))
    }

    fn line_with<'a>(lines: &'a [String], needle: &str) -> &'a str {
        lines
            .iter()
            .find(|l| l.contains(needle))
            .map(String::as_str)
            .unwrap_or_else(|| panic!("no line contains {needle:?}"))
    }

    #[test]
    fn configure_affordance_only_for_allow_listed_rows() {
        let lines = draw(&state());

        assert!(line_with(&lines, "nis ").contains("configure"));
        assert!(line_with(&lines, "ntpd").contains("configure"));
        assert!(!line_with(&lines, "rockstor").contains("configure"));
    }

    #[test]
    fn switches_reflect_status() {
        let lines = draw(&state());

        assert!(line_with(&lines, "nis ").contains("OFF"));
        assert!(line_with(&lines, "ntpd").contains("ON"));
    }

    #[test]
    fn failed_stop_shows_one_icon_on_its_row() {
        let mut state = state();
        state.update(Action::Completed {
            name: "ntpd".into(),
            action: ServiceAction::Stop,
            result: Err("Failed to stop ntpd".into()),
        });

        let lines = draw(&state);
        let icons: Vec<_> = lines.iter().filter(|l| l.contains('✖')).collect();
        assert_eq!(icons.len(), 1);
        assert!(icons[0].contains("ntpd"));
        assert!(!lines.iter().any(|l| l.contains("Failed to stop ntpd")));

        state.update(Action::ShowError {
            name: "ntpd".into(),
        });
        let lines = draw(&state);
        assert!(line_with(&lines, "Failed to stop ntpd").contains("Failed to stop ntpd"));
        assert!(lines.iter().any(|l| l.contains("ntpd error")));
    }

    #[test]
    fn title_shows_page_and_sort() {
        let lines = draw(&state());

        assert!(lines[0].contains("page 1/1"));
        assert!(lines[0].contains("15 per page"));
        assert!(lines[0].contains("sort: default"));
    }

    #[test]
    fn active_directory_note_on_selection() {
        let state = ViewState::new(ServiceCollection::new([Service::new(
            "active-directory",
            "Active Directory",
            false,
        )]));
        let lines = draw(&state);

        assert!(line_with(&lines, "Active Directory (i)").contains("configure"));
        assert!(lines.iter().any(|l| l.contains("By turning this service on")));
    }

    #[test]
    fn flash_after_success() {
        let mut state = state();
        state.update(Action::Completed {
            name: "nis".into(),
            action: ServiceAction::Start,
            result: Ok(()),
        });

        let lines = draw(&state);
        assert!(lines.iter().any(|l| l.contains("NIS started")));
    }
}
