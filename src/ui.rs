use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Cell, Clear, Paragraph, Row, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Table, TableState,
    },
};

use crate::model::{Model, UIData};

pub const TITLE_HEIGHT: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const CMDLINE_HEIGH: usize = 2;
pub const SCROLLBAR_WIDTH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

#[derive(Default)]
pub struct TableUI {}

impl TableUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(TITLE_HEIGHT as u16),
                Constraint::Min(1),
                Constraint::Length(CMDLINE_HEIGH as u16),
            ])
            .split(frame.area());

        self.draw_title(uidata, frame, layout[0]);
        self.draw_table(uidata, frame, layout[1]);
        self.draw_statusline(uidata, frame, layout[2]);

        if uidata.show_popup {
            self.draw_popup(uidata, frame);
        }
    }

    fn draw_title(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let title = Line::from(vec![
            Span::from(" rview ").bold().reversed(),
            Span::from(" "),
            Span::from(uidata.name.as_str()).bold(),
        ]);
        frame.render_widget(Paragraph::new(title), area);
    }

    fn draw_table(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if uidata.table.is_empty() {
            let text = if !uidata.has_data {
                "No data"
            } else {
                "No visible columns (press v to choose)"
            };
            frame.render_widget(Paragraph::new(text).italic().centered(), area);
            return;
        }

        let [table_area, scrollbar_area] = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(SCROLLBAR_WIDTH as u16)])
            .areas(area);

        let header = Row::new(
            uidata
                .table
                .iter()
                .map(|c| Cell::from(c.name.as_str()))
                .collect::<Vec<_>>(),
        )
        .style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED));

        let nrows = uidata.table.first().map(|c| c.data.len()).unwrap_or(0);
        let rows = (0..nrows).map(|ridx| {
            Row::new(
                uidata
                    .table
                    .iter()
                    .map(|c| Cell::from(c.data[ridx].as_str()))
                    .collect::<Vec<_>>(),
            )
        });

        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16));

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .cell_highlight_style(Style::default().add_modifier(Modifier::BOLD).yellow());

        let mut state = TableState::default()
            .with_selected(Some(uidata.selected_row))
            .with_selected_column(Some(uidata.selected_column));
        frame.render_stateful_widget(table, table_area, &mut state);

        let mut scrollbar_state = ScrollbarState::new(uidata.nrows).position(uidata.abs_selected_row);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            scrollbar_area,
            &mut scrollbar_state,
        );
    }

    fn draw_statusline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let [summary_area, cmd_area] = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .areas(area);

        frame.render_widget(Paragraph::new(uidata.summary.as_str()).dim(), summary_area);

        match (uidata.active_cmdinput, uidata.cmd_mode) {
            (true, Some(mode)) => {
                let prompt = mode.prompt();
                let line = Line::from(vec![
                    Span::from(prompt).bold(),
                    Span::from(uidata.cmdinput.input.as_str()),
                ]);
                frame.render_widget(Paragraph::new(line), cmd_area);
                let x = cmd_area.x + (prompt.chars().count() + uidata.cmdinput.cursor_pos) as u16;
                frame.set_cursor_position(Position::new(x.min(cmd_area.right().saturating_sub(1)), cmd_area.y));
            }
            _ => {
                frame.render_widget(Paragraph::new(uidata.status_message.as_str()), cmd_area);
            }
        }
    }

    fn draw_popup(&self, uidata: &UIData, frame: &mut Frame) {
        let area = centered_rect(frame.area(), 60, 80);
        let block = Block::default().title(" Help ").borders(Borders::ALL);
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(Text::from(uidata.popup_message.as_str())).block(block),
            area,
        );
    }
}

fn centered_rect(r: Rect, percent_x: u16, percent_y: u16) -> Rect {
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
