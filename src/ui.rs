use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Margin, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{
        Block, Cell, Clear, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState,
    },
};

use crate::domain::CMDMode;
use crate::model::{Model, UIData};

pub const SCROLLBAR_WIDTH: usize = 1;
pub const TABLE_BORDER_WIDTH: usize = 2;
pub const CMDLINE_HEIGH: u16 = 1;
pub const STATUSLINE_HEIGH: u16 = 1;

#[derive(Debug, Default)]
pub struct TableUI {
    state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [table_area, status_area, cmd_area] = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(STATUSLINE_HEIGH),
            Constraint::Length(CMDLINE_HEIGH),
        ])
        .areas(frame.area());

        self.render_table(uidata, table_area, frame);
        Self::render_statusline(uidata, status_area, frame);
        Self::render_cmdline(uidata, cmd_area, frame);

        if uidata.show_popup {
            Self::render_popup(&uidata.popup_message, frame);
        }
    }

    fn render_table(&mut self, uidata: &UIData, area: Rect, frame: &mut Frame) {
        let header = Row::new(uidata.table.iter().map(|c| Cell::from(c.name.clone())))
            .style(Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD));

        let rows = (0..uidata.nrows).map(|ridx| {
            Row::new(
                uidata
                    .table
                    .iter()
                    .map(|c| Cell::from(c.data[ridx].clone())),
            )
        });
        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16));

        let title = Line::from(format!(" {} ", uidata.name)).bold().centered();
        let block = Block::bordered()
            .title(title)
            .border_set(border::THICK);

        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .row_highlight_style(Style::new().add_modifier(Modifier::REVERSED))
            .column_highlight_style(Style::new().fg(Color::Cyan))
            .cell_highlight_style(
                Style::new()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            );

        if uidata.nrows > 0 {
            self.state.select(Some(uidata.selected_row));
            self.state.select_column(Some(uidata.selected_column));
        } else {
            self.state.select(None);
            self.state.select_column(None);
        }
        frame.render_stateful_widget(table, area, &mut self.state);

        let mut scrollbar_state = ScrollbarState::new(uidata.nrows).position(uidata.selected_row);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }

    fn render_statusline(uidata: &UIData, area: Rect, frame: &mut Frame) {
        let page = if uidata.page_count == 0 {
            "page 0/0".to_string()
        } else {
            format!("page {}/{}", uidata.page + 1, uidata.page_count)
        };
        let rows = if uidata.search_term.is_empty() {
            format!("{} rows", uidata.total)
        } else {
            format!(
                "{}/{} rows matching \"{}\"",
                uidata.matches, uidata.total, uidata.search_term
            )
        };
        let line = Line::from(vec![
            Span::from(format!(" {} ", uidata.name)).black().on_yellow(),
            " ".into(),
            page.blue().bold(),
            " | ".into(),
            rows.into(),
            " | ".into(),
            uidata.status_message.clone().italic(),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_cmdline(uidata: &UIData, area: Rect, frame: &mut Frame) {
        if uidata.active_cmdinput {
            let prompt = match uidata.cmd_mode {
                Some(CMDMode::Search) => "/",
                None => ":",
            };
            let line = Line::from(vec![prompt.bold(), uidata.cmdinput.input.clone().into()]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + 1 + uidata.cmdinput.cursor_pos as u16;
            frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
        } else {
            let line = Line::from(vec![
                " Help ".into(),
                "<?>".blue().bold(),
                " Search ".into(),
                "</>".blue().bold(),
                " Sort ".into(),
                "<s>".blue().bold(),
                " Boys/Girls ".into(),
                "<g>".blue().bold(),
                " Quit ".into(),
                "<q> ".blue().bold(),
            ]);
            frame.render_widget(Paragraph::new(line), area);
        }
    }

    fn render_popup(message: &str, frame: &mut Frame) {
        let area = Self::popup_area(frame.area(), 60, 80);
        let block = Block::bordered()
            .title(Line::from(" Help ").bold().centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(message.to_string()).block(block), area);
    }

    fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
        let [area] = Layout::vertical([Constraint::Percentage(percent_y)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::horizontal([Constraint::Percentage(percent_x)])
            .flex(Flex::Center)
            .areas(area);
        area
    }
}
