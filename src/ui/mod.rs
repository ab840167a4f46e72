use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Tabs, Wrap};
use ratatui::Frame;
use regex::Regex;
use time::{macros::format_description, OffsetDateTime};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::state::{AppState, BrowseState, View};
use crate::catalog::PAGE_SIZE;
use crate::deck::{format_name, DeckSnapshot, Entry, EntryPhase, Message, StatKey};
use crate::highlight::{build_search_regex, split_matches};

const NAME_WIDTH: usize = 16;
const TYPE_WIDTH: usize = 16;

pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    snapshot: &DeckSnapshot,
    table_state: &mut TableState,
) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let selected_tab = match state.view {
        View::Browse => 0,
        View::Deck => 1,
    };
    let tabs = Tabs::new(vec![
        Line::from("Browse"),
        Line::from(format!("Deck ({})", snapshot.summary.count)),
    ])
    .select(selected_tab)
    .block(Block::default().title("PokeDeck").borders(Borders::ALL))
    .highlight_style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    frame.render_widget(tabs, vertical[0]);

    match state.view {
        View::Browse => draw_browse(frame, vertical[1], &state.browse, snapshot, table_state),
        View::Deck => draw_deck(frame, vertical[1], state, snapshot, table_state),
    }

    frame.render_widget(Paragraph::new(summary_line(snapshot)), vertical[2]);
    frame.render_widget(Paragraph::new(status_line(state)), vertical[3]);
    frame.render_widget(Paragraph::new(keys_line(state.view)), vertical[4]);
}

fn draw_browse(
    frame: &mut Frame,
    area: Rect,
    browse: &BrowseState,
    snapshot: &DeckSnapshot,
    table_state: &mut TableState,
) {
    let pages = browse
        .page_count()
        .map(|count| count.to_string())
        .unwrap_or_else(|| "?".to_string());
    let mut title = format!("Browse · page {}/{} ({} per page)", browse.page, pages, PAGE_SIZE);
    if browse.loading {
        title.push_str(" · loading…");
    }
    let block = Block::default().title(title).borders(Borders::ALL);

    if browse.entries.is_empty() {
        let text = match (&browse.error, browse.loading) {
            (Some(error), _) => Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )),
            (None, true) => Line::from(Span::styled(
                "Loading Pokemon…",
                Style::default().fg(Color::DarkGray),
            )),
            (None, false) => Line::from("No Pokemon on this page."),
        };
        frame.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let rows = browse.entries.iter().map(|entry| {
        let marker = match snapshot.phase(entry.id) {
            EntryPhase::Browsed => Span::raw(""),
            EntryPhase::Adding => Span::styled("adding…", Style::default().fg(Color::Yellow)),
            EntryPhase::InDeck => Span::styled("in deck", Style::default().fg(Color::Green)),
            EntryPhase::Removing => Span::styled("removing…", Style::default().fg(Color::Yellow)),
        };
        let mut cells = entry_cells(entry, None);
        cells.push(Cell::from(marker));
        Row::new(cells)
    });

    let mut widths = entry_widths();
    widths.push(Constraint::Length(10));
    let mut header = entry_header();
    header.push(Cell::from(""));

    let table = Table::new(rows, widths)
        .header(Row::new(header).style(header_style()))
        .block(block)
        .highlight_style(selection_style())
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, area, table_state);

    if let Some(error) = &browse.error {
        let line = Rect {
            y: area.y + area.height.saturating_sub(2),
            height: 1,
            x: area.x + 2,
            width: area.width.saturating_sub(4),
        };
        frame.render_widget(
            Paragraph::new(Span::styled(error.clone(), Style::default().fg(Color::Red))),
            line,
        );
    }
}

fn draw_deck(
    frame: &mut Frame,
    area: Rect,
    state: &AppState,
    snapshot: &DeckSnapshot,
    table_state: &mut TableState,
) {
    let filter = snapshot
        .filter
        .map(|category| format_name(category.as_ref()))
        .unwrap_or_else(|| "All".to_string());
    let direction = if snapshot.query.ascending { "asc" } else { "desc" };
    let mut title = format!(
        "Deck · type {} · sort {} {}",
        filter,
        snapshot.query.sort_key.label(),
        direction
    );
    if snapshot.filter_pending {
        title.push_str(" · filtering…");
    }
    if !snapshot.loaded {
        title.push_str(" · loading…");
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(3)])
        .split(area);
    frame.render_widget(Paragraph::new(search_line(state, snapshot)), chunks[0]);

    let block = Block::default().title(title).borders(Borders::ALL);
    if snapshot.view.entries.is_empty() {
        let text = snapshot
            .notice()
            .map(|notice| notice.to_string())
            .or_else(|| match &snapshot.message {
                Some(Message::Notice(notice)) => Some(notice.to_string()),
                _ => None,
            })
            .unwrap_or_default();
        frame.render_widget(
            Paragraph::new(Span::styled(text, Style::default().fg(Color::DarkGray)))
                .wrap(Wrap { trim: true })
                .block(block),
            chunks[1],
        );
        return;
    }

    let regex = build_search_regex(&snapshot.query.search);
    let rows = snapshot.view.entries.iter().map(|entry| {
        let mut cells = entry_cells(entry, regex.as_ref());
        let marker = match (snapshot.phase(entry.id), snapshot.entry_errors.get(&entry.id)) {
            (EntryPhase::Removing, _) => {
                Span::styled("removing…", Style::default().fg(Color::Yellow))
            }
            (_, Some(_)) => Span::styled("retry d", Style::default().fg(Color::Red)),
            _ => Span::raw(""),
        };
        cells.push(Cell::from(marker));
        Row::new(cells)
    });

    let mut widths = entry_widths();
    widths.push(Constraint::Length(10));
    let mut header = entry_header();
    header.push(Cell::from(""));

    let table = Table::new(rows, widths)
        .header(Row::new(header).style(header_style()))
        .block(block)
        .highlight_style(selection_style())
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, chunks[1], table_state);
}

fn search_line(state: &AppState, snapshot: &DeckSnapshot) -> Line<'static> {
    let active = state.is_search_active();
    let label_style = if active {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    let mut spans = vec![Span::styled("Search / ", label_style)];
    if snapshot.query.search.is_empty() && !active {
        spans.push(Span::styled(
            "(press / to search by name)",
            Style::default().fg(Color::DarkGray),
        ));
    } else {
        spans.push(Span::styled(
            snapshot.query.search.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    }
    if active {
        spans.push(Span::styled(" ▌", Style::default().fg(Color::Cyan)));
    }
    Line::from(spans)
}

fn entry_header() -> Vec<Cell<'static>> {
    let mut header = vec![Cell::from("#"), Cell::from("Name"), Cell::from("Type")];
    header.extend(StatKey::ALL.iter().map(|key| Cell::from(key.short_label())));
    header.push(Cell::from("Total"));
    header
}

fn entry_widths() -> Vec<Constraint> {
    let mut widths = vec![
        Constraint::Length(5),
        Constraint::Length(NAME_WIDTH as u16),
        Constraint::Length(TYPE_WIDTH as u16),
    ];
    widths.extend(StatKey::ALL.iter().map(|_| Constraint::Length(4)));
    widths.push(Constraint::Length(5));
    widths
}

fn entry_cells(entry: &Entry, regex: Option<&Regex>) -> Vec<Cell<'static>> {
    let name = fit_width(&format_name(&entry.name), NAME_WIDTH);
    let types = entry
        .categories
        .iter()
        .map(|label| format_name(label))
        .collect::<Vec<_>>()
        .join("/");
    let mut cells = vec![
        Cell::from(format!("{}", entry.id)),
        Cell::from(Line::from(highlight_spans(&name, regex))),
        Cell::from(fit_width(&types, TYPE_WIDTH)),
    ];
    cells.extend(
        entry
            .attributes()
            .iter()
            .map(|(_, value)| Cell::from(value.to_string())),
    );
    cells.push(Cell::from(Span::styled(
        entry.total().to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    cells
}

fn highlight_spans(text: &str, regex: Option<&Regex>) -> Vec<Span<'static>> {
    let highlight = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    split_matches(text, regex)
        .into_iter()
        .map(|(segment, matched)| {
            if matched {
                Span::styled(segment.to_string(), highlight)
            } else {
                Span::raw(segment.to_string())
            }
        })
        .collect()
}

fn summary_line(snapshot: &DeckSnapshot) -> Line<'static> {
    let summary = &snapshot.summary;
    let mut spans = vec![Span::styled(
        format!("{} Pokemon", summary.count),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    for key in StatKey::ALL {
        spans.push(Span::raw(format!(
            " · {} {}",
            key.short_label(),
            summary.display_average(key)
        )));
    }
    spans.push(Span::styled(
        format!(" · Avg total {}", summary.display_average_total()),
        Style::default().fg(Color::Cyan),
    ));
    Line::from(spans)
}

fn status_line(state: &AppState) -> Line<'static> {
    let Some(status) = &state.status else {
        return Line::from("");
    };
    let style = if status.failure {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Cyan)
    };
    Line::from(vec![
        Span::styled(
            format!("[{}] ", format_time_short(status.at)),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(status.text.clone(), style),
    ])
}

fn keys_line(view: View) -> Line<'static> {
    let keys = match view {
        View::Browse => "Tab deck • j/k move • n/p page • a add • r reload • q quit",
        View::Deck => {
            "Tab browse • j/k move • / search • f type • s sort • o asc/desc • d remove • R reset • q quit"
        }
    };
    Line::from(vec![
        Span::styled(
            "Keys: ",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(keys, Style::default().fg(Color::DarkGray)),
    ])
}

fn header_style() -> Style {
    Style::default()
        .fg(Color::Gray)
        .add_modifier(Modifier::BOLD)
}

fn selection_style() -> Style {
    Style::default()
        .bg(Color::Blue)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Truncates to `width` terminal columns, marking the cut with an ellipsis.
fn fit_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}
