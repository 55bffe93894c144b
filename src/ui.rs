use crate::app::{App, FormField, InputMode, NoticeLevel, PlaceSearch, VenueForm};
use crate::braille::BrailleCanvas;
use crate::map::canvas::{Cursor, MarkerIcon, Popup, PopupAction};
use crate::map::geometry::draw_ring;
use crate::map::pin_drop::PinDropMode;
use crate::map::MapLayers;
use crate::session::SessionStatus;
use crate::venue::Activity;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
    Frame,
};

/// Render the UI. Returns the map area inside the border so the caller can
/// report it as the map surface.
pub fn render(frame: &mut Frame, app: &App) -> Rect {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    let inner = render_map(frame, app, chunks[0]);
    render_status_bar(frame, app, chunks[1]);

    match &app.mode {
        InputMode::Normal => {}
        InputMode::Form(form) => render_form(frame, form, inner),
        InputMode::Search(search) => render_search(frame, search, inner),
    }
    inner
}

fn render_map(frame: &mut Frame, app: &App, area: Rect) -> Rect {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " courtmap ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(handle) = app.session.canvas() else {
        render_placeholder(frame, app.session.status(), inner);
        return inner;
    };
    let canvas = handle.borrow();
    let viewport = canvas.viewport().clone();
    let (cols, rows) = (inner.width as usize, inner.height as usize);

    let layers = app
        .renderer
        .render(cols, rows, &viewport, app.session.tile_layer());

    let mut markers = Vec::new();
    for marker in canvas.markers() {
        let (px, py) = viewport.project(marker.position);
        if px < 0 || py < 0 || px >= viewport.width as i32 || py >= viewport.height as i32 {
            continue;
        }
        markers.push(((px / 2) as u16, (py / 4) as u16, marker.icon));
    }

    // Ring the selected venue
    let mut highlight = BrailleCanvas::new(cols, rows);
    if let Some(venue) = app.session.selected_venue() {
        let (px, py) = viewport.project(venue.coordinate);
        draw_ring(&mut highlight, px, py, 5);
    }

    let cursor = match canvas.cursor() {
        Cursor::Crosshair => app.mouse_cell(),
        Cursor::Grab => None,
    };

    frame.render_widget(
        MapWidget {
            layers,
            highlight,
            markers,
            cursor,
        },
        inner,
    );

    if let Some(popup) = app.session.selected_popup() {
        render_popup(frame, &popup, inner);
    }
    inner
}

fn render_placeholder(frame: &mut Frame, status: &SessionStatus, area: Rect) {
    let (lines, color) = match status {
        SessionStatus::Failed(e) => (
            vec![
                Line::from(Span::styled(
                    "Map unavailable",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(e.to_string()),
                Line::from(""),
                Line::from(Span::styled("r: retry   q: quit", Style::default().fg(Color::DarkGray))),
            ],
            Color::Red,
        ),
        _ => (vec![Line::from("Loading map…")], Color::DarkGray),
    };

    let panel = centered(area, 50, lines.len() as u16 + 2);
    frame.render_widget(Clear, panel);
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color))),
        panel,
    );
}

fn icon_color(icon: MarkerIcon) -> Color {
    match icon {
        MarkerIcon::Activity(Activity::Basketball) => Color::LightRed,
        MarkerIcon::Activity(Activity::Tennis) => Color::LightGreen,
        MarkerIcon::Activity(Activity::Pickleball) => Color::LightYellow,
        MarkerIcon::Activity(Activity::Volleyball) => Color::LightBlue,
        MarkerIcon::Activity(Activity::Soccer) => Color::White,
        MarkerIcon::Venue => Color::Gray,
        MarkerIcon::Preview => Color::Magenta,
    }
}

/// Braille basemap with markers and labels on top
struct MapWidget {
    layers: MapLayers,
    highlight: BrailleCanvas,
    /// (column, row, icon) relative to the map area
    markers: Vec<(u16, u16, MarkerIcon)>,
    cursor: Option<(u16, u16)>,
}

impl MapWidget {
    /// Render a braille canvas layer with a specific color
    fn render_layer(canvas: &BrailleCanvas, color: Color, area: Rect, buf: &mut Buffer) {
        for row in 0..canvas.height().min(area.height as usize) {
            for col in 0..canvas.width().min(area.width as usize) {
                if let Some(ch) = canvas.glyph(col, row) {
                    let (x, y) = (area.x + col as u16, area.y + row as u16);
                    buf[(x, y)].set_char(ch).set_fg(color);
                }
            }
        }
    }

    fn put_text(text: &str, x: u16, y: u16, style: Style, area: Rect, buf: &mut Buffer) {
        if y >= area.y + area.height {
            return;
        }
        for (i, ch) in text.chars().enumerate() {
            let px = x + i as u16;
            if px >= area.x + area.width {
                break;
            }
            buf[(px, y)].set_char(ch).set_style(style);
        }
    }
}

impl Widget for MapWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Back to front
        Self::render_layer(&self.layers.detail, Color::DarkGray, area, buf);
        Self::render_layer(&self.layers.land, Color::Cyan, area, buf);
        Self::render_layer(&self.layers.boundaries, Color::Yellow, area, buf);

        let label_style = Style::default().fg(Color::White);
        for (lx, ly, text) in &self.layers.labels {
            if *lx >= area.width || *ly >= area.height {
                continue;
            }
            let label: String = text.chars().take(24).collect();
            Self::put_text(&label, area.x + lx, area.y + ly, label_style, area, buf);
        }

        Self::render_layer(&self.highlight, Color::LightMagenta, area, buf);

        for (mx, my, icon) in &self.markers {
            if *mx >= area.width || *my >= area.height {
                continue;
            }
            buf[(area.x + mx, area.y + my)]
                .set_char(icon.glyph())
                .set_style(Style::default().fg(icon_color(*icon)).add_modifier(Modifier::BOLD));
        }

        if let Some((cx, cy)) = self.cursor {
            if cx < area.width && cy < area.height {
                buf[(area.x + cx, area.y + cy)].set_char('╋').set_fg(Color::Red);
            }
        }
    }
}

fn render_popup(frame: &mut Frame, popup: &Popup, map: Rect) {
    let mut lines = vec![Line::from(Span::styled(
        popup.subtitle.clone(),
        Style::default().fg(Color::DarkGray),
    ))];
    for (label, value) in &popup.fields {
        lines.push(Line::from(vec![
            Span::styled(format!("{label}: "), Style::default().fg(Color::DarkGray)),
            Span::raw(value.clone()),
        ]));
    }
    for action in &popup.actions {
        match action {
            PopupAction::Delete(_) => lines.push(Line::from(Span::styled(
                "d: delete",
                Style::default().fg(Color::Red),
            ))),
        }
    }

    let width = 36.min(map.width);
    let height = (lines.len() as u16 + 2).min(map.height);
    let panel = Rect::new(map.x + map.width - width, map.y, width, height);
    frame.render_widget(Clear, panel);
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: true }).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(Span::styled(
                    format!(" {} ", popup.title),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
        ),
        panel,
    );
}

fn render_form(frame: &mut Frame, form: &VenueForm, map: Rect) {
    let details = &form.details;
    let focused = form.focused();
    let lines: Vec<Line> = VenueForm::fields()
        .into_iter()
        .map(|field| {
            let (label, value) = match field {
                FormField::Name => ("Name".to_string(), format!("{}_", details.name)),
                FormField::Setting => ("Setting".to_string(), details.setting.label().to_string()),
                FormField::Lighting => (
                    "Lighting".to_string(),
                    if details.lighting { "Yes" } else { "No" }.to_string(),
                ),
                FormField::Access => ("Access".to_string(), details.access.label().to_string()),
                FormField::Courts(activity) => (
                    format!("{} courts", activity.label()),
                    details.courts.get(&activity).copied().unwrap_or(0).to_string(),
                ),
            };
            let style = if field == focused {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{label:>18}  "), Style::default().fg(Color::DarkGray)),
                Span::styled(value, style),
            ])
        })
        .chain([
            Line::from(""),
            Line::from(Span::styled(
                "↑↓ field  ←→ change  Enter save  Esc close",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .collect();

    let panel = centered(map, 50, lines.len() as u16 + 2);
    frame.render_widget(Clear, panel);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta))
                .title(" Add venue "),
        ),
        panel,
    );
}

fn render_search(frame: &mut Frame, search: &PlaceSearch, map: Rect) {
    let mut lines = vec![Line::from(vec![
        Span::styled("/ ", Style::default().fg(Color::DarkGray)),
        Span::raw(format!("{}_", search.query)),
    ])];
    for (i, suggestion) in search.suggestions.iter().enumerate() {
        let style = if i == search.selected {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(suggestion.label.clone(), style)));
    }

    let width = 44.min(map.width);
    let panel = Rect::new(
        map.x + (map.width - width) / 2,
        map.y,
        width,
        (lines.len() as u16 + 2).min(map.height),
    );
    frame.render_widget(Clear, panel);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Search places "),
        ),
        panel,
    );
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(notice) = &app.notice {
        let color = match notice.level {
            NoticeLevel::Info => Color::Green,
            NoticeLevel::Error => Color::Red,
        };
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                format!(" {}", notice.text),
                Style::default().fg(color),
            ))),
            area,
        );
        return;
    }

    let session = &app.session;
    let mode = match session.pin_drop_mode() {
        PinDropMode::Inactive => None,
        PinDropMode::AwaitingClick => Some("click map to place pin".to_string()),
        PinDropMode::Previewing => Some(match session.pending_pin().and_then(|p| p.address) {
            Some(address) => format!("pin at {address} (Enter: details, drag to move)"),
            None => "pin placed (Enter: details, drag to move)".to_string(),
        }),
    };
    let attribution = session
        .canvas()
        .and_then(|c| c.borrow().tile_layer().map(|l| l.descriptor.attribution.clone()))
        .unwrap_or_default();

    let mut spans = vec![
        Span::styled(" ", Style::default()),
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("[f]{}", app.filter_label()), Style::default().fg(Color::Green)),
        Span::styled(" ", Style::default()),
        Span::styled(
            format!("[t]{}", session.tile_layer().label()),
            Style::default().fg(Color::Magenta),
        ),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
    ];
    match mode {
        Some(mode) => spans.push(Span::styled(mode, Style::default().fg(Color::LightMagenta))),
        None => spans.push(Span::styled(
            "a:add /:search g:locate q:quit",
            Style::default().fg(Color::DarkGray),
        )),
    }
    if !attribution.is_empty() {
        spans.push(Span::styled(
            format!(" | {attribution}"),
            Style::default().fg(Color::DarkGray),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Rectangle of at most `width` x `height` centered in `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}
