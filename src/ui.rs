use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Widget, Wrap},
};

use tapr::game::Phase;

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let session = &self.session;

        // styles
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints(
                [
                    Constraint::Length(3), // countdown bar
                    Constraint::Length(2), // tap count
                    Constraint::Length(2), // high score
                    Constraint::Min(4),    // message / statistics
                ]
                .as_ref(),
            )
            .split(area);

        let gauge_color = match session.phase() {
            Phase::Idle => Color::Blue,
            Phase::Running => Color::Green,
            Phase::TimedOut | Phase::Recovering => Color::Red,
        };

        let gauge_label = match session.phase() {
            Phase::Running => format!("{:.1}s", session.seconds_remaining()),
            phase => phase.to_string(),
        };

        Gauge::default()
            .gauge_style(Style::default().fg(gauge_color))
            .ratio(session.progress())
            .label(gauge_label)
            .render(chunks[0], buf);

        // Dim the counter while input is disabled.
        let count_style = if session.input_enabled() {
            bold_style
        } else {
            bold_style.add_modifier(Modifier::DIM)
        };
        Paragraph::new(Span::styled(
            format!("{} taps", session.taps()),
            count_style,
        ))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

        let record_line = match self.record_set_at {
            Some(set_at) => format!(
                "high score: {} (set {})",
                session.high_score(),
                set_at.format("%Y-%m-%d %H:%M")
            ),
            None => format!("high score: {}", session.high_score()),
        };
        Paragraph::new(Span::styled(record_line, dim_style))
            .alignment(Alignment::Center)
            .render(chunks[2], buf);

        let mut lines: Vec<Line> = session
            .message()
            .lines()
            .map(|line| Line::from(Span::styled(line.to_string(), italic_style)))
            .collect();

        if let Some(summary) = session.summary() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!(
                    "intervals: mean {:.3}s, sd {:.3}s, min {:.3}s, max {:.3}s",
                    summary.mean, summary.std_dev, summary.min, summary.max
                ),
                dim_style,
            )));
        } else if matches!(session.phase(), Phase::TimedOut | Phase::Recovering) {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "not enough taps for statistics",
                dim_style,
            )));
        }

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[3], buf);
    }
}
