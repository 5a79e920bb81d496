use chrono::{Datelike, Duration, Months, NaiveDate};
use crossterm::event::KeyCode;
use tui::{
    backend::Backend,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Year,
    Month,
    Day,
}

impl Segment {
    fn width(&self) -> usize {
        match self {
            Segment::Year => 4,
            Segment::Month | Segment::Day => 2,
        }
    }

    fn next(&self) -> Segment {
        match self {
            Segment::Year => Segment::Month,
            Segment::Month => Segment::Day,
            Segment::Day => Segment::Year,
        }
    }

    fn previous(&self) -> Segment {
        match self {
            Segment::Year => Segment::Day,
            Segment::Month => Segment::Year,
            Segment::Day => Segment::Month,
        }
    }
}

/// An optional calendar date edited one segment at a time.
///
/// Digits typed into a segment are applied once the segment is full; Up and
/// Down step the active segment by one. A day that does not exist in the new
/// month is pulled back to the last day of that month.
#[derive(Debug, Clone)]
pub struct DateInput {
    date: Option<NaiveDate>,
    fallback: NaiveDate,
    editing: bool,
    segment: Segment,
    typed: String,
}

impl DateInput {
    /// `fallback` is the date editing starts from while no date is set
    pub fn new(date: Option<NaiveDate>, fallback: NaiveDate) -> Self {
        Self {
            date,
            fallback,
            editing: false,
            segment: Segment::Year,
            typed: String::new(),
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// The date as `YYYY-MM-DD`
    pub fn value(&self) -> Option<String> {
        self.date.map(|d| d.format("%Y-%m-%d").to_string())
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn start_editing(&mut self) {
        self.editing = true;
        self.segment = Segment::Year;
        self.typed.clear();
        if self.date.is_none() {
            self.date = Some(self.fallback);
        }
    }

    pub fn stop_editing(&mut self) {
        self.editing = false;
        self.typed.clear();
    }

    pub fn clear(&mut self) {
        self.date = None;
        self.stop_editing();
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        if !self.editing {
            return;
        }

        match key {
            KeyCode::Char(c) if c.is_ascii_digit() => {
                self.typed.push(c);
                if self.typed.len() == self.segment.width() {
                    self.apply_typed();
                    self.segment = self.segment.next();
                }
            }
            KeyCode::Backspace => {
                self.typed.pop();
            }
            KeyCode::Up => self.step(true),
            KeyCode::Down => self.step(false),
            KeyCode::Right | KeyCode::Tab => {
                self.typed.clear();
                self.segment = self.segment.next();
            }
            KeyCode::Left | KeyCode::BackTab => {
                self.typed.clear();
                self.segment = self.segment.previous();
            }
            _ => {}
        }
    }

    fn current(&self) -> NaiveDate {
        self.date.unwrap_or(self.fallback)
    }

    fn apply_typed(&mut self) {
        let Ok(number) = self.typed.parse::<u32>() else {
            self.typed.clear();
            return;
        };
        self.typed.clear();

        let date = self.current();
        let updated = match self.segment {
            Segment::Year if (1900..=2100).contains(&number) => clamped(number as i32, date.month(), date.day()),
            Segment::Month if (1..=12).contains(&number) => clamped(date.year(), number, date.day()),
            Segment::Day => NaiveDate::from_ymd_opt(date.year(), date.month(), number),
            _ => None,
        };

        if let Some(updated) = updated {
            self.date = Some(updated);
        }
    }

    fn step(&mut self, up: bool) {
        self.typed.clear();
        let date = self.current();
        let stepped = match (self.segment, up) {
            (Segment::Year, true) => date.checked_add_months(Months::new(12)),
            (Segment::Year, false) => date.checked_sub_months(Months::new(12)),
            (Segment::Month, true) => date.checked_add_months(Months::new(1)),
            (Segment::Month, false) => date.checked_sub_months(Months::new(1)),
            (Segment::Day, true) => date.checked_add_signed(Duration::days(1)),
            (Segment::Day, false) => date.checked_sub_signed(Duration::days(1)),
        };

        if let Some(stepped) = stepped {
            self.date = Some(stepped);
        }
    }

    pub fn display(&self) -> String {
        let Some(date) = self.date else {
            return "(none)".to_string();
        };
        if !self.editing {
            return date.format("%Y-%m-%d").to_string();
        }

        let year = format!("{:04}", date.year());
        let month = format!("{:02}", date.month());
        let day = format!("{:02}", date.day());
        let cursor = if self.typed.is_empty() {
            match self.segment {
                Segment::Year => "[YYYY]".to_string(),
                Segment::Month => "[MM]".to_string(),
                Segment::Day => "[DD]".to_string(),
            }
        } else {
            format!("[{}]", self.typed)
        };

        match self.segment {
            Segment::Year => format!("{cursor}-{month}-{day}"),
            Segment::Month => format!("{year}-{cursor}-{day}"),
            Segment::Day => format!("{year}-{month}-{cursor}"),
        }
    }
}

fn clamped(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

pub fn render_date_input<B: Backend>(frame: &mut Frame<B>, area: Rect, input: &DateInput, title: &str, focused: bool) {
    let style = if input.is_editing() {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let hint = if input.is_editing() {
        "  (digits, Up/Down, Left/Right, Enter to finish, Del to clear)"
    } else {
        ""
    };

    let paragraph = Paragraph::new(Spans::from(vec![
        Span::styled(input.display(), style),
        Span::styled(hint, Style::default().fg(Color::DarkGray)),
    ]))
    .block(Block::default().title(title.to_string()).borders(Borders::ALL));

    frame.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn typed(input: &mut DateInput, text: &str) {
        for c in text.chars() {
            input.handle_key(KeyCode::Char(c));
        }
    }

    #[test]
    fn starts_empty_and_takes_the_fallback_when_edited() {
        let mut input = DateInput::new(None, date(2025, 8, 1));
        assert_eq!(input.value(), None);

        input.start_editing();
        assert_eq!(input.value().as_deref(), Some("2025-08-01"));
    }

    #[test]
    fn typing_fills_segments_in_order() {
        let mut input = DateInput::new(None, date(2025, 8, 1));
        input.start_editing();
        typed(&mut input, "20261115");
        input.stop_editing();

        assert_eq!(input.value().as_deref(), Some("2026-11-15"));
    }

    #[test]
    fn month_change_clamps_the_day() {
        let mut input = DateInput::new(Some(date(2025, 1, 31)), date(2025, 1, 1));
        input.start_editing();
        input.handle_key(KeyCode::Right);
        typed(&mut input, "02");

        assert_eq!(input.date(), Some(date(2025, 2, 28)));
    }

    #[test]
    fn invalid_day_is_ignored() {
        let mut input = DateInput::new(Some(date(2025, 4, 10)), date(2025, 1, 1));
        input.start_editing();
        input.handle_key(KeyCode::Left);
        typed(&mut input, "31");

        assert_eq!(input.date(), Some(date(2025, 4, 10)));
    }

    #[test]
    fn arrows_step_the_active_segment() {
        let mut input = DateInput::new(Some(date(2025, 12, 31)), date(2025, 1, 1));
        input.start_editing();
        input.handle_key(KeyCode::Left);
        input.handle_key(KeyCode::Up);
        assert_eq!(input.date(), Some(date(2026, 1, 1)));

        input.handle_key(KeyCode::Left);
        input.handle_key(KeyCode::Down);
        assert_eq!(input.date(), Some(date(2025, 12, 1)));
    }

    #[test]
    fn display_marks_the_active_segment() {
        let mut input = DateInput::new(Some(date(2025, 8, 1)), date(2025, 1, 1));
        assert_eq!(input.display(), "2025-08-01");

        input.start_editing();
        input.handle_key(KeyCode::Right);
        assert_eq!(input.display(), "2025-[MM]-01");
        input.handle_key(KeyCode::Char('1'));
        assert_eq!(input.display(), "2025-[1]-01");

        input.clear();
        assert_eq!(input.display(), "(none)");
    }
}
