// 📅 Period Resolver - academic year + term from the calendar
//
// Fixed calendar convention (not configurable):
//   month < 8  → academic year (Y-1)/Y, else Y/(Y+1)
//   months 9-12 → First Term, 1-4 → Second Term, 5-8 → Third Term

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TERM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    First,
    Second,
    Third,
}

impl Term {
    pub const ALL: [Term; 3] = [Term::First, Term::Second, Term::Third];

    pub fn label(&self) -> &'static str {
        match self {
            Term::First => "First Term",
            Term::Second => "Second Term",
            Term::Third => "Third Term",
        }
    }

    /// Parse a stored or submitted term label (exact match after trimming)
    pub fn from_label(label: &str) -> Option<Term> {
        Term::ALL.into_iter().find(|t| t.label() == label.trim())
    }

    /// Position within the academic year (0, 1, 2)
    pub fn index(&self) -> i32 {
        match self {
            Term::First => 0,
            Term::Second => 1,
            Term::Third => 2,
        }
    }

    /// Term covering a calendar month (1-12)
    pub fn for_month(month: u32) -> Term {
        match month {
            9..=12 => Term::First,
            1..=4 => Term::Second,
            _ => Term::Third,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// ACADEMIC YEAR
// ============================================================================

/// Format an academic year starting in `start_year` ("2024/2025")
pub fn academic_year_label(start_year: i32) -> String {
    format!("{}/{}", start_year, start_year + 1)
}

/// Start year of a "YYYY/YYYY+1" label, 0 when unparseable
pub fn academic_year_start(label: &str) -> i32 {
    label
        .split('/')
        .next()
        .and_then(|y| y.trim().parse::<i32>().ok())
        .unwrap_or(0)
}

/// Strict check for "YYYY/YYYY+1"
pub fn is_valid_academic_year(label: &str) -> bool {
    let mut parts = label.trim().split('/');
    let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if start.len() != 4 || end.len() != 4 {
        return false;
    }
    match (start.parse::<i32>(), end.parse::<i32>()) {
        (Ok(s), Ok(e)) => e == s + 1,
        _ => false,
    }
}

/// Academic years offered in forms: two years either side of `calendar_year`
pub fn academic_year_choices(calendar_year: i32) -> Vec<String> {
    (calendar_year - 2..calendar_year + 3)
        .map(academic_year_label)
        .collect()
}

// ============================================================================
// PERIOD
// ============================================================================

/// (academic year, term) pair. Labels are kept as stored so that rows with
/// an unknown term still take part in breakdowns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub academic_year: String,
    pub term_label: String,
}

impl Period {
    pub fn new(academic_year: impl Into<String>, term_label: impl Into<String>) -> Self {
        Period {
            academic_year: academic_year.into(),
            term_label: term_label.into(),
        }
    }

    /// Period resolver: pure function of (year, month)
    pub fn resolve(year: i32, month: u32) -> Period {
        let start_year = if month < 8 { year - 1 } else { year };
        Period::new(academic_year_label(start_year), Term::for_month(month).label())
    }

    pub fn for_date(date: NaiveDate) -> Period {
        Period::resolve(date.year(), date.month())
    }

    pub fn start_year(&self) -> i32 {
        academic_year_start(&self.academic_year)
    }

    /// Term position, -1 for an unknown label
    pub fn term_index(&self) -> i32 {
        Term::from_label(&self.term_label)
            .map(|t| t.index())
            .unwrap_or(-1)
    }

    /// Sort key for breakdowns: larger is more recent
    pub fn recency_key(&self) -> (i32, i32) {
        (self.start_year(), self.term_index())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.term_label, self.academic_year)
    }
}

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "today". Injected so period resolution can be tested.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn current_period(&self) -> Period {
        Period::for_date(self.today())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
