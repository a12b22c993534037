// 💰 Fee Schedule - expected fee per (class, term)
//
// Fixed data, built once at startup and shared read-only.
// At most one amount per (class, term); every amount is non-negative.

use crate::period::Term;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Standard schedule: (class label, [First, Second, Third] in whole naira)
const STANDARD_FEES: &[(&str, [i64; 3])] = &[
    ("Nur. 1", [50_000, 45_000, 40_000]),
    ("Nur. 2", [52_000, 47_000, 42_000]),
    ("Nur. 3", [55_000, 50_000, 45_000]),
    ("Basic 1", [60_000, 55_000, 50_000]),
    ("Basic 2", [62_000, 57_000, 52_000]),
    ("Basic 3", [65_000, 60_000, 55_000]),
    ("JSS 1", [70_000, 65_000, 60_000]),
    ("JSS 2", [72_000, 67_000, 62_000]),
    ("JSS 3", [75_000, 70_000, 65_000]),
    ("SS 1", [80_000, 75_000, 70_000]),
    ("SS 2", [82_000, 77_000, 72_000]),
    ("SS 3", [85_000, 80_000, 75_000]),
];

#[derive(Debug, Clone)]
pub struct FeeSchedule {
    entries: BTreeMap<(String, String), Decimal>,
    /// Class labels in display order
    classes: Vec<String>,
}

impl FeeSchedule {
    /// The school's standard schedule
    pub fn standard() -> Self {
        let mut schedule = FeeSchedule {
            entries: BTreeMap::new(),
            classes: Vec::new(),
        };

        for (class_label, amounts) in STANDARD_FEES {
            for (term, amount) in Term::ALL.iter().zip(amounts) {
                schedule.insert(class_label, term.label(), Decimal::from(*amount));
            }
        }

        schedule
    }

    /// Build from explicit entries. Negative amounts are dropped and a later
    /// entry for the same (class, term) replaces an earlier one.
    pub fn from_entries<I, C, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (C, T, Decimal)>,
        C: Into<String>,
        T: Into<String>,
    {
        let mut schedule = FeeSchedule {
            entries: BTreeMap::new(),
            classes: Vec::new(),
        };
        for (class_label, term_label, amount) in entries {
            let class_label: String = class_label.into();
            let term_label: String = term_label.into();
            schedule.insert(&class_label, &term_label, amount);
        }
        schedule
    }

    fn insert(&mut self, class_label: &str, term_label: &str, amount: Decimal) {
        if amount.is_sign_negative() {
            return;
        }
        if !self.classes.iter().any(|c| c == class_label) {
            self.classes.push(class_label.to_string());
        }
        self.entries
            .insert((class_label.to_string(), term_label.to_string()), amount);
    }

    /// Expected fee, None when the schedule has no entry
    pub fn lookup(&self, class_label: &str, term_label: &str) -> Option<Decimal> {
        self.entries
            .get(&(class_label.to_string(), term_label.to_string()))
            .copied()
    }

    /// Expected fee, zero when the schedule has no entry
    pub fn expected_fee(&self, class_label: &str, term_label: &str) -> Decimal {
        self.lookup(class_label, term_label).unwrap_or(Decimal::ZERO)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Term labels present in the schedule, in term order
    pub fn terms(&self) -> Vec<&'static str> {
        Term::ALL
            .iter()
            .map(|t| t.label())
            .filter(|label| self.entries.keys().any(|(_, term)| term == label))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, Decimal)> + '_ {
        self.entries
            .iter()
            .map(|((class_label, term_label), amount)| {
                (class_label.as_str(), term_label.as_str(), *amount)
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}
