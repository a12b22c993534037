// ⚖️ Fee Reconciliation - expected vs paid per student and period
//
//   expected    = schedule[(student.class, term)]   (0 when absent)
//   paid        = Σ payments for (student, year, term)
//   outstanding = expected - paid                   (negative = overpaid)
//
// Classification (one policy everywhere: lists, detail page, dashboard):
//   NotApplicable  no schedule entry for (class, term), or unknown student
//   Paid           outstanding <= 0
//   Defaulter      nothing paid, outstanding > 0
//   PartiallyPaid  0 < paid < expected
//
// Nothing here caches a running balance: every call re-reads and re-sums,
// so concurrent inserts for the same student are always reflected.

use crate::db::{self, Payment, PaymentRecord, Student};
use crate::error::{AppError, AppResult};
use crate::fee_schedule::FeeSchedule;
use crate::period::Period;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// ============================================================================
// FEE STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeStatus {
    Paid,
    Defaulter,
    PartiallyPaid,
    NotApplicable,
}

impl FeeStatus {
    pub const ALL: [FeeStatus; 4] = [
        FeeStatus::Paid,
        FeeStatus::Defaulter,
        FeeStatus::PartiallyPaid,
        FeeStatus::NotApplicable,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FeeStatus::Paid => "Paid",
            FeeStatus::Defaulter => "Defaulter",
            FeeStatus::PartiallyPaid => "Partially Paid",
            FeeStatus::NotApplicable => "N/A",
        }
    }

    /// Stable identifier for query strings and CSS classes
    pub fn slug(&self) -> &'static str {
        match self {
            FeeStatus::Paid => "paid",
            FeeStatus::Defaulter => "defaulter",
            FeeStatus::PartiallyPaid => "partially-paid",
            FeeStatus::NotApplicable => "n-a",
        }
    }

    /// Accepts either the slug or the display label
    pub fn parse(value: &str) -> Option<FeeStatus> {
        let value = value.trim();
        FeeStatus::ALL
            .into_iter()
            .find(|s| s.slug().eq_ignore_ascii_case(value) || s.label().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a period from its expected fee and total paid
pub fn classify(expected: Decimal, paid: Decimal) -> FeeStatus {
    if expected <= Decimal::ZERO {
        FeeStatus::NotApplicable
    } else if paid >= expected {
        FeeStatus::Paid
    } else if paid <= Decimal::ZERO {
        FeeStatus::Defaulter
    } else {
        FeeStatus::PartiallyPaid
    }
}

// ============================================================================
// PERIOD SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period: Period,
    pub expected: Decimal,
    pub paid: Decimal,
    /// Not clamped: negative means overpayment
    pub outstanding: Decimal,
    pub status: FeeStatus,
}

impl PeriodSummary {
    pub fn new(period: Period, expected: Decimal, paid: Decimal) -> Self {
        PeriodSummary {
            period,
            expected,
            paid,
            outstanding: expected - paid,
            status: classify(expected, paid),
        }
    }

    pub fn is_overpaid(&self) -> bool {
        self.outstanding < Decimal::ZERO
    }
}

/// Student with an open balance, for dashboard lists
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutstandingStudent {
    pub reg_number: String,
    pub name: String,
    pub class_label: String,
    pub term_label: String,
    pub academic_year: String,
    pub outstanding: Decimal,
}

/// Aggregate figures for the admin dashboard, for one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub period: Period,
    pub total_students: usize,
    pub paid_count: usize,
    pub defaulter_count: usize,
    pub partially_paid_count: usize,
    pub not_applicable_count: usize,
    pub expected_revenue: Decimal,
    pub received_revenue: Decimal,
    pub outstanding_revenue: Decimal,
    pub defaulters: Vec<OutstandingStudent>,
    pub partially_paid: Vec<OutstandingStudent>,
    pub recent_payments: Vec<PaymentRecord>,
}

// ============================================================================
// FEE RECONCILER
// ============================================================================

pub struct FeeReconciler {
    schedule: FeeSchedule,
}

impl FeeReconciler {
    pub fn new(schedule: FeeSchedule) -> Self {
        FeeReconciler { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    pub fn expected_fee(&self, student: &Student, term_label: &str) -> Decimal {
        self.schedule.expected_fee(&student.class_label, term_label)
    }

    // ------------------------------------------------------------------------
    // Pure computations over a snapshot
    // ------------------------------------------------------------------------

    /// Summary of one period from a snapshot of the student's payments.
    /// Payments for other students or periods are ignored.
    pub fn summarize(&self, student: &Student, payments: &[Payment], period: &Period) -> AppResult<PeriodSummary> {
        let paid = db::sum_amounts(
            payments
                .iter()
                .filter(|p| {
                    p.student_reg_number == student.reg_number
                        && p.academic_year == period.academic_year
                        && p.term_label == period.term_label
                })
                .map(|p| p.amount_paid),
        )?;

        Ok(PeriodSummary::new(
            period.clone(),
            self.expected_fee(student, &period.term_label),
            paid,
        ))
    }

    /// Breakdown from a snapshot. Periods come from the enrollment period,
    /// every paid period and the current period; most recent first.
    pub fn breakdown_for(
        &self,
        student: &Student,
        payments: &[Payment],
        current: &Period,
    ) -> AppResult<Vec<PeriodSummary>> {
        let mut periods: BTreeSet<Period> = BTreeSet::new();

        if !student.academic_year.is_empty() && !student.term_label.is_empty() {
            periods.insert(Period::new(&student.academic_year, &student.term_label));
        }
        for payment in payments.iter().filter(|p| p.student_reg_number == student.reg_number) {
            periods.insert(Period::new(&payment.academic_year, &payment.term_label));
        }
        periods.insert(current.clone());

        let mut summaries: Vec<PeriodSummary> = periods
            .into_iter()
            .map(|period| self.summarize(student, payments, &period))
            .collect::<AppResult<_>>()?;

        // Year desc, then term desc; unparseable year (0) and unknown term
        // (-1) sink to the end. The set is already ordered by label, and the
        // stable sort keeps that order between equal keys.
        summaries.sort_by(|a, b| b.period.recency_key().cmp(&a.period.recency_key()));
        Ok(summaries)
    }

    // ------------------------------------------------------------------------
    // Store-backed operations
    // ------------------------------------------------------------------------

    /// Status of a student for one period. Unknown student → NotApplicable.
    pub fn compute_status(
        &self,
        conn: &Connection,
        reg_number: &str,
        academic_year: &str,
        term_label: &str,
    ) -> AppResult<FeeStatus> {
        let Some(student) = db::find_student(conn, reg_number)? else {
            return Ok(FeeStatus::NotApplicable);
        };

        let expected = self.expected_fee(&student, term_label);
        let paid = db::total_paid(conn, reg_number, academic_year, term_label)?;

        Ok(classify(expected, paid))
    }

    /// Full summary for one student and period
    pub fn period_summary(&self, conn: &Connection, student: &Student, period: &Period) -> AppResult<PeriodSummary> {
        let paid = db::total_paid(conn, &student.reg_number, &period.academic_year, &period.term_label)?;
        Ok(PeriodSummary::new(
            period.clone(),
            self.expected_fee(student, &period.term_label),
            paid,
        ))
    }

    /// Fee breakdown for a student across all relevant periods
    pub fn breakdown(&self, conn: &Connection, reg_number: &str, current: &Period) -> AppResult<Vec<PeriodSummary>> {
        let student = db::find_student(conn, reg_number)?
            .ok_or_else(|| AppError::not_found(format!("Student '{reg_number}' not found.")))?;
        let payments = db::payments_for_student(conn, reg_number)?;

        self.breakdown_for(&student, &payments, current)
    }

    /// Status of every student for one period, keyed by reg number
    pub fn statuses_for_period(
        &self,
        conn: &Connection,
        students: &[Student],
        period: &Period,
    ) -> AppResult<HashMap<String, FeeStatus>> {
        let payments = db::payments_for_period(conn, &period.academic_year, &period.term_label)?;
        let paid_by_student = paid_by_student(&payments)?;

        Ok(students
            .iter()
            .map(|s| {
                let paid = paid_by_student.get(s.reg_number.as_str()).copied().unwrap_or_default();
                let expected = self.expected_fee(s, &period.term_label);
                (s.reg_number.clone(), classify(expected, paid))
            })
            .collect())
    }

    /// Aggregate counts and revenue for one period plus the latest payments
    pub fn dashboard(&self, conn: &Connection, period: &Period, recent_limit: usize) -> AppResult<DashboardSummary> {
        let students = db::all_students(conn)?;
        let payments = db::payments_for_period(conn, &period.academic_year, &period.term_label)?;
        let paid_by_student = paid_by_student(&payments)?;

        let mut summary = DashboardSummary {
            period: period.clone(),
            total_students: students.len(),
            paid_count: 0,
            defaulter_count: 0,
            partially_paid_count: 0,
            not_applicable_count: 0,
            expected_revenue: Decimal::ZERO,
            received_revenue: db::sum_amounts(payments.iter().map(|p| p.amount_paid))?,
            outstanding_revenue: Decimal::ZERO,
            defaulters: Vec::new(),
            partially_paid: Vec::new(),
            recent_payments: db::recent_payments(conn, recent_limit)?,
        };

        for student in &students {
            let expected = self.expected_fee(student, &period.term_label);
            let paid = paid_by_student
                .get(student.reg_number.as_str())
                .copied()
                .unwrap_or_default();
            summary.expected_revenue = db::add_amounts(summary.expected_revenue, expected)?;

            let owing = || OutstandingStudent {
                reg_number: student.reg_number.clone(),
                name: student.name.clone(),
                class_label: student.class_label.clone(),
                term_label: period.term_label.clone(),
                academic_year: period.academic_year.clone(),
                outstanding: expected - paid,
            };

            match classify(expected, paid) {
                FeeStatus::Paid => summary.paid_count += 1,
                FeeStatus::Defaulter => {
                    summary.defaulter_count += 1;
                    summary.defaulters.push(owing());
                }
                FeeStatus::PartiallyPaid => {
                    summary.partially_paid_count += 1;
                    summary.partially_paid.push(owing());
                }
                FeeStatus::NotApplicable => summary.not_applicable_count += 1,
            }
        }

        summary.outstanding_revenue = db::subtract_amounts(summary.expected_revenue, summary.received_revenue)?;
        Ok(summary)
    }
}

impl Default for FeeReconciler {
    fn default() -> Self {
        Self::new(FeeSchedule::standard())
    }
}

fn paid_by_student(payments: &[Payment]) -> AppResult<HashMap<&str, Decimal>> {
    let mut totals: HashMap<&str, Decimal> = HashMap::new();
    for payment in payments {
        let total = totals.entry(payment.student_reg_number.as_str()).or_default();
        *total = db::add_amounts(*total, payment.amount_paid)?;
    }
    Ok(totals)
}

// ============================================================================
// TESTS
// ============================================================================
