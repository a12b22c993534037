// 🧾 Payment Recording - append-only fee payments
//
// No upper bound against the outstanding balance: overpayment is allowed
// and shows up as a negative outstanding amount in the breakdown.

use crate::auth::Principal;
use crate::db::{self, Payment};
use crate::error::{AppError, AppResult};
use crate::period::{is_valid_academic_year, Clock, Term};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;

/// Payment form as submitted
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPayment {
    pub term: String,
    pub academic_year: String,
    pub amount_paid: String,
}

/// Largest single payment accepted (₦1 trillion)
pub const MAX_PAYMENT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Parse a submitted amount: a positive decimal in naira and kobo
pub fn parse_amount(raw: &str) -> AppResult<Decimal> {
    let amount = Decimal::from_str(raw.trim())
        .map_err(|_| AppError::invalid("Invalid amount. Please enter a valid number."))?
        .normalize();

    if amount <= Decimal::ZERO {
        return Err(AppError::invalid("Payment amount must be positive."));
    }
    if amount.scale() > 2 {
        return Err(AppError::invalid("Amounts can have at most two decimal places."));
    }
    if amount > MAX_PAYMENT {
        return Err(AppError::invalid(
            "Payment amount is too large. The limit for one payment is ₦1,000,000,000,000.",
        ));
    }

    Ok(amount)
}

/// Record a payment for `reg_number` on behalf of `principal`.
/// Admin only. Nothing is written unless every check passes.
pub fn record_payment(
    conn: &mut Connection,
    principal: &Principal,
    clock: &dyn Clock,
    reg_number: &str,
    form: &NewPayment,
) -> AppResult<Payment> {
    principal.require_admin()?;

    let amount_paid = parse_amount(&form.amount_paid)?;
    let term = Term::from_label(&form.term)
        .ok_or_else(|| AppError::invalid(format!("Unknown term '{}'.", form.term.trim())))?;
    let academic_year = form.academic_year.trim();
    if !is_valid_academic_year(academic_year) {
        return Err(AppError::invalid(format!(
            "Academic year '{academic_year}' must look like 2024/2025."
        )));
    }

    let tx = conn.transaction()?;

    let student = db::find_student(&tx, reg_number)?.ok_or_else(|| {
        AppError::not_found(format!("Student with registration number '{reg_number}' not found."))
    })?;

    // The period total must stay representable for every later read
    let period_total = db::total_paid(&tx, &student.reg_number, academic_year, term.label())?;
    if period_total.checked_add(amount_paid).is_none() {
        return Err(AppError::invalid(format!(
            "Payment would push the {} {academic_year} total out of range.",
            term.label()
        )));
    }

    let mut payment = Payment {
        id: 0,
        student_reg_number: student.reg_number.clone(),
        term_label: term.label().to_string(),
        academic_year: academic_year.to_string(),
        amount_paid,
        payment_date: clock.today().format("%Y-%m-%d").to_string(),
        recorded_by: principal.user_id,
    };
    payment.id = db::insert_payment(&tx, &payment)?;

    tx.commit()?;

    info!(
        reg_number = %payment.student_reg_number,
        amount = %payment.amount_paid,
        period = %format!("{} {}", payment.term_label, payment.academic_year),
        recorded_by = %principal.username,
        "payment recorded"
    );

    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::period::FixedClock;
    use chrono::NaiveDate;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("70000").unwrap(), dec("70000"));
        assert_eq!(parse_amount(" 30000.50 ").unwrap(), dec("30000.5"));
        assert!(matches!(parse_amount("-5"), Err(AppError::InvalidInput(_))));
        assert!(matches!(parse_amount("0"), Err(AppError::InvalidInput(_))));
        assert!(matches!(parse_amount("abc"), Err(AppError::InvalidInput(_))));
        assert!(matches!(parse_amount(""), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_amount_kobo_precision() {
        assert_eq!(parse_amount("0.01").unwrap(), dec("0.01"));
        // Trailing zeros past kobo are harmless
        assert_eq!(parse_amount("250.500").unwrap(), dec("250.5"));
        assert!(matches!(parse_amount("0.001"), Err(AppError::InvalidInput(_))));
        assert!(matches!(parse_amount("100.125"), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_amount_upper_limit() {
        assert_eq!(MAX_PAYMENT, dec("1000000000000"));
        assert_eq!(parse_amount("1000000000000").unwrap(), MAX_PAYMENT);
        assert!(matches!(parse_amount("1000000000000.01"), Err(AppError::InvalidInput(_))));
        assert!(matches!(
            parse_amount("79228162514264337593543950335"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_staff_cannot_record() {
        let mut conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let staff = Principal {
            user_id: 1,
            username: "clerk".to_string(),
            role: Role::Staff,
        };
        let clock = FixedClock(NaiveDate::from_ymd_opt(2024, 10, 1).unwrap());
        let form = NewPayment {
            term: "First Term".to_string(),
            academic_year: "2024/2025".to_string(),
            amount_paid: "100".to_string(),
        };

        let err = record_payment(&mut conn, &staff, &clock, "AFA/001", &form).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }
}
