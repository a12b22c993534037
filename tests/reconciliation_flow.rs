// End-to-end reconciliation over an on-disk database

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rusqlite::Connection;
use rust_decimal::Decimal;
use school_fees::auth::{authenticate, create_user, Principal, Role};
use school_fees::db::{all_payment_records, find_student, payments_for_student, setup_database};
use school_fees::{
    record_payment, register_student, AppError, FeeReconciler, FeeStatus, FixedClock, NewPayment,
    Period, StudentForm,
};
use std::str::FromStr;
use tempfile::TempDir;

const YEAR: &str = "2024/2025";
const TERM: &str = "First Term";

struct Office {
    _dir: TempDir,
    conn: Connection,
    admin: Principal,
    clock: FixedClock,
    reconciler: FeeReconciler,
}

fn create_test_office() -> Office {
    let dir = TempDir::new().unwrap();
    let conn = Connection::open(dir.path().join("school_fees.db")).unwrap();
    setup_database(&conn).unwrap();

    create_user(&conn, "bursar", "secret-pass", Role::Admin).unwrap();
    let admin = authenticate(&conn, "bursar", "secret-pass").unwrap();

    Office {
        _dir: dir,
        conn,
        admin,
        // October 2024 → First Term 2024/2025
        clock: FixedClock(NaiveDate::from_ymd_opt(2024, 10, 1).unwrap()),
        reconciler: FeeReconciler::default(),
    }
}

fn create_test_form(reg_number: &str, name: &str, class_label: &str) -> StudentForm {
    StudentForm {
        reg_number: reg_number.to_string(),
        name: name.to_string(),
        class_label: class_label.to_string(),
        term_label: TERM.to_string(),
        academic_year: YEAR.to_string(),
        ..StudentForm::default()
    }
}

fn payment_form(amount: &str) -> NewPayment {
    NewPayment {
        term: TERM.to_string(),
        academic_year: YEAR.to_string(),
        amount_paid: amount.to_string(),
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn status(office: &Office, reg_number: &str) -> FeeStatus {
    office
        .reconciler
        .compute_status(&office.conn, reg_number, YEAR, TERM)
        .unwrap()
}

#[test]
fn unpaid_then_fully_paid() {
    let mut office = create_test_office();
    let form = create_test_form("AFA/001", "Ada Obi", "JSS 1");
    register_student(&mut office.conn, &office.admin, &office.clock, &form).unwrap();

    assert_eq!(status(&office, "AFA/001"), FeeStatus::Defaulter);

    let payment = record_payment(
        &mut office.conn,
        &office.admin,
        &office.clock,
        "AFA/001",
        &payment_form("70000"),
    )
    .unwrap();
    assert_eq!(payment.payment_date, "2024-10-01");
    assert_eq!(payment.recorded_by, office.admin.user_id);

    assert_eq!(status(&office, "AFA/001"), FeeStatus::Paid);

    let current = Period::new(YEAR, TERM);
    let breakdown = office.reconciler.breakdown(&office.conn, "AFA/001", &current).unwrap();
    assert_eq!(breakdown.len(), 1);
    assert_eq!(breakdown[0].expected, dec("70000"));
    assert_eq!(breakdown[0].paid, dec("70000"));
    assert_eq!(breakdown[0].outstanding, Decimal::ZERO);
}

#[test]
fn partial_payment_leaves_balance() {
    let mut office = create_test_office();
    let form = create_test_form("AFA/002", "Bola Ade", "JSS 1");
    register_student(&mut office.conn, &office.admin, &office.clock, &form).unwrap();

    record_payment(
        &mut office.conn,
        &office.admin,
        &office.clock,
        "AFA/002",
        &payment_form("30000"),
    )
    .unwrap();

    assert_eq!(status(&office, "AFA/002"), FeeStatus::PartiallyPaid);

    let student = find_student(&office.conn, "AFA/002").unwrap().unwrap();
    let summary = office
        .reconciler
        .period_summary(&office.conn, &student, &Period::new(YEAR, TERM))
        .unwrap();
    assert_eq!(summary.outstanding, dec("40000"));

    // Repeated computation without writes gives the same answer
    assert_eq!(status(&office, "AFA/002"), status(&office, "AFA/002"));
}

#[test]
fn invalid_amounts_write_nothing() {
    let mut office = create_test_office();
    let form = create_test_form("AFA/003", "Chidi Eze", "JSS 1");
    register_student(&mut office.conn, &office.admin, &office.clock, &form).unwrap();

    for amount in ["-5", "abc", "0", "", "0.001", "1000000000000.01", "79228162514264337593543950335"] {
        let err = record_payment(
            &mut office.conn,
            &office.admin,
            &office.clock,
            "AFA/003",
            &payment_form(amount),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)), "amount {amount:?} gave {err:?}");
    }

    assert!(payments_for_student(&office.conn, "AFA/003").unwrap().is_empty());
    assert_eq!(status(&office, "AFA/003"), FeeStatus::Defaulter);
}

#[test]
fn payment_for_unknown_student_is_not_found() {
    let mut office = create_test_office();
    let err = record_payment(
        &mut office.conn,
        &office.admin,
        &office.clock,
        "NOPE/404",
        &payment_form("100"),
    )
    .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(all_payment_records(&office.conn).unwrap().is_empty());
    assert_eq!(status(&office, "NOPE/404"), FeeStatus::NotApplicable);
}

#[test]
fn duplicate_registration_keeps_original() {
    let mut office = create_test_office();
    let original = create_test_form("AFA/004", "Dayo Ola", "JSS 1");
    register_student(&mut office.conn, &office.admin, &office.clock, &original).unwrap();

    let duplicate = create_test_form("AFA/004", "Someone Else", "SS 3");
    let err = register_student(&mut office.conn, &office.admin, &office.clock, &duplicate).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let stored = find_student(&office.conn, "AFA/004").unwrap().unwrap();
    assert_eq!(stored.name, "Dayo Ola");
    assert_eq!(stored.class_label, "JSS 1");
}

#[test]
fn staff_can_read_but_not_write() {
    let mut office = create_test_office();
    let form = create_test_form("AFA/005", "Efe Uche", "JSS 1");
    register_student(&mut office.conn, &office.admin, &office.clock, &form).unwrap();

    create_user(&office.conn, "clerk", "clerk-pass", Role::Staff).unwrap();
    let clerk = authenticate(&office.conn, "clerk", "clerk-pass").unwrap();

    let err = record_payment(&mut office.conn, &clerk, &office.clock, "AFA/005", &payment_form("100"))
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let another = create_test_form("AFA/006", "Femi Bello", "JSS 2");
    let err = register_student(&mut office.conn, &clerk, &office.clock, &another).unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Reads stay available
    assert_eq!(status(&office, "AFA/005"), FeeStatus::Defaulter);
}

#[test]
fn dashboard_totals_for_period() {
    let mut office = create_test_office();
    for (reg, name) in [("AFA/010", "Ada"), ("AFA/011", "Bola"), ("AFA/012", "Chidi")] {
        let form = create_test_form(reg, name, "JSS 1");
        register_student(&mut office.conn, &office.admin, &office.clock, &form).unwrap();
    }
    let unknown_class = create_test_form("AFA/013", "Dayo", "Year 9");
    register_student(&mut office.conn, &office.admin, &office.clock, &unknown_class).unwrap();

    record_payment(&mut office.conn, &office.admin, &office.clock, "AFA/010", &payment_form("70000")).unwrap();
    record_payment(&mut office.conn, &office.admin, &office.clock, "AFA/011", &payment_form("30000")).unwrap();

    let summary = office
        .reconciler
        .dashboard(&office.conn, &Period::new(YEAR, TERM), 10)
        .unwrap();

    assert_eq!(summary.total_students, 4);
    assert_eq!(summary.paid_count, 1);
    assert_eq!(summary.partially_paid_count, 1);
    assert_eq!(summary.defaulter_count, 1);
    assert_eq!(summary.not_applicable_count, 1);
    assert_eq!(summary.expected_revenue, dec("210000"));
    assert_eq!(summary.received_revenue, dec("100000"));
    assert_eq!(summary.outstanding_revenue, dec("110000"));
    assert_eq!(summary.defaulters[0].reg_number, "AFA/012");
    assert_eq!(summary.partially_paid[0].outstanding, dec("40000"));
    assert_eq!(summary.recent_payments.len(), 2);
    assert_eq!(summary.recent_payments[0].recorded_by_username, "bursar");
}
