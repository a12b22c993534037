// 🗄️ Persistence - SQLite schema and row access for the school office
//
// Tables: users, students, payments, sessions.
// Amounts are stored as TEXT and read back as Decimal; sums happen in Rust.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// ROWS
// ============================================================================

/// Registered student. `reg_number` is the stable identity; payments
/// reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub reg_number: String,
    pub name: String,
    pub class_label: String,
    /// Enrollment term
    pub term_label: String,
    /// Enrollment academic year
    pub academic_year: String,

    // Contact fields (optional on the forms)
    pub dob: String,
    pub gender: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub admission_date: String,
}

/// Recorded payment. Append-only: there is no update or delete path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub student_reg_number: String,
    pub term_label: String,
    pub academic_year: String,
    pub amount_paid: Decimal,
    pub payment_date: String,
    /// users.id of the acting user
    pub recorded_by: i64,
}

/// Payment joined with the student's name and the recorder's username
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub payment: Payment,
    pub student_name: String,
    pub recorded_by_username: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

/// Column filters for the student list. Empty values mean "all".
#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
    pub class_label: Option<String>,
    pub term_label: Option<String>,
    /// Substring over name and reg number
    pub search: Option<String>,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> AppResult<()> {
    // WAL for crash recovery; in-memory databases silently keep "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reg_number TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            class TEXT NOT NULL,
            term TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            dob TEXT NOT NULL DEFAULT '',
            gender TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            admission_date TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_reg_number TEXT NOT NULL REFERENCES students (reg_number),
            term TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            amount_paid TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            recorded_by INTEGER NOT NULL REFERENCES users (id),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users (id),
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_students_class ON students (class);
        CREATE INDEX IF NOT EXISTS idx_students_name ON students (name);
        CREATE INDEX IF NOT EXISTS idx_payments_student_period
            ON payments (student_reg_number, academic_year, term);
        CREATE INDEX IF NOT EXISTS idx_payments_date ON payments (payment_date);",
    )?;

    Ok(())
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

/// Read a Decimal column. TEXT is the canonical storage; INTEGER/REAL are
/// accepted for rows written by older tools.
fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let conversion = |e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e)
    };
    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|e| conversion(Box::new(e)))?;
            Decimal::from_str(text.trim()).map_err(|e| conversion(Box::new(e)))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::from_f64(f)
            .ok_or_else(|| conversion(format!("non-finite amount {f}").into())),
        ValueRef::Null => Ok(Decimal::ZERO),
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "amount_paid".to_string(),
            Type::Blob,
        )),
    }
}

const STUDENT_COLUMNS: &str = "id, reg_number, name, class, term, academic_year,
    dob, gender, address, phone, email, admission_date";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        reg_number: row.get(1)?,
        name: row.get(2)?,
        class_label: row.get(3)?,
        term_label: row.get(4)?,
        academic_year: row.get(5)?,
        dob: row.get(6)?,
        gender: row.get(7)?,
        address: row.get(8)?,
        phone: row.get(9)?,
        email: row.get(10)?,
        admission_date: row.get(11)?,
    })
}

const PAYMENT_COLUMNS: &str =
    "p.id, p.student_reg_number, p.term, p.academic_year, p.amount_paid, p.payment_date, p.recorded_by";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        student_reg_number: row.get(1)?,
        term_label: row.get(2)?,
        academic_year: row.get(3)?,
        amount_paid: decimal_column(row, 4)?,
        payment_date: row.get(5)?,
        recorded_by: row.get(6)?,
    })
}

/// Escape LIKE wildcards so a search for "50%" matches literally
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

// ============================================================================
// STUDENTS
// ============================================================================

/// Insert a student; `student.id` is ignored. Returns the new row id.
pub fn insert_student(conn: &Connection, student: &Student) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO students (
            reg_number, name, class, term, academic_year,
            dob, gender, address, phone, email, admission_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            student.reg_number,
            student.name,
            student.class_label,
            student.term_label,
            student.academic_year,
            student.dob,
            student.gender,
            student.address,
            student.phone,
            student.email,
            student.admission_date,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Update every mutable field of the student identified by `reg_number`.
/// Returns the number of rows changed (0 when the student does not exist).
pub fn update_student(conn: &Connection, student: &Student) -> AppResult<usize> {
    let changed = conn.execute(
        "UPDATE students
         SET name = ?2, class = ?3, term = ?4, academic_year = ?5,
             dob = ?6, gender = ?7, address = ?8, phone = ?9, email = ?10
         WHERE reg_number = ?1",
        params![
            student.reg_number,
            student.name,
            student.class_label,
            student.term_label,
            student.academic_year,
            student.dob,
            student.gender,
            student.address,
            student.phone,
            student.email,
        ],
    )?;

    Ok(changed)
}

pub fn find_student(conn: &Connection, reg_number: &str) -> AppResult<Option<Student>> {
    let student = conn
        .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE reg_number = ?1"),
            [reg_number],
            student_from_row,
        )
        .optional()?;

    Ok(student)
}

/// Students matching the column filters, ordered by name
pub fn list_students(conn: &Connection, query: &StudentQuery) -> AppResult<Vec<Student>> {
    let mut sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE 1 = 1");
    let mut args: Vec<String> = Vec::new();

    if let Some(class_label) = query.class_label.as_deref().filter(|c| !c.is_empty()) {
        args.push(class_label.to_string());
        sql.push_str(&format!(" AND class = ?{}", args.len()));
    }
    if let Some(term_label) = query.term_label.as_deref().filter(|t| !t.is_empty()) {
        args.push(term_label.to_string());
        sql.push_str(&format!(" AND term = ?{}", args.len()));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        args.push(like_pattern(search));
        let n = args.len();
        sql.push_str(&format!(
            " AND (name LIKE ?{n} ESCAPE '\\' OR reg_number LIKE ?{n} ESCAPE '\\')"
        ));
    }
    sql.push_str(" ORDER BY name, reg_number");

    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params_from_iter(args.iter()), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students)
}

pub fn all_students(conn: &Connection) -> AppResult<Vec<Student>> {
    list_students(conn, &StudentQuery::default())
}

pub fn count_students(conn: &Connection) -> AppResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;

    Ok(count)
}

/// Distinct class labels in use, sorted
pub fn distinct_classes(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT class FROM students ORDER BY class")?;
    let classes = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(classes)
}

/// Distinct enrollment term labels in use, sorted
pub fn distinct_terms(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT term FROM students ORDER BY term")?;
    let terms = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(terms)
}

// ============================================================================
// PAYMENTS
// ============================================================================

/// Append a payment; `payment.id` is ignored. Returns the new row id.
pub fn insert_payment(conn: &Connection, payment: &Payment) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO payments (
            student_reg_number, term, academic_year, amount_paid, payment_date, recorded_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            payment.student_reg_number,
            payment.term_label,
            payment.academic_year,
            payment.amount_paid.to_string(),
            payment.payment_date,
            payment.recorded_by,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// All payments of one student, newest first
pub fn payments_for_student(conn: &Connection, reg_number: &str) -> AppResult<Vec<Payment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments p
         WHERE p.student_reg_number = ?1
         ORDER BY p.payment_date DESC, p.academic_year DESC, p.term DESC, p.id DESC"
    ))?;

    let payments = stmt
        .query_map([reg_number], payment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(payments)
}

/// All payments recorded against one (academic year, term)
pub fn payments_for_period(
    conn: &Connection,
    academic_year: &str,
    term_label: &str,
) -> AppResult<Vec<Payment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments p
         WHERE p.academic_year = ?1 AND p.term = ?2
         ORDER BY p.id"
    ))?;

    let payments = stmt
        .query_map(params![academic_year, term_label], payment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(payments)
}

/// Total paid by a student for one period; zero when nothing matches
pub fn total_paid(
    conn: &Connection,
    reg_number: &str,
    academic_year: &str,
    term_label: &str,
) -> AppResult<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT amount_paid FROM payments
         WHERE student_reg_number = ?1 AND academic_year = ?2 AND term = ?3",
    )?;

    let amounts = stmt
        .query_map(params![reg_number, academic_year, term_label], |row| {
            decimal_column(row, 0)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    sum_amounts(amounts)
}

fn amount_out_of_range() -> AppError {
    AppError::Persistence("payment total is out of range".to_string())
}

/// `a + b`, reporting overflow instead of panicking
pub fn add_amounts(a: Decimal, b: Decimal) -> AppResult<Decimal> {
    a.checked_add(b).ok_or_else(amount_out_of_range)
}

/// `a - b`, reporting overflow instead of panicking
pub fn subtract_amounts(a: Decimal, b: Decimal) -> AppResult<Decimal> {
    a.checked_sub(b).ok_or_else(amount_out_of_range)
}

/// Checked total of a sequence of amounts
pub fn sum_amounts<I>(amounts: I) -> AppResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |total, amount| add_amounts(total, amount))
}

fn payment_records(conn: &Connection, limit: Option<i64>) -> AppResult<Vec<PaymentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS}, s.name, COALESCE(u.username, '')
         FROM payments p
         JOIN students s ON p.student_reg_number = s.reg_number
         LEFT JOIN users u ON p.recorded_by = u.id
         ORDER BY p.payment_date DESC, p.id DESC
         LIMIT ?1"
    ))?;

    let records = stmt
        .query_map([limit.unwrap_or(-1)], |row| {
            Ok(PaymentRecord {
                payment: payment_from_row(row)?,
                student_name: row.get(7)?,
                recorded_by_username: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Most recent payments across all students and periods
pub fn recent_payments(conn: &Connection, limit: usize) -> AppResult<Vec<PaymentRecord>> {
    payment_records(conn, Some(limit as i64))
}

/// Full payment ledger, newest first
pub fn all_payment_records(conn: &Connection) -> AppResult<Vec<PaymentRecord>> {
    payment_records(conn, None)
}

// ============================================================================
// USERS
// ============================================================================

pub fn insert_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    role: &str,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
        params![username, password_hash, role],
    )?;

    Ok(conn.last_insert_rowid())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
    })
}

pub fn find_user_by_username(conn: &Connection, username: &str) -> AppResult<Option<UserRow>> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?;

    Ok(user)
}

pub fn count_users(conn: &Connection) -> AppResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// SESSIONS
// ============================================================================

pub fn insert_session(
    conn: &Connection,
    token_hash: &str,
    user_id: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            token_hash,
            user_id,
            created_at.to_rfc3339(),
            expires_at.to_rfc3339()
        ],
    )?;

    Ok(())
}

/// Session joined with its user. Rows with an unparseable expiry are
/// treated as already expired.
pub fn find_session(conn: &Connection, token_hash: &str) -> AppResult<Option<SessionRow>> {
    let session = conn
        .query_row(
            "SELECT s.user_id, u.username, u.role, s.expires_at
             FROM sessions s
             JOIN users u ON s.user_id = u.id
             WHERE s.token_hash = ?1",
            [token_hash],
            |row| {
                let expires_str: String = row.get(3)?;
                let expires_at = DateTime::parse_from_rfc3339(&expires_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);

                Ok(SessionRow {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    role: row.get(2)?,
                    expires_at,
                })
            },
        )
        .optional()?;

    Ok(session)
}

pub fn delete_session(conn: &Connection, token_hash: &str) -> AppResult<()> {
    conn.execute("DELETE FROM sessions WHERE token_hash = ?1", [token_hash])?;

    Ok(())
}

/// Remove every session that expired before `now`. Returns the count removed.
pub fn delete_expired_sessions(conn: &Connection, now: DateTime<Utc>) -> AppResult<usize> {
    let removed = conn.execute(
        "DELETE FROM sessions WHERE expires_at < ?1",
        [now.to_rfc3339()],
    )?;

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_user(&conn, "bursar", "hash", "admin").unwrap();
        conn
    }

    fn create_test_student(reg_number: &str, name: &str, class_label: &str) -> Student {
        Student {
            id: 0,
            reg_number: reg_number.to_string(),
            name: name.to_string(),
            class_label: class_label.to_string(),
            term_label: "First Term".to_string(),
            academic_year: "2024/2025".to_string(),
            dob: String::new(),
            gender: String::new(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            admission_date: "2024-09-10".to_string(),
        }
    }

    fn create_test_payment(reg_number: &str, term: &str, year: &str, amount: &str, date: &str) -> Payment {
        Payment {
            id: 0,
            student_reg_number: reg_number.to_string(),
            term_label: term.to_string(),
            academic_year: year.to_string(),
            amount_paid: Decimal::from_str(amount).unwrap(),
            payment_date: date.to_string(),
            recorded_by: 1,
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_db();
        setup_database(&conn).unwrap();
        assert_eq!(count_users(&conn).unwrap(), 1);
    }

    #[test]
    fn test_student_round_trip() {
        let conn = test_db();
        let student = create_test_student("AFA/001", "Amina Bello", "JSS 1");
        insert_student(&conn, &student).unwrap();

        let found = find_student(&conn, "AFA/001").unwrap().unwrap();
        assert_eq!(found.name, "Amina Bello");
        assert_eq!(found.class_label, "JSS 1");
        assert!(find_student(&conn, "AFA/999").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_reg_number_is_conflict() {
        let conn = test_db();
        insert_student(&conn, &create_test_student("AFA/001", "Amina", "JSS 1")).unwrap();

        let err = insert_student(&conn, &create_test_student("AFA/001", "Other", "SS 1")).unwrap_err();
        assert!(matches!(err, crate::error::AppError::Conflict(_)));
        assert_eq!(count_students(&conn).unwrap(), 1);
    }

    #[test]
    fn test_list_students_filters() {
        let conn = test_db();
        insert_student(&conn, &create_test_student("AFA/001", "Zainab Musa", "JSS 1")).unwrap();
        insert_student(&conn, &create_test_student("AFA/002", "Chidi Okafor", "JSS 1")).unwrap();
        insert_student(&conn, &create_test_student("AFA/003", "Bola Ade", "SS 2")).unwrap();

        let all = all_students(&conn).unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Bola Ade", "Chidi Okafor", "Zainab Musa"]);

        let jss1 = list_students(
            &conn,
            &StudentQuery {
                class_label: Some("JSS 1".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(jss1.len(), 2);

        let by_reg = list_students(
            &conn,
            &StudentQuery {
                search: Some("003".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_reg.len(), 1);
        assert_eq!(by_reg[0].name, "Bola Ade");

        let by_name = list_students(
            &conn,
            &StudentQuery {
                search: Some("okafor".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_name.len(), 1);

        let wildcard = list_students(
            &conn,
            &StudentQuery {
                search: Some("%".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(wildcard.is_empty());

        assert_eq!(distinct_classes(&conn).unwrap(), vec!["JSS 1", "SS 2"]);
        assert_eq!(distinct_terms(&conn).unwrap(), vec!["First Term"]);
    }

    #[test]
    fn test_total_paid_sums_only_matching_period() {
        let conn = test_db();
        insert_student(&conn, &create_test_student("AFA/001", "Amina", "JSS 1")).unwrap();

        for p in [
            create_test_payment("AFA/001", "First Term", "2024/2025", "30000.00", "2024-09-12"),
            create_test_payment("AFA/001", "First Term", "2024/2025", "10000.50", "2024-10-01"),
            create_test_payment("AFA/001", "Second Term", "2024/2025", "5000", "2025-01-10"),
            create_test_payment("AFA/001", "First Term", "2023/2024", "7000", "2023-09-10"),
        ] {
            insert_payment(&conn, &p).unwrap();
        }

        let total = total_paid(&conn, "AFA/001", "2024/2025", "First Term").unwrap();
        assert_eq!(total, Decimal::from_str("40000.50").unwrap());
        assert_eq!(
            total_paid(&conn, "AFA/001", "2025/2026", "First Term").unwrap(),
            Decimal::ZERO
        );
        assert_eq!(payments_for_period(&conn, "2024/2025", "First Term").unwrap().len(), 2);
    }

    #[test]
    fn test_sum_amounts_reports_overflow() {
        let amounts = [Decimal::MAX, Decimal::ONE];
        let err = sum_amounts(amounts).unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));

        assert!(subtract_amounts(Decimal::MIN, Decimal::ONE).is_err());
        assert_eq!(
            sum_amounts([Decimal::from_str("0.50").unwrap(), Decimal::ONE]).unwrap(),
            Decimal::from_str("1.50").unwrap()
        );
    }

    #[test]
    fn test_payment_for_unknown_student_is_rejected() {
        let conn = test_db();
        let err = insert_payment(
            &conn,
            &create_test_payment("NOPE", "First Term", "2024/2025", "100", "2024-09-12"),
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::AppError::Persistence(_)));
    }

    #[test]
    fn test_recent_payments_newest_first_with_names() {
        let conn = test_db();
        insert_student(&conn, &create_test_student("AFA/001", "Amina", "JSS 1")).unwrap();
        for (i, date) in ["2024-09-01", "2024-11-15", "2024-10-05"].iter().enumerate() {
            let amount = format!("{}", (i + 1) * 1000);
            insert_payment(
                &conn,
                &create_test_payment("AFA/001", "First Term", "2024/2025", &amount, date),
            )
            .unwrap();
        }

        let recent = recent_payments(&conn, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payment.payment_date, "2024-11-15");
        assert_eq!(recent[1].payment.payment_date, "2024-10-05");
        assert_eq!(recent[0].student_name, "Amina");
        assert_eq!(recent[0].recorded_by_username, "bursar");

        assert_eq!(all_payment_records(&conn).unwrap().len(), 3);
    }

    #[test]
    fn test_legacy_real_amounts_are_read() {
        let conn = test_db();
        insert_student(&conn, &create_test_student("AFA/001", "Amina", "JSS 1")).unwrap();
        conn.execute(
            "INSERT INTO payments (student_reg_number, term, academic_year, amount_paid, payment_date, recorded_by)
             VALUES ('AFA/001', 'First Term', '2024/2025', 2500.5, '2024-09-01', 1)",
            [],
        )
        .unwrap();

        let total = total_paid(&conn, "AFA/001", "2024/2025", "First Term").unwrap();
        assert_eq!(total, Decimal::from_str("2500.5").unwrap());
    }

    #[test]
    fn test_sessions() {
        let conn = test_db();
        let now = Utc::now();
        insert_session(&conn, "live", 1, now, now + chrono::Duration::hours(1)).unwrap();
        insert_session(&conn, "stale", 1, now, now - chrono::Duration::hours(1)).unwrap();

        let session = find_session(&conn, "live").unwrap().unwrap();
        assert_eq!(session.username, "bursar");
        assert_eq!(session.role, "admin");

        assert_eq!(delete_expired_sessions(&conn, now).unwrap(), 1);
        assert!(find_session(&conn, "stale").unwrap().is_none());

        delete_session(&conn, "live").unwrap();
        assert!(find_session(&conn, "live").unwrap().is_none());
    }
}
