// 🎒 Students - registration, edits, filtered listing, CSV import

use crate::auth::Principal;
use crate::db::{self, Student, StudentQuery};
use crate::error::{AppError, AppResult};
use crate::period::{is_valid_academic_year, Clock, Period, Term};
use crate::reconciliation::{FeeReconciler, FeeStatus};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// FORMS
// ============================================================================

/// Registration / edit form. On edit, `reg_number` is ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StudentForm {
    #[serde(default)]
    pub reg_number: String,
    pub name: String,
    #[serde(rename = "class")]
    pub class_label: String,
    #[serde(rename = "term")]
    pub term_label: String,
    pub academic_year: String,
    #[serde(default)]
    pub dob: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

impl StudentForm {
    /// Trimmed copy of every field
    pub fn trimmed(&self) -> StudentForm {
        StudentForm {
            reg_number: self.reg_number.trim().to_string(),
            name: self.name.trim().to_string(),
            class_label: self.class_label.trim().to_string(),
            term_label: self.term_label.trim().to_string(),
            academic_year: self.academic_year.trim().to_string(),
            dob: self.dob.trim().to_string(),
            gender: self.gender.trim().to_string(),
            address: self.address.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
        }
    }

    /// Checks shared by registration and edit (reg number excluded)
    fn validate_details(&self) -> AppResult<()> {
        if self.name.is_empty() {
            return Err(AppError::invalid("Student name is required."));
        }
        if self.class_label.is_empty() {
            return Err(AppError::invalid("Class is required."));
        }
        if Term::from_label(&self.term_label).is_none() {
            return Err(AppError::invalid(format!("Unknown term '{}'.", self.term_label)));
        }
        if !is_valid_academic_year(&self.academic_year) {
            return Err(AppError::invalid(format!(
                "Academic year '{}' must look like 2024/2025.",
                self.academic_year
            )));
        }
        Ok(())
    }

    fn into_student(self, id: i64, reg_number: String, admission_date: String) -> Student {
        Student {
            id,
            reg_number,
            name: self.name,
            class_label: self.class_label,
            term_label: self.term_label,
            academic_year: self.academic_year,
            dob: self.dob,
            gender: self.gender,
            address: self.address,
            phone: self.phone,
            email: self.email,
            admission_date,
        }
    }
}

impl From<&Student> for StudentForm {
    fn from(student: &Student) -> Self {
        StudentForm {
            reg_number: student.reg_number.clone(),
            name: student.name.clone(),
            class_label: student.class_label.clone(),
            term_label: student.term_label.clone(),
            academic_year: student.academic_year.clone(),
            dob: student.dob.clone(),
            gender: student.gender.clone(),
            address: student.address.clone(),
            phone: student.phone.clone(),
            email: student.email.clone(),
        }
    }
}

// ============================================================================
// REGISTRATION + EDIT
// ============================================================================

fn insert_new_student(conn: &Connection, form: &StudentForm, clock: &dyn Clock) -> AppResult<Student> {
    let form = form.trimmed();
    if form.reg_number.is_empty() {
        return Err(AppError::invalid("Registration number is required."));
    }
    form.validate_details()?;

    let reg_number = form.reg_number.clone();
    let admission_date = clock.today().format("%Y-%m-%d").to_string();
    let mut student = form.into_student(0, reg_number, admission_date);

    student.id = db::insert_student(conn, &student).map_err(|e| match e {
        AppError::Conflict(_) => AppError::conflict(format!(
            "A student with registration number '{}' already exists.",
            student.reg_number
        )),
        other => other,
    })?;

    Ok(student)
}

/// Register a new student (admin only)
pub fn register_student(
    conn: &mut Connection,
    principal: &Principal,
    clock: &dyn Clock,
    form: &StudentForm,
) -> AppResult<Student> {
    principal.require_admin()?;

    let tx = conn.transaction()?;
    let student = insert_new_student(&tx, form, clock)?;
    tx.commit()?;

    info!(
        reg_number = %student.reg_number,
        class = %student.class_label,
        registered_by = %principal.username,
        "student registered"
    );
    Ok(student)
}

/// Update a student's details (admin only). The reg number never changes.
pub fn edit_student(
    conn: &mut Connection,
    principal: &Principal,
    reg_number: &str,
    form: &StudentForm,
) -> AppResult<Student> {
    principal.require_admin()?;

    let form = form.trimmed();
    form.validate_details()?;

    let tx = conn.transaction()?;
    let existing = db::find_student(&tx, reg_number)?
        .ok_or_else(|| AppError::not_found(format!("Student '{reg_number}' not found.")))?;

    let updated = form.into_student(existing.id, existing.reg_number, existing.admission_date);
    db::update_student(&tx, &updated)?;
    tx.commit()?;

    info!(reg_number = %updated.reg_number, edited_by = %principal.username, "student updated");
    Ok(updated)
}

// ============================================================================
// LISTING
// ============================================================================

/// Query-string filters for the student list. "all" or empty means no filter.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StudentFilter {
    #[serde(default, rename = "class")]
    pub class_label: Option<String>,
    #[serde(default, rename = "term")]
    pub term_label: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search_query: Option<String>,
}

fn active(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
        .map(str::to_string)
}

impl StudentFilter {
    pub fn class_filter(&self) -> Option<String> {
        active(&self.class_label)
    }

    pub fn term_filter(&self) -> Option<String> {
        active(&self.term_label)
    }

    pub fn search(&self) -> Option<String> {
        active(&self.search_query)
    }

    /// Unrecognised status values filter nothing
    pub fn status_filter(&self) -> Option<FeeStatus> {
        active(&self.status).and_then(|s| FeeStatus::parse(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentWithStatus {
    pub student: Student,
    pub status: FeeStatus,
}

/// Students matching the filter, each with its status for `period`
pub fn list_students(
    conn: &Connection,
    reconciler: &FeeReconciler,
    filter: &StudentFilter,
    period: &Period,
) -> AppResult<Vec<StudentWithStatus>> {
    let query = StudentQuery {
        class_label: filter.class_filter(),
        term_label: filter.term_filter(),
        search: filter.search(),
    };
    let students = db::list_students(conn, &query)?;
    let statuses = reconciler.statuses_for_period(conn, &students, period)?;
    let wanted = filter.status_filter();

    Ok(students
        .into_iter()
        .map(|student| {
            let status = statuses
                .get(&student.reg_number)
                .copied()
                .unwrap_or(FeeStatus::NotApplicable);
            StudentWithStatus { student, status }
        })
        .filter(|s| wanted.map_or(true, |w| s.status == w))
        .collect())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub inserted: usize,
    /// Reg numbers that already existed
    pub skipped: Vec<String>,
    /// (CSV line number, reason)
    pub rejected: Vec<(usize, String)>,
}

/// Bulk registration from a CSV with headers
/// `reg_number,name,class,term,academic_year` (contact columns optional).
/// Runs in one transaction; duplicates are skipped, invalid rows rejected.
pub fn import_students(conn: &mut Connection, csv_path: &Path, clock: &dyn Clock) -> AppResult<ImportReport> {
    let mut reader = csv::Reader::from_path(csv_path)
        .map_err(|e| AppError::invalid(format!("Failed to open CSV file: {e}")))?;

    let mut report = ImportReport::default();
    let tx = conn.transaction()?;

    for (index, result) in reader.deserialize::<StudentForm>().enumerate() {
        // Header is line 1
        let line = index + 2;
        let form = match result {
            Ok(form) => form,
            Err(e) => {
                report.rejected.push((line, e.to_string()));
                continue;
            }
        };

        match insert_new_student(&tx, &form, clock) {
            Ok(_) => report.inserted += 1,
            Err(AppError::Conflict(_)) => report.skipped.push(form.reg_number.trim().to_string()),
            Err(AppError::InvalidInput(reason)) => report.rejected.push((line, reason)),
            Err(other) => return Err(other),
        }
    }

    tx.commit()?;

    info!(
        inserted = report.inserted,
        skipped = report.skipped.len(),
        rejected = report.rejected.len(),
        "student import finished"
    );
    for (line, reason) in &report.rejected {
        warn!(line, reason = %reason, "rejected import row");
    }

    Ok(report)
}
