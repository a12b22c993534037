// 🧭 Route Handlers - thin glue between HTTP and the library operations
//
// Each handler locks the connection once and does all its work synchronously;
// nothing is awaited while the guard is held. Login is the exception: the
// password hash is checked between two short locks.

use super::session::{clear_session_cookie, session_cookie, session_token};
use super::views::{self, FormChoices, Notice, NoticeKind, StudentFormMode};
use super::{redirect_with_notice, student_path, AppState};
use crate::auth::{self, Principal, Role};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::payments::{self, NewPayment};
use crate::period::{academic_year_choices, is_valid_academic_year, Period, Term};
use crate::students::{self, StudentFilter, StudentForm};
use crate::{RECENT_PAYMENTS_LIMIT, VERSION};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    Form,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

// ============================================================================
// Helpers
// ============================================================================

fn form_choices(state: &AppState) -> FormChoices {
    let schedule = state.reconciler.schedule();
    FormChoices {
        classes: schedule.classes().to_vec(),
        terms: schedule.terms(),
        academic_years: academic_year_choices(state.clock.today().year()),
    }
}

/// Choices that also contain a stored class and year outside the defaults
fn form_choices_with(state: &AppState, class_label: &str, academic_year: &str) -> FormChoices {
    let mut choices = form_choices(state);
    if !class_label.is_empty() && !choices.classes.iter().any(|c| c == class_label) {
        choices.classes.push(class_label.to_string());
    }
    if !academic_year.is_empty() && !choices.academic_years.iter().any(|y| y == academic_year) {
        choices.academic_years.push(academic_year.to_string());
    }
    choices
}

/// Recoverable form errors re-render the form; everything else propagates
fn form_failure(err: AppError, render: impl FnOnce(&Notice) -> String) -> AppResult<Response> {
    let (status, message) = match err {
        AppError::Conflict(message) => (StatusCode::CONFLICT, message),
        AppError::InvalidInput(message) => (StatusCode::BAD_REQUEST, message),
        other => return Err(other),
    };
    Ok((status, Html(render(&Notice::error(message)))).into_response())
}

fn student_not_found(reg_number: &str) -> AppError {
    AppError::not_found(format!("Student '{reg_number}' not found."))
}

// ============================================================================
// Health + landing
// ============================================================================

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": VERSION }))
}

/// GET / - admins land on the dashboard, staff on the student list
pub async fn index(principal: Option<Principal>) -> Redirect {
    match principal {
        Some(p) if p.is_admin() => Redirect::to("/dashboard"),
        Some(_) => Redirect::to("/students"),
        None => Redirect::to("/login"),
    }
}

// ============================================================================
// Login / logout
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// GET /login
pub async fn login_page(principal: Option<Principal>, Query(notice): Query<Notice>) -> Response {
    if principal.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(views::login_page(&notice, "")).into_response()
}

/// POST /login
pub async fn login_submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> AppResult<Response> {
    let user = db::find_user_by_username(&state.conn(), form.username.trim())?;

    match auth::verify_login(user.as_ref(), &form.username, &form.password) {
        Ok(principal) => {
            let token = auth::start_session(&state.conn(), &principal, Utc::now(), state.session_ttl)?;
            info!(user = %principal.username, role = %principal.role, "logged in");

            let target = if principal.is_admin() { "/dashboard" } else { "/students" };
            Ok((
                [(header::SET_COOKIE, session_cookie(&token, state.session_ttl))],
                Redirect::to(target),
            )
                .into_response())
        }
        Err(AppError::Unauthenticated(message)) => Ok((
            StatusCode::UNAUTHORIZED,
            Html(views::login_page(&Notice::error(message), &form.username)),
        )
            .into_response()),
        Err(other) => Err(other),
    }
}

/// GET /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session_token(&headers) {
        let conn = state.conn();
        auth::end_session(&conn, &token)?;
    }

    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        redirect_with_notice("/login", NoticeKind::Info, "You have been logged out."),
    )
        .into_response())
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
}

impl PeriodQuery {
    /// Requested period; malformed parts fall back to `current`
    pub fn resolve(&self, current: Period) -> Period {
        let academic_year = self
            .year
            .as_deref()
            .map(str::trim)
            .filter(|y| is_valid_academic_year(y))
            .map(str::to_string)
            .unwrap_or(current.academic_year);
        let term_label = self
            .term
            .as_deref()
            .and_then(Term::from_label)
            .map(|t| t.label().to_string())
            .unwrap_or(current.term_label);

        Period::new(academic_year, term_label)
    }
}

/// GET /dashboard (admin)
pub async fn dashboard(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<PeriodQuery>,
    Query(notice): Query<Notice>,
) -> AppResult<Html<String>> {
    principal.require_admin()?;

    let period = query.resolve(state.clock.current_period());
    let conn = state.conn();
    let summary = state.reconciler.dashboard(&conn, &period, RECENT_PAYMENTS_LIMIT)?;
    let choices = form_choices_with(&state, "", &period.academic_year);

    Ok(Html(views::dashboard_page(&principal, &notice, &summary, &choices)))
}

// ============================================================================
// Students
// ============================================================================

fn render_student_list(
    state: &AppState,
    principal: &Principal,
    notice: &Notice,
    filter: &StudentFilter,
    heading: String,
) -> AppResult<Html<String>> {
    let period = state.clock.current_period();
    let conn = state.conn();

    let rows = students::list_students(&conn, &state.reconciler, filter, &period)?;
    let classes = db::distinct_classes(&conn)?;
    let terms = db::distinct_terms(&conn)?;

    let view = views::StudentListView {
        heading,
        rows: &rows,
        filter,
        classes: &classes,
        terms: &terms,
        period: &period,
    };
    Ok(Html(views::student_list_page(principal, notice, &view)))
}

/// GET /students
pub async fn student_list(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<StudentFilter>,
    Query(notice): Query<Notice>,
) -> AppResult<Html<String>> {
    render_student_list(&state, &principal, &notice, &filter, "Students".to_string())
}

/// GET /students/class/:class_label
pub async fn students_in_class(
    State(state): State<AppState>,
    principal: Principal,
    Path(class_label): Path<String>,
    Query(mut filter): Query<StudentFilter>,
    Query(notice): Query<Notice>,
) -> AppResult<Html<String>> {
    let heading = format!("Students in {class_label}");
    filter.class_label = Some(class_label);
    render_student_list(&state, &principal, &notice, &filter, heading)
}

/// GET /students/new (admin)
pub async fn new_student_page(
    State(state): State<AppState>,
    principal: Principal,
    Query(notice): Query<Notice>,
) -> AppResult<Html<String>> {
    principal.require_admin()?;

    let current = state.clock.current_period();
    let form = StudentForm {
        term_label: current.term_label,
        academic_year: current.academic_year,
        ..StudentForm::default()
    };
    let choices = form_choices(&state);

    Ok(Html(views::student_form_page(
        &principal,
        &notice,
        StudentFormMode::Register,
        &form,
        &choices,
    )))
}

/// POST /students/new (admin)
pub async fn create_student(
    State(state): State<AppState>,
    principal: Principal,
    Form(form): Form<StudentForm>,
) -> AppResult<Response> {
    let result = {
        let mut conn = state.conn();
        students::register_student(&mut conn, &principal, state.clock.as_ref(), &form)
    };

    match result {
        Ok(student) => Ok(redirect_with_notice(
            &student_path(&student.reg_number),
            NoticeKind::Success,
            &format!("Student {} registered.", student.name),
        )
        .into_response()),
        Err(err) => {
            let choices = form_choices_with(&state, form.class_label.trim(), form.academic_year.trim());
            form_failure(err, |notice| {
                views::student_form_page(&principal, notice, StudentFormMode::Register, &form, &choices)
            })
        }
    }
}

/// GET /students/:reg_number
pub async fn student_detail(
    State(state): State<AppState>,
    principal: Principal,
    Path(reg_number): Path<String>,
    Query(notice): Query<Notice>,
) -> AppResult<Html<String>> {
    let conn = state.conn();
    let student = db::find_student(&conn, &reg_number)?.ok_or_else(|| student_not_found(&reg_number))?;
    let payments = db::payments_for_student(&conn, &reg_number)?;

    let current_period = state.clock.current_period();
    let current = state.reconciler.summarize(&student, &payments, &current_period)?;
    let breakdown = state.reconciler.breakdown_for(&student, &payments, &current_period)?;

    let view = views::StudentDetailView {
        student: &student,
        current: &current,
        breakdown: &breakdown,
        payments: &payments,
    };
    Ok(Html(views::student_detail_page(&principal, &notice, &view)))
}

/// GET /students/:reg_number/edit (admin)
pub async fn edit_student_page(
    State(state): State<AppState>,
    principal: Principal,
    Path(reg_number): Path<String>,
    Query(notice): Query<Notice>,
) -> AppResult<Html<String>> {
    principal.require_admin()?;

    let conn = state.conn();
    let student = db::find_student(&conn, &reg_number)?.ok_or_else(|| student_not_found(&reg_number))?;
    let form = StudentForm::from(&student);
    let choices = form_choices_with(&state, &student.class_label, &student.academic_year);

    Ok(Html(views::student_form_page(
        &principal,
        &notice,
        StudentFormMode::Edit,
        &form,
        &choices,
    )))
}

/// POST /students/:reg_number/edit (admin)
pub async fn update_student(
    State(state): State<AppState>,
    principal: Principal,
    Path(reg_number): Path<String>,
    Form(mut form): Form<StudentForm>,
) -> AppResult<Response> {
    let result = {
        let mut conn = state.conn();
        students::edit_student(&mut conn, &principal, &reg_number, &form)
    };

    match result {
        Ok(student) => Ok(redirect_with_notice(
            &student_path(&student.reg_number),
            NoticeKind::Success,
            "Student details updated.",
        )
        .into_response()),
        Err(err) => {
            form.reg_number = reg_number;
            let choices = form_choices_with(&state, form.class_label.trim(), form.academic_year.trim());
            form_failure(err, |notice| {
                views::student_form_page(&principal, notice, StudentFormMode::Edit, &form, &choices)
            })
        }
    }
}

// ============================================================================
// Payments
// ============================================================================

/// GET /students/:reg_number/payments/new (admin)
pub async fn new_payment_page(
    State(state): State<AppState>,
    principal: Principal,
    Path(reg_number): Path<String>,
    Query(notice): Query<Notice>,
) -> AppResult<Html<String>> {
    principal.require_admin()?;

    let conn = state.conn();
    let student = db::find_student(&conn, &reg_number)?.ok_or_else(|| student_not_found(&reg_number))?;

    let current = state.clock.current_period();
    let expected = state.reconciler.expected_fee(&student, &current.term_label);
    let form = NewPayment {
        term: current.term_label,
        academic_year: current.academic_year,
        amount_paid: String::new(),
    };
    let choices = form_choices_with(&state, "", &student.academic_year);

    Ok(Html(views::payment_form_page(
        &principal, &notice, &student, &form, expected, &choices,
    )))
}

/// POST /students/:reg_number/payments/new (admin)
pub async fn create_payment(
    State(state): State<AppState>,
    principal: Principal,
    Path(reg_number): Path<String>,
    Form(form): Form<NewPayment>,
) -> AppResult<Response> {
    let mut conn = state.conn();

    match payments::record_payment(&mut conn, &principal, state.clock.as_ref(), &reg_number, &form) {
        Ok(payment) => Ok(redirect_with_notice(
            &student_path(&payment.student_reg_number),
            NoticeKind::Success,
            &format!(
                "Payment of ₦{} recorded for {} {}.",
                views::format_amount(payment.amount_paid),
                payment.term_label,
                payment.academic_year
            ),
        )
        .into_response()),
        Err(err @ (AppError::InvalidInput(_) | AppError::Conflict(_))) => {
            let student = db::find_student(&conn, &reg_number)?.ok_or_else(|| student_not_found(&reg_number))?;
            let expected = state.reconciler.expected_fee(&student, form.term.trim());
            let choices = form_choices_with(&state, "", form.academic_year.trim());
            form_failure(err, |notice| {
                views::payment_form_page(&principal, notice, &student, &form, expected, &choices)
            })
        }
        Err(other) => Err(other),
    }
}

/// GET /payments
pub async fn payment_ledger(
    State(state): State<AppState>,
    principal: Principal,
    Query(notice): Query<Notice>,
) -> AppResult<Html<String>> {
    let conn = state.conn();
    let records = db::all_payment_records(&conn)?;
    Ok(Html(views::payment_ledger_page(&principal, &notice, &records)))
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NewUserForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: String,
}

/// GET /users/new (admin)
pub async fn new_user_page(principal: Principal, Query(notice): Query<Notice>) -> AppResult<Html<String>> {
    principal.require_admin()?;
    Ok(Html(views::user_form_page(&principal, &notice, "", Role::Staff.as_str())))
}

/// POST /users/new (admin)
pub async fn create_user(
    State(state): State<AppState>,
    principal: Principal,
    Form(form): Form<NewUserForm>,
) -> AppResult<Response> {
    principal.require_admin()?;

    let result = Role::parse(&form.role)
        .ok_or_else(|| AppError::invalid(format!("Unknown role '{}'.", form.role.trim())))
        .and_then(|role| {
            let conn = state.conn();
            auth::create_user(&conn, &form.username, &form.password, role)
        });

    match result {
        Ok(_) => {
            info!(user = %form.username.trim(), created_by = %principal.username, "account added");
            Ok(redirect_with_notice(
                "/dashboard",
                NoticeKind::Success,
                &format!("User {} created.", form.username.trim()),
            )
            .into_response())
        }
        Err(err) => form_failure(err, |notice| {
            views::user_form_page(&principal, notice, &form.username, &form.role)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_query_resolution() {
        let current = Period::new("2024/2025", "First Term");

        let empty = PeriodQuery::default();
        assert_eq!(empty.resolve(current.clone()), current);

        let chosen = PeriodQuery {
            year: Some("2023/2024".to_string()),
            term: Some("Third Term".to_string()),
        };
        assert_eq!(chosen.resolve(current.clone()), Period::new("2023/2024", "Third Term"));

        let garbage = PeriodQuery {
            year: Some("2023-24".to_string()),
            term: Some("Summer".to_string()),
        };
        assert_eq!(garbage.resolve(current.clone()), current);
    }
}
