// 🌐 Web Layer - axum router, shared state, error pages
//
// Server-rendered HTML over the library operations. One SQLite connection
// behind a mutex; every request re-reads what it shows.

pub mod handlers;
pub mod session;
pub mod views;

use crate::error::AppError;
use crate::fee_schedule::FeeSchedule;
use crate::period::Clock;
use crate::reconciliation::FeeReconciler;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    pub reconciler: Arc<FeeReconciler>,
    pub clock: Arc<dyn Clock>,
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(
        conn: Connection,
        schedule: FeeSchedule,
        clock: Arc<dyn Clock>,
        session_ttl: chrono::Duration,
    ) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            reconciler: Arc::new(FeeReconciler::new(schedule)),
            clock,
            session_ttl,
        }
    }

    /// Exclusive access to the connection for the rest of the request.
    /// A panic in another request poisons the mutex but leaves the
    /// connection usable, since writes happen inside transactions.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| {
            warn!("database lock was poisoned by a panicking request; recovering");
            self.db.clear_poison();
            poisoned.into_inner()
        })
    }
}

/// Build the full router. `static_dir` is served under /static when given.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/login", get(handlers::login_page).post(handlers::login_submit))
        .route("/logout", get(handlers::logout))
        .route("/dashboard", get(handlers::dashboard))
        .route("/students", get(handlers::student_list))
        .route("/students/new", get(handlers::new_student_page).post(handlers::create_student))
        .route("/students/class/:class_label", get(handlers::students_in_class))
        .route("/students/:reg_number", get(handlers::student_detail))
        .route(
            "/students/:reg_number/edit",
            get(handlers::edit_student_page).post(handlers::update_student),
        )
        .route(
            "/students/:reg_number/payments/new",
            get(handlers::new_payment_page).post(handlers::create_payment),
        )
        .route("/payments", get(handlers::payment_ledger))
        .route("/users/new", get(handlers::new_user_page).post(handlers::create_user))
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Redirect carrying a one-shot notice in the query string
pub fn redirect_with_notice(path: &str, kind: views::NoticeKind, message: &str) -> Redirect {
    let separator = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!(
        "{path}{separator}notice={}&kind={}",
        urlencoding::encode(message),
        kind.as_str()
    ))
}

/// Path segment for a reg number ("AFA/001" → "AFA%2F001")
pub fn student_path(reg_number: &str) -> String {
    format!("/students/{}", urlencoding::encode(reg_number))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthenticated(message) => {
                redirect_with_notice("/login", views::NoticeKind::Info, &message).into_response()
            }
            AppError::NotFound(message) => {
                redirect_with_notice("/students", views::NoticeKind::Error, &message).into_response()
            }
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                Html(views::error_page(StatusCode::FORBIDDEN, &AppError::Forbidden.to_string())),
            )
                .into_response(),
            AppError::Conflict(message) => (
                StatusCode::CONFLICT,
                Html(views::error_page(StatusCode::CONFLICT, &message)),
            )
                .into_response(),
            AppError::InvalidInput(message) => (
                StatusCode::BAD_REQUEST,
                Html(views::error_page(StatusCode::BAD_REQUEST, &message)),
            )
                .into_response(),
            err @ (AppError::Persistence(_) | AppError::Config(_)) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(views::error_page(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &err.user_message(),
                    )),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::FixedClock;
    use chrono::NaiveDate;

    fn test_state() -> AppState {
        AppState::new(
            Connection::open_in_memory().unwrap(),
            FeeSchedule::standard(),
            Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 10, 1).unwrap())),
            chrono::Duration::hours(1),
        )
    }

    #[test]
    fn test_conn_survives_panicking_request() {
        let state = test_state();
        let shared = state.clone();

        let outcome = std::thread::spawn(move || {
            let _conn = shared.conn();
            panic!("handler panicked while holding the connection");
        })
        .join();
        assert!(outcome.is_err());
        assert!(state.db.is_poisoned());

        let conn = state.conn();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
        drop(conn);
        assert!(!state.db.is_poisoned());
    }
}
