// School Fees Tracker - Core Library
// Exposes all modules for use in the CLI, the web server, and tests

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod fee_schedule;
pub mod logging;
pub mod payments;
pub mod period;
pub mod reconciliation;
pub mod students;

#[cfg(feature = "server")]
pub mod web;

// Re-export commonly used types
pub use auth::{
    authenticate, create_user, ensure_bootstrap_admin, Principal, Role,
};
pub use config::SchoolFeesConfig;
pub use db::{
    Payment, PaymentRecord, Student, StudentQuery,
    setup_database, find_student, payments_for_student, recent_payments, total_paid,
};
pub use error::{AppError, AppResult, ConfigError};
pub use fee_schedule::FeeSchedule;
pub use payments::{parse_amount, record_payment, NewPayment};
pub use period::{Clock, FixedClock, Period, SystemClock, Term};
pub use reconciliation::{
    classify, DashboardSummary, FeeReconciler, FeeStatus, OutstandingStudent, PeriodSummary,
};
pub use students::{
    edit_student, import_students, list_students, register_student,
    ImportReport, StudentFilter, StudentForm, StudentWithStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of payments shown on the dashboard
pub const RECENT_PAYMENTS_LIMIT: usize = 10;
