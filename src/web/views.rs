// 🖼️ HTML Views - server-rendered pages
//
// Every page goes through `layout`. Anything that came from a user or the
// database passes through `escape_html` before it lands in markup.

use super::student_path;
use crate::auth::{Principal, Role};
use crate::db::{self, Payment, PaymentRecord, Student};
use crate::payments::NewPayment;
use crate::period::Period;
use crate::reconciliation::{DashboardSummary, FeeStatus, OutstandingStudent, PeriodSummary};
use crate::students::{StudentFilter, StudentForm, StudentWithStatus};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt::Write;

// ============================================================================
// NOTICES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Info => "info",
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
        }
    }
}

/// One-shot message shown above the page body (`?notice=...&kind=...`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Notice {
    #[serde(default)]
    pub notice: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

impl Notice {
    pub fn none() -> Self {
        Notice::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            notice: Some(message.into()),
            kind: Some(NoticeKind::Error.as_str().to_string()),
        }
    }

    pub fn kind(&self) -> NoticeKind {
        match self.kind.as_deref() {
            Some("success") => NoticeKind::Success,
            Some("error") => NoticeKind::Error,
            _ => NoticeKind::Info,
        }
    }

    fn render(&self) -> String {
        match self.notice.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => format!(
                r#"<div class="notice notice-{}">{}</div>"#,
                self.kind().as_str(),
                escape_html(message)
            ),
            _ => String::new(),
        }
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Two decimals with thousands separators: 70000 → "70,000.00"
pub fn format_amount(amount: Decimal) -> String {
    let fixed = format!("{:.2}", amount.round_dp(2));
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{fraction}")
}

fn naira(amount: Decimal) -> String {
    format!("₦{}", format_amount(amount))
}

fn status_badge(status: FeeStatus) -> String {
    format!(
        r#"<span class="status status-{}">{}</span>"#,
        status.slug(),
        status.label()
    )
}

fn options<'a>(values: impl IntoIterator<Item = &'a str>, selected: &str) -> String {
    values
        .into_iter()
        .map(|value| {
            let marker = if value == selected { " selected" } else { "" };
            format!(
                r#"<option value="{0}"{marker}>{0}</option>"#,
                escape_html(value)
            )
        })
        .collect()
}

/// `options` with a leading "All" entry for filter menus
fn filter_options<'a>(values: impl IntoIterator<Item = &'a str>, selected: Option<&str>) -> String {
    let all_marker = if selected.is_none() { " selected" } else { "" };
    format!(
        r#"<option value="all"{all_marker}>All</option>{}"#,
        options(values, selected.unwrap_or(""))
    )
}

// ============================================================================
// LAYOUT
// ============================================================================

fn navigation(principal: Option<&Principal>) -> String {
    let Some(principal) = principal else {
        return r#"<nav><a href="/login">Log in</a></nav>"#.to_string();
    };

    let mut links = String::new();
    if principal.role == Role::Admin {
        links.push_str(r#"<a href="/dashboard">Dashboard</a>"#);
    }
    links.push_str(r#"<a href="/students">Students</a>"#);
    if principal.role == Role::Admin {
        links.push_str(r#"<a href="/students/new">Register Student</a>"#);
    }
    links.push_str(r#"<a href="/payments">Payments</a>"#);
    if principal.role == Role::Admin {
        links.push_str(r#"<a href="/users/new">Add User</a>"#);
    }

    format!(
        r#"<nav>{links}<span class="whoami">{} ({})</span><a href="/logout">Log out</a></nav>"#,
        escape_html(&principal.username),
        principal.role
    )
}

pub fn layout(title: &str, principal: Option<&Principal>, notice: &Notice, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} · School Fees</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<header><h1>School Fees</h1>{nav}</header>
<main>
{notice}
<h2>{title}</h2>
{body}
</main>
</body>
</html>"#,
        title = escape_html(title),
        nav = navigation(principal),
        notice = notice.render(),
    )
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let title = status.canonical_reason().unwrap_or("Error");
    let body = format!(
        r#"<p>{}</p><p><a href="/">Back to safety</a></p>"#,
        escape_html(message)
    );
    layout(title, None, &Notice::none(), &body)
}

// ============================================================================
// LOGIN
// ============================================================================

pub fn login_page(notice: &Notice, username: &str) -> String {
    let body = format!(
        r#"<form method="post" action="/login" class="card">
<label>Username <input name="username" value="{}" required autofocus></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">Log in</button>
</form>"#,
        escape_html(username)
    );
    layout("Log in", None, notice, &body)
}

// ============================================================================
// DASHBOARD
// ============================================================================

fn outstanding_table(rows: &[OutstandingStudent]) -> String {
    if rows.is_empty() {
        return "<p>None.</p>".to_string();
    }

    let mut html = String::from(
        "<table><thead><tr><th>Reg No.</th><th>Name</th><th>Class</th><th>Outstanding</th></tr></thead><tbody>",
    );
    for row in rows {
        let _ = write!(
            html,
            r#"<tr><td><a href="{}">{}</a></td><td>{}</td><td>{}</td><td class="amount">{}</td></tr>"#,
            escape_html(&student_path(&row.reg_number)),
            escape_html(&row.reg_number),
            escape_html(&row.name),
            escape_html(&row.class_label),
            naira(row.outstanding)
        );
    }
    html.push_str("</tbody></table>");
    html
}

fn recent_payments_table(records: &[PaymentRecord], show_recorder: bool) -> String {
    if records.is_empty() {
        return "<p>No payments recorded yet.</p>".to_string();
    }

    let mut html = String::from(
        "<table><thead><tr><th>Date</th><th>Reg No.</th><th>Student</th><th>Period</th><th>Amount</th>",
    );
    if show_recorder {
        html.push_str("<th>Recorded by</th>");
    }
    html.push_str("</tr></thead><tbody>");

    for record in records {
        let payment = &record.payment;
        let _ = write!(
            html,
            r#"<tr><td>{}</td><td><a href="{}">{}</a></td><td>{}</td><td>{} {}</td><td class="amount">{}</td>"#,
            escape_html(&payment.payment_date),
            escape_html(&student_path(&payment.student_reg_number)),
            escape_html(&payment.student_reg_number),
            escape_html(&record.student_name),
            escape_html(&payment.term_label),
            escape_html(&payment.academic_year),
            naira(payment.amount_paid)
        );
        if show_recorder {
            let _ = write!(html, "<td>{}</td>", escape_html(&record.recorded_by_username));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

fn period_picker(action: &str, period: &Period, choices: &FormChoices) -> String {
    format!(
        r#"<form method="get" action="{action}" class="filters">
<label>Year <select name="year">{}</select></label>
<label>Term <select name="term">{}</select></label>
<button type="submit">Show</button>
</form>"#,
        options(choices.academic_years.iter().map(String::as_str), &period.academic_year),
        options(choices.terms.iter().copied(), &period.term_label),
    )
}

pub fn dashboard_page(
    principal: &Principal,
    notice: &Notice,
    summary: &DashboardSummary,
    choices: &FormChoices,
) -> String {
    let mut body = period_picker("/dashboard", &summary.period, choices);

    let _ = write!(
        body,
        r#"<section class="stats">
<div class="stat"><span>Total students</span><strong>{}</strong></div>
<div class="stat"><span>Paid</span><strong>{}</strong></div>
<div class="stat"><span>Defaulters</span><strong>{}</strong></div>
<div class="stat"><span>Partially paid</span><strong>{}</strong></div>
<div class="stat"><span>N/A</span><strong>{}</strong></div>
</section>
<section class="stats">
<div class="stat"><span>Expected revenue</span><strong>{}</strong></div>
<div class="stat"><span>Received revenue</span><strong>{}</strong></div>
<div class="stat"><span>Outstanding revenue</span><strong>{}</strong></div>
</section>"#,
        summary.total_students,
        summary.paid_count,
        summary.defaulter_count,
        summary.partially_paid_count,
        summary.not_applicable_count,
        naira(summary.expected_revenue),
        naira(summary.received_revenue),
        naira(summary.outstanding_revenue),
    );

    let _ = write!(
        body,
        "<h3>Defaulters</h3>{}<h3>Partially paid</h3>{}<h3>Recent payments</h3>{}",
        outstanding_table(&summary.defaulters),
        outstanding_table(&summary.partially_paid),
        recent_payments_table(&summary.recent_payments, false),
    );

    layout(
        &format!("Dashboard · {}", summary.period),
        Some(principal),
        notice,
        &body,
    )
}

// ============================================================================
// STUDENTS
// ============================================================================

/// Menu contents for student, payment and period forms
#[derive(Debug, Clone)]
pub struct FormChoices {
    pub classes: Vec<String>,
    pub terms: Vec<&'static str>,
    pub academic_years: Vec<String>,
}

pub struct StudentListView<'a> {
    pub heading: String,
    pub rows: &'a [StudentWithStatus],
    pub filter: &'a StudentFilter,
    pub classes: &'a [String],
    pub terms: &'a [String],
    pub period: &'a Period,
}

pub fn student_list_page(principal: &Principal, notice: &Notice, view: &StudentListView<'_>) -> String {
    let class_filter = view.filter.class_filter();
    let term_filter = view.filter.term_filter();
    let status_filter = view.filter.status_filter();
    let search = view.filter.search().unwrap_or_default();

    let status_options: String = std::iter::once(("all", "All"))
        .chain(FeeStatus::ALL.iter().map(|s| (s.slug(), s.label())))
        .map(|(value, label)| {
            let selected = match status_filter {
                Some(status) => status.slug() == value,
                None => value == "all",
            };
            format!(
                r#"<option value="{value}"{}>{label}</option>"#,
                if selected { " selected" } else { "" }
            )
        })
        .collect();

    let mut body = format!(
        r#"<form method="get" action="/students" class="filters">
<label>Class <select name="class">{classes}</select></label>
<label>Term <select name="term">{terms}</select></label>
<label>Status ({period}) <select name="status">{status_options}</select></label>
<label>Search <input name="search_query" value="{search}" placeholder="Name or reg number"></label>
<button type="submit">Filter</button>
</form>"#,
        classes = filter_options(view.classes.iter().map(String::as_str), class_filter.as_deref()),
        terms = filter_options(view.terms.iter().map(String::as_str), term_filter.as_deref()),
        period = escape_html(&view.period.to_string()),
        search = escape_html(&search),
    );

    if view.rows.is_empty() {
        body.push_str("<p>No students match.</p>");
    } else {
        body.push_str(
            "<table><thead><tr><th>Reg No.</th><th>Name</th><th>Class</th><th>Term</th><th>Year</th><th>Status</th></tr></thead><tbody>",
        );
        for row in view.rows {
            let s = &row.student;
            let _ = write!(
                body,
                r#"<tr><td><a href="{}">{}</a></td><td>{}</td><td><a href="/students/class/{}">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
                escape_html(&student_path(&s.reg_number)),
                escape_html(&s.reg_number),
                escape_html(&s.name),
                escape_html(&urlencoding::encode(&s.class_label)),
                escape_html(&s.class_label),
                escape_html(&s.term_label),
                escape_html(&s.academic_year),
                status_badge(row.status),
            );
        }
        body.push_str("</tbody></table>");
    }
    let _ = write!(body, r#"<p class="muted">{} student(s)</p>"#, view.rows.len());

    layout(&view.heading, Some(principal), notice, &body)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentFormMode {
    Register,
    Edit,
}

pub fn student_form_page(
    principal: &Principal,
    notice: &Notice,
    mode: StudentFormMode,
    form: &StudentForm,
    choices: &FormChoices,
) -> String {
    let (title, action, reg_field) = match mode {
        StudentFormMode::Register => (
            "Register Student".to_string(),
            "/students/new".to_string(),
            format!(
                r#"<label>Registration number <input name="reg_number" value="{}" required></label>"#,
                escape_html(&form.reg_number)
            ),
        ),
        StudentFormMode::Edit => (
            format!("Edit {}", form.reg_number),
            format!("{}/edit", student_path(&form.reg_number)),
            format!(
                r#"<p>Registration number <strong>{}</strong></p>"#,
                escape_html(&form.reg_number)
            ),
        ),
    };

    let genders = ["", "Male", "Female"];
    let body = format!(
        r#"<form method="post" action="{action}" class="card">
{reg_field}
<label>Name <input name="name" value="{name}" required></label>
<label>Class <select name="class">{classes}</select></label>
<label>Term <select name="term">{terms}</select></label>
<label>Academic year <select name="academic_year">{years}</select></label>
<label>Date of birth <input name="dob" type="date" value="{dob}"></label>
<label>Gender <select name="gender">{genders}</select></label>
<label>Address <input name="address" value="{address}"></label>
<label>Phone <input name="phone" value="{phone}"></label>
<label>Email <input name="email" type="email" value="{email}"></label>
<button type="submit">Save</button>
</form>"#,
        action = escape_html(&action),
        name = escape_html(&form.name),
        classes = options(choices.classes.iter().map(String::as_str), &form.class_label),
        terms = options(choices.terms.iter().copied(), &form.term_label),
        years = options(choices.academic_years.iter().map(String::as_str), &form.academic_year),
        dob = escape_html(&form.dob),
        genders = options(genders, &form.gender),
        address = escape_html(&form.address),
        phone = escape_html(&form.phone),
        email = escape_html(&form.email),
    );

    layout(&title, Some(principal), notice, &body)
}

pub struct StudentDetailView<'a> {
    pub student: &'a Student,
    pub current: &'a PeriodSummary,
    pub breakdown: &'a [PeriodSummary],
    pub payments: &'a [Payment],
}

pub fn student_detail_page(principal: &Principal, notice: &Notice, view: &StudentDetailView<'_>) -> String {
    let s = view.student;
    let optional = |value: &str| {
        if value.is_empty() {
            "-".to_string()
        } else {
            escape_html(value)
        }
    };

    let mut body = format!(
        r#"<section class="card">
<dl>
<dt>Name</dt><dd>{}</dd>
<dt>Class</dt><dd>{}</dd>
<dt>Enrolled</dt><dd>{} {}</dd>
<dt>Date of birth</dt><dd>{}</dd>
<dt>Gender</dt><dd>{}</dd>
<dt>Address</dt><dd>{}</dd>
<dt>Phone</dt><dd>{}</dd>
<dt>Email</dt><dd>{}</dd>
<dt>Admitted</dt><dd>{}</dd>
<dt>Status ({})</dt><dd>{}</dd>
</dl>
</section>"#,
        escape_html(&s.name),
        escape_html(&s.class_label),
        escape_html(&s.term_label),
        escape_html(&s.academic_year),
        optional(&s.dob),
        optional(&s.gender),
        optional(&s.address),
        optional(&s.phone),
        optional(&s.email),
        optional(&s.admission_date),
        escape_html(&view.current.period.to_string()),
        status_badge(view.current.status),
    );

    if principal.is_admin() {
        let path = escape_html(&student_path(&s.reg_number));
        let _ = write!(
            body,
            r#"<p class="actions"><a href="{path}/payments/new">Record payment</a> <a href="{path}/edit">Edit details</a></p>"#
        );
    }

    body.push_str(
        "<h3>Fee breakdown</h3><table><thead><tr><th>Period</th><th>Expected</th><th>Paid</th><th>Outstanding</th><th>Status</th></tr></thead><tbody>",
    );
    for summary in view.breakdown {
        let outstanding_class = if summary.is_overpaid() { "amount credit" } else { "amount" };
        let _ = write!(
            body,
            r#"<tr><td>{}</td><td class="amount">{}</td><td class="amount">{}</td><td class="{outstanding_class}">{}</td><td>{}</td></tr>"#,
            escape_html(&summary.period.to_string()),
            naira(summary.expected),
            naira(summary.paid),
            naira(summary.outstanding),
            status_badge(summary.status),
        );
    }
    body.push_str("</tbody></table>");

    body.push_str("<h3>Payment history</h3>");
    if view.payments.is_empty() {
        body.push_str("<p>No payments recorded.</p>");
    } else {
        body.push_str(
            "<table><thead><tr><th>Date</th><th>Period</th><th>Amount</th></tr></thead><tbody>",
        );
        for payment in view.payments {
            let _ = write!(
                body,
                r#"<tr><td>{}</td><td>{} {}</td><td class="amount">{}</td></tr>"#,
                escape_html(&payment.payment_date),
                escape_html(&payment.term_label),
                escape_html(&payment.academic_year),
                naira(payment.amount_paid),
            );
        }
        body.push_str("</tbody></table>");
    }

    layout(
        &format!("{} ({})", s.name, s.reg_number),
        Some(principal),
        notice,
        &body,
    )
}

// ============================================================================
// PAYMENTS
// ============================================================================

pub fn payment_form_page(
    principal: &Principal,
    notice: &Notice,
    student: &Student,
    form: &NewPayment,
    expected: Decimal,
    choices: &FormChoices,
) -> String {
    let body = format!(
        r#"<p>{name} · {class} · expected this term {expected}</p>
<form method="post" action="{action}" class="card">
<label>Term <select name="term">{terms}</select></label>
<label>Academic year <select name="academic_year">{years}</select></label>
<label>Amount (₦) <input name="amount_paid" value="{amount}" inputmode="decimal" required></label>
<button type="submit">Record payment</button>
</form>"#,
        name = escape_html(&student.name),
        class = escape_html(&student.class_label),
        expected = naira(expected),
        action = escape_html(&format!("{}/payments/new", student_path(&student.reg_number))),
        terms = options(choices.terms.iter().copied(), &form.term),
        years = options(choices.academic_years.iter().map(String::as_str), &form.academic_year),
        amount = escape_html(&form.amount_paid),
    );

    layout(
        &format!("Record Payment · {}", student.reg_number),
        Some(principal),
        notice,
        &body,
    )
}

pub fn payment_ledger_page(principal: &Principal, notice: &Notice, records: &[PaymentRecord]) -> String {
    let total = match db::sum_amounts(records.iter().map(|r| r.payment.amount_paid)) {
        Ok(total) => naira(total),
        Err(_) => "an out-of-range amount".to_string(),
    };
    let body = format!(
        r#"{}<p class="muted">{} payment(s), {} in total</p>"#,
        recent_payments_table(records, true),
        records.len(),
        total
    );
    layout("Payments", Some(principal), notice, &body)
}

// ============================================================================
// USERS
// ============================================================================

pub fn user_form_page(principal: &Principal, notice: &Notice, username: &str, role: &str) -> String {
    let body = format!(
        r#"<form method="post" action="/users/new" class="card">
<label>Username <input name="username" value="{}" required></label>
<label>Password <input name="password" type="password" required></label>
<label>Role <select name="role">{}</select></label>
<button type="submit">Create user</button>
</form>"#,
        escape_html(username),
        options([Role::Staff.as_str(), Role::Admin.as_str()], role),
    );
    layout("Add User", Some(principal), notice, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(Decimal::from(70_000)), "70,000.00");
        assert_eq!(format_amount(Decimal::from(0)), "0.00");
        assert_eq!(format_amount(Decimal::from(999)), "999.00");
        assert_eq!(format_amount(Decimal::from(1_234_567)), "1,234,567.00");
        assert_eq!(format_amount(Decimal::from_str("30000.5").unwrap()), "30,000.50");
        assert_eq!(format_amount(Decimal::from(-5_000)), "-5,000.00");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#39;y&#39;"
        );
        assert_eq!(escape_html("Ada Obi"), "Ada Obi");
    }

    #[test]
    fn test_notice_rendering() {
        let notice = Notice::error("<b>bad</b>");
        let html = layout("Title", None, &notice, "");
        assert!(html.contains(r#"class="notice notice-error""#));
        assert!(html.contains("&lt;b&gt;bad&lt;/b&gt;"));

        let blank = Notice {
            notice: Some("  ".to_string()),
            kind: None,
        };
        assert!(!layout("Title", None, &blank, "").contains("class=\"notice"));
    }

    #[test]
    fn test_ledger_total_out_of_range() {
        let admin = Principal {
            user_id: 1,
            username: "admin".to_string(),
            role: Role::Admin,
        };
        let record = PaymentRecord {
            payment: Payment {
                id: 1,
                student_reg_number: "AFA/001".to_string(),
                term_label: "First Term".to_string(),
                academic_year: "2024/2025".to_string(),
                amount_paid: Decimal::MAX,
                payment_date: "2024-10-01".to_string(),
                recorded_by: 1,
            },
            student_name: "Ada Obi".to_string(),
            recorded_by_username: "admin".to_string(),
        };
        let blank = Notice {
            notice: None,
            kind: None,
        };

        let html = payment_ledger_page(&admin, &blank, &[record.clone(), record]);
        assert!(html.contains("2 payment(s), an out-of-range amount in total"));
    }

    #[test]
    fn test_navigation_by_role() {
        let admin = Principal {
            user_id: 1,
            username: "admin".to_string(),
            role: Role::Admin,
        };
        let staff = Principal {
            user_id: 2,
            username: "clerk".to_string(),
            role: Role::Staff,
        };

        let admin_nav = navigation(Some(&admin));
        assert!(admin_nav.contains("/dashboard"));
        assert!(admin_nav.contains("/users/new"));

        let staff_nav = navigation(Some(&staff));
        assert!(!staff_nav.contains("/dashboard"));
        assert!(!staff_nav.contains("/students/new"));
        assert!(staff_nav.contains("/payments"));
    }
}
