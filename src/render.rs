//! Plain text and HTML rendering of an invoice.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use invoice_core::{Invoice, ReportBucket, Session};
use std::fmt::Write;

fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn nice_date<Tz: TimeZone>(value: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    value.format("%a %d %b %Y @ %H:%M").to_string()
}

fn month_title(invoice: &Invoice<'_>) -> String {
    NaiveDate::from_ymd_opt(invoice.year, invoice.month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_else(|| format!("{}-{:02}", invoice.year, invoice.month))
}

fn session_line(session: &Session) -> (String, String, DateTime<FixedOffset>, String, f64) {
    (
        session.student().name().to_string(),
        session.student().financed().label().to_string(),
        session.timestamp(),
        session.status().to_string(),
        session.price(),
    )
}

fn non_empty<'i, 'a>(invoice: &'i Invoice<'a>) -> impl Iterator<Item = &'i ReportBucket<'a>> {
    invoice.buckets.iter().filter(|b| !b.is_empty())
}

/// Renders the invoice for a terminal.
pub fn render_text(invoice: &Invoice<'_>) -> String {
    let mut out = String::new();
    let title = format!("INVOICE {}", month_title(invoice));
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "=".repeat(title.len()));

    for bucket in non_empty(invoice) {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} : {} x = {} EUR",
            bucket.label,
            bucket.len(),
            money(bucket.subtotal())
        );
        for session in &bucket.sessions {
            let (name, _, date, status, price) = session_line(session);
            let _ = writeln!(
                out,
                "    {name: <30} {} {status: <20} {: >7}",
                nice_date(&date),
                money(price)
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "TOTAL : {} sessions = {} EUR",
        invoice.session_count(),
        money(invoice.total())
    );

    if !invoice.auto_financed_students.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Auto-financed students:");
        for student in &invoice.auto_financed_students {
            let _ = writeln!(out, "    {student}");
        }
    }

    if !invoice.no_charge.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Not charged:");
        for session in &invoice.no_charge {
            let _ = writeln!(out, "    {session}");
        }
    }

    if !invoice.to_complete.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "To complete:");
        for session in &invoice.to_complete {
            let _ = writeln!(out, "    {session}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {} in {:.1}s",
        nice_date(&invoice.generated_at),
        invoice.duration.as_secs_f64()
    );
    out
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn html_session_list(out: &mut String, heading: &str, sessions: &[&Session]) {
    if sessions.is_empty() {
        return;
    }
    let _ = writeln!(out, "<h2>{}</h2>", escape(heading));
    let _ = writeln!(out, "<ul>");
    for session in sessions {
        let (name, _, date, status, _) = session_line(session);
        let _ = writeln!(
            out,
            "  <li>{} - {} - level {} - {}</li>",
            escape(&name),
            nice_date(&date),
            session.level(),
            escape(&status)
        );
    }
    let _ = writeln!(out, "</ul>");
}

/// Renders the invoice as a standalone HTML page.
pub fn render_html(invoice: &Invoice<'_>) -> String {
    let title = format!("Invoice {}", month_title(invoice));
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html>");
    let _ = writeln!(out, "<head><meta charset=\"utf-8\"><title>{}</title></head>", escape(&title));
    let _ = writeln!(out, "<body>");
    let _ = writeln!(out, "<h1>{}</h1>", escape(&title));

    for bucket in non_empty(invoice) {
        let _ = writeln!(
            out,
            "<h2>{} <small>{} x = {} EUR</small></h2>",
            escape(&bucket.label),
            bucket.len(),
            money(bucket.subtotal())
        );
        let _ = writeln!(out, "<table>");
        let _ = writeln!(
            out,
            "  <tr><th>Student</th><th>Financing</th><th>Date</th><th>Status</th><th>Price</th></tr>"
        );
        for session in &bucket.sessions {
            let (name, financed, date, status, price) = session_line(session);
            let _ = writeln!(
                out,
                "  <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&name),
                financed,
                nice_date(&date),
                escape(&status),
                money(price)
            );
        }
        let _ = writeln!(out, "</table>");
    }

    let _ = writeln!(
        out,
        "<p><strong>Total: {} sessions = {} EUR</strong></p>",
        invoice.session_count(),
        money(invoice.total())
    );

    if !invoice.auto_financed_students.is_empty() {
        let _ = writeln!(out, "<h2>Auto-financed students</h2>");
        let _ = writeln!(out, "<ul>");
        for student in &invoice.auto_financed_students {
            let _ = writeln!(out, "  <li>{}</li>", escape(student.name()));
        }
        let _ = writeln!(out, "</ul>");
    }

    html_session_list(&mut out, "Not charged", &invoice.no_charge);
    html_session_list(&mut out, "To complete", &invoice.to_complete);

    let _ = writeln!(
        out,
        "<footer>Generated {} in {:.1}s</footer>",
        nice_date(&invoice.generated_at),
        invoice.duration.as_secs_f64()
    );
    let _ = writeln!(out, "</body>");
    let _ = writeln!(out, "</html>");
    out
}
