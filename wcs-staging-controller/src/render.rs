//! Server-rendered HTML for the admin surface. Every dynamic value goes
//! through [`escape_html`].

use axum::http::StatusCode;
use staging_core::{ActionOutcome, DetectorKind, StagingStatus};

use crate::{
    nonce::NONCE_FIELD,
    server::{ADMIN_PAGE_PATH, Diagnostics, LOGIN_PATH},
};

const PAGE_TITLE: &str = "WooCommerce Subscriptions Staging Controller";

const STYLE: &str = concat!(
    "body{font-family:system-ui,sans-serif;margin:2rem;max-width:60rem;color:#1d2327}",
    ".notice{padding:.75rem 1rem;margin:1rem 0;border-left:4px solid}",
    ".notice-success{border-color:#00a32a;background:#edfaef}",
    ".notice-error{border-color:#d63638;background:#fcf0f1}",
    ".notice-warning{border-color:#dba617;background:#fcf9e8}",
    ".card{border:1px solid #c3c4c7;padding:1rem 1.25rem;margin:1rem 0;background:#fff}",
    ".panel{padding:15px;margin-bottom:15px;border-left:4px solid}",
    ".panel-live{background:#f0f8ff;border-color:#0073aa}",
    ".panel-staging{background:#fff3cd;border-color:#ffc107}",
    ".panel-manual{background:#f8f9fa;border-color:#6c757d}",
    ".panel-repair{background:#fcf0f1;border-color:#d63638}",
    "th{text-align:left;padding-right:1.5rem}",
    ".mode-staging{color:red;font-weight:bold}.mode-live{color:green;font-weight:bold}",
    "code{word-break:break-all}"
);

pub struct AdminPageView<'a> {
    pub status: &'a StagingStatus,
    pub notices: &'a [ActionOutcome],
    pub nonce: &'a str,
    pub diagnostics: &'a Diagnostics,
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn admin_page(view: &AdminPageView<'_>) -> String {
    let status = view.status;
    let mut body = String::new();

    for notice in view.notices {
        let class = if notice.is_success() {
            "notice-success"
        } else {
            "notice-error"
        };
        body.push_str(&format!(
            "<div class=\"notice {class}\"><p>{}</p></div>\n",
            escape_html(notice.notice())
        ));
    }

    let (banner_class, mode_html, effect) = if status.is_staging {
        (
            "notice-error",
            "<span class=\"mode-staging\">STAGING MODE</span>",
            "Automatic payments disabled, manual renewals only",
        )
    } else {
        (
            "notice-success",
            "<span class=\"mode-live\">LIVE MODE</span>",
            "Automatic payments enabled",
        )
    };
    body.push_str(&format!(
        concat!(
            "<div class=\"notice {}\" id=\"status-banner\">\n",
            "<p><strong>Current Status:</strong> {}</p>\n",
            "<p><strong>Effect:</strong> {}</p>\n",
            "</div>\n"
        ),
        banner_class, mode_html, effect
    ));

    let stored_display = status.stored_url.as_deref().unwrap_or("Not set");
    let match_display = if status.urls_match {
        "&#9989; Yes"
    } else {
        "&#10060; No"
    };
    body.push_str(&format!(
        concat!(
            "<div class=\"card\">\n<h2>Current Settings</h2>\n<table>\n",
            "<tr><th>Current Site URL:</th><td>{}</td></tr>\n",
            "<tr><th>Stored Subscriptions URL:</th><td>{}</td></tr>\n",
            "<tr><th>URLs Match:</th><td>{}</td></tr>\n",
            "</table>\n</div>\n"
        ),
        escape_html(&status.canonical_url),
        escape_html(stored_display),
        match_display
    ));

    if status.is_corrupted() {
        body.push_str(&format!(
            concat!(
                "<div class=\"card panel panel-repair\" id=\"repair-panel\">\n",
                "<h2>Corrupted Stored URL</h2>\n",
                "<p>The stored URL still contains an unresolved placeholder. ",
                "Reset it to the current site URL ({}).</p>\n",
                "{}</div>\n"
            ),
            escape_html(&status.canonical_url),
            action_form(
                view.nonce,
                "repair_url",
                "Repair Stored URL",
                Some("Reset the stored URL to the current site URL?"),
            )
        ));
    }

    body.push_str("<div class=\"card\">\n<h2>Staging Mode Controls</h2>\n");
    if status.is_staging {
        body.push_str(&format!(
            concat!(
                "<div class=\"panel panel-live\">\n<h3>Enable Live Mode</h3>\n",
                "<p>Click below to enable automatic payments and switch to live mode:</p>\n",
                "{}</div>\n"
            ),
            action_form(
                view.nonce,
                "enable_live",
                "Enable Live Mode",
                Some("Are you sure you want to enable automatic payments on this site?"),
            )
        ));
    } else {
        body.push_str(&format!(
            concat!(
                "<div class=\"panel panel-staging\">\n<h3>Enable Staging Mode</h3>\n",
                "<p>Click below to disable automatic payments and switch to staging mode:</p>\n",
                "{}</div>\n"
            ),
            action_form(
                view.nonce,
                "enable_staging",
                "Enable Staging Mode",
                Some("This will disable automatic payments. Are you sure?"),
            )
        ));
    }
    body.push_str(&format!(
        concat!(
            "<div class=\"panel panel-manual\">\n<h3>Manual URL Control</h3>\n",
            "<p>Set a specific URL for WooCommerce Subscriptions:</p>\n",
            "<form method=\"post\" action=\"{action}\">\n",
            "<input type=\"hidden\" name=\"{field}\" value=\"{nonce}\">\n",
            "<input type=\"hidden\" name=\"action\" value=\"update_url\">\n",
            "<label>Set URL to: <input type=\"url\" name=\"new_url\" value=\"{site_url}\" size=\"50\" required></label>\n",
            "<p><small>This will determine if the site is in staging or live mode</small></p>\n",
            "<input type=\"submit\" value=\"Update URL\">\n",
            "</form>\n</div>\n</div>\n"
        ),
        action = ADMIN_PAGE_PATH,
        field = NONCE_FIELD,
        nonce = escape_html(view.nonce),
        site_url = escape_html(&status.canonical_url),
    ));

    body.push_str(concat!(
        "<div class=\"card\">\n<h2>How It Works</h2>\n<ul>\n",
        "<li><strong>Live Mode:</strong> Automatic payments enabled, subscription emails sent</li>\n",
        "<li><strong>Staging Mode:</strong> Manual renewals only, no automatic payments, subscription emails disabled</li>\n",
        "<li><strong>URL Comparison:</strong> WooCommerce Subscriptions compares the current site URL with the stored URL</li>\n",
        "<li><strong>Safety Feature:</strong> Staging mode prevents accidental payments on test sites</li>\n",
        "</ul>\n</div>\n"
    ));

    body.push_str(&diagnostics_panel(view.diagnostics));
    body.push_str(
        "<form method=\"post\" action=\"/logout\"><input type=\"submit\" value=\"Log out\"></form>\n",
    );

    document(PAGE_TITLE, &body)
}

pub fn billing_inactive_page(diagnostics: &Diagnostics) -> String {
    let mut body = String::from(concat!(
        "<div class=\"notice notice-error\" id=\"billing-inactive\">\n",
        "<p><strong>WooCommerce Subscriptions is not active.</strong> ",
        "Staging controls are unavailable until the billing system is installed and active.</p>\n",
        "</div>\n"
    ));
    body.push_str(&diagnostics_panel(diagnostics));
    document(PAGE_TITLE, &body)
}

pub fn login_page(error: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(error) = error {
        body.push_str(&format!(
            "<div class=\"notice notice-error\"><p>{}</p></div>\n",
            escape_html(error)
        ));
    }
    body.push_str(&format!(
        concat!(
            "<div class=\"card\">\n<h2>Administrator Login</h2>\n",
            "<form method=\"post\" action=\"{}\">\n",
            "<label>Admin token: <input type=\"password\" name=\"token\" required autofocus></label>\n",
            "<input type=\"submit\" value=\"Log in\">\n",
            "</form>\n</div>\n"
        ),
        LOGIN_PATH
    ));
    document(PAGE_TITLE, &body)
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        concat!(
            "<div class=\"notice notice-error\">\n",
            "<p><strong>{}</strong></p>\n<p>{}</p>\n",
            "</div>\n",
            "<p><a href=\"{}\">Back to the staging controller</a></p>\n"
        ),
        escape_html(status.canonical_reason().unwrap_or("Error")),
        escape_html(message),
        ADMIN_PAGE_PATH
    );
    document(PAGE_TITLE, &body)
}

fn diagnostics_panel(diagnostics: &Diagnostics) -> String {
    let raw_value = match diagnostics.raw_stored_value.as_deref() {
        Some(value) => format!("<code>{}</code>", escape_html(value)),
        None => "<em>(not set)</em>".to_string(),
    };
    let detector = match diagnostics.detector {
        DetectorKind::Authoritative => "Billing system status endpoint",
        DetectorKind::Fallback => "Local URL comparison",
    };
    format!(
        concat!(
            "<div class=\"card\" id=\"diagnostics\">\n<h2>Debug Information</h2>\n<table>\n",
            "<tr><th>Controller Version:</th><td>{}</td></tr>\n",
            "<tr><th>Subscriptions Active:</th><td>{}</td></tr>\n",
            "<tr><th>Subscriptions Version:</th><td>{}</td></tr>\n",
            "<tr><th>Staging Detection:</th><td>{}</td></tr>\n",
            "<tr><th>Raw Stored Value:</th><td>{}</td></tr>\n",
            "<tr><th>Stored Value Status:</th><td>{}</td></tr>\n",
            "</table>\n</div>\n"
        ),
        escape_html(&diagnostics.controller_version),
        if diagnostics.billing_active { "Yes" } else { "No" },
        escape_html(
            diagnostics
                .billing_version
                .as_deref()
                .unwrap_or("not detected")
        ),
        detector,
        raw_value,
        diagnostics.stored_state.label()
    )
}

fn action_form(nonce: &str, action: &str, label: &str, confirm: Option<&str>) -> String {
    let onclick = confirm
        .map(|message| {
            format!(
                " onclick=\"return confirm('{}')\"",
                escape_html(&message.replace('\'', "\\'"))
            )
        })
        .unwrap_or_default();
    format!(
        concat!(
            "<form method=\"post\" action=\"{}\">\n",
            "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
            "<input type=\"hidden\" name=\"action\" value=\"{}\">\n",
            "<input type=\"submit\" value=\"{}\"{}>\n",
            "</form>\n"
        ),
        ADMIN_PAGE_PATH,
        NONCE_FIELD,
        escape_html(nonce),
        escape_html(action),
        escape_html(label),
        onclick
    )
}

fn document(title: &str, body: &str) -> String {
    format!(
        concat!(
            "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n",
            "<title>{title}</title>\n<style>{style}</style>\n</head>\n",
            "<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n"
        ),
        title = escape_html(title),
        style = STYLE,
        body = body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use staging_core::StoredUrlState;

    fn status(stored: Option<&str>, is_staging: bool, state: StoredUrlState) -> StagingStatus {
        StagingStatus {
            is_staging,
            stored_url: stored.map(str::to_string),
            canonical_url: "https://shop.example.com".to_string(),
            urls_match: stored == Some("https://shop.example.com"),
            stored_state: state,
            detector: DetectorKind::Fallback,
        }
    }

    fn diagnostics(raw: Option<&str>, state: StoredUrlState) -> Diagnostics {
        Diagnostics {
            controller_version: "wcs-staging-controller untagged".to_string(),
            billing_active: true,
            billing_version: None,
            detector: DetectorKind::Fallback,
            raw_stored_value: raw.map(str::to_string),
            stored_state: state,
        }
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn live_page_offers_staging_control_and_not_set_marker() {
        let status = status(None, false, StoredUrlState::NotSet);
        let diagnostics = diagnostics(None, StoredUrlState::NotSet);
        let html = admin_page(&AdminPageView {
            status: &status,
            notices: &[],
            nonce: "abc123",
            diagnostics: &diagnostics,
        });
        assert!(html.contains("LIVE MODE"));
        assert!(html.contains("Not set"));
        assert!(html.contains("value=\"enable_staging\""));
        assert!(!html.contains("value=\"enable_live\""));
        assert!(!html.contains("repair-panel"));
        assert!(html.contains("name=\"wcs_staging_nonce\" value=\"abc123\""));
        assert!(html.contains("not detected"));
    }

    #[test]
    fn corrupted_page_shows_repair_form_and_escapes_values() {
        let raw = "<script>[wc_subscriptions_siteurl]";
        let status = status(Some(raw), true, StoredUrlState::Corrupted);
        let diagnostics = diagnostics(Some(raw), StoredUrlState::Corrupted);
        let html = admin_page(&AdminPageView {
            status: &status,
            notices: &[ActionOutcome::InvalidUrl],
            nonce: "abc123",
            diagnostics: &diagnostics,
        });
        assert!(html.contains("STAGING MODE"));
        assert!(html.contains("repair-panel"));
        assert!(html.contains("value=\"repair_url\""));
        assert!(html.contains("value=\"enable_live\""));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;[wc_subscriptions_siteurl]"));
        assert!(html.contains("notice-error\"><p>The URL you entered is not a valid absolute URL."));
    }

    #[test]
    fn inactive_billing_page_has_no_controls() {
        let html = billing_inactive_page(&diagnostics(None, StoredUrlState::NotSet));
        assert!(html.contains("billing-inactive"));
        assert!(!html.contains("<form"));
    }
}
