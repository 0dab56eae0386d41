//! Minimal digest body rendering. HTML email templating details (styling,
//! branding, layout) are out of scope here; this produces the section
//! structure `ShouldSendToUser`/tests key off of and leaves presentation to
//! whatever template layer wraps it in production.

use crate::digest::model::{DigestData, UserRecord};

/// Page titles and comments originate from the edit stream, not this
/// service, so they're escaped before landing in an HTML body.
fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_digest(data: &DigestData, user: &UserRecord) -> String {
    let mut body = String::new();
    body.push_str("<html><body>\n");

    if user.content.wants_global() && !data.highlights.is_empty() {
        body.push_str("<h2>Global Highlights</h2>\n<ul>\n");
        for highlight in &data.highlights {
            body.push_str(&format!(
                "<li>{} ({} edits)</li>\n",
                escape(&highlight.title),
                highlight.edit_count
            ));
        }
        body.push_str("</ul>\n");
        body.push_str(&format!("<p>Total edits: {}</p>\n", data.total_edits));
        if !data.language_shares.is_empty() {
            body.push_str("<h3>Language share</h3>\n<ul>\n");
            for share in &data.language_shares {
                body.push_str(&format!(
                    "<li>{}: {:.1}%</li>\n",
                    escape(&share.language),
                    share.percentage
                ));
            }
            body.push_str("</ul>\n");
        }
    }

    if user.content.wants_watchlist() && !data.watchlist_events.is_empty() {
        body.push_str("<h2>Your Watchlist</h2>\n<ul>\n");
        for event in &data.watchlist_events {
            body.push_str(&format!(
                "<li>{}{}: {}</li>\n",
                escape(&event.title),
                if event.notable { " (notable)" } else { "" },
                escape(&event.note)
            ));
        }
        body.push_str("</ul>\n");
    }

    body.push_str("</body></html>\n");
    body
}

pub fn subject_for(data: &DigestData) -> String {
    match data.period {
        crate::digest::model::DigestPeriod::Daily => "Your daily WikiSurge digest".to_string(),
        crate::digest::model::DigestPeriod::Weekly => "Your weekly WikiSurge digest".to_string(),
    }
}
