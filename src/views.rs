//! Server-rendered pages
//!
//! Plain HTML forms, one shared layout with the site header.

use axum::response::Html;

use crate::models::{Session, TrackedProperty};

/// Escape text for HTML element and attribute content
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
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

fn header(session: Option<&Session>) -> String {
    let account = match session {
        Some(session) => format!(
            r#"<span class="account">{}</span>
      <form method="post" action="/sign-out"><button type="submit">Sign out</button></form>"#,
            escape(session.user.email.as_deref().unwrap_or(""))
        ),
        None => String::new(),
    };

    format!(
        r#"<header>
      <a class="brand" href="/">Rightmove Tracker</a>
      {account}
    </header>"#
    )
}

fn layout(title: &str, session: Option<&Session>, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
  </head>
  <body>
    {header}
    <main>
{body}
    </main>
  </body>
</html>
"#,
        title = escape(title),
        header = header(session),
    ))
}

fn notice(class: &str, message: Option<&str>) -> String {
    message
        .map(|m| format!(r#"<div class="{}">{}</div>"#, class, escape(m)))
        .unwrap_or_default()
}

pub fn landing_page(session: Option<&Session>) -> Html<String> {
    let action = if session.is_some() {
        r#"<a href="/dashboard">Go to your dashboard</a>"#
    } else {
        r#"<a href="/sign-in">Sign in or create account</a>"#
    };

    let body = format!(
        r#"      <h1>Track Rightmove listings effortlessly</h1>
      <p>Get notified when property status changes</p>
      {action}
      <ol>
        <li>Track: paste the URL of any Rightmove property you're interested in</li>
        <li>Monitor: we check for status changes every day</li>
        <li>Get notified: receive an email when a property status changes</li>
      </ol>"#
    );

    layout("Rightmove Tracker", session, &body)
}

/// Sign-in page notices
#[derive(Debug, Default)]
pub struct SignInNotice<'a> {
    pub error: Option<&'a str>,
    pub link_sent: bool,
}

pub fn sign_in_page(notice_state: SignInNotice<'_>) -> Html<String> {
    let sent = notice_state.link_sent.then_some(
        "Magic link sent! Check your email to log in. If this is your first time, an account will be created automatically.",
    );

    let body = format!(
        r#"      <h1>Sign in to your account</h1>
      <p>Sign in or create a new account to track properties</p>
      <form method="post" action="/auth/oauth">
        <button type="submit">Sign in with Google</button>
      </form>
      <p>or</p>
      <form method="post" action="/auth/magic-link">
        <input type="email" name="email" placeholder="Email address" required>
        <button type="submit">Send magic link</button>
      </form>
      {error}
      {sent}"#,
        error = notice("error", notice_state.error),
        sent = notice("success", sent),
    );

    layout("Sign in", None, &body)
}

/// Dashboard notices and pending confirmation
#[derive(Debug, Default)]
pub struct DashboardNotice<'a> {
    pub error: Option<&'a str>,
    pub added: bool,
    pub removed: bool,
    /// Subscription awaiting unsubscribe confirmation
    pub confirm: Option<&'a str>,
}

fn tracked_item(tracked: &TrackedProperty, confirm: Option<&str>) -> String {
    let id = tracked.subscription_id.to_string();
    let property = &tracked.property;
    let checked = property
        .last_checked_at
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "Not checked yet".to_string());

    let control = if confirm == Some(id.as_str()) {
        format!(
            r#"<form method="post" action="/dashboard/subscriptions/{id}/unsubscribe">
            <input type="hidden" name="confirm" value="yes">
            <button type="submit">Confirm</button>
          </form>
          <a href="/dashboard">Cancel</a>"#
        )
    } else {
        format!(
            r#"<form method="post" action="/dashboard/subscriptions/{id}/unsubscribe">
            <button type="submit">Unsubscribe</button>
          </form>"#
        )
    };

    format!(
        r#"        <li id="subscription-{id}">
          <a href="{url}" target="_blank" rel="noopener noreferrer">{url}</a>
          <span class="status">Status: {status}</span>
          <span class="checked">Last checked: {checked}</span>
          {control}
        </li>"#,
        url = escape(&property.url),
        status = escape(property.status_or_unknown()),
    )
}

pub fn dashboard_page(
    session: &Session,
    tracked: &[TrackedProperty],
    notice_state: DashboardNotice<'_>,
) -> Html<String> {
    let list = if tracked.is_empty() {
        r#"      <p>You're not tracking any listings yet!</p>
      <p>Add a Rightmove property URL to start tracking.</p>"#
            .to_string()
    } else {
        let items: Vec<String> = tracked
            .iter()
            .map(|t| tracked_item(t, notice_state.confirm))
            .collect();
        format!("      <ul class=\"tracked\">\n{}\n      </ul>", items.join("\n"))
    };

    let added = notice_state
        .added
        .then_some("Property added successfully!");
    let removed = notice_state.removed.then_some("Property removed.");

    let body = format!(
        r#"      <h1>Dashboard</h1>
      <section>
        <h2>Add Property</h2>
        <form method="post" action="/dashboard/properties">
          <label for="propertyUrl">Rightmove Property URL</label>
          <input id="propertyUrl" name="url" type="url" placeholder="https://www.rightmove.co.uk/properties/123456789" required>
          <p>Example: https://www.rightmove.co.uk/properties/156861416</p>
          <button type="submit">Track Property</button>
        </form>
        {error}
        {added}
        {removed}
      </section>
      <section>
        <h2>Your Tracked Properties</h2>
{list}
      </section>"#,
        error = notice("error", notice_state.error),
        added = notice("success", added),
        removed = notice("success", removed),
    );

    layout("Dashboard", Some(session), &body)
}
