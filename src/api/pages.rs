//! Server-rendered HTML pages.

use std::fmt::Write;

use crate::store::{Plant, User};

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, error_mode: bool, body: &str) -> String {
    let (label, state) = if error_mode { ("on", "true") } else { ("off", "false") };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} - Carnivorous Greenhouse</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body data-error-mode="{state}">
<header>
<nav><a href="/">Home</a> <a href="/dashboard">Dashboard</a> <a href="/logout">Log out</a></nav>
<form method="post" action="/toggle_error_mode" class="error-mode">
<button type="submit">Error mode: {label}</button>
</form>
</header>
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
    )
}

fn error_paragraph(error: Option<&str>) -> String {
    error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape(e)))
        .unwrap_or_default()
}

pub fn index(error_mode: bool) -> String {
    layout(
        "Welcome",
        error_mode,
        r#"<h1>Carnivorous Greenhouse</h1>
<p>Live health monitoring for your flytraps, sundews and pitcher plants.</p>
<p><a href="/signup">Sign up</a> or <a href="/login">log in</a>.</p>"#,
    )
}

fn credentials_form(action: &str, submit: &str) -> String {
    format!(
        r#"<form method="post" action="{action}">
<label>Username <input name="username" required></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">{submit}</button>
</form>"#
    )
}

pub fn signup(error: Option<&str>, error_mode: bool) -> String {
    let body = format!(
        "<h1>Sign up</h1>\n{}{}",
        error_paragraph(error),
        credentials_form("/signup", "Create account")
    );
    layout("Sign up", error_mode, &body)
}

pub fn login(error_mode: bool) -> String {
    let body = format!("<h1>Log in</h1>\n{}", credentials_form("/login", "Log in"));
    layout("Log in", error_mode, &body)
}

pub fn dashboard(user: &User, plants: &[Plant], error_mode: bool) -> String {
    let mut rows = String::new();
    for plant in plants {
        let _ = writeln!(
            rows,
            r#"<li class="plant" data-plant-id="{id}"><span class="name">{name}</span> <span class="type">{kind}</span> <span class="health">{health}</span> <span class="reading"></span></li>"#,
            id = plant.id,
            name = escape(&plant.name),
            kind = escape(&plant.plant_type),
            health = escape(&plant.health_status),
        );
    }
    let body = format!(
        r#"<h1>{username}'s greenhouse</h1>
<p class="error" id="socket-error" hidden></p>
<ul id="plants">
{rows}</ul>
<form id="add-plant">
<label>Name <input name="plant_name" required></label>
<label>Type <input name="plant_type" required></label>
<button type="submit">Add plant</button>
</form>
<script src="/static/dashboard.js"></script>"#,
        username = escape(&user.username),
    );
    layout("Dashboard", error_mode, &body)
}
