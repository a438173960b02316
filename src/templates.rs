use actix_web::http::StatusCode;
use rust_embed::RustEmbed;

use crate::config::SITE_DESCRIPTION;
use crate::models::models::Post;

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

const ADMIN_NAV: &str = r#"<a href="/dashboard">Dashboard</a><a href="/add-post">Add post</a><a href="/logout">Logout</a>"#;
const PUBLIC_NAV: &str = r#"<a href="/">Home</a><a href="/admin">Admin</a>"#;

fn load(name: &str) -> anyhow::Result<String> {
    let file = Templates::get(name).ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?;
    Ok(String::from_utf8(file.data.into_owned())?)
}

/// Replaces every `{{key}}` marker in one pass. Substituted values are not
/// rescanned, so user content can never expand into another marker. Unknown
/// markers are left as they are.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match values.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn text(value: &str) -> String {
    html_escape::encode_text(value).into_owned()
}

fn attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}

fn timestamp(post_time: &chrono::DateTime<chrono::Utc>) -> String {
    post_time.format("%Y-%m-%d %H:%M").to_string()
}

fn page(title: &str, nav: &str, content: &str) -> anyhow::Result<String> {
    let layout = load("layout.html")?;
    Ok(fill(
        &layout,
        &[
            ("title", &text(title)),
            ("description", &attr(SITE_DESCRIPTION)),
            ("nav", nav),
            ("content", content),
        ],
    ))
}

pub fn render_login() -> anyhow::Result<String> {
    page("Admin", PUBLIC_NAV, &load("login.html")?)
}

pub fn render_dashboard(posts: &[Post]) -> anyhow::Result<String> {
    let row = load("dashboard_row.html")?;
    let rows: String = posts
        .iter()
        .map(|post| {
            fill(
                &row,
                &[
                    ("id", &attr(&post.id)),
                    ("title", &text(&post.title)),
                    ("updated_at", &timestamp(&post.updated_at)),
                ],
            )
        })
        .collect();

    let content = fill(&load("dashboard.html")?, &[("rows", &rows)]);
    page("Admin", ADMIN_NAV, &content)
}

/// The add form when `post` is `None`, otherwise the edit form pre-filled
/// with the post's current values.
pub fn render_post_form(post: Option<&Post>) -> anyhow::Result<String> {
    let (title, heading, action, submit) = match post {
        Some(p) => (
            "Edit Post",
            "Edit Post",
            format!("/edit-post/{}?_method=PUT", p.id),
            "Update",
        ),
        None => ("Add Post", "Add New Post", "/add-post".to_string(), "Add"),
    };
    let post_title = post.map(|p| p.title.as_str()).unwrap_or_default();
    let post_body = post.map(|p| p.body.as_str()).unwrap_or_default();

    let content = fill(
        &load("post_form.html")?,
        &[
            ("heading", heading),
            ("action", &attr(&action)),
            ("post_title", &attr(post_title)),
            ("post_body", &text(post_body)),
            ("submit", submit),
        ],
    );
    page(title, ADMIN_NAV, &content)
}

pub fn render_index(posts: &[Post]) -> anyhow::Result<String> {
    let item = load("index_item.html")?;
    let items: String = posts
        .iter()
        .map(|post| {
            fill(
                &item,
                &[
                    ("title", &text(&post.title)),
                    ("created_at", &timestamp(&post.created_at)),
                    ("body", &text(&post.body)),
                ],
            )
        })
        .collect();

    let content = fill(&load("index.html")?, &[("posts", &items)]);
    page("Quill", PUBLIC_NAV, &content)
}

pub fn render_error(status: StatusCode, message: &str) -> anyhow::Result<String> {
    let status_line = match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    };
    let content = fill(
        &load("error.html")?,
        &[("status", &text(&status_line)), ("message", &text(message))],
    );
    page(&status_line, PUBLIC_NAV, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(title: &str, body: &str) -> Post {
        let now = Utc::now();
        Post {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn fill_is_single_pass() {
        let out = fill("<p>{{a}}</p><p>{{b}}</p>", &[("a", "{{b}}"), ("b", "x")]);
        assert_eq!(out, "<p>{{b}}</p><p>x</p>");
    }

    #[test]
    fn fill_keeps_unknown_and_unterminated_markers() {
        assert_eq!(fill("{{nope}} and {{a}}", &[("a", "1")]), "{{nope}} and 1");
        assert_eq!(fill("tail {{open", &[]), "tail {{open");
    }

    #[test]
    fn dashboard_lists_and_escapes_titles() {
        let p = post("<script>alert(1)</script>", "b");
        let html = render_dashboard(std::slice::from_ref(&p)).unwrap();
        assert!(html.contains(&format!("/edit-post/{}", p.id)));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn edit_form_is_prefilled() {
        let p = post("Say \"hi\"", "Body & soul");
        let html = render_post_form(Some(&p)).unwrap();
        assert!(html.contains("Say &quot;hi&quot;"));
        assert!(html.contains("Body &amp; soul"));
        assert!(html.contains(&format!("/edit-post/{}?_method=PUT", p.id)));
    }

    #[test]
    fn add_form_is_empty() {
        let html = render_post_form(None).unwrap();
        assert!(html.contains(r#"action="/add-post""#));
        assert!(html.contains(r#"value="""#));
    }

    #[test]
    fn error_page_shows_status_and_message() {
        let html = render_error(StatusCode::NOT_FOUND, "Post not found").unwrap();
        assert!(html.contains("404 Not Found"));
        assert!(html.contains("Post not found"));
    }
}
