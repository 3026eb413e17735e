//! Server-rendered HTML for the login challenge and error pages.

const STYLES: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: #f4f5f7;
    color: #1f2328;
    min-height: 100vh;
    display: flex;
    justify-content: center;
    align-items: center;
}
.container { width: 100%; max-width: 400px; padding: 1rem; }
h2 { text-align: center; font-weight: 500; margin-bottom: 1.5rem; }
.card {
    background: #fff;
    border: 1px solid #d0d7de;
    border-radius: 8px;
    padding: 1.25rem;
    margin-bottom: 1rem;
}
.card-title { font-size: 0.875rem; color: #57606a; margin-bottom: 0.75rem; }
.form-input {
    width: 100%;
    padding: 0.5rem 0.75rem;
    margin-bottom: 0.75rem;
    border: 1px solid #d0d7de;
    border-radius: 6px;
    font-size: 0.9375rem;
}
.btn {
    width: 100%;
    padding: 0.55rem 1rem;
    border: none;
    border-radius: 6px;
    font-size: 0.9375rem;
    cursor: pointer;
    text-decoration: none;
    display: inline-block;
    text-align: center;
}
.btn-primary { background: #2563eb; color: #fff; }
.btn-link { background: #fff; color: #1f2328; border: 1px solid #d0d7de; }
.error-title { font-size: 1.25rem; margin-bottom: 0.5rem; }
.error-description { color: #57606a; margin-bottom: 1.25rem; }
"#;

/// Everything a provider fragment needs: where it posts, where the user goes
/// afterwards and the provider name shown on the button.
#[derive(Debug, Clone)]
pub struct LoginPartial<'a> {
    pub action: &'a str,
    pub redirect: &'a str,
    pub name: &'a str,
}

/// Username/password form posting to the provider's start route.
#[must_use]
pub fn form_fragment(partial: &LoginPartial<'_>) -> String {
    let mut content = String::with_capacity(1024);

    content.push_str("<div class=\"card\">\n");
    content.push_str("<div class=\"card-title\">");
    content.push_str(&html_escape(partial.name));
    content.push_str("</div>\n");
    content.push_str("<form method=\"POST\" action=\"");
    content.push_str(&html_escape(partial.action));
    content.push_str("\">\n");
    content.push_str("<input type=\"hidden\" name=\"rd\" value=\"");
    content.push_str(&html_escape(partial.redirect));
    content.push_str("\">\n");
    content.push_str(
        "<input type=\"text\" name=\"username\" class=\"form-input\" placeholder=\"Username\" ",
    );
    content.push_str("required autocomplete=\"username\">\n");
    content.push_str(
        "<input type=\"password\" name=\"password\" class=\"form-input\" placeholder=\"Password\" ",
    );
    content.push_str("required autocomplete=\"current-password\">\n");
    content.push_str("<button type=\"submit\" class=\"btn btn-primary\">Sign in</button>\n");
    content.push_str("</form>\n</div>\n");

    content
}

/// Single button sending the browser to a delegated provider.
#[must_use]
pub fn link_fragment(partial: &LoginPartial<'_>) -> String {
    let mut content = String::with_capacity(512);

    content.push_str("<div class=\"card\">\n");
    content.push_str("<form method=\"GET\" action=\"");
    content.push_str(&html_escape(partial.action));
    content.push_str("\">\n");
    content.push_str("<input type=\"hidden\" name=\"rd\" value=\"");
    content.push_str(&html_escape(partial.redirect));
    content.push_str("\">\n");
    content.push_str("<button type=\"submit\" class=\"btn btn-link\">Sign in with ");
    content.push_str(&html_escape(partial.name));
    content.push_str("</button>\n</form>\n</div>\n");

    content
}

/// Login page wrapping the already rendered provider fragments.
///
/// Fragments are inserted as is; they were escaped when rendered.
#[must_use]
pub fn login_page(fragments: &[String]) -> String {
    let mut content = String::with_capacity(1024 + fragments.iter().map(String::len).sum::<usize>());

    content.push_str("<h2>Please login to proceed</h2>\n");
    for fragment in fragments {
        content.push_str(fragment);
    }

    html_page("Login", &content)
}

/// Error page with a link back to the login challenge.
#[must_use]
pub fn error_page(title: &str, message: &str, login_path: &str) -> String {
    let mut content = String::with_capacity(512);

    content.push_str("<div class=\"card\" style=\"text-align: center;\">\n");
    content.push_str("<div class=\"error-title\">");
    content.push_str(&html_escape(title));
    content.push_str("</div>\n");
    content.push_str("<div class=\"error-description\">");
    content.push_str(&html_escape(message));
    content.push_str("</div>\n");
    content.push_str("<a class=\"btn btn-primary\" href=\"");
    content.push_str(&html_escape(login_path));
    content.push_str("\">Back to login page</a>\n</div>");

    html_page("Oops!", &content)
}

fn html_page(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{STYLES}</style>\n</head>\n<body>\n\
         <div class=\"container\">\n{content}\n</div>\n</body>\n</html>\n",
        html_escape(title)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial<'a>(action: &'a str, redirect: &'a str, name: &'a str) -> LoginPartial<'a> {
        LoginPartial {
            action,
            redirect,
            name,
        }
    }

    #[test]
    fn test_form_fragment_posts_credentials() {
        let html = form_fragment(&partial("/auth/ldap/start", "/reports", "LDAP"));
        assert!(html.contains(r#"method="POST" action="/auth/ldap/start""#));
        assert!(html.contains(r#"name="username""#));
        assert!(html.contains(r#"name="password""#));
        assert!(html.contains(r#"name="rd" value="/reports""#));
    }

    #[test]
    fn test_link_fragment_is_a_get_button() {
        let html = link_fragment(&partial("/oauth2/google/start", "/", "Google"));
        assert!(html.contains(r#"method="GET" action="/oauth2/google/start""#));
        assert!(html.contains("Sign in with Google"));
        assert!(!html.contains("password"));
    }

    #[test]
    fn test_redirect_is_escaped() {
        let html = link_fragment(&partial("/oauth2/google/start", "/a?x=\"><script>", "Google"));
        assert!(html.contains("/a?x=&quot;&gt;&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_login_page_keeps_fragment_order() {
        let html = login_page(&["<p>first</p>".to_string(), "<p>second</p>".to_string()]);
        let first = html.find("first");
        let second = html.find("second");
        assert!(first.is_some() && second.is_some());
        assert!(first < second);
        assert!(html.contains("Please login to proceed"));
    }

    #[test]
    fn test_render_error_page() {
        let html = error_page("Login Failed", "Invalid credentials", "/auth");
        assert!(html.contains("Login Failed"));
        assert!(html.contains("Invalid credentials"));
        assert!(html.contains(r#"href="/auth""#));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("a&b"), "a&amp;b");
        assert_eq!(html_escape("\"quoted\""), "&quot;quoted&quot;");
    }
}
