// =============================================================================
// VIEWS MODULE
// =============================================================================
// Renders the one HTML page the service serves.
//
// Every value that came from the visitor goes through `escape()` before it
// is written into the page.
// =============================================================================

use std::fmt::Write;

use axum::response::Html;

use crate::models::{ContactForm, Notification};
use crate::validation::{Field, FieldErrors};

/// Everything the contact page needs for one render.
#[derive(Debug, Default)]
pub struct ContactPage {
    /// Values to pre-fill (empty on a plain GET)
    pub values: ContactForm,

    pub errors: FieldErrors,

    /// One-time flash message from the previous request
    pub notification: Option<Notification>,

    /// Token for the hidden field; `None` when CSRF is disabled
    pub csrf_token: Option<String>,
}

impl ContactPage {
    pub fn render(&self) -> Html<String> {
        let mut body = String::with_capacity(2048);

        body.push_str(
            "<!doctype html>\n<html lang=\"en\">\n<head>\n\
             <meta charset=\"utf-8\">\n<title>Contact us</title>\n</head>\n<body>\n\
             <h1>Contact us</h1>\n",
        );

        if let Some(notification) = &self.notification {
            let _ = writeln!(
                body,
                "<div class=\"flash {}\">{}</div>",
                notification.kind.css_class(),
                escape(&notification.message)
            );
        }

        body.push_str("<form method=\"post\" action=\"/\" novalidate>\n");
        self.field_errors(&mut body, Field::Form);

        if let Some(token) = &self.csrf_token {
            let _ = writeln!(
                body,
                "<input type=\"hidden\" name=\"csrf_token\" value=\"{}\">",
                escape(token)
            );
        }
        self.field_errors(&mut body, Field::CsrfToken);

        self.input(&mut body, Field::Name, "Name", &self.values.name);
        self.input(&mut body, Field::Email, "Email", &self.values.email);

        body.push_str("<p>\n<label for=\"message\">Message</label>\n");
        let _ = writeln!(
            body,
            "<textarea id=\"message\" name=\"message\" rows=\"6\">{}</textarea>",
            escape(&self.values.message)
        );
        self.field_errors(&mut body, Field::Message);
        body.push_str("</p>\n");

        body.push_str("<button type=\"submit\">Send</button>\n</form>\n</body>\n</html>\n");

        Html(body)
    }

    fn input(&self, body: &mut String, field: Field, label: &str, value: &str) {
        let name = field.as_str();
        let kind = if field == Field::Email { "email" } else { "text" };

        let _ = writeln!(body, "<p>\n<label for=\"{name}\">{label}</label>");
        let _ = writeln!(
            body,
            "<input type=\"{kind}\" id=\"{name}\" name=\"{name}\" value=\"{}\">",
            escape(value)
        );
        self.field_errors(body, field);
        body.push_str("</p>\n");
    }

    fn field_errors(&self, body: &mut String, field: Field) {
        let messages = self.errors.get(field);
        if messages.is_empty() {
            return;
        }

        let _ = writeln!(body, "<ul class=\"errors\" data-field=\"{}\">", field.as_str());
        for message in messages {
            let _ = writeln!(body, "<li>{}</li>", escape(message));
        }
        body.push_str("</ul>\n");
    }
}

/// Minimal HTML escaping for text and double-quoted attribute values.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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
