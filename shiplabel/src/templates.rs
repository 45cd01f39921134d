//! HTML pages, compiled into the binary.

use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;

use crate::errors::Error;

pub const LOGIN_PAGE: &str = "login.html";
pub const LABEL_FORM_PAGE: &str = "label_form.html";

/// Build the template environment with every page registered.
pub fn environment() -> Result<Environment<'static>, Error> {
    let mut env = Environment::new();
    for (name, source) in [
        (LOGIN_PAGE, include_str!("../templates/login.html")),
        (LABEL_FORM_PAGE, include_str!("../templates/label_form.html")),
    ] {
        env.add_template(name, source).map_err(|e| Error::Internal {
            operation: format!("compile template {name}: {e}"),
        })?;
    }
    Ok(env)
}

/// Render a registered page.
pub fn render(env: &Environment<'static>, name: &str, context: impl Serialize) -> Result<Html<String>, Error> {
    let template = env.get_template(name).map_err(|e| Error::Internal {
        operation: format!("load template {name}: {e}"),
    })?;
    let html = template.render(context).map_err(|e| Error::Internal {
        operation: format!("render template {name}: {e}"),
    })?;
    Ok(Html(html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_pages_render() {
        let env = environment().unwrap();

        let Html(login) = render(&env, LOGIN_PAGE, context! { title => "Delivery Label" }).unwrap();
        assert!(login.contains(r#"action="/login""#));
        assert!(login.contains(r#"name="password""#));

        let Html(form) = render(&env, LABEL_FORM_PAGE, context! { title => "Delivery Label", username => "dispatch" }).unwrap();
        assert!(form.contains(r#"action="/generate-label""#));
        assert!(form.contains(r#"name="senderName""#));
        assert!(form.contains(r#"name="receiverAddress""#));
        assert!(form.contains("dispatch"));
    }

    #[test]
    fn test_values_are_escaped() {
        let env = environment().unwrap();
        let Html(form) = render(&env, LABEL_FORM_PAGE, context! { title => "<b>", username => "<script>" }).unwrap();
        assert!(!form.contains("<script>"));
        assert!(form.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_unknown_template() {
        let env = environment().unwrap();
        assert!(matches!(render(&env, "missing.html", ()), Err(Error::Internal { .. })));
    }
}
