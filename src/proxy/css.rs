//! CSS rewriting (spec.md §4.D "Response path — body", CSS strategy):
//! rewrites `url(...)` operands and `@import` targets. Scheme-relative and
//! other-origin URLs are left alone; only root-relative and backend-absolute
//! URLs are rewritten, via the same [`super::rewrite::rewrite_url`] used
//! everywhere else.

use once_cell::sync::Lazy;
use regex::Regex;

use super::rewrite::rewrite_url;

static URL_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"url\(\s*(['"]?)([^'")]*)\1\s*\)"#).unwrap());
static IMPORT_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"@import\s+(['"])([^'"]*)\1"#).unwrap());

pub fn rewrite(css: &str, slug: &str, backend_origin: &str) -> String {
    let step1 = URL_FN.replace_all(css, |caps: &regex::Captures| {
        let quote = &caps[1];
        let value = &caps[2];
        let rewritten = rewrite_url(value, slug, backend_origin);
        format!("url({quote}{rewritten}{quote})")
    });

    let step2 = IMPORT_BARE.replace_all(&step1, |caps: &regex::Captures| {
        let quote = &caps[1];
        let value = &caps[2];
        let rewritten = rewrite_url(value, slug, backend_origin);
        format!("@import {quote}{rewritten}{quote}")
    });

    step2.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "http://backend.internal:8080";

    #[test]
    fn rewrites_root_relative_url_function() {
        let out = rewrite("body { background: url(/img/bg.png); }", "app", ORIGIN);
        assert_eq!(out, "body { background: url(/proxy/app/img/bg.png); }");
    }

    #[test]
    fn rewrites_backend_absolute_url_function() {
        let out = rewrite("a { background: url('http://backend.internal:8080/a.png'); }", "app", ORIGIN);
        assert_eq!(out, "a { background: url('/proxy/app/a.png'); }");
    }

    #[test]
    fn leaves_scheme_relative_and_other_origin_alone() {
        let css = "a { background: url(//cdn.example.com/a.png); } b { background: url(https://other.com/x.png); }";
        assert_eq!(rewrite(css, "app", ORIGIN), css);
    }

    #[test]
    fn rewrites_bare_string_import() {
        let out = rewrite("@import \"/fonts/a.css\";", "app", ORIGIN);
        assert_eq!(out, "@import \"/proxy/app/fonts/a.css\";");
    }

    #[test]
    fn rewrites_url_form_import() {
        let out = rewrite("@import url(/fonts/a.css);", "app", ORIGIN);
        assert_eq!(out, "@import url(/proxy/app/fonts/a.css);");
    }
}
