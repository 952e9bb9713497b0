//! Streaming HTML rewriting (spec.md §4.D "Response path — body", HTML
//! strategy): rewrites path-valued attributes, strips SRI `integrity`
//! attributes, and injects the runtime interceptor `<script>` immediately
//! after `<head>`'s opening tag (or prepends it to `<body>` if the document
//! never produces a `<head>`).
//!
//! No full-document buffering: chunks are held only long enough to find a
//! complete tag boundary (mirroring the teacher's `transforms/streaming.rs`
//! line-buffering idiom, generalized from newline boundaries to `>` tag
//! boundaries), bounded by [`MAX_HOLDBACK_BYTES`] so a body with no closing
//! `>` for a long stretch doesn't grow the buffer unbounded.

use once_cell::sync::Lazy;
use regex::Regex;

use super::interceptor;
use super::rewrite::rewrite_url;

/// Upper bound on how long the rewriter will withhold output waiting for a
/// tag boundary or an injection point before flushing what it has anyway.
const MAX_HOLDBACK_BYTES: usize = 64 * 1024;

static URL_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(href|src|action|poster|formaction)\s*=\s*("([^"]*)"|'([^']*)')"#).unwrap()
});
static SRCSET_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\bsrcset\s*=\s*("([^"]*)"|'([^']*)')"#).unwrap());
static SRCSET_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S+)(\s+[\d.]+[xw])?").unwrap());
static META_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta\b[^>]*\bname\s*=\s*["'][^"']*["'][^>]*\bcontent\s*=\s*("([^"]*)"|'([^']*)')[^>]*>"#).unwrap()
});
static DATA_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\bdata-[a-z-]+\s*=\s*("([^"]*)"|'([^']*)')"#).unwrap());
static INTEGRITY_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s+integrity\s*=\s*("[^"]*"|'[^']*')"#).unwrap());
static HEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head[^>]*>").unwrap());
static BODY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body[^>]*>").unwrap());

/// Rewrite every path-valued attribute and strip `integrity` in one HTML
/// fragment. Safe to call on arbitrary substrings since it only touches
/// attribute-value text, never tag structure.
fn rewrite_fragment(fragment: &str, slug: &str, backend_origin: &str) -> String {
    let without_integrity = INTEGRITY_ATTR.replace_all(fragment, "");

    let step1 = URL_ATTR.replace_all(&without_integrity, |caps: &regex::Captures| {
        let attr = &caps[1];
        let quote = if caps.get(3).is_some() { '"' } else { '\'' };
        let value = caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str()).unwrap_or("");
        let rewritten = rewrite_url(value, slug, backend_origin);
        format!("{attr}={quote}{rewritten}{quote}")
    });

    let step2 = SRCSET_ATTR.replace_all(&step1, |caps: &regex::Captures| {
        let quote = if caps.get(2).is_some() { '"' } else { '\'' };
        let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or("");
        let rewritten = SRCSET_URL.replace_all(value, |c: &regex::Captures| {
            let url = rewrite_url(&c[1], slug, backend_origin);
            match c.get(2) {
                Some(descriptor) => format!("{url}{}", descriptor.as_str()),
                None => url,
            }
        });
        format!("srcset={quote}{rewritten}{quote}")
    });

    let step3 = META_CONTENT.replace_all(&step2, |caps: &regex::Captures| {
        let whole = caps.get(0).unwrap().as_str();
        let quote = if caps.get(2).is_some() { '"' } else { '\'' };
        let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or("");
        let rewritten = rewrite_url(value, slug, backend_origin);
        whole.replacen(&format!("{quote}{value}{quote}"), &format!("{quote}{rewritten}{quote}"), 1)
    });

    let step4 = DATA_ATTR.replace_all(&step3, |caps: &regex::Captures| {
        let whole = caps.get(0).unwrap().as_str();
        let quote = if caps.get(2).is_some() { '"' } else { '\'' };
        let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or("");
        if value.is_empty() || !(value.starts_with('/') || value.starts_with("http")) {
            return whole.to_string();
        }
        let rewritten = rewrite_url(value, slug, backend_origin);
        whole.replacen(&format!("{quote}{value}{quote}"), &format!("{quote}{rewritten}{quote}"), 1)
    });

    step4.into_owned()
}

pub struct HtmlRewriter {
    slug: String,
    backend_origin: String,
    buffer: String,
    injected: bool,
}

impl HtmlRewriter {
    pub fn new(slug: &str, backend_origin: &str) -> Self {
        Self {
            slug: slug.to_string(),
            backend_origin: backend_origin.to_string(),
            buffer: String::new(),
            injected: false,
        }
    }

    /// Feed a chunk of decoded text; returns output ready to send to the
    /// client now. Output is withheld only until the interceptor's
    /// injection point is found (or [`MAX_HOLDBACK_BYTES`] is exceeded).
    pub fn push(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);

        if !self.injected {
            if let Some(m) = HEAD_OPEN.find(&self.buffer) {
                let insert_at = m.end();
                let script = interceptor::render(&self.slug, &self.backend_origin);
                self.buffer.insert_str(insert_at, &script);
                self.injected = true;
            } else if self.buffer.len() >= MAX_HOLDBACK_BYTES {
                if let Some(m) = BODY_OPEN.find(&self.buffer) {
                    let insert_at = m.end();
                    let script = interceptor::render(&self.slug, &self.backend_origin);
                    self.buffer.insert_str(insert_at, &script);
                } else {
                    let script = interceptor::render(&self.slug, &self.backend_origin);
                    self.buffer.insert_str(0, &script);
                }
                self.injected = true;
            } else {
                // Keep buffering: we haven't found an injection point yet.
                return String::new();
            }
        }

        let Some(last_gt) = self.buffer.rfind('>') else {
            return String::new();
        };
        let flush_len = last_gt + 1;
        let to_flush: String = self.buffer.drain(..flush_len).collect();
        rewrite_fragment(&to_flush, &self.slug, &self.backend_origin)
    }

    /// Flush any remaining buffered tail at end of stream; injects the
    /// interceptor first if the document never produced a `<head>` or
    /// `<body>` tag at all.
    pub fn finish(&mut self) -> String {
        if !self.injected {
            let script = interceptor::render(&self.slug, &self.backend_origin);
            self.buffer.insert_str(0, &script);
            self.injected = true;
        }
        let rest = std::mem::take(&mut self.buffer);
        rewrite_fragment(&rest, &self.slug, &self.backend_origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "http://backend.internal:8080";

    fn rewrite_whole(html: &str, slug: &str) -> String {
        let mut r = HtmlRewriter::new(slug, ORIGIN);
        let mut out = r.push(html);
        out.push_str(&r.finish());
        out
    }

    #[test]
    fn iframe_unblocking_scenario_rewrites_href_and_injects_script() {
        let out = rewrite_whole("<html><head></head><body><a href=\"/x\">link</a></body></html>", "sonarr");
        assert!(out.contains("href=\"/proxy/sonarr/x\""));
        assert!(out.contains("data-muximux-intercept=\"sonarr\""));
        let head_pos = out.find("<head>").unwrap();
        let script_pos = out.find("data-muximux-intercept").unwrap();
        assert!(script_pos > head_pos);
    }

    #[test]
    fn strips_integrity_attribute() {
        let out = rewrite_whole(
            "<link rel=\"stylesheet\" href=\"/s.css\" integrity=\"sha384-abc\" crossorigin=\"anonymous\">",
            "app",
        );
        assert!(!out.contains("integrity"));
        assert!(out.contains("href=\"/proxy/app/s.css\""));
    }

    #[test]
    fn rewrites_absolute_backend_url_in_src() {
        let out = rewrite_whole("<img src=\"http://backend.internal:8080/img/a.png\">", "app");
        assert!(out.contains("src=\"/proxy/app/img/a.png\""));
    }

    #[test]
    fn rewrites_srcset_list_preserving_descriptors() {
        let out = rewrite_whole("<img srcset=\"/a.png 1x, /b.png 2x\">", "app");
        assert!(out.contains("srcset=\"/proxy/app/a.png 1x, /proxy/app/b.png 2x\""));
    }

    #[test]
    fn injects_into_body_when_no_head_present() {
        let out = rewrite_whole("<html><body><p>no head here</p></body></html>", "app");
        assert!(out.contains("data-muximux-intercept=\"app\""));
        let body_pos = out.find("<body>").unwrap();
        let script_pos = out.find("data-muximux-intercept").unwrap();
        assert!(script_pos > body_pos);
    }

    #[test]
    fn chunk_boundary_inside_a_tag_does_not_corrupt_output() {
        let html = "<a href=\"/x\">text</a>";
        let (first, second) = html.split_at(5);
        let mut r = HtmlRewriter::new("app", ORIGIN);
        let mut out = r.push(first);
        out.push_str(&r.push(second));
        out.push_str(&r.finish());
        assert!(out.contains("href=\"/proxy/app/x\""));
    }
}
