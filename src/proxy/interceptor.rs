//! The runtime interceptor (spec.md §4.D, glossary "Interceptor"): a small
//! static script injected into every proxied HTML document, patching the
//! browser APIs that construct URLs at runtime so they land back under
//! `/proxy/{slug}`. Synchronous, idempotent (a `data-muximux-intercept`
//! marker guards against double injection).

/// Render the interceptor `<script>` tag for a given slug and backend
/// origin. The rewrite logic mirrors [`super::rewrite::rewrite_url`]
/// exactly so client-side and server-side rewriting agree.
pub fn render(slug: &str, backend_origin: &str) -> String {
    format!(
        r#"<script data-muximux-intercept="{slug}">(function() {{
  if (window.__muximuxIntercepted) return;
  window.__muximuxIntercepted = true;
  var PREFIX = "/proxy/{slug}";
  var ORIGIN = {backend_origin_json};

  function rewrite(url) {{
    if (typeof url !== "string" || url.length === 0) return url;
    if (ORIGIN && url.indexOf(ORIGIN) === 0) {{
      var rest = url.slice(ORIGIN.length);
      if (rest === "" || rest.charAt(0) === "/") return PREFIX + rest;
    }}
    if (url.indexOf(PREFIX + "/") === 0 || url === PREFIX) return url;
    if (url.charAt(0) === "/" && url.charAt(1) !== "/") return PREFIX + url;
    return url;
  }}

  var origFetch = window.fetch;
  if (origFetch) {{
    window.fetch = function(input, init) {{
      if (typeof input === "string") {{
        input = rewrite(input);
      }} else if (input && typeof input.url === "string") {{
        input = new Request(rewrite(input.url), input);
      }}
      return origFetch.call(this, input, init);
    }};
  }}

  var origOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function(method, url) {{
    var args = Array.prototype.slice.call(arguments);
    args[1] = rewrite(url);
    return origOpen.apply(this, args);
  }};

  var OrigWebSocket = window.WebSocket;
  if (OrigWebSocket) {{
    window.WebSocket = function(url, protocols) {{
      var rewritten = rewrite(url).replace(/^http/, "ws");
      return protocols === undefined ? new OrigWebSocket(rewritten) : new OrigWebSocket(rewritten, protocols);
    }};
    window.WebSocket.prototype = OrigWebSocket.prototype;
  }}

  var OrigEventSource = window.EventSource;
  if (OrigEventSource) {{
    window.EventSource = function(url, config) {{
      return new OrigEventSource(rewrite(url), config);
    }};
    window.EventSource.prototype = OrigEventSource.prototype;
  }}

  var SRC_TAGS = ["IMG", "SCRIPT", "SOURCE", "VIDEO", "AUDIO"];
  function patchProp(proto, prop) {{
    var desc = Object.getOwnPropertyDescriptor(proto, prop);
    if (!desc || !desc.set) return;
    Object.defineProperty(proto, prop, {{
      get: desc.get,
      set: function(value) {{
        desc.set.call(this, rewrite(value));
      }},
      configurable: true,
    }});
  }}
  patchProp(HTMLImageElement.prototype, "src");
  patchProp(HTMLScriptElement.prototype, "src");
  patchProp(HTMLSourceElement.prototype, "src");
  patchProp(HTMLMediaElement.prototype, "src");
  patchProp(HTMLVideoElement.prototype, "poster");

  function patchElement(el) {{
    if (SRC_TAGS.indexOf(el.tagName) === -1) return;
    if (el.hasAttribute("src")) {{
      var v = el.getAttribute("src");
      var r = rewrite(v);
      if (r !== v) el.setAttribute("src", r);
    }}
    if (el.tagName === "VIDEO" && el.hasAttribute("poster")) {{
      var p = el.getAttribute("poster");
      var rp = rewrite(p);
      if (rp !== p) el.setAttribute("poster", rp);
    }}
  }}

  var observer = new MutationObserver(function(mutations) {{
    for (var i = 0; i < mutations.length; i++) {{
      var m = mutations[i];
      if (m.type === "attributes") {{
        patchElement(m.target);
      }} else if (m.type === "childList") {{
        m.addedNodes.forEach(function(node) {{
          if (node.nodeType !== 1) return;
          patchElement(node);
          if (node.querySelectorAll) {{
            var all = node.querySelectorAll(SRC_TAGS.join(","));
            for (var j = 0; j < all.length; j++) patchElement(all[j]);
          }}
        }});
      }}
    }}
  }});
  observer.observe(document.documentElement || document, {{
    childList: true,
    subtree: true,
    attributes: true,
    attributeFilter: ["src", "poster"],
  }});
}})();</script>"#,
        slug = slug,
        backend_origin_json = serde_json::to_string(backend_origin).unwrap_or_else(|_| "\"\"".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_deterministic_and_idempotent_marker_present() {
        let a = render("sonarr", "http://backend.internal:8080");
        let b = render("sonarr", "http://backend.internal:8080");
        assert_eq!(a, b);
        assert!(a.contains("__muximuxIntercepted"));
        assert!(a.contains("data-muximux-intercept=\"sonarr\""));
    }

    #[test]
    fn render_embeds_backend_origin_as_json_string() {
        let script = render("plex", "http://10.0.0.5:32400");
        assert!(script.contains("\"http://10.0.0.5:32400\""));
    }
}
