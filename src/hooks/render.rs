use crate::config::HostConfig;
use crate::models::Injection;

/// Render queued injections as markup for the host to print into the page.
pub fn render_html(injections: &[Injection], host: &HostConfig) -> String {
    let mut html = String::new();
    for injection in injections {
        match injection {
            Injection::Assets { js, css } => {
                html.push_str(&format!(
                    "<script type=\"text/javascript\" src=\"{}\"></script>\n",
                    escape_attr(js)
                ));
                html.push_str(&format!(
                    "<link rel=\"stylesheet\" type=\"text/css\" href=\"{}\">\n",
                    escape_attr(css)
                ));
            }
            Injection::Init { payload } => {
                let json = match serde_json::to_string(payload) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize page payload");
                        continue;
                    }
                };
                html.push_str(&format!(
                    "\n<script>$(() => {}.init({}, {}));</script>\n",
                    host.js_object,
                    script_safe(&json),
                    host.jsmo_name
                ));
            }
        }
    }
    html
}

/// Make JSON safe to embed in an inline `<script>` element. The result is
/// still valid JSON.
fn script_safe(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateConfig, FeatureConfig, FeatureParams, PagePayload};
    use serde_json::json;

    #[test]
    fn init_script_embeds_payload_safely() {
        let mut params = FeatureParams::new();
        params.insert("linkLabel".into(), json!("<span>AI</span> Reveal"));
        let payload = PagePayload::new(
            AggregateConfig {
                features: vec![FeatureConfig::new("reveal-hidden", params)],
                errors: vec![],
            },
            "0.3.0",
            false,
        );
        let host = HostConfig::new("https://host.example.org/", "14.5.0");

        let html = render_html(&[Injection::Init { payload }], &host);

        assert!(html.contains("DE_RUB_AdminInsights.init({\"features\""));
        assert!(html.contains("\\u003cspan\\u003eAI\\u003c/span\\u003e"));
        assert_eq!(html.matches("</script>").count(), 1);
    }

    #[test]
    fn embedded_payload_stays_valid_json() {
        let mut params = FeatureParams::new();
        params.insert("note".into(), json!("<!-- a --> </script> & \u{2028}"));
        let config = AggregateConfig {
            features: vec![FeatureConfig::new("reveal-hidden", params)],
            errors: vec![],
        };
        let payload = PagePayload::new(config, "0.3.0", true);
        let json = serde_json::to_string(&payload).unwrap();

        let safe = script_safe(&json);

        assert!(!safe.contains('<'));
        assert!(!safe.contains("-->"));
        let parsed: PagePayload = serde_json::from_str(&safe).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn assets_render_script_and_stylesheet_tags() {
        let host = HostConfig::new("https://host.example.org/", "14.5.0");
        let html = render_html(
            &[Injection::Assets {
                js: host.script_url(),
                css: host.stylesheet_url(),
            }],
            &host,
        );

        assert!(html.contains("src=\"https://host.example.org/modules/admin_insights/js/admin-insights.js\""));
        assert!(html.contains("rel=\"stylesheet\""));
    }
}
