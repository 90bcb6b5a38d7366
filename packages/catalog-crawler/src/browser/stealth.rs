//! Stealth hardening: launch flags and the script injected into every new
//! document to hide automation indicators (§4.4).

use std::path::Path;

use chromiumoxide::browser::{BrowserConfig, BrowserConfigBuilder};
use chromiumoxide::Page;

use crate::error::{CrawlError, Result};

/// Launch flags disabling the catalogued set of automation-detectable
/// browser features.
const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--no-first-run",
    "--disable-dev-shm-usage",
    "--window-size=1440,900",
];

const REALISTIC_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Script injected before every page load: removes `navigator.webdriver`,
/// fabricates a plausible plugin/language list, and stubs `window.chrome`.
pub const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
window.chrome = window.chrome || { runtime: {} };
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
  parameters.name === 'notifications'
    ? Promise.resolve({ state: Notification.permission })
    : originalQuery(parameters)
);
"#;

pub fn browser_config(profile_dir: &Path) -> Result<BrowserConfig> {
    let mut builder: BrowserConfigBuilder = BrowserConfig::builder()
        .user_data_dir(profile_dir)
        .user_agent(REALISTIC_USER_AGENT)
        .viewport(None);

    for arg in STEALTH_ARGS {
        builder = builder.arg(*arg);
    }

    builder
        .build()
        .map_err(|e| CrawlError::Fatal(format!("could not build browser config: {e}")))
}

/// Applies the stealth script to `page` so it runs before any page script.
pub async fn apply_stealth(page: &Page) -> Result<()> {
    page.evaluate_on_new_document(STEALTH_SCRIPT)
        .await
        .map_err(|e| CrawlError::NavigationFailed(format!("stealth script injection failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stealth_script_disables_the_webdriver_flag() {
        assert!(STEALTH_SCRIPT.contains("navigator.webdriver"));
    }

    #[test]
    fn launch_args_disable_automation_controlled_blink_feature() {
        assert!(STEALTH_ARGS.iter().any(|a| a.contains("AutomationControlled")));
    }
}
