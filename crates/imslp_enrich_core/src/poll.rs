use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::http::Sleeper;
use crate::wiki::{PageObject, WikiClient};

/// Fetch the page object, re-fetching up to `attempts` times while it reports
/// non-existence. A page that never appears is returned as-is, not as an error.
pub fn wait_for_existence(
    wiki: &dyn WikiClient,
    sleeper: &dyn Sleeper,
    title: &str,
    attempts: u32,
    delay: Duration,
) -> Result<PageObject> {
    let mut page = wiki.page(title)?;
    let mut refetches = 0u32;
    while !page.exists && refetches < attempts {
        debug!(title, refetches, "page not visible yet; polling again");
        sleeper.sleep(delay);
        page = wiki.page(title)?;
        refetches += 1;
    }
    Ok(page)
}
