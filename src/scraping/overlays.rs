use tracing::debug;

use crate::config::Timings;
use crate::scraping::driver::{settle, wait_for, PageDriver, Query};
use crate::signal::RunSignal;

/// Transient prompts the site shows after login, most likely first.
pub const KNOWN_OVERLAYS: &[(&str, &[&str])] = &[
    ("save_info", &["Not Now", "Not now"]),
    ("notifications", &["Not Now", "Not now"]),
    ("add_to_home", &["Not Now", "Cancel"]),
    ("generic", &["Skip", "Maybe Later", "No Thanks"]),
];

/// Matches a `<button>` or a `role="button"` div whose text contains `label`.
pub fn dismiss_button_query(label: &str) -> Query {
    Query::xpath(format!(
        "//button[contains(text(), '{label}')] | //div[contains(text(), '{label}') and @role='button']"
    ))
}

/// Clicks away whichever known overlays are showing.
///
/// Every failure is swallowed: an overlay that is not there is the normal
/// case. Returns how many overlays were dismissed.
pub async fn dismiss_known_overlays<P: PageDriver + ?Sized>(
    page: &P,
    signal: &RunSignal,
    timings: &Timings,
) -> usize {
    let mut dismissed = 0;

    for (category, labels) in KNOWN_OVERLAYS {
        if signal.is_cancelled() {
            break;
        }

        for label in *labels {
            let Some(found) = wait_for(page, &dismiss_button_query(label), timings.overlay_wait).await
            else {
                continue;
            };
            let Some(button) = found.first() else {
                continue;
            };
            match page.click(button).await {
                Ok(()) => {
                    debug!("Handled {} popup", category);
                    dismissed += 1;
                    settle(timings.overlay_settle).await;
                    break;
                }
                Err(e) => debug!("Could not click '{}' on {} popup: {}", label, category, e),
            }
        }
    }

    dismissed
}
