use tracing::{info, warn};

use crate::config::{Credentials, SiteUrls, Timings};
use crate::error::AppError;
use crate::scraping::driver::{
    navigate_within, settle, wait_for, DriverError, PageDriver, Query, ENTER_KEY,
};
use crate::scraping::overlays::dismiss_known_overlays;
use crate::signal::RunSignal;

pub const USERNAME_FIELD: &str = "input[name='username']";
pub const PASSWORD_FIELD: &str = "input[name='password']";

const LOGIN_PAGE_ATTEMPTS: u32 = 3;

/// Logs in through the site's login form.
///
/// `Ok(false)` means the credentials were submitted but the site did not let
/// us through; `Err(LoginFormNotFound)` means the form itself is gone.
pub async fn establish_session<P: PageDriver + ?Sized>(
    page: &P,
    credentials: &Credentials,
    site: &SiteUrls,
    signal: &RunSignal,
    timings: &Timings,
) -> Result<bool, AppError> {
    info!("Logging in as {}...", credentials.identity);

    if let Err(e) = open_login_page(page, site, timings).await {
        warn!("Login page did not load: {}", e);
        return Ok(false);
    }

    let username = wait_for(page, &Query::css(USERNAME_FIELD), timings.login_form_wait).await;
    let password = wait_for(page, &Query::css(PASSWORD_FIELD), timings.element_wait).await;
    let (Some(username), Some(password)) = (username, password) else {
        return Err(AppError::LoginFormNotFound);
    };
    let (Some(username), Some(password)) = (username.first(), password.first()) else {
        return Err(AppError::LoginFormNotFound);
    };

    if let Err(e) = submit(page, username, password, credentials).await {
        warn!("Login failed: {}", e);
        return Ok(false);
    }

    settle(timings.login_settle).await;
    dismiss_known_overlays(page, signal, timings).await;

    match page.current_location().await {
        Ok(location) if location.contains(site.login_marker()) => {
            warn!("Login failed - still on login page");
            Ok(false)
        }
        Ok(_) => {
            info!("Login successful");
            Ok(true)
        }
        Err(e) => {
            warn!("Could not verify login: {}", e);
            Ok(false)
        }
    }
}

async fn open_login_page<P: PageDriver + ?Sized>(
    page: &P,
    site: &SiteUrls,
    timings: &Timings,
) -> Result<(), DriverError> {
    let url = site.login();
    let mut last_error = None;
    for attempt in 1..=LOGIN_PAGE_ATTEMPTS {
        match navigate_within(page, &url, timings.navigation_timeout).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("Login page load failed (attempt {}/{}): {}", attempt, LOGIN_PAGE_ATTEMPTS, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| DriverError::Navigation(url)))
}

async fn submit<P: PageDriver + ?Sized>(
    page: &P,
    username: &P::Element,
    password: &P::Element,
    credentials: &Credentials,
) -> Result<(), DriverError> {
    page.type_text(username, &credentials.identity).await?;
    page.type_text(password, &credentials.secret).await?;
    page.type_text(password, ENTER_KEY).await
}
