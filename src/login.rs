use std::time::Duration;

use anyhow::Result;
use rand::{rng, Rng};
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::extract;
use crate::settings::Settings;

const COOKIE_BUTTON: &str =
    r#"button[data-test-id="cookies-accept-btn"], button[aria-label="Aceitar cookies"]"#;
const EMAIL_INPUT: &str = r#"input[name="id"]"#;
const PASSWORD_INPUT: &str = r#"input[name="password"]"#;
const LOGIN_BUTTON: &str = r#"button[data-test-id="login-button"]"#;

/// Markers that only render on a logged-in feed page.
const LOGGED_IN_MARKERS: &str = r#"div[aria-label="Feed de início"], [data-test-id="search-box"] input[type="search"], div[data-test-id="pin"]"#;

/// Log into the site with the configured credentials. Returns whether the
/// session ended up on a logged-in feed page; callers abort the run on
/// `false`.
pub async fn login(session: &BrowserSession, settings: &Settings) -> Result<bool> {
    let (Some(email), Some(password)) = (&settings.email, &settings.password) else {
        return Ok(false);
    };

    let origin = extract::site_origin(&settings.board_url);
    let login_url = format!("{}/login/", origin);
    info!("Logging in at {}", login_url);

    session.goto(&login_url).await?;
    humanized_pause(settings.delay_min_secs, settings.delay_max_secs).await;

    accept_cookie_banner(session).await;

    fill_field(session, EMAIL_INPUT, email).await?;
    humanized_pause(0.5, 1.5).await;
    fill_field(session, PASSWORD_INPUT, password).await?;
    humanized_pause(1.0, 2.0).await;

    if !click_login_button(session).await {
        warn!("Every attempt to click the login button failed");
        return Ok(false);
    }

    if !session
        .wait_for_selector(LOGGED_IN_MARKERS, Duration::from_secs(60))
        .await?
    {
        warn!("Timed out waiting for a logged-in feed marker");
        return Ok(false);
    }

    // The markers can also render on the login page itself; require the URL
    // to have left the login path.
    let url = session.current_url().await?.unwrap_or_default();
    let logged_in = is_logged_in_url(&url, &origin);
    if logged_in {
        info!("Login verified, landed on {}", url);
    } else {
        warn!("Unexpected post-login URL: {}", url);
    }
    Ok(logged_in)
}

/// Best effort; many sessions never see the banner.
async fn accept_cookie_banner(session: &BrowserSession) {
    let find = tokio::time::timeout(
        Duration::from_secs(5),
        session.page().find_element(COOKIE_BUTTON),
    )
    .await;
    match find {
        Ok(Ok(button)) => {
            if let Err(e) = button.click().await {
                debug!("Cookie banner click failed: {}", e);
            }
        }
        _ => debug!("No cookie banner found"),
    }
}

async fn fill_field(session: &BrowserSession, selector: &str, value: &str) -> Result<()> {
    let element = session.page().find_element(selector).await?;
    element.click().await?;
    element.type_str(value).await?;
    Ok(())
}

/// Three fallbacks, mirroring how often login buttons dodge selectors:
/// direct click, text-matched click, then a synthetic DOM click.
async fn click_login_button(session: &BrowserSession) -> bool {
    let direct = tokio::time::timeout(Duration::from_secs(10), async {
        let button = session.page().find_element(LOGIN_BUTTON).await?;
        button.click().await?;
        Ok::<(), anyhow::Error>(())
    })
    .await;
    if matches!(direct, Ok(Ok(()))) {
        return true;
    }
    debug!("Direct login button click failed, trying text match");

    let by_text = r#"(() => {
        const buttons = Array.from(document.querySelectorAll('button'));
        const target = buttons.find(b => /entrar|log\s?in/i.test(b.innerText || ''));
        if (!target) return false;
        target.click();
        return true;
    })()"#;
    if let Ok(val) = session.page().evaluate(by_text).await {
        if val.into_value::<bool>().unwrap_or(false) {
            return true;
        }
    }
    debug!("Text-matched click failed, forcing a DOM click");

    let forced = format!(
        r#"(() => {{
            const el = document.querySelector('{}');
            if (!el) return false;
            el.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true }}));
            return true;
        }})()"#,
        LOGIN_BUTTON
    );
    match session.page().evaluate(forced).await {
        Ok(val) => val.into_value::<bool>().unwrap_or(false),
        Err(_) => false,
    }
}

/// On the right origin and off the `/login/` path. Only the path itself
/// disqualifies; a board slug that happens to contain "login" is fine.
fn is_logged_in_url(url: &str, origin: &str) -> bool {
    url.starts_with(origin) && !url.starts_with(&format!("{}/login/", origin))
}

async fn humanized_pause(min_secs: f64, max_secs: f64) {
    let secs = if max_secs > min_secs {
        rng().random_range(min_secs..max_secs)
    } else {
        min_secs
    };
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

// ── Tests ──
