use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use log::{error, info, warn};
use scraper::{Html, Selector};

use crate::browser::{BrowserError, BrowserSession};
use crate::text::extract_text;

/// Phrases the search page shows when the CAPTCHA answer was wrong.
const REJECTION_PHRASES: [&str; 7] = [
    "captcha code is invalid",
    "captcha code is incorrect",
    "invalid captcha",
    "incorrect captcha",
    "captcha verification failed",
    "please enter the captcha correctly",
    "captcha does not match",
];

const RESULT_INDICATORS: [&str; 5] = ["table", "judgment", "result", "download", "pdf"];

static ERROR_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "div.alert-danger, div.error, span.error, div[class*='error'], span[class*='error']",
    )
    .expect("valid selector")
});

#[async_trait]
pub trait CaptchaSolver: Send {
    /// Text shown in `image`, or `None` if it could not be read.
    async fn solve(&mut self, image: &[u8]) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaOutcome {
    /// The page has no CAPTCHA.
    NotPresent,
    Solved(String),
    Exhausted { attempts: u32 },
}

/// Fetches a fresh challenge image; `None` if there is none to fetch.
pub async fn refresh(session: &mut dyn BrowserSession) -> Option<Vec<u8>> {
    match session.captcha_image().await {
        Ok(Some(image)) => {
            info!("CAPTCHA refreshed");
            Some(image)
        }
        Ok(None) => {
            warn!("Could not find a CAPTCHA to refresh");
            None
        }
        Err(e) => {
            error!("Failed to refresh CAPTCHA: {}", e);
            None
        }
    }
}

pub async fn enter_text(session: &mut dyn BrowserSession, text: &str) -> bool {
    match session.fill("captcha", text).await {
        Ok(()) => {
            info!("CAPTCHA text entered");
            true
        }
        Err(e) => {
            error!("Failed to enter CAPTCHA text: {}", e);
            false
        }
    }
}

/// Asks `solver` for an answer up to `max_attempts` times, fetching a new
/// challenge after each miss.
pub async fn solve_with_attempts(
    solver: &mut dyn CaptchaSolver,
    session: &mut dyn BrowserSession,
    max_attempts: u32,
) -> Result<CaptchaOutcome, BrowserError> {
    let Some(mut image) = session.captcha_image().await? else {
        info!("No CAPTCHA on the page");
        return Ok(CaptchaOutcome::NotPresent);
    };
    for attempt in 1..=max_attempts {
        info!("CAPTCHA solving attempt {}/{}", attempt, max_attempts);
        if let Some(text) = solver.solve(&image).await {
            return Ok(CaptchaOutcome::Solved(text));
        }
        if attempt == max_attempts {
            break;
        }
        match refresh(session).await {
            Some(fresh) => image = fresh,
            None => break,
        }
    }
    error!("Failed to solve CAPTCHA after {} attempts", max_attempts);
    Ok(CaptchaOutcome::Exhausted {
        attempts: max_attempts,
    })
}

/// Best-effort guess at whether the site turned the search down over the
/// CAPTCHA: a known error phrase, an error element mentioning the
/// CAPTCHA, or still sitting on the search page with nothing that looks
/// like results.
pub fn submission_rejected(page: &str, current_url: &str, search_url: &str) -> bool {
    let lower = page.to_lowercase();
    if REJECTION_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        warn!("CAPTCHA validation failed - specific error message detected");
        return true;
    }

    let document = Html::parse_document(page);
    let error_mentions_captcha = document.select(&ERROR_ELEMENTS).any(|element| {
        let text = extract_text(element);
        if !text.is_empty() {
            info!("Error element found: {}", text);
        }
        text.to_lowercase().contains("captcha")
    });
    if error_mentions_captcha {
        warn!("CAPTCHA validation failed - error element with CAPTCHA text found");
        return true;
    }

    let same_page = current_url.trim_end_matches('/') == search_url.trim_end_matches('/');
    if same_page && !RESULT_INDICATORS.iter().any(|i| lower.contains(i)) {
        warn!("CAPTCHA validation failed - no results found on search page");
        return true;
    }
    false
}

/// Writes the challenge to disk and waits for a human to type it in.
pub struct ManualSolver {
    image_path: PathBuf,
}

impl ManualSolver {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
        }
    }
}

#[async_trait]
impl CaptchaSolver for ManualSolver {
    async fn solve(&mut self, image: &[u8]) -> Option<String> {
        if let Err(e) = tokio::fs::write(&self.image_path, image).await {
            error!("Could not write CAPTCHA image to {}: {}", self.image_path.display(), e);
            return None;
        }
        let path = self.image_path.display().to_string();
        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stdout = io::stdout();
            writeln!(stdout, "CAPTCHA image saved to {path}")?;
            write!(stdout, "Enter the CAPTCHA text (empty to skip): ")?;
            stdout.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => {
                let text = line.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Ok(Err(e)) => {
                error!("Could not read CAPTCHA answer: {}", e);
                None
            }
            Err(e) => {
                error!("CAPTCHA prompt task failed: {}", e);
                None
            }
        }
    }
}
