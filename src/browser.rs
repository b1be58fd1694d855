//! The browser collaborator: page navigation, form interaction, and the
//! request/response event stream the traffic capture listens to.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use scraper::{ElementRef, Html, Selector};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("network error: {0}")]
    Network(String),

    #[error("no element matching {0:?} on the current page")]
    MissingElement(String),

    #[error("no page has been loaded yet")]
    NoPage,
}

impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        BrowserError::Network(err.to_string())
    }
}

/// A response as the browser saw it. The body read can fail for some
/// resource types, which listeners must tolerate.
#[derive(Debug, Clone)]
pub struct ObservedResponse {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Result<Vec<u8>, String>,
}

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Request { url: String, method: String },
    Response(ObservedResponse),
}

#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Types `value` into the first input whose name, id, or placeholder
    /// contains `field_hint`.
    async fn fill(&mut self, field_hint: &str, value: &str) -> Result<(), BrowserError>;

    /// Submits the search form and waits for the result page.
    async fn submit(&mut self) -> Result<(), BrowserError>;

    async fn content(&self) -> Result<String, BrowserError>;

    fn current_url(&self) -> Option<String>;

    /// Bytes of the CAPTCHA image on the current page, if there is one.
    async fn captcha_image(&mut self) -> Result<Option<Vec<u8>>, BrowserError>;

    /// Network events since the previous call.
    fn take_network_events(&mut self) -> Vec<NetworkEvent>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

static FORM_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("valid selector"));
static INPUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name], select[name], textarea[name]").expect("valid selector"));
static CAPTCHA_IMAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img[src*='captcha'], img[alt*='captcha'], img[id*='captcha'], .captcha img")
        .expect("valid selector")
});

#[derive(Debug, Clone)]
struct FormField {
    name: String,
    id: String,
    placeholder: String,
    kind: String,
    value: String,
}

impl FormField {
    fn matches(&self, hint: &str) -> bool {
        let hint = hint.to_lowercase();
        [&self.name, &self.id, &self.placeholder]
            .iter()
            .any(|attr| attr.to_lowercase().contains(&hint))
    }
}

#[derive(Debug, Clone)]
struct FormState {
    action: Url,
    method: String,
    fields: Vec<FormField>,
}

impl FormState {
    fn from_element(form: ElementRef, page_url: &Url) -> Self {
        let action = form
            .value()
            .attr("action")
            .filter(|a| !a.trim().is_empty())
            .and_then(|a| page_url.join(a).ok())
            .unwrap_or_else(|| page_url.clone());
        let method = form.value().attr("method").unwrap_or("get").to_lowercase();
        let fields = form
            .select(&INPUT_SELECTOR)
            .map(|input| {
                let attr = |name: &str| input.value().attr(name).unwrap_or("").to_string();
                FormField {
                    name: attr("name"),
                    id: attr("id"),
                    placeholder: attr("placeholder"),
                    kind: attr("type").to_lowercase(),
                    value: attr("value"),
                }
            })
            .collect();
        Self {
            action,
            method,
            fields,
        }
    }

    fn params(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|f| !matches!(f.kind.as_str(), "button" | "reset" | "image"))
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect()
    }
}

struct LoadedPage {
    url: Url,
    body: String,
    form: Option<FormState>,
}

/// A cookie-keeping HTTP session that stands in for a scripted browser on
/// plain form-driven pages. Every exchange is recorded as network events.
pub struct HttpFormSession {
    client: reqwest::Client,
    page: Option<LoadedPage>,
    events: Vec<NetworkEvent>,
}

impl HttpFormSession {
    pub fn new(timeout: Duration) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0")
            .build()?;
        Ok(Self {
            client,
            page: None,
            events: vec![],
        })
    }

    async fn exchange(&mut self, request: reqwest::RequestBuilder) -> Result<(Url, u16, Vec<u8>), BrowserError> {
        let request = request.build()?;
        self.events.push(NetworkEvent::Request {
            url: request.url().to_string(),
            method: request.method().to_string(),
        });
        let response = self.client.execute(request).await?;
        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await.map(|b| b.to_vec());
        self.events.push(NetworkEvent::Response(ObservedResponse {
            url: url.to_string(),
            status,
            headers,
            body: body.as_ref().map(Clone::clone).map_err(ToString::to_string),
        }));
        Ok((url, status, body?))
    }

    fn load(&mut self, url: Url, body: Vec<u8>) {
        let body = String::from_utf8_lossy(&body).into_owned();
        let form = {
            let document = Html::parse_document(&body);
            let forms: Vec<ElementRef> = document.select(&FORM_SELECTOR).collect();
            // Prefer the form that carries the date inputs.
            forms
                .iter()
                .find(|form| {
                    form.select(&INPUT_SELECTOR)
                        .any(|i| i.value().attr("name").is_some_and(|n| n.to_lowercase().contains("from")))
                })
                .or(forms.first())
                .map(|form| FormState::from_element(*form, &url))
        };
        debug!("Loaded {} ({} bytes, form: {})", url, body.len(), form.is_some());
        self.page = Some(LoadedPage { url, body, form });
    }

    fn form_mut(&mut self) -> Result<&mut FormState, BrowserError> {
        self.page
            .as_mut()
            .ok_or(BrowserError::NoPage)?
            .form
            .as_mut()
            .ok_or_else(|| BrowserError::MissingElement("form".to_string()))
    }
}

#[async_trait]
impl BrowserSession for HttpFormSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        info!("Navigating to: {}", url);
        let (final_url, status, body) = self.exchange(self.client.get(url)).await?;
        if status >= 400 {
            return Err(BrowserError::Network(format!("{url} answered {status}")));
        }
        self.load(final_url, body);
        Ok(())
    }

    async fn fill(&mut self, field_hint: &str, value: &str) -> Result<(), BrowserError> {
        let form = self.form_mut()?;
        let field = form
            .fields
            .iter_mut()
            .find(|f| f.kind != "hidden" && f.matches(field_hint))
            .ok_or_else(|| BrowserError::MissingElement(format!("input[name*='{field_hint}']")))?;
        field.value = value.to_string();
        Ok(())
    }

    async fn submit(&mut self) -> Result<(), BrowserError> {
        let form = self.form_mut()?.clone();
        let request = if form.method == "post" {
            let body = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form.params())
                .finish();
            self.client
                .post(form.action.clone())
                .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body)
        } else {
            let mut target = form.action.clone();
            target.query_pairs_mut().extend_pairs(form.params());
            self.client.get(target)
        };
        let (url, _, body) = self.exchange(request).await?;
        self.load(url, body);
        Ok(())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page
            .as_ref()
            .map(|p| p.body.clone())
            .ok_or(BrowserError::NoPage)
    }

    fn current_url(&self) -> Option<String> {
        self.page.as_ref().map(|p| p.url.to_string())
    }

    async fn captcha_image(&mut self) -> Result<Option<Vec<u8>>, BrowserError> {
        let image_url = {
            let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
            let document = Html::parse_document(&page.body);
            let Some(src) = document
                .select(&CAPTCHA_IMAGE_SELECTOR)
                .find_map(|img| img.value().attr("src").map(str::to_string))
            else {
                return Ok(None);
            };
            page.url
                .join(&src)
                .map_err(|e| BrowserError::Network(format!("bad captcha src {src:?}: {e}")))?
        };
        let (_, status, bytes) = self.exchange(self.client.get(image_url)).await?;
        Ok((status == 200 && !bytes.is_empty()).then_some(bytes))
    }

    fn take_network_events(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.events)
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.page = None;
        self.events.clear();
        info!("Browser session closed");
        Ok(())
    }
}
