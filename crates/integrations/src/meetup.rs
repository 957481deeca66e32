use async_trait::async_trait;
use rudolph_core::errors::CollaboratorError;
use rudolph_core::meetups::MeetupPages;

const OG_TITLE: &str = "property=\"og:title\"";
const CONTENT_ATTR: &str = "content=\"";

/// Reads event titles from public meetup pages.
pub struct MeetupPageClient {
    http: reqwest::Client,
}

impl MeetupPageClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// Value of the page's `og:title` meta tag, with the common entities decoded.
pub fn extract_og_title(page: &str) -> Option<String> {
    let property = page.find(OG_TITLE)?;
    let tag_start = page[..property].rfind('<')?;
    let tag_end = property + page[property..].find('>')?;
    let tag = &page[tag_start..tag_end];

    let value_start = tag.find(CONTENT_ATTR)? + CONTENT_ATTR.len();
    let value_len = tag[value_start..].find('"')?;
    let title = decode_entities(tag[value_start..value_start + value_len].trim());

    (!title.is_empty()).then_some(title)
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[async_trait]
impl MeetupPages for MeetupPageClient {
    async fn event_title(&self, url: &str) -> Result<String, CollaboratorError> {
        let context = format!("could not read meetup page {url}");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| CollaboratorError::request(&context, error))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::status(context, response.status().as_u16()));
        }

        let page =
            response.text().await.map_err(|error| CollaboratorError::request(&context, error))?;
        extract_og_title(&page)
            .ok_or_else(|| CollaboratorError::malformed(context, "og:title not found"))
    }
}
