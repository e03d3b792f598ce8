//! Renders a composed digest into per-recipient email bodies.
//!
//! Every story link is wrapped in the click redirect and the body ends
//! with the recipient-bound open pixel, so the same digest renders
//! differently for every recipient.

use askama::Template;
use chrono::Utc;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::content::ContentItem;
use crate::digest::Digest;
use crate::routes;
use crate::Result;

#[derive(Clone, Debug)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Template)]
#[template(path = "email_daily.html")]
struct DailyEmail {
    brand: String,
    date_label: String,
    stories: Vec<Story>,
    categories: Vec<CategoryBlock>,
    pixel: String,
}

struct Story {
    title: String,
    channel: String,
    views: String,
    thumbnail: Option<String>,
    link: String,
}

struct CategoryBlock {
    name: String,
    items: Vec<Story>,
}

/// Renders one recipient's copy of the digest. `sid` is the recipient
/// token embedded into every tracking URL.
pub fn render(config: &Config, digest: &Digest, mail_id: Uuid, sid: &str) -> Result<Rendered> {
    let date_label = Utc::now()
        .with_timezone(&config.metrics.timezone)
        .format("%Y.%m.%d")
        .to_string();
    let subject = format!("[{}] Daily brief {}", config.name, date_label);

    let stories = digest
        .top_stories
        .iter()
        .map(|item| story(config, item, mail_id, "top", sid))
        .collect::<Result<Vec<_>>>()?;
    let categories = digest
        .categories
        .iter()
        .map(|section| {
            Ok(CategoryBlock {
                name: section.name.clone(),
                items: section
                    .items
                    .iter()
                    .map(|item| story(config, item, mail_id, &section.name, sid))
                    .collect::<Result<Vec<_>>>()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let email = DailyEmail {
        brand: config.name.clone(),
        date_label: date_label.clone(),
        stories,
        categories,
        pixel: pixel_url(config, mail_id, sid)?,
    };

    Ok(Rendered {
        subject,
        text: plain_text(&config.name, &date_label, digest),
        html: email.render()?,
    })
}

fn story(
    config: &Config,
    item: &ContentItem,
    mail_id: Uuid,
    target: &str,
    sid: &str,
) -> Result<Story> {
    Ok(Story {
        title: item.title.clone(),
        channel: item.channel.clone(),
        views: format_thousands(item.views),
        thumbnail: item.thumbnail.clone(),
        link: tracked_link(config, &item.url, mail_id, target, sid)?,
    })
}

/// Wraps a story URL in the click redirect, carrying the original URL,
/// the dispatch id, a target label and the recipient token.
pub fn tracked_link(
    config: &Config,
    target_url: &str,
    mail_id: Uuid,
    target: &str,
    sid: &str,
) -> Result<String> {
    let mut url = Url::parse(&config.public_url)?.join(routes::TRACK_CLICK)?;
    url.query_pairs_mut()
        .append_pair("url", target_url)
        .append_pair("mailId", &mail_id.to_string())
        .append_pair("target", target)
        .append_pair("sid", sid);
    Ok(url.to_string())
}

pub fn pixel_url(config: &Config, mail_id: Uuid, sid: &str) -> Result<String> {
    let mut url = Url::parse(&config.public_url)?.join(routes::TRACK_OPEN)?;
    url.query_pairs_mut()
        .append_pair("mailId", &mail_id.to_string())
        .append_pair("sid", sid);
    Ok(url.to_string())
}

fn plain_text(brand: &str, date_label: &str, digest: &Digest) -> String {
    let mut out = format!("{} daily brief {}\n", brand, date_label);
    if digest.top_stories.is_empty() {
        out.push_str("\nNo new updates today.\n");
        return out;
    }
    for item in &digest.top_stories {
        out.push_str(&format!(
            "\n- {} ({} views)\n  {}\n",
            item.title,
            format_thousands(item.views),
            item.url
        ));
    }
    for section in &digest.categories {
        out.push_str(&format!("\n{}\n", section.name));
        for item in &section.items {
            out.push_str(&format!("- {}\n  {}\n", item.title, item.url));
        }
    }
    out
}

fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
