//! Digest composition: ranks the eligible pool into top stories and
//! keyword category sections, personalized per recipient.

use std::collections::HashSet;

use crate::config;
use crate::content::ContentItem;
use crate::subscriber::Preferences;

#[derive(Clone, Debug, Default)]
pub struct Digest {
    pub top_stories: Vec<ContentItem>,
    pub categories: Vec<CategorySection>,
}

#[derive(Clone, Debug)]
pub struct CategorySection {
    pub name: String,
    pub items: Vec<ContentItem>,
}

/// Composes a digest from an eligible pool.
///
/// Top story slots go to the recipient's preferred channels first, in view
/// order, then backfill from the overall ranking. A story is never listed
/// twice; slots deduplicate on URL. Category sections draw from the pool
/// left over after the overall top slots, so a story leading the digest is
/// not repeated further down.
pub fn personalize(
    pool: &[ContentItem],
    preferences: &Preferences,
    rules: &[config::Category],
    top_n: usize,
    per_category: usize,
) -> Digest {
    let mut ranked = pool.to_vec();
    ranked.sort_by(|a, b| b.views.cmp(&a.views));

    let top_stories = if preferences.channels.is_empty() {
        ranked.iter().take(top_n).cloned().collect()
    } else {
        let mut slots: Vec<ContentItem> = Vec::with_capacity(top_n);
        let mut seen: HashSet<String> = HashSet::new();

        let preferred = ranked.iter().filter(|item| {
            preferences
                .channels
                .iter()
                .any(|channel| channel.eq_ignore_ascii_case(&item.channel))
        });
        for item in preferred.chain(ranked.iter()) {
            if slots.len() == top_n {
                break;
            }
            if seen.insert(item.url.clone()) {
                slots.push(item.clone());
            }
        }
        slots
    };

    let remainder = if ranked.len() > top_n {
        &ranked[top_n..]
    } else {
        &[]
    };

    let categories = rules
        .iter()
        .filter_map(|rule| {
            let keyword = rule.keyword.to_lowercase();
            let items: Vec<ContentItem> = remainder
                .iter()
                .filter(|item| {
                    item.channel.to_lowercase().contains(&keyword)
                        || item.title.to_lowercase().contains(&keyword)
                })
                .take(per_category)
                .cloned()
                .collect();
            if items.is_empty() {
                None
            } else {
                Some(CategorySection {
                    name: rule.name.clone(),
                    items,
                })
            }
        })
        .collect();

    Digest {
        top_stories,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Category;

    fn item(title: &str, channel: &str, views: u64) -> ContentItem {
        ContentItem {
            title: title.to_string(),
            url: format!("https://example.com/{}", title.to_lowercase()),
            channel: channel.to_string(),
            views,
            ..ContentItem::default()
        }
    }

    fn prefs(channels: &[&str]) -> Preferences {
        Preferences {
            channels: channels.iter().map(|c| c.to_string()).collect(),
            categories: vec![],
        }
    }

    #[test]
    fn preferred_channel_leads_then_backfills() {
        let pool = vec![
            item("A", "X", 10),
            item("B", "Y", 8),
            item("C", "X", 5),
            item("D", "Z", 3),
        ];
        let digest = personalize(&pool, &prefs(&["X"]), &[], 3, 5);
        let titles: Vec<&str> = digest.top_stories.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C", "B"]);
    }

    #[test]
    fn no_preferences_keeps_view_order() {
        let pool = vec![item("B", "Y", 8), item("A", "X", 10), item("C", "X", 5)];
        let digest = personalize(&pool, &Preferences::default(), &[], 2, 5);
        let titles: Vec<&str> = digest.top_stories.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn backfill_never_repeats_a_url() {
        let mut duplicate = item("A-mirror", "Y", 9);
        duplicate.url = "https://example.com/a".to_string();
        let pool = vec![item("A", "X", 10), duplicate, item("B", "Y", 8)];

        let digest = personalize(&pool, &prefs(&["X"]), &[], 3, 5);
        let titles: Vec<&str> = digest.top_stories.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn pool_shorter_than_slots() {
        let pool = vec![item("A", "X", 10)];
        let digest = personalize(&pool, &prefs(&["Y"]), &[], 3, 5);
        assert_eq!(digest.top_stories.len(), 1);
        assert!(digest.categories.is_empty());
    }

    #[test]
    fn empty_pool_yields_empty_digest() {
        let digest = personalize(&[], &Preferences::default(), &[Category::new("Tech", "tech")], 3, 5);
        assert!(digest.top_stories.is_empty());
        assert!(digest.categories.is_empty());
    }

    #[test]
    fn categories_draw_from_the_remainder() {
        let pool = vec![
            item("tech-leader", "tech", 10),
            item("politics-piece", "politics", 8),
            item("tech-runner-up", "tech", 5),
            item("economy-note", "economy", 3),
        ];
        let rules = vec![Category::new("Tech", "tech"), Category::new("Economy", "econom")];
        let digest = personalize(&pool, &Preferences::default(), &rules, 2, 5);

        // The two top slots absorb tech-leader and politics-piece.
        assert_eq!(digest.categories.len(), 2);
        let tech: Vec<&str> = digest.categories[0]
            .items
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(tech, vec!["tech-runner-up"]);
        assert_eq!(digest.categories[1].items[0].title, "economy-note");
    }

    #[test]
    fn keyword_matches_title_and_channel_case_insensitively() {
        let pool = vec![
            item("top", "misc", 10),
            item("The TECH roundup", "misc", 5),
            item("plain", "Technology", 4),
        ];
        let rules = vec![Category::new("Tech", "tech")];
        let digest = personalize(&pool, &Preferences::default(), &rules, 1, 5);
        assert_eq!(digest.categories[0].items.len(), 2);
    }

    #[test]
    fn section_cap_and_multi_membership() {
        let mut pool = vec![item("top", "misc", 100)];
        for n in 0..7 {
            pool.push(item(&format!("tech-story-{n}"), "tech", 10 - n));
        }
        let rules = vec![
            Category::new("Tech", "tech"),
            Category::new("Stories", "story"),
        ];
        let digest = personalize(&pool, &Preferences::default(), &rules, 1, 5);
        assert_eq!(digest.categories[0].items.len(), 5);
        // Same items also satisfy the second rule.
        assert_eq!(digest.categories[1].items.len(), 5);
    }

    #[test]
    fn empty_sections_are_dropped() {
        let pool = vec![item("top", "misc", 10), item("second", "misc", 5)];
        let rules = vec![Category::new("Tech", "tech")];
        let digest = personalize(&pool, &Preferences::default(), &rules, 1, 5);
        assert!(digest.categories.is_empty());
    }
}
