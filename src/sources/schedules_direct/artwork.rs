//! Artwork lookup and ordering
//!
//! Artwork is looked up under the full program id and under its ten character
//! series prefix, then stably sorted by tier (Episode, Season, Series, other)
//! and, within a tier, by banner category precedence. Unknown categories sort
//! last.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::api::Artwork;

const SERIES_PREFIX_LEN: usize = 10;

const CATEGORY_PRECEDENCE: [&str; 7] = [
    "banner-l1",
    "banner-l2",
    "banner-l3",
    "banner-lo",
    "banner-l1t",
    "banner-lot",
    "banner",
];

/// Keys under which artwork for `program_id` may be filed
pub fn lookup_keys(program_id: &str) -> Vec<String> {
    let mut keys = vec![program_id.to_string()];
    if let Some(prefix) = program_id.get(..SERIES_PREFIX_LEN)
        && prefix != program_id
    {
        keys.push(prefix.to_string());
    }
    keys
}

/// Gather and order the artwork for one program
pub fn resolve_artwork(program_id: &str, artwork: &HashMap<String, Vec<Artwork>>) -> Vec<Artwork> {
    let mut resolved: Vec<Artwork> = Vec::new();
    for key in lookup_keys(program_id) {
        if let Some(images) = artwork.get(&key) {
            for image in images {
                if !resolved.iter().any(|existing| existing.uri == image.uri) {
                    resolved.push(image.clone());
                }
            }
        }
    }
    sort_artwork(&mut resolved);
    resolved
}

/// Stable sort: tier first, category only between equal tiers
pub fn sort_artwork(artwork: &mut [Artwork]) {
    artwork.sort_by(compare_artwork);
}

fn compare_artwork(a: &Artwork, b: &Artwork) -> Ordering {
    tier_rank(a.tier.as_deref())
        .cmp(&tier_rank(b.tier.as_deref()))
        .then_with(|| category_rank(a.category.as_deref()).cmp(&category_rank(b.category.as_deref())))
}

fn tier_rank(tier: Option<&str>) -> usize {
    match tier.map(str::to_ascii_lowercase).as_deref() {
        Some("episode") => 0,
        Some("season") => 1,
        Some("series") => 2,
        _ => 3,
    }
}

fn category_rank(category: Option<&str>) -> usize {
    let Some(category) = category else {
        return CATEGORY_PRECEDENCE.len();
    };
    let lower = category.to_ascii_lowercase();
    CATEGORY_PRECEDENCE
        .iter()
        .position(|known| *known == lower)
        .unwrap_or(CATEGORY_PRECEDENCE.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(uri: &str, tier: Option<&str>, category: Option<&str>) -> Artwork {
        Artwork {
            uri: uri.to_string(),
            tier: tier.map(str::to_string),
            category: category.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_tier_orders_before_category() {
        let mut images = vec![
            art("series-l1", Some("Series"), Some("Banner-L1")),
            art("other", None, Some("Banner-L1")),
            art("episode-banner", Some("Episode"), Some("Banner")),
            art("season-l2", Some("season"), Some("Banner-L2")),
        ];
        sort_artwork(&mut images);
        let order: Vec<&str> = images.iter().map(|a| a.uri.as_str()).collect();
        assert_eq!(order, vec!["episode-banner", "season-l2", "series-l1", "other"]);
    }

    #[test]
    fn test_category_breaks_ties_and_unknown_sorts_last() {
        let mut images = vec![
            art("iconic", Some("Series"), Some("Iconic")),
            art("plain", Some("Series"), Some("Banner")),
            art("l3", Some("Series"), Some("Banner-L3")),
            art("lot", Some("Series"), Some("banner-lot")),
            art("l1", Some("Series"), Some("Banner-L1")),
        ];
        sort_artwork(&mut images);
        let order: Vec<&str> = images.iter().map(|a| a.uri.as_str()).collect();
        assert_eq!(order, vec!["l1", "l3", "lot", "plain", "iconic"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let mut images = vec![
            art("first", Some("Series"), Some("Banner-L1")),
            art("second", Some("Series"), Some("Banner-L1")),
        ];
        sort_artwork(&mut images);
        assert_eq!(images[0].uri, "first");
    }

    #[test]
    fn test_resolve_merges_program_and_series_keys() {
        let mut artwork = HashMap::new();
        artwork.insert("EP01234567".to_string(), vec![art("series.jpg", Some("Series"), Some("Banner-L1"))]);
        artwork.insert(
            "EP012345670001".to_string(),
            vec![
                art("episode.jpg", Some("Episode"), Some("Banner-L1")),
                art("series.jpg", Some("Series"), Some("Banner-L1")),
            ],
        );
        let resolved = resolve_artwork("EP012345670001", &artwork);
        let uris: Vec<&str> = resolved.iter().map(|a| a.uri.as_str()).collect();
        assert_eq!(uris, vec!["episode.jpg", "series.jpg"]);
        assert_eq!(lookup_keys("EP012345670001"), vec!["EP012345670001", "EP01234567"]);
        assert_eq!(lookup_keys("SH01234567"), vec!["SH01234567"]);
    }
}
