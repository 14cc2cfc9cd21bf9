//! Channel name matching
//!
//! Fuzzy matches a free-text channel name against the primary display names of
//! the channels ingested for a guide source. Names are compared as bags of
//! fixed-size substrings (character n-grams) and scored with the Dice
//! coefficient, so "hbo" scores 1.0 against "HBO", 0.8 against "HBO2" and 0.0
//! against "ESPN".
//!
//! Ordering is deterministic: score descending, then name, then the channel's
//! position in the input list.

use std::collections::HashMap;

use crate::config::MatcherConfig;
use crate::models::Channel;

/// Matcher settings
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Length of each substring in a bag
    pub bag_size: usize,
    /// Maximum number of ranked results returned
    pub max_results: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from_config(&MatcherConfig::default())
    }
}

impl MatchSettings {
    pub fn from_config(config: &MatcherConfig) -> Self {
        Self {
            bag_size: config.bag_size.max(1),
            max_results: config.max_results,
        }
    }
}

/// A ranked match
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMatch {
    pub channel: Channel,
    pub score: f64,
}

pub struct ChannelMatcher {
    settings: MatchSettings,
}

impl ChannelMatcher {
    pub fn new(settings: MatchSettings) -> Self {
        Self { settings }
    }

    /// Rank `channels` by similarity of their name to `input`
    ///
    /// An empty (or whitespace-only) input yields no matches; callers treat
    /// that as the "no input" case.
    pub fn rank(&self, channels: &[Channel], input: &str) -> Vec<ChannelMatch> {
        let needle = normalize(input);
        if needle.is_empty() || channels.is_empty() {
            return Vec::new();
        }
        let needle_bag = bag(&needle, self.settings.bag_size);

        let mut scored: Vec<(f64, &str, usize)> = channels
            .iter()
            .enumerate()
            .map(|(index, channel)| {
                let name = normalize(&channel.name);
                let score = dice(&needle_bag, &bag(&name, self.settings.bag_size));
                (score, channel.name.as_str(), index)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        scored
            .into_iter()
            .take(self.settings.max_results)
            .map(|(score, _, index)| ChannelMatch {
                channel: channels[index].clone(),
                score,
            })
            .collect()
    }

    /// Channels only, in ranked order
    pub fn find(&self, channels: &[Channel], input: &str) -> Vec<Channel> {
        self.rank(channels, input)
            .into_iter()
            .map(|m| m.channel)
            .collect()
    }
}

impl Default for ChannelMatcher {
    fn default() -> Self {
        Self::new(MatchSettings::default())
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Multiset of `size`-character substrings; short strings form a single bag
fn bag(value: &str, size: usize) -> HashMap<String, usize> {
    let chars: Vec<char> = value.chars().collect();
    let mut counts = HashMap::new();
    if chars.is_empty() {
        return counts;
    }
    if chars.len() <= size {
        counts.insert(value.to_string(), 1);
        return counts;
    }
    for window in chars.windows(size) {
        *counts.entry(window.iter().collect::<String>()).or_insert(0) += 1;
    }
    counts
}

fn dice(a: &HashMap<String, usize>, b: &HashMap<String, usize>) -> f64 {
    let total: usize = a.values().sum::<usize>() + b.values().sum::<usize>();
    if total == 0 {
        return 0.0;
    }
    let shared: usize = a
        .iter()
        .map(|(gram, count)| (*count).min(b.get(gram).copied().unwrap_or(0)))
        .sum();
    (2 * shared) as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(names: &[&str]) -> Vec<Channel> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Channel {
                id: format!("c{i}"),
                name: name.to_string(),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_hbo_ranks_ahead_of_espn() {
        let matcher = ChannelMatcher::default();
        let list = channels(&["ESPN", "HBO2", "HBO"]);

        let first: Vec<String> = matcher.find(&list, "hbo").into_iter().map(|c| c.name).collect();
        assert_eq!(first, vec!["HBO", "HBO2", "ESPN"]);

        let second: Vec<String> = matcher.find(&list, "hbo").into_iter().map(|c| c.name).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scores() {
        let matcher = ChannelMatcher::default();
        let ranked = matcher.rank(&channels(&["HBO", "HBO2", "ESPN"]), "hbo");
        assert_eq!(ranked[0].score, 1.0);
        assert!((ranked[1].score - 0.8).abs() < f64::EPSILON);
        assert_eq!(ranked[2].score, 0.0);
    }

    #[test]
    fn test_empty_input_returns_nothing() {
        let matcher = ChannelMatcher::default();
        assert!(matcher.find(&channels(&["HBO"]), "").is_empty());
        assert!(matcher.find(&channels(&["HBO"]), "   ").is_empty());
        assert!(matcher.find(&[], "hbo").is_empty());
    }

    #[test]
    fn test_ties_break_on_name_then_position() {
        let matcher = ChannelMatcher::default();
        let list = channels(&["ZZZ", "AAA", "AAA"]);
        let ranked = matcher.rank(&list, "qq");
        let ids: Vec<&str> = ranked.iter().map(|m| m.channel.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c0"]);
    }

    #[test]
    fn test_max_results_is_respected() {
        let matcher = ChannelMatcher::new(MatchSettings {
            bag_size: 2,
            max_results: 1,
        });
        let ranked = matcher.rank(&channels(&["HBO", "HBO2"]), "hbo2");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].channel.name, "HBO2");
    }
}
