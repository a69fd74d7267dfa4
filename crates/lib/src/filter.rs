//! Content filter: pick the first configured pattern that occurs in a message.

use crate::config::{FilterPattern, MessageFilterConfig};

/// Return the first pattern (in declared order) whose text occurs in `content`, ignoring case.
/// Disabled filters never match.
pub fn evaluate<'a>(content: &str, config: &'a MessageFilterConfig) -> Option<&'a FilterPattern> {
    if !config.enabled {
        return None;
    }
    let content = content.to_lowercase();
    config
        .patterns
        .iter()
        .find(|p| content.contains(&p.match_text.to_lowercase()))
}
