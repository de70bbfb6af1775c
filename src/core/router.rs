use crate::config::TopicEntry;

/// Keyword-substring topic router. Rules are checked in configured order and
/// the first keyword found anywhere in the (lowercased) input wins; keyword
/// length and position in the text never matter.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    rules: Vec<TopicRule>,
}

#[derive(Debug, Clone)]
struct TopicRule {
    keyword: String,
    persona: String,
}

impl TopicRouter {
    pub fn from_entries(entries: &[TopicEntry]) -> Self {
        let rules = entries
            .iter()
            .map(|e| TopicRule {
                keyword: e.keyword.to_lowercase(),
                persona: e.persona.clone(),
            })
            .collect();
        Self { rules }
    }

    /// Returns the persona key for the first matching keyword, or `None`
    /// when no keyword occurs in the input (caller falls back to the
    /// coordinator).
    pub fn route(&self, text: &str) -> Option<&str> {
        if text.is_empty() {
            return None;
        }
        let lower = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| lower.contains(&rule.keyword))
            .map(|rule| rule.persona.as_str())
    }
}
