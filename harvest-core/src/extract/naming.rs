use regex::Regex;

use crate::storage::sanitize_segment;

/// Derives stable folder names for posts from their URLs.
#[derive(Debug)]
pub struct PostNamer {
    pattern: Regex,
    fallback_prefix: &'static str,
    fallbacks_used: usize,
}

impl PostNamer {
    /// `/s/question/<id>` becomes `<id>`; anything else becomes `Topic_<n>`.
    pub fn questions() -> Self {
        Self::with_pattern(r"/s/question/([^/?#]+)", "Topic")
    }

    /// `/s/article/<id>` becomes `<id>`; anything else becomes `Article_<n>`.
    pub fn articles() -> Self {
        Self::with_pattern(r"/s/article/([^/?#]+)", "Article")
    }

    fn with_pattern(pattern: &str, fallback_prefix: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("valid regex"),
            fallback_prefix,
            fallbacks_used: 0,
        }
    }

    pub fn name_for(&mut self, url: &str) -> String {
        let identifier = self
            .pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| sanitize_segment(m.as_str()))
            .filter(|id| !id.is_empty());
        match identifier {
            Some(id) => id,
            None => {
                self.fallbacks_used += 1;
                format!("{}_{}", self.fallback_prefix, self.fallbacks_used)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_urls_use_their_identifier() {
        let mut namer = PostNamer::questions();
        assert_eq!(
            namer.name_for("https://community.onsemi.com/s/question/0D54V00007abc/how-to-bias"),
            "0D54V00007abc"
        );
        assert_eq!(
            namer.name_for("https://community.onsemi.com/s/question/0D5XYZ?language=en_US"),
            "0D5XYZ"
        );
    }

    #[test]
    fn fallback_counter_only_advances_on_fallback() {
        let mut namer = PostNamer::questions();
        assert_eq!(namer.name_for("https://community.onsemi.com/s/topic/0TO1"), "Topic_1");
        assert_eq!(namer.name_for("https://community.onsemi.com/s/question/Q1"), "Q1");
        assert_eq!(namer.name_for("https://community.onsemi.com/s/"), "Topic_2");
    }

    #[test]
    fn article_urls_use_their_identifier() {
        let mut namer = PostNamer::articles();
        assert_eq!(
            namer.name_for("https://community.onsemi.com/s/article/Power-Loss-Calculation"),
            "Power-Loss-Calculation"
        );
        assert_eq!(namer.name_for("about:blank"), "Article_1");
    }
}
