use serde::{Deserialize, Serialize};

/// One ordered piece of post content. Images carry the local file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ContentBlock {
    Text(String),
    Html(String),
    Image(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl ContentSection {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            count: None,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub username: Option<String>,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub link: Option<String>,
}

/// Knowledge articles are titled, community questions are asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostHeading {
    Title(Option<String>),
    Question(Option<String>),
}

/// The persisted form of an article or question page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumPost {
    #[serde(rename = "Link")]
    pub link: String,
    #[serde(flatten)]
    pub heading: PostHeading,
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Details", default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ContentSection>,
    #[serde(rename = "Best Answer")]
    pub best_answer: ContentSection,
    #[serde(rename = "All Answers")]
    pub all_answers: ContentSection,
    #[serde(rename = "Replies")]
    pub replies: Vec<Reply>,
    #[serde(rename = "Tags")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostVariant {
    /// Category knowledge article: body text, markup, then images.
    Article,
    /// Community question: text and images interleaved in page order.
    Question,
}

impl PostVariant {
    pub fn heading(self, title: Option<String>) -> PostHeading {
        match self {
            PostVariant::Article => PostHeading::Title(title),
            PostVariant::Question => PostHeading::Question(title),
        }
    }
}
