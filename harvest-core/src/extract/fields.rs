//! The raw page payload and the script that collects it.

use serde::Deserialize;

use crate::config::PostSelectors;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPost {
    title: Option<String>,
    date: Option<String>,
    body: Option<RawBlock>,
    best_answer: Option<RawBlock>,
    answer_count: Option<String>,
    answers: Vec<RawBlock>,
    replies: Vec<RawReply>,
    tags: Vec<RawTag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBlock {
    text: Option<String>,
    html: Option<String>,
    images: Vec<String>,
    segments: Vec<RawSegment>,
}

/// Text runs and image sources in document order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RawSegment {
    Text(String),
    Image(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawReply {
    username: Option<String>,
    text: Option<String>,
    images: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTag {
    name: Option<String>,
    link: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn sources(values: &[String]) -> impl Iterator<Item = &str> {
    values.iter().map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl RawPost {
    pub fn title(&self) -> Option<&str> {
        present(&self.title)
    }

    pub fn date(&self) -> Option<&str> {
        present(&self.date)
    }

    pub fn body(&self) -> Option<&RawBlock> {
        self.body.as_ref()
    }

    pub fn best_answer(&self) -> Option<&RawBlock> {
        self.best_answer.as_ref()
    }

    /// The first number in the answer-count label, e.g. "3 Answers".
    pub fn answer_count(&self) -> Option<u32> {
        let label = present(&self.answer_count)?;
        let digits: String = label
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }

    pub fn answers(&self) -> &[RawBlock] {
        &self.answers
    }

    pub fn replies(&self) -> &[RawReply] {
        &self.replies
    }

    pub fn tags(&self) -> &[RawTag] {
        &self.tags
    }
}

impl RawBlock {
    pub fn text(&self) -> Option<&str> {
        present(&self.text)
    }

    pub fn html(&self) -> Option<&str> {
        present(&self.html)
    }

    pub fn images(&self) -> impl Iterator<Item = &str> {
        sources(&self.images)
    }

    /// Ordered segments; falls back to text then images when the page gave
    /// no interleaving.
    pub fn segments(&self) -> Vec<RawSegment> {
        let segments: Vec<RawSegment> = self
            .segments
            .iter()
            .filter_map(|segment| match segment {
                RawSegment::Text(text) => {
                    let text = text.trim();
                    (!text.is_empty()).then(|| RawSegment::Text(text.to_string()))
                }
                RawSegment::Image(src) => {
                    let src = src.trim();
                    (!src.is_empty()).then(|| RawSegment::Image(src.to_string()))
                }
            })
            .collect();
        if !segments.is_empty() {
            return segments;
        }
        self.text()
            .map(|text| RawSegment::Text(text.to_string()))
            .into_iter()
            .chain(self.images().map(|src| RawSegment::Image(src.to_string())))
            .collect()
    }
}

impl RawReply {
    pub fn username(&self) -> Option<&str> {
        present(&self.username)
    }

    pub fn text(&self) -> Option<&str> {
        present(&self.text)
    }

    pub fn images(&self) -> impl Iterator<Item = &str> {
        sources(&self.images)
    }
}

impl RawTag {
    pub fn name(&self) -> Option<&str> {
        present(&self.name)
    }

    pub fn link(&self) -> Option<&str> {
        present(&self.link)
    }
}

const COLLECT_TEMPLATE: &str = r#"(() => {
  const sel = __SELECTORS__;
  const first = (root, s) => { try { return root.querySelector(s); } catch (_) { return null; } };
  const all = (root, s) => { try { return Array.from(root.querySelectorAll(s)); } catch (_) { return []; } };
  const text = (el) => el ? ((el.innerText || el.textContent || '').trim() || null) : null;
  const src = (img) => img.currentSrc || img.src || img.getAttribute('src') || '';
  const images = (el) => el ? all(el, 'img').map(src).filter(Boolean) : [];
  const segments = (el) => {
    if (!el) return [];
    const out = [];
    let buffer = '';
    const flush = () => {
      const t = buffer.replace(/\s+/g, ' ').trim();
      if (t) out.push({ kind: 'text', value: t });
      buffer = '';
    };
    const walker = document.createTreeWalker(el, NodeFilter.SHOW_TEXT | NodeFilter.SHOW_ELEMENT);
    while (walker.nextNode()) {
      const node = walker.currentNode;
      if (node.nodeType === Node.TEXT_NODE) {
        buffer += node.textContent + ' ';
      } else if (node.tagName === 'IMG') {
        flush();
        const s = src(node);
        if (s) out.push({ kind: 'image', value: s });
      } else if (node.tagName === 'P' || node.tagName === 'BR' || node.tagName === 'LI') {
        buffer += '\n';
      }
    }
    flush();
    return out;
  };
  const block = (el) => el ? { text: text(el), html: el.innerHTML || null, images: images(el), segments: segments(el) } : null;
  return {
    title: text(first(document, sel.title)),
    date: text(first(document, sel.date)),
    body: block(first(document, sel.body)),
    best_answer: block(first(document, sel.best_answer)),
    answer_count: text(first(document, sel.answer_count)),
    answers: all(document, sel.answers).map(item => block(first(item, sel.answer_body) || item)),
    replies: all(document, sel.replies).map(item => {
      const body = first(item, sel.reply_body) || item;
      return { username: text(first(item, sel.reply_username)), text: text(body), images: images(body) };
    }),
    tags: all(document, sel.tags).map(a => ({ name: text(a), link: a.href || null })),
  };
})()"#;

/// Builds the DOM script that returns a [`RawPost`] for the current page.
pub fn collect_script(selectors: &PostSelectors) -> String {
    let encoded = serde_json::to_string(selectors).unwrap_or_else(|_| "{}".to_string());
    COLLECT_TEMPLATE.replace("__SELECTORS__", &encoded)
}
