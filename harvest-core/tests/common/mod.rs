#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;

use harvest_core::browser::{BrowserError, BrowserResult, PageSession, PageSessionFactory};
use harvest_core::config::HarvestConfig;
use harvest_core::HarvestContext;

/// Location key that matches every location.
pub const ANYWHERE: &str = "*";

/// Separates a selector from an element index in pinned targets.
const PIN: &str = "@pin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Goto(String),
    Reload,
    Click(String, usize),
    Capture(PathBuf),
    Release,
    Close,
}

#[derive(Default)]
pub struct Script {
    location: String,
    counts: HashMap<(String, String), usize>,
    texts: HashMap<(String, String), Vec<String>>,
    attributes: HashMap<(String, String), Vec<String>>,
    links: HashMap<(String, String), Vec<String>>,
    disabled: HashSet<String>,
    disabling_clicks: HashMap<(String, usize), String>,
    consumed_on_click: HashSet<String>,
    payloads: HashMap<String, Value>,
    navigating_clicks: HashMap<String, String>,
    attached_for: HashMap<String, usize>,
    failing_clicks: HashSet<(String, usize)>,
    failing_gotos: HashSet<String>,
    export_button: Option<(String, String)>,
    exports: VecDeque<Option<String>>,
    capture_dir: Option<PathBuf>,
    events: Vec<Event>,
    opened: usize,
}

impl Script {
    fn lookup<'m, T>(
        &self,
        map: &'m HashMap<(String, String), T>,
        selector: &str,
    ) -> Option<&'m T> {
        map.get(&(self.location.clone(), selector.to_string()))
            .or_else(|| map.get(&(ANYWHERE.to_string(), selector.to_string())))
    }
}

/// A page double driven by a shared script. Every lookup is keyed by the
/// current location (set by `goto` or by a navigating click) and selector.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    script: Rc<RefCell<Script>>,
}

fn key(location: &str, selector: &str) -> (String, String) {
    (location.to_string(), selector.to_string())
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_at(&self, location: &str, selector: &str, count: usize) -> &Self {
        self.script.borrow_mut().counts.insert(key(location, selector), count);
        self
    }

    pub fn texts_at(&self, location: &str, selector: &str, texts: &[&str]) -> &Self {
        let values = texts.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        self.script
            .borrow_mut()
            .counts
            .insert(key(location, selector), values.len());
        self.script.borrow_mut().texts.insert(key(location, selector), values);
        self
    }

    pub fn attributes_at(&self, location: &str, selector: &str, values: &[&str]) -> &Self {
        let values = values.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        self.script
            .borrow_mut()
            .counts
            .insert(key(location, selector), values.len());
        self.script
            .borrow_mut()
            .attributes
            .insert(key(location, selector), values);
        self
    }

    pub fn links_at(&self, location: &str, selector: &str, links: &[&str]) -> &Self {
        let values = links.iter().map(|t| t.to_string()).collect();
        self.script.borrow_mut().links.insert(key(location, selector), values);
        self
    }

    /// Clicking `selector[index]` disables `target` until the next reload.
    pub fn disables_on_click(&self, selector: &str, index: usize, target: &str) -> &Self {
        self.script
            .borrow_mut()
            .disabling_clicks
            .insert((selector.to_string(), index), target.to_string());
        self
    }

    /// Every click on a match of `selector` removes one element from its
    /// match set, like a chevron that turns into its expanded form.
    pub fn consumed_on_click(&self, selector: &str) -> &Self {
        self.script
            .borrow_mut()
            .consumed_on_click
            .insert(selector.to_string());
        self
    }

    pub fn count_of(&self, selector: &str) -> usize {
        let script = self.script.borrow();
        script.lookup(&script.counts, selector).copied().unwrap_or(0)
    }

    /// Payload returned by `evaluate` while at `location`.
    pub fn payload_at(&self, location: &str, payload: Value) -> &Self {
        self.script
            .borrow_mut()
            .payloads
            .insert(location.to_string(), payload);
        self
    }

    /// Clicking `selector` moves the page to `location`.
    pub fn navigates(&self, selector: &str, location: &str) -> &Self {
        self.script
            .borrow_mut()
            .navigating_clicks
            .insert(selector.to_string(), location.to_string());
        self
    }

    /// `selector` stays attached for `clicks` clicks, then disappears.
    pub fn attached_for(&self, selector: &str, clicks: usize) -> &Self {
        self.script
            .borrow_mut()
            .attached_for
            .insert(selector.to_string(), clicks);
        self
    }

    /// The next click on `selector[index]` fails.
    pub fn fail_click(&self, selector: &str, index: usize) -> &Self {
        self.script
            .borrow_mut()
            .failing_clicks
            .insert((selector.to_string(), index));
        self
    }

    pub fn fail_goto(&self, url: &str) -> &Self {
        self.script.borrow_mut().failing_gotos.insert(url.to_string());
        self
    }

    /// Each click on `selector` writes the next queued export into the
    /// capture directory as `file_name`; `None` produces no file.
    pub fn exports(&self, selector: &str, file_name: &str, exports: Vec<Option<String>>) -> &Self {
        let mut script = self.script.borrow_mut();
        script.export_button = Some((selector.to_string(), file_name.to_string()));
        script.counts.insert(key(ANYWHERE, selector), 1);
        script.exports = exports.into();
        drop(script);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.script.borrow().events.clone()
    }

    pub fn clicks_on(&self, selector: &str) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Click(s, index) if s == selector => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn gotos(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Goto(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.script.borrow().opened
    }

    fn log(&self, event: Event) {
        self.script.borrow_mut().events.push(event);
    }
}

#[async_trait(?Send)]
impl PageSession for ScriptedPage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        self.log(Event::Goto(url.to_string()));
        let mut script = self.script.borrow_mut();
        if script.failing_gotos.contains(url) {
            return Err(BrowserError::Navigation(format!("{url}: unreachable")));
        }
        script.location = url.to_string();
        Ok(())
    }

    async fn reload(&self) -> BrowserResult<()> {
        self.log(Event::Reload);
        self.script.borrow_mut().disabled.clear();
        Ok(())
    }

    async fn count(&self, selector: &str) -> BrowserResult<usize> {
        let script = self.script.borrow();
        Ok(script.lookup(&script.counts, selector).copied().unwrap_or(0))
    }

    async fn click_nth(&self, selector: &str, index: usize) -> BrowserResult<()> {
        let (selector, index, pinned) = match selector.rsplit_once(PIN) {
            Some((base, pin)) => match pin.parse::<usize>() {
                Ok(pin) => (base, pin, true),
                Err(_) => (selector, index, false),
            },
            None => (selector, index, false),
        };
        self.log(Event::Click(selector.to_string(), index));
        let mut script = self.script.borrow_mut();
        if script.failing_clicks.remove(&(selector.to_string(), index)) {
            return Err(BrowserError::Interaction(format!("{selector}[{index}] not clickable")));
        }
        if script.consumed_on_click.contains(selector) {
            let here = key(&script.location, selector);
            let current = if script.counts.contains_key(&here) {
                here
            } else {
                key(ANYWHERE, selector)
            };
            let count = script.counts.entry(current).or_insert(0);
            if !pinned && index >= *count {
                return Err(BrowserError::Interaction(format!(
                    "{selector}[{index}] not present ({count} matches)"
                )));
            }
            *count = count.saturating_sub(1);
        }
        if let Some(target) = script
            .disabling_clicks
            .get(&(selector.to_string(), index))
            .cloned()
        {
            script.disabled.insert(target);
        }
        if let Some(remaining) = script.attached_for.get_mut(selector) {
            if *remaining == 0 {
                return Err(BrowserError::Interaction(format!("{selector} detached")));
            }
            *remaining -= 1;
        }
        if let Some(location) = script.navigating_clicks.get(selector).cloned() {
            script.location = location;
        }
        let export = match &script.export_button {
            Some((button, file_name)) if button == selector => Some(file_name.clone()),
            _ => None,
        };
        if let Some(file_name) = export {
            let next = script.exports.pop_front().flatten();
            if let (Some(body), Some(dir)) = (next, script.capture_dir.clone()) {
                std::fs::write(dir.join(file_name), body)?;
            }
        }
        Ok(())
    }

    async fn pin_all(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let count = self.count(selector).await?;
        Ok((0..count).map(|index| format!("{selector}{PIN}{index}")).collect())
    }

    async fn texts(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let script = self.script.borrow();
        Ok(script.lookup(&script.texts, selector).cloned().unwrap_or_default())
    }

    async fn attribute_values(
        &self,
        selector: &str,
        _attribute: &str,
    ) -> BrowserResult<Vec<String>> {
        let script = self.script.borrow();
        Ok(script
            .lookup(&script.attributes, selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn link_targets(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let script = self.script.borrow();
        Ok(script.lookup(&script.links, selector).cloned().unwrap_or_default())
    }

    async fn is_enabled(&self, selector: &str) -> BrowserResult<bool> {
        Ok(!self.script.borrow().disabled.contains(selector))
    }

    async fn is_attached(&self, selector: &str) -> BrowserResult<bool> {
        let script = self.script.borrow();
        Ok(script
            .attached_for
            .get(selector)
            .map(|remaining| *remaining > 0)
            .unwrap_or(false))
    }

    async fn evaluate(&self, _script: &str) -> BrowserResult<Value> {
        let script = self.script.borrow();
        script
            .payloads
            .get(&script.location)
            .cloned()
            .ok_or_else(|| BrowserError::Extraction(format!("no payload at {}", script.location)))
    }

    async fn capture_downloads(&self, directory: &Path) -> BrowserResult<()> {
        self.log(Event::Capture(directory.to_path_buf()));
        self.script.borrow_mut().capture_dir = Some(directory.to_path_buf());
        Ok(())
    }

    async fn release_downloads(&self) -> BrowserResult<()> {
        self.log(Event::Release);
        self.script.borrow_mut().capture_dir = None;
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.log(Event::Close);
        Ok(())
    }
}

#[async_trait(?Send)]
impl PageSessionFactory for ScriptedPage {
    async fn open(&self) -> BrowserResult<Box<dyn PageSession>> {
        self.script.borrow_mut().opened += 1;
        Ok(Box::new(self.clone()))
    }
}

/// A config rooted in `root` with short waits and no politeness delay.
pub fn fast_config(root: &Path, server: &str) -> HarvestConfig {
    let mut config = HarvestConfig::default();
    config.output.root_dir = root.to_string_lossy().to_string();
    let docs = &mut config.documentation;
    docs.search_url = format!("{server}/design/technical-documentation");
    docs.click_settle_ms = 0;
    docs.expand_settle_ms = 0;
    docs.ready_timeout_seconds = 1;
    docs.export_timeout_seconds = 1;
    docs.poll_interval_ms = 10;
    let forum = &mut config.forum;
    forum.category_url = format!("{server}/s/categories");
    forum.topic_url = format!("{server}/s/topiccatalog");
    forum.article_base_url = format!("{server}/s/article/");
    forum.wait_timeout_seconds = 1;
    forum.poll_interval_ms = 10;
    forum.politeness_delay_ms = [0, 0];
    forum.load_more_settle_ms = 0;
    config.download.retry_delay_ms = 0;
    config.download.timeout_seconds = 5;
    config
}

pub fn context(root: &Path, server: &str) -> HarvestContext {
    HarvestContext::new(fast_config(root, server)).expect("context")
}
