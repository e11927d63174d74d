//! In-memory fakes of the page-automation capability, plus scripted
//! classifier and transcriber backends, used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use recaptcha_solver::classify::{TileClassification, TileClassifier};
use recaptcha_solver::errors::{AutomationError, Error};
use recaptcha_solver::page::{
    Frame, OutboundRequest, Page, RequestDisposition, RequestGuard, ResponseEvent,
};
use recaptcha_solver::selector::{Role, Selector};
use recaptcha_solver::speech::{AudioClip, SpeechTranscriber};

/// One fake DOM element. Matching is structural: role plus accessible name,
/// visible text, or an exact CSS selector string.
#[derive(Clone)]
pub struct Element {
    pub css: String,
    pub role: Option<Role>,
    pub label: String,
    pub text: String,
    pub visible: bool,
    pub checked: bool,
    pub enabled: bool,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(css: &str) -> Self {
        Self {
            css: css.to_string(),
            role: None,
            label: String::new(),
            text: String::new(),
            visible: true,
            checked: false,
            enabled: true,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn role(mut self, role: Role, label: &str) -> Self {
        self.role = Some(role);
        self.label = label.to_string();
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr_value(&self, name: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.attrs.iter_mut().find(|(key, _)| key == name) {
            entry.1 = value.to_string();
        } else {
            self.attrs.push((name.to_string(), value.to_string()));
        }
    }
}

fn leaf_matches(element: &Element, selector: &Selector) -> bool {
    match selector {
        Selector::Role { role, name } => {
            element.role == Some(*role) && name.matches(&element.label)
        }
        Selector::Text(pattern) => pattern.matches(&element.text),
        Selector::Css(css) => &element.css == css,
        _ => false,
    }
}

fn descendants<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    out.push(element);
    for child in &element.children {
        descendants(child, out);
    }
}

fn resolve<'a>(scope: &'a [Element], selector: &Selector) -> Vec<&'a Element> {
    match selector {
        Selector::Nth(inner, index) => {
            resolve(scope, inner).into_iter().skip(*index).take(1).collect()
        }
        Selector::Within(parent, child) => resolve(scope, parent)
            .into_iter()
            .flat_map(|element| resolve(&element.children, child))
            .collect(),
        leaf => {
            let mut all = Vec::new();
            for element in scope {
                descendants(element, &mut all);
            }
            all.into_iter()
                .filter(|element| leaf_matches(element, leaf))
                .collect()
        }
    }
}

fn update_tree(scope: &mut [Element], pred: &dyn Fn(&Element) -> bool, f: &dyn Fn(&mut Element)) {
    for element in scope {
        if pred(element) {
            f(element);
        }
        update_tree(&mut element.children, pred, f);
    }
}

pub type ClickHandler = Arc<dyn Fn() + Send + Sync>;

pub struct MockFrame {
    url: String,
    name: String,
    detached: Mutex<bool>,
    elements: Mutex<Vec<Element>>,
    click_handlers: Mutex<HashMap<String, ClickHandler>>,
    pub clicks: Mutex<Vec<String>>,
    pub fills: Mutex<Vec<(String, String)>>,
}

impl MockFrame {
    pub fn new(url: &str, name: &str, elements: Vec<Element>) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            name: name.to_string(),
            detached: Mutex::new(false),
            elements: Mutex::new(elements),
            click_handlers: Mutex::new(HashMap::new()),
            clicks: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
        })
    }

    /// Register a callback fired after a click on the given selector.
    pub fn on_click(&self, selector: &Selector, handler: impl Fn() + Send + Sync + 'static) {
        self.click_handlers
            .lock()
            .unwrap()
            .insert(selector.to_string(), Arc::new(handler));
    }

    pub fn detach(&self) {
        *self.detached.lock().unwrap() = true;
    }

    /// Mutate every element (at any depth) matching the predicate.
    pub fn update_where(
        &self,
        pred: impl Fn(&Element) -> bool,
        f: impl Fn(&mut Element),
    ) {
        update_tree(&mut self.elements.lock().unwrap(), &pred, &f);
    }

    pub fn click_count(&self, selector: &Selector) -> usize {
        let needle = selector.to_string();
        self.clicks
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| **entry == needle)
            .count()
    }

    fn first<T>(
        &self,
        selector: &Selector,
        f: impl Fn(&Element) -> T,
    ) -> Option<T> {
        let elements = self.elements.lock().unwrap();
        resolve(&elements, selector)
            .into_iter()
            .next()
            .map(|element| f(element))
    }
}

#[async_trait]
impl Frame for MockFrame {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_detached(&self) -> bool {
        *self.detached.lock().unwrap()
    }

    async fn is_visible(&self, selector: &Selector) -> Result<bool, AutomationError> {
        Ok(self.first(selector, |element| element.visible).unwrap_or(false))
    }

    async fn is_checked(&self, selector: &Selector) -> Result<bool, AutomationError> {
        self.first(selector, |element| element.checked)
            .ok_or_else(|| AutomationError::ElementNotFound(selector.to_string()))
    }

    async fn is_enabled(&self, selector: &Selector) -> Result<bool, AutomationError> {
        self.first(selector, |element| element.enabled)
            .ok_or_else(|| AutomationError::ElementNotFound(selector.to_string()))
    }

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError> {
        let key = selector.to_string();

        if self.first(selector, |_| ()).is_none() {
            return Err(AutomationError::ElementNotFound(key));
        }

        self.clicks.lock().unwrap().push(key.clone());

        let handler = self.click_handlers.lock().unwrap().get(&key).cloned();
        if let Some(handler) = handler {
            handler();
        }

        Ok(())
    }

    async fn fill(&self, selector: &Selector, text: &str) -> Result<(), AutomationError> {
        let key = selector.to_string();

        if self.first(selector, |_| ()).is_none() {
            return Err(AutomationError::ElementNotFound(key));
        }

        self.fills.lock().unwrap().push((key, text.to_string()));
        Ok(())
    }

    async fn attribute(
        &self,
        selector: &Selector,
        name: &str,
    ) -> Result<Option<String>, AutomationError> {
        Ok(self.first(selector, |element| element.attr_value(name)).flatten())
    }

    async fn inner_text(&self, selector: &Selector) -> Result<String, AutomationError> {
        self.first(selector, |element| element.text.clone())
            .ok_or_else(|| AutomationError::ElementNotFound(selector.to_string()))
    }

    async fn count(&self, selector: &Selector) -> Result<usize, AutomationError> {
        let elements = self.elements.lock().unwrap();
        Ok(resolve(&elements, selector).len())
    }
}

pub struct MockPage {
    frames: Mutex<Vec<Arc<MockFrame>>>,
    responses: broadcast::Sender<ResponseEvent>,
    fetch_bodies: Mutex<HashMap<String, Vec<u8>>>,
    pub fetched: Mutex<Vec<String>>,
    guard: Mutex<Option<RequestGuard>>,
    pub evaluations: Mutex<Vec<String>>,
    evaluate_result: Mutex<serde_json::Value>,
    evaluate_queue: Mutex<VecDeque<serde_json::Value>>,
}

impl MockPage {
    pub fn new(frames: Vec<Arc<MockFrame>>) -> Arc<Self> {
        let (responses, _) = broadcast::channel(64);

        Arc::new(Self {
            frames: Mutex::new(frames),
            responses,
            fetch_bodies: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
            guard: Mutex::new(None),
            evaluations: Mutex::new(Vec::new()),
            evaluate_result: Mutex::new(serde_json::Value::Bool(true)),
            evaluate_queue: Mutex::new(VecDeque::new()),
        })
    }

    pub fn add_frame(&self, frame: Arc<MockFrame>) {
        self.frames.lock().unwrap().push(frame);
    }

    /// Deliver a fake network response to every listener.
    pub fn emit_response(&self, url: &str, body: &str) {
        let _ = self
            .responses
            .send(ResponseEvent::new(url, 200, body.as_bytes().to_vec()));
    }

    pub fn stub_fetch(&self, url: &str, body: Vec<u8>) {
        self.fetch_bodies.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn set_evaluate_result(&self, value: serde_json::Value) {
        *self.evaluate_result.lock().unwrap() = value;
    }

    /// Results consumed one per evaluation before the fixed result applies.
    pub fn queue_evaluate_results(&self, values: Vec<serde_json::Value>) {
        self.evaluate_queue.lock().unwrap().extend(values);
    }

    /// Run an outbound request through the installed guard, the way a real
    /// backend would before sending it.
    pub fn dispatch_request(&self, request: &OutboundRequest) -> RequestDisposition {
        match self.guard.lock().unwrap().as_ref() {
            Some(guard) => guard(request),
            None => RequestDisposition::Allow,
        }
    }
}

#[async_trait]
impl Page for MockPage {
    fn frames(&self) -> Vec<Arc<dyn Frame>> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| Arc::clone(frame) as Arc<dyn Frame>)
            .collect()
    }

    async fn wait(&self, duration: Duration) {
        // Compress waits so pacing delays do not slow the suite down.
        tokio::time::sleep(duration.min(Duration::from_millis(5))).await;
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AutomationError> {
        self.fetched.lock().unwrap().push(url.to_string());

        self.fetch_bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AutomationError::Fetch(format!("no stub for {url}")))
    }

    fn response_events(&self) -> broadcast::Receiver<ResponseEvent> {
        self.responses.subscribe()
    }

    fn set_request_guard(&self, guard: Option<RequestGuard>) {
        *self.guard.lock().unwrap() = guard;
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, AutomationError> {
        self.evaluations.lock().unwrap().push(script.to_string());

        if let Some(value) = self.evaluate_queue.lock().unwrap().pop_front() {
            return Ok(value);
        }
        Ok(self.evaluate_result.lock().unwrap().clone())
    }
}

/// Transcriber that replays a scripted sequence of results, then `None`.
pub struct ScriptedTranscriber {
    replies: Mutex<VecDeque<Option<String>>>,
    pub languages: Mutex<Vec<String>>,
}

impl ScriptedTranscriber {
    pub fn new(replies: Vec<Option<&str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|reply| reply.map(str::to_string))
                    .collect(),
            ),
            languages: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SpeechTranscriber for ScriptedTranscriber {
    async fn transcribe(
        &self,
        _clip: &AudioClip,
        language: &str,
    ) -> Result<Option<String>, Error> {
        self.languages.lock().unwrap().push(language.to_string());
        Ok(self.replies.lock().unwrap().pop_front().flatten())
    }
}

/// Classifier that replays a scripted sequence of results, then "no match".
pub struct ScriptedClassifier {
    results: Mutex<VecDeque<TileClassification>>,
    pub questions: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    pub fn new(results: Vec<TileClassification>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into_iter().collect()),
            questions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TileClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        _image: &[u8],
        category: &str,
    ) -> Result<TileClassification, Error> {
        self.questions.lock().unwrap().push(category.to_string());
        Ok(self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(TileClassification::no_match))
    }
}

/// Minimal valid 16-bit PCM WAV container, decodable by the audio pipeline.
pub fn wav_bytes(sample_rate: u32, frames: &[i16]) -> Vec<u8> {
    let data_len = (frames.len() * 2) as u32;

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for frame in frames {
        out.extend_from_slice(&frame.to_le_bytes());
    }
    out
}
