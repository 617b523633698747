use base64::alphabet;
use base64::engine::{ DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig };
use base64::Engine;
use log::{ debug, error, info, warn };
use serde_json::Value as JsonValue;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Mutex, MutexGuard };
use uuid::Uuid;

use crate::client::RefineClient;
use crate::errors::{ ExchangeError, ImageError };
use crate::models::chat::{ ChartImage, ChatMessage };
use crate::models::refine::{ BotReply, PendingChart, RefineResponse };
use crate::surface::{ ChatSurface, ElementId };

pub const RENDER_FAILURE_NOTE: &str = "\nChart: Failed to load image";

// Payloads only pass a prefix check before they get here, so decode the way a
// browser data URI would: padding optional, trailing bits ignored.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true)
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; nothing happened.
    Empty,
    /// Another submission was still awaiting its reply; this one was dropped.
    Busy,
    /// The request settled and exactly one bot message was appended.
    Settled,
}

/// Owns the chat surface and the refine client for the lifetime of the chat.
pub struct MessageExchangeHandler<S: ChatSurface, C: RefineClient> {
    surface: Mutex<S>,
    client: C,
    in_flight: AtomicBool,
}

impl<S: ChatSurface, C: RefineClient> MessageExchangeHandler<S, C> {
    pub fn new(surface: S, client: C) -> Result<Self, ExchangeError> {
        let missing: Vec<ElementId> = ElementId::ALL
            .iter()
            .copied()
            .filter(|id| !surface.has_element(*id))
            .collect();
        if !missing.is_empty() {
            let err = ExchangeError::Initialization { missing };
            error!("{}", err);
            return Err(err);
        }

        Ok(Self {
            surface: Mutex::new(surface),
            client,
            in_flight: AtomicBool::new(false),
        })
    }

    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let prompt = text.trim();
        if prompt.is_empty() {
            return SubmitOutcome::Empty;
        }
        let Some(_flight) = InFlight::acquire(&self.in_flight) else {
            warn!("Ignoring submission while a previous request is in flight");
            return SubmitOutcome::Busy;
        };

        let submission_id = Uuid::new_v4();
        info!("Submission {} started ({} chars)", submission_id, prompt.len());
        {
            let mut surface = self.lock_surface();
            surface.append_message(&ChatMessage::user(prompt));
            surface.clear_input();
            surface.set_loading(true);
        }
        let _loading = LoadingIndicator { surface: &self.surface };

        let reply = self.client
            .refine(prompt).await
            .and_then(|raw| self.handle_response(&raw));

        match reply {
            Ok(reply) => {
                self.render(reply);
                info!("Submission {} settled", submission_id);
            }
            Err(e) => {
                error!("Submission {} failed: {}", submission_id, e);
                self.render(BotReply { text: format!("Error: {}", e), chart: None });
            }
        }
        SubmitOutcome::Settled
    }

    pub fn handle_response(&self, raw: &JsonValue) -> Result<BotReply, ExchangeError> {
        let response = RefineResponse::parse(raw)?;
        if let Some(raw_output) = &response.raw_output {
            debug!("Refine raw output: {}", raw_output);
        }
        Ok(response.into_reply())
    }

    /// Appends a bot message, resolving its chart first. A chart the surface
    /// cannot show is dropped and noted in the text.
    pub fn render(&self, reply: BotReply) -> ChatMessage {
        let mut surface = self.lock_surface();
        let mut text = reply.text;
        let image = match reply.chart {
            Some(chart) =>
                match load_chart(&mut *surface, chart) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        warn!("Failed to load chart image: {}", e);
                        text.push_str(RENDER_FAILURE_NOTE);
                        None
                    }
                }
            None => None,
        };

        let message = ChatMessage::bot(text, image);
        surface.append_message(&message);
        message
    }

    pub fn close(&self) {
        info!("Closing chat");
        self.lock_surface().close();
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn with_surface<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let surface = self.lock_surface();
        f(&*surface)
    }

    fn lock_surface(&self) -> MutexGuard<'_, S> {
        lock(&self.surface)
    }
}

fn lock<S>(surface: &Mutex<S>) -> MutexGuard<'_, S> {
    surface.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn load_chart<S: ChatSurface + ?Sized>(
    surface: &mut S,
    chart: PendingChart
) -> Result<ChartImage, ImageError> {
    let png = LENIENT_BASE64
        .decode(chart.base64.as_bytes())
        .map_err(|e| ImageError::Render(format!("base64 decode failed: {}", e)))?;
    let image = ChartImage {
        label: chart.label,
        base64: chart.base64,
        png,
    };
    surface.prepare_image(&image).map_err(ImageError::Render)?;
    Ok(image)
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Hides the loading indicator when the submission settles or is dropped.
struct LoadingIndicator<'a, S: ChatSurface> {
    surface: &'a Mutex<S>,
}

impl<S: ChatSurface> Drop for LoadingIndicator<'_, S> {
    fn drop(&mut self) {
        lock(self.surface).set_loading(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;
    use crate::models::refine::{ FALLBACK_MESSAGE, INVALID_IMAGE_NOTE };
    use crate::surface::RecordingSurface;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    enum Scripted {
        Reply(JsonValue),
        Fail(ExchangeError),
        Gated(Arc<Gate>, JsonValue),
        Hang,
    }

    #[derive(Default)]
    struct Gate {
        entered: Notify,
        release: Notify,
    }

    #[derive(Default)]
    struct ScriptedClient {
        script: Mutex<VecDeque<Scripted>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn with(script: Vec<Scripted>) -> Self {
            Self { script: Mutex::new(script.into()), prompts: Mutex::default() }
        }
    }

    #[async_trait]
    impl RefineClient for ScriptedClient {
        async fn refine(&self, prompt: &str) -> Result<JsonValue, ExchangeError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(v)) => Ok(v),
                Some(Scripted::Fail(e)) => Err(e),
                Some(Scripted::Gated(gate, v)) => {
                    gate.entered.notify_one();
                    gate.release.notified().await;
                    Ok(v)
                }
                Some(Scripted::Hang) => std::future::pending().await,
                None => panic!("unexpected request for {prompt:?}"),
            }
        }
    }

    fn handler(script: Vec<Scripted>) -> MessageExchangeHandler<RecordingSurface, ScriptedClient> {
        MessageExchangeHandler::new(RecordingSurface::new(), ScriptedClient::with(script)).unwrap()
    }

    fn prompts(h: &MessageExchangeHandler<RecordingSurface, ScriptedClient>) -> Vec<String> {
        h.client.prompts.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn submit_appends_user_then_bot_and_hides_loading() {
        let h = handler(vec![Scripted::Reply(json!({ "message": "hi" }))]);
        h.lock_surface().set_input("  hello there ");

        assert_eq!(h.submit("  hello there ").await, SubmitOutcome::Settled);

        h.with_surface(|s| {
            assert_eq!(s.texts(), vec!["hello there", "hi"]);
            assert_eq!(s.messages[0].role, Role::User);
            assert_eq!(s.messages[1].role, Role::Bot);
            assert!(s.input.is_empty());
            assert_eq!(s.loading_changes, vec![true, false]);
        });
        assert_eq!(prompts(&h), vec!["hello there"]);
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let h = handler(vec![]);
        for blank in ["", "   ", "\n\t"] {
            assert_eq!(h.submit(blank).await, SubmitOutcome::Empty);
        }
        h.with_surface(|s| {
            assert!(s.messages.is_empty());
            assert!(s.loading_changes.is_empty());
        });
        assert!(prompts(&h).is_empty());
    }

    #[tokio::test]
    async fn transport_failure_becomes_one_error_message() {
        let h = handler(vec![Scripted::Fail(ExchangeError::HttpStatus {
            status: 500,
            reason: "Internal Server Error".to_string(),
        })]);

        h.submit("prices").await;

        h.with_surface(|s| {
            assert_eq!(s.texts(), vec!["prices", "Error: API error: 500 Internal Server Error"]);
            assert!(!s.loading);
        });
        assert!(!h.is_busy());
    }

    #[tokio::test]
    async fn non_object_response_is_reported_not_raised() {
        let h = handler(vec![Scripted::Reply(json!(null)), Scripted::Reply(json!([1, 2]))]);
        h.submit("a").await;
        h.submit("b").await;
        h.with_surface(|s| {
            assert_eq!(s.texts(), vec![
                "a",
                "Error: Invalid API response format",
                "b",
                "Error: Invalid API response format",
            ]);
        });
    }

    #[tokio::test]
    async fn empty_object_renders_fallback() {
        let h = handler(vec![Scripted::Reply(json!({}))]);
        h.submit("x").await;
        h.with_surface(|s| assert_eq!(s.messages[1].text, FALLBACK_MESSAGE));
    }

    #[tokio::test]
    async fn valid_chart_is_rendered_without_note() {
        let h = handler(vec![Scripted::Reply(json!({
            "refined_message": "Apple",
            "stocks": [{ "chart_image_base64": "iVBORw0KGgoABC" }]
        }))]);
        h.submit("apple chart").await;

        h.with_surface(|s| {
            let bot = &s.messages[1];
            assert_eq!(bot.text, "Apple");
            let image = bot.image.as_ref().expect("chart should be rendered");
            assert!(image.png.starts_with(&crate::surface::PNG_SIGNATURE));
            assert_eq!(image.data_uri(), "data:image/png;base64,iVBORw0KGgoABC");
        });
    }

    #[tokio::test]
    async fn invalid_prefix_suppresses_chart() {
        let h = handler(vec![Scripted::Reply(json!({
            "message": "Apple",
            "stocks": [{ "chart_image_base64": "notapng" }]
        }))]);
        h.submit("apple chart").await;

        h.with_surface(|s| {
            let bot = &s.messages[1];
            assert!(bot.image.is_none());
            assert!(bot.text.ends_with(INVALID_IMAGE_NOTE));
        });
    }

    #[test]
    fn rejected_chart_is_removed_and_noted() {
        let h = MessageExchangeHandler::new(
            RecordingSurface::new().rejecting_images(),
            ScriptedClient::default()
        ).unwrap();
        let message = h.render(BotReply {
            text: "Apple".to_string(),
            chart: Some(PendingChart { label: None, base64: "iVBORw0KGgoABC".to_string() }),
        });

        assert!(message.image.is_none());
        assert_eq!(message.text, "Apple\nChart: Failed to load image");
        h.with_surface(|s| assert_eq!(s.messages.len(), 1));
    }

    #[test]
    fn undecodable_chart_is_a_render_failure() {
        let h = handler(vec![]);
        let message = h.render(BotReply {
            text: "Apple".to_string(),
            chart: Some(PendingChart { label: None, base64: "iVBORw0KGgo!!!!".to_string() }),
        });
        assert!(message.image.is_none());
        assert!(message.text.ends_with(RENDER_FAILURE_NOTE));
    }

    #[test]
    fn missing_elements_fail_construction() {
        let surface = RecordingSurface::new()
            .without(ElementId::LoadingIndicator)
            .without(ElementId::SendControl);
        let err = MessageExchangeHandler::new(surface, ScriptedClient::default())
            .err()
            .expect("construction should fail");
        match err {
            ExchangeError::Initialization { missing } => {
                assert_eq!(missing, vec![ElementId::SendControl, ElementId::LoadingIndicator]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn overlapping_submission_is_ignored() {
        let gate = Arc::new(Gate::default());
        let h = Arc::new(handler(vec![Scripted::Gated(gate.clone(), json!({ "message": "first" }))]));

        let first = tokio::spawn({
            let h = h.clone();
            async move { h.submit("one").await }
        });
        gate.entered.notified().await;

        assert!(h.is_busy());
        assert_eq!(h.submit("two").await, SubmitOutcome::Busy);
        h.with_surface(|s| {
            assert_eq!(s.texts(), vec!["one"]);
            assert!(s.loading);
        });

        gate.release.notify_one();
        assert_eq!(first.await.unwrap(), SubmitOutcome::Settled);
        h.with_surface(|s| assert_eq!(s.texts(), vec!["one", "first"]));
        assert_eq!(prompts(&h), vec!["one"]);
    }

    #[tokio::test]
    async fn dropped_submission_still_cleans_up() {
        let h = handler(vec![Scripted::Hang, Scripted::Reply(json!({ "message": "ok" }))]);

        let timed_out = tokio::time::timeout(Duration::from_millis(20), h.submit("stuck")).await;
        assert!(timed_out.is_err());
        assert!(!h.is_busy());
        h.with_surface(|s| assert!(!s.loading));

        assert_eq!(h.submit("again").await, SubmitOutcome::Settled);
        h.with_surface(|s| assert_eq!(s.texts(), vec!["stuck", "again", "ok"]));
    }

    #[test]
    fn close_closes_surface() {
        let h = handler(vec![]);
        h.close();
        h.with_surface(|s| assert!(s.closed));
    }
}
