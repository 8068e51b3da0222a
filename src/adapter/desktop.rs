//! Desktop-surface adapter
//!
//! Drives a target application running on the local desktop: actions are
//! synthesized as keyboard input, state is fingerprinted from screen captures.
//! Each supported application gets its own gesture profile mapping action
//! descriptors to concrete key sequences.

use crate::adapter::{
    ActionDescriptor, ActionKind, AdapterError, StateSignature, TargetAdapter, TargetApp,
    UIStateSnapshot,
};
use crate::artifact::{ArtifactRef, ArtifactStore};
use async_trait::async_trait;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use image_hasher::{HashAlg, HasherConfig};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Pause between successive synthesized key taps
const TAP_INTERVAL: Duration = Duration::from_millis(50);

/// One synthesized input event
#[derive(Debug, Clone)]
enum InputEvent {
    /// Press and release a single character key
    Tap(char),
    /// Hold modifiers while tapping a key
    Chord(Vec<Key>),
    /// Type free text
    Text(String),
    /// Press Enter
    Enter,
}

/// Platform command modifier for palette shortcuts
#[cfg(target_os = "macos")]
const COMMAND_KEY: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const COMMAND_KEY: Key = Key::Control;

/// Gesture mapping for one supported application
#[derive(Debug, Clone, Copy)]
struct AppProfile {
    app: TargetApp,
}

impl AppProfile {
    fn for_app(app: TargetApp) -> Self {
        Self { app }
    }

    /// Resolve an action into the input events that perform it, or `None`
    /// when the application offers no gesture for it
    fn resolve(&self, action: &ActionDescriptor) -> Option<Vec<InputEvent>> {
        match action.kind {
            ActionKind::Navigate | ActionKind::OpenDialog => self.resolve_navigation(action),
            ActionKind::Fill => action
                .detail
                .as_ref()
                .map(|text| vec![InputEvent::Text(text.clone())]),
            ActionKind::Confirm => Some(vec![InputEvent::Enter]),
            ActionKind::Other => None,
        }
    }

    fn resolve_navigation(&self, action: &ActionDescriptor) -> Option<Vec<InputEvent>> {
        let target = action.target.trim().to_lowercase();
        if target.is_empty() {
            return None;
        }

        match self.app {
            TargetApp::Linear => Some(match target.as_str() {
                // Linear's two-stroke navigation shortcuts
                "projects" => vec![InputEvent::Tap('g'), InputEvent::Tap('p')],
                "issues" | "my issues" => vec![InputEvent::Tap('g'), InputEvent::Tap('i')],
                "inbox" => vec![InputEvent::Tap('g'), InputEvent::Tap('n')],
                "settings" => vec![InputEvent::Tap('g'), InputEvent::Tap('s')],
                "create issue" => vec![InputEvent::Tap('c')],
                // Anything else goes through the command palette
                _ => palette_sequence(COMMAND_KEY, 'k', &action.target),
            }),
            TargetApp::Notion => Some(match target.as_str() {
                "search" => vec![InputEvent::Chord(vec![COMMAND_KEY, Key::Unicode('p')])],
                _ => palette_sequence(COMMAND_KEY, 'p', &action.target),
            }),
            // Asana reaches everything through search, opened with '/'
            TargetApp::Asana => Some(vec![
                InputEvent::Tap('/'),
                InputEvent::Text(action.target.clone()),
                InputEvent::Enter,
            ]),
        }
    }
}

/// Open a command palette, type the target, and submit
fn palette_sequence(modifier: Key, key: char, target: &str) -> Vec<InputEvent> {
    vec![
        InputEvent::Chord(vec![modifier, Key::Unicode(key)]),
        InputEvent::Text(target.to_string()),
        InputEvent::Enter,
    ]
}

/// Adapter driving an application through the local desktop
pub struct DesktopAdapter {
    profile: AppProfile,
    store: Arc<dyn ArtifactStore>,
    /// Wait after input before the post-action state read
    input_settle: Duration,
}

impl DesktopAdapter {
    /// Create the desktop adapter for an application
    pub fn for_app(app: TargetApp, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            profile: AppProfile::for_app(app),
            store,
            input_settle: Duration::from_millis(800),
        }
    }

    /// Override the post-input settle wait
    pub fn with_input_settle(mut self, input_settle: Duration) -> Self {
        self.input_settle = input_settle;
        self
    }

    /// Capture the primary display, returning the encoded frame and its
    /// perceptual-hash signature
    fn capture_frame(&self) -> Result<(Vec<u8>, StateSignature), AdapterError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| AdapterError::Unavailable(format!("screen capture failed: {}", e)))?;
        let monitor = monitors
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Unavailable("no display found".to_string()))?;
        let raw = monitor
            .capture_image()
            .map_err(|e| AdapterError::Unavailable(format!("screen capture failed: {}", e)))?;

        let img = DynamicImage::ImageRgba8(raw);

        // Scale down large displays; the fingerprint and the artifact both
        // survive the reduction
        let (width, height) = img.dimensions();
        let resized = if width > 1600 || height > 1200 {
            let scale = f32::min(1600.0 / width as f32, 1200.0 / height as f32);
            let new_width = (width as f32 * scale) as u32;
            let new_height = (height as f32 * scale) as u32;
            img.resize(new_width, new_height, FilterType::Lanczos3)
        } else {
            img
        };

        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::DoubleGradient)
            .hash_size(8, 8)
            .to_hasher();
        let signature = StateSignature::new(hasher.hash_image(&resized).to_base64());

        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        let mut jpeg = Vec::new();
        let mut cursor = Cursor::new(&mut jpeg);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, 75);
        rgb.write_with_encoder(encoder)
            .map_err(|e| AdapterError::Unavailable(format!("frame encoding failed: {}", e)))?;

        Ok((jpeg, signature))
    }

    /// Capture, store, and wrap the current screen as a snapshot
    fn snapshot(&self) -> Result<UIStateSnapshot, AdapterError> {
        let (jpeg, signature) = self.capture_frame()?;
        let label = format!("{}-screen", self.profile.app.display_name().to_lowercase());
        let artifact = self
            .store
            .store(&jpeg, &label)
            .map_err(|e| AdapterError::Unavailable(format!("artifact store failed: {}", e)))?;
        Ok(UIStateSnapshot::new(signature, artifact))
    }

    /// Synthesize the input events for a gesture
    fn apply_inputs(&self, events: &[InputEvent]) -> Result<(), AdapterError> {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| AdapterError::Unavailable(format!("input channel failed: {}", e)))?;

        for event in events {
            match event {
                InputEvent::Tap(c) => {
                    enigo
                        .key(Key::Unicode(*c), Direction::Click)
                        .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
                }
                InputEvent::Chord(keys) => {
                    let (last, modifiers) = keys
                        .split_last()
                        .ok_or_else(|| AdapterError::ActionRejected("empty chord".to_string()))?;
                    for key in modifiers {
                        enigo
                            .key(*key, Direction::Press)
                            .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
                    }
                    enigo
                        .key(*last, Direction::Click)
                        .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
                    // Release modifiers in reverse order
                    for key in modifiers.iter().rev() {
                        enigo
                            .key(*key, Direction::Release)
                            .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
                    }
                }
                InputEvent::Text(text) => {
                    enigo
                        .text(text)
                        .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
                }
                InputEvent::Enter => {
                    enigo
                        .key(Key::Return, Direction::Click)
                        .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
                }
            }
            std::thread::sleep(TAP_INTERVAL);
        }

        Ok(())
    }
}

#[async_trait]
impl TargetAdapter for DesktopAdapter {
    fn app(&self) -> TargetApp {
        self.profile.app
    }

    async fn navigate(&self, action: &ActionDescriptor) -> Result<UIStateSnapshot, AdapterError> {
        let events = self.profile.resolve(action).ok_or_else(|| {
            AdapterError::ActionRejected(format!(
                "{} offers no gesture for '{}'",
                self.profile.app,
                action.describe()
            ))
        })?;

        tracing::debug!(app = %self.profile.app, action = %action.describe(), "synthesizing input");
        tokio::task::block_in_place(|| self.apply_inputs(&events))?;

        // Give the target a moment to react before reading the outcome
        tokio::time::sleep(self.input_settle).await;

        // The target may also have moved under external influence; re-read
        // rather than assume the gesture's nominal result
        self.current_state().await
    }

    async fn current_state(&self) -> Result<UIStateSnapshot, AdapterError> {
        tokio::task::block_in_place(|| self.snapshot())
    }

    async fn capture_artifact(&self) -> Result<ArtifactRef, AdapterError> {
        let snapshot = tokio::task::block_in_place(|| self.snapshot())?;
        Ok(snapshot.artifact)
    }
}
