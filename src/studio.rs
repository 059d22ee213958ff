//! The composition root.
//!
//! A [`Studio`] owns the configuration store, the logo processor and a
//! renderer. Every accepted update goes through the store; logo inputs are
//! handed to the processor; options are re-derived and re-rendered only when
//! the configuration version or the processed logo changed.
//!
//! While the processed logo for the current snapshot is still being
//! computed, the studio keeps showing what it rendered last. It never
//! derives options from a configuration paired with another snapshot's
//! logo. A background watcher refreshes the studio as soon as the processor
//! publishes a result, so edits made in the meantime show up with it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::config::Configuration;
use crate::error::{ConfigError, RenderError, StudioError};
use crate::logo::{LogoKey, LogoSource};
use crate::options::{RenderOptions, derive_options};
use crate::processor::{LogoCompositor, LogoProcessor, LogoState};
use crate::render::{ExportFormat, RenderedCode, Renderer, SvgRenderer};
use crate::store::{ConfigStore, FieldUpdate, UpdateOutcome};

/// Inputs of the last derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Digest {
    version: u64,
    logo: Option<LogoKey>,
}

// ============================================================================
// Session
// ============================================================================

/// Mutable state shared between the studio and its logo watcher.
struct Session<R> {
    store: ConfigStore,
    processor: LogoProcessor,
    renderer: R,
    digest: Option<Digest>,
    options: Option<RenderOptions>,
    rendered: Option<RenderedCode>,
    last_error: Option<Arc<RenderError>>,
}

impl<R: Renderer> Session<R> {
    fn after_update(&mut self, outcome: &UpdateOutcome) {
        if !outcome.changed {
            return;
        }
        if outcome.logo_inputs_changed {
            self.request_logo();
        }
        self.refresh();
    }

    fn request_logo(&mut self) {
        let snapshot = self.store.snapshot();
        // The ticket is not needed: results arrive through the processor state
        let _ = self
            .processor
            .request(snapshot.logo.as_ref(), snapshot.logo_opacity);
    }

    fn refresh(&mut self) -> bool {
        let snapshot = self.store.snapshot();
        let wanted = snapshot
            .logo
            .as_ref()
            .map(|logo| LogoKey::new(logo.id(), snapshot.logo_opacity));

        let state = self.processor.state();
        let processed = match wanted {
            Some(key) => match state.processed_for(key) {
                Some(processed) => Some(processed.clone()),
                None => {
                    log::debug!("{} still processing; keeping previous render", key.logo());
                    return false;
                }
            },
            None => None,
        };

        let digest = Digest {
            version: self.store.version(),
            logo: wanted,
        };
        if self.digest == Some(digest) {
            return false;
        }
        self.digest = Some(digest);

        log::debug!("deriving options for version {}", digest.version);
        let options = derive_options(&snapshot, processed.as_ref());
        match self.renderer.render(&options) {
            Ok(code) => {
                log::info!(
                    "rendered {} modules at level {}",
                    code.module_count(),
                    options.ec_level
                );
                self.rendered = Some(code);
                self.last_error = None;
            }
            Err(err) => {
                log::warn!("render failed: {err}");
                self.last_error = Some(Arc::new(err));
            }
        }
        self.options = Some(options);
        true
    }
}

fn lock<R>(session: &Mutex<Session<R>>) -> MutexGuard<'_, Session<R>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Refreshes the session each time the processor state changes.
///
/// Holds the session weakly and stops once the studio is gone.
fn spawn_watcher<R>(
    runtime: &Handle,
    session: Weak<Mutex<Session<R>>>,
    mut updates: watch::Receiver<LogoState>,
) -> AbortHandle
where
    R: Renderer + Send + 'static,
{
    let task = runtime.spawn(async move {
        while updates.changed().await.is_ok() {
            let Some(session) = session.upgrade() else {
                break;
            };
            let refreshed = tokio::task::spawn_blocking(move || lock(&session).refresh()).await;
            match refreshed {
                Ok(true) => log::debug!("refreshed after logo update"),
                Ok(false) => {}
                Err(err) => log::warn!("refresh after logo update did not complete: {err}"),
            }
        }
    });
    task.abort_handle()
}

// ============================================================================
// Studio
// ============================================================================

/// Live QR design session.
///
/// Cheap to share by reference: every method takes `&self`.
pub struct Studio<R: Renderer = SvgRenderer> {
    session: Arc<Mutex<Session<R>>>,
    logo_updates: watch::Receiver<LogoState>,
    watcher: AbortHandle,
}

impl Studio {
    /// Creates a studio with the SVG renderer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_config(config: Configuration) -> Result<Self, StudioError> {
        Self::new(config, SvgRenderer::new())
    }
}

impl<R: Renderer + Send + 'static> Studio<R> {
    /// Creates a studio and renders the initial configuration.
    ///
    /// If the configuration carries a logo, processing starts immediately
    /// and the first render follows once it is published. The saved error
    /// correction level is kept.
    pub fn new(config: Configuration, renderer: R) -> Result<Self, StudioError> {
        let runtime = Handle::try_current()?;
        let processor = LogoProcessor::new(runtime.clone());
        Ok(Self::assemble(&runtime, config, renderer, processor))
    }

    /// Like [`new`](Self::new), with a custom compositing step.
    pub fn with_compositor(
        config: Configuration,
        renderer: R,
        compositor: impl LogoCompositor,
    ) -> Result<Self, StudioError> {
        let runtime = Handle::try_current()?;
        let processor = LogoProcessor::with_compositor(runtime.clone(), compositor);
        Ok(Self::assemble(&runtime, config, renderer, processor))
    }

    fn assemble(
        runtime: &Handle,
        config: Configuration,
        renderer: R,
        processor: LogoProcessor,
    ) -> Self {
        let logo_updates = processor.subscribe();
        let watcher_updates = processor.subscribe();

        let mut session = Session {
            store: ConfigStore::new(config),
            processor,
            renderer,
            digest: None,
            options: None,
            rendered: None,
            last_error: None,
        };
        session.request_logo();
        session.refresh();

        let session = Arc::new(Mutex::new(session));
        let watcher = spawn_watcher(runtime, Arc::downgrade(&session), watcher_updates);
        Self {
            session,
            logo_updates,
            watcher,
        }
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    /// Applies one field update.
    pub fn apply(&self, update: FieldUpdate) -> UpdateOutcome {
        let mut session = lock(&self.session);
        let outcome = session.store.apply(update);
        session.after_update(&outcome);
        outcome
    }

    /// Applies a form event given as a camelCase field name and a raw value.
    pub fn apply_event(&self, field: &str, value: &str) -> Result<UpdateOutcome, ConfigError> {
        let update = FieldUpdate::parse(field, value)?;
        Ok(self.apply(update))
    }

    /// Uploads a new logo from its encoded bytes.
    pub fn upload_logo(&self, bytes: impl Into<Arc<[u8]>>) -> UpdateOutcome {
        let source = LogoSource::new(bytes);
        log::info!("uploaded {} ({})", source.id(), source.mime_type());
        self.apply(FieldUpdate::Logo(Some(source)))
    }

    pub fn remove_logo(&self) -> UpdateOutcome {
        self.apply(FieldUpdate::Logo(None))
    }

    /// Replaces the whole configuration.
    ///
    /// Bringing in a logo where there was none forces level `H`.
    pub fn replace_config(&self, config: Configuration) -> UpdateOutcome {
        let mut session = lock(&self.session);
        let outcome = session.store.replace(config);
        session.after_update(&outcome);
        outcome
    }

    // ------------------------------------------------------------------------
    // Derivation
    // ------------------------------------------------------------------------

    /// Re-derives and re-renders if the configuration or the processed logo
    /// changed since the last derivation.
    ///
    /// Returns true if a new render was attempted. Published logo results
    /// trigger this automatically.
    pub fn refresh(&self) -> bool {
        lock(&self.session).refresh()
    }

    /// Waits for the pending logo, if any, then refreshes.
    pub async fn settle(&self) -> bool {
        let mut updates = self.logo_updates.clone();
        if updates.wait_for(|state| !state.is_pending()).await.is_err() {
            log::warn!("logo processor closed while a logo was pending");
        }
        self.refresh()
    }

    /// Subscribes to logo processing state changes.
    pub fn logo_updates(&self) -> watch::Receiver<LogoState> {
        self.logo_updates.clone()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<Configuration> {
        lock(&self.session).store.snapshot()
    }

    pub fn version(&self) -> u64 {
        lock(&self.session).store.version()
    }

    /// Options of the last derivation.
    pub fn options(&self) -> Option<RenderOptions> {
        lock(&self.session).options.clone()
    }

    /// The last successful render.
    pub fn rendered(&self) -> Option<RenderedCode> {
        lock(&self.session).rendered.clone()
    }

    /// The error of the last render, if it failed.
    pub fn last_error(&self) -> Option<Arc<RenderError>> {
        lock(&self.session).last_error.clone()
    }

    pub fn logo_state(&self) -> LogoState {
        self.logo_updates.borrow().clone()
    }

    pub fn is_logo_pending(&self) -> bool {
        self.logo_updates.borrow().is_pending()
    }

    /// Runs `f` with the renderer.
    pub fn with_renderer<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&lock(&self.session).renderer)
    }

    /// Exports the last successful render.
    pub fn download(&self, format: ExportFormat) -> Result<Vec<u8>, RenderError> {
        self.rendered()
            .ok_or(RenderError::NothingRendered)?
            .export(format)
    }
}

impl<R: Renderer> Drop for Studio<R> {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::HexColor;
    use crate::config::ErrorCorrectionLevel;
    use crate::logo::{LogoId, ProcessedLogo, composite_logo};
    use crate::render::raster::encode_image;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::sync::mpsc;
    use std::time::Duration;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn png(color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 4, Rgba(color));
        encode_image(&img, ImageFormat::Png, Rgba([0, 0, 0, 0])).unwrap()
    }

    /// Records every set of options it is asked to render.
    #[derive(Default)]
    struct RecordingRenderer {
        seen: Vec<RenderOptions>,
    }

    impl Renderer for RecordingRenderer {
        fn render(&mut self, options: &RenderOptions) -> Result<RenderedCode, RenderError> {
            self.seen.push(options.clone());
            SvgRenderer::new().render(options)
        }
    }

    fn studio(config: Configuration) -> Studio<RecordingRenderer> {
        Studio::new(config, RecordingRenderer::default()).unwrap()
    }

    fn renders(studio: &Studio<RecordingRenderer>) -> usize {
        studio.with_renderer(|renderer| renderer.seen.len())
    }

    /// Blocks compositing of selected logos until released.
    #[derive(Default)]
    struct GatedCompositor {
        gates: Mutex<HashMap<LogoId, mpsc::Receiver<()>>>,
    }

    impl GatedCompositor {
        fn gate(&self, id: LogoId) -> mpsc::Sender<()> {
            let (tx, rx) = mpsc::channel();
            self.gates.lock().unwrap().insert(id, rx);
            tx
        }
    }

    impl LogoCompositor for Arc<GatedCompositor> {
        fn composite(&self, source: &LogoSource, opacity: f32) -> ProcessedLogo {
            let gate = self.gates.lock().unwrap().remove(&source.id());
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            composite_logo(source, opacity)
        }
    }

    fn gated_studio() -> (Studio<RecordingRenderer>, Arc<GatedCompositor>) {
        let compositor = Arc::new(GatedCompositor::default());
        let studio = Studio::with_compositor(
            Configuration::default(),
            RecordingRenderer::default(),
            Arc::clone(&compositor),
        )
        .unwrap();
        (studio, compositor)
    }

    fn shown_logo(studio: &Studio<RecordingRenderer>) -> Option<LogoKey> {
        studio
            .options()
            .and_then(|options| options.logo_image)
            .map(|image| image.key())
    }

    #[test]
    fn requires_a_runtime() {
        assert!(matches!(
            Studio::with_config(Configuration::default()),
            Err(StudioError::NoRuntime(_))
        ));
    }

    #[tokio::test]
    async fn renders_on_creation_and_on_change_only() {
        init_logging();
        let studio = studio(Configuration::default());
        assert_eq!(renders(&studio), 1);
        assert!(studio.rendered().is_some());

        let outcome = studio.apply(FieldUpdate::Payload("https://mindsecurity.org/".into()));
        assert!(!outcome.changed);
        assert!(!studio.refresh());
        assert_eq!(renders(&studio), 1);

        studio.apply_event("foregroundColor", "#000000").unwrap();
        assert_eq!(renders(&studio), 2);
        assert_eq!(studio.options().unwrap().fg_color, HexColor::BLACK);
    }

    #[tokio::test]
    async fn bad_events_leave_the_configuration_alone() {
        let studio = studio(Configuration::default());
        assert!(studio.apply_event("qrStyle", "hexagons").is_err());
        assert!(studio.apply_event("noSuchField", "1").is_err());
        assert_eq!(studio.version(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn upload_holds_previous_render_until_processed() {
        init_logging();
        let (studio, compositor) = gated_studio();
        let before = studio.options().unwrap();

        let source = LogoSource::new(png([255, 0, 0, 255]));
        let release = compositor.gate(source.id());
        let outcome = studio.apply(FieldUpdate::Logo(Some(source.clone())));
        assert_eq!(outcome.snapshot.error_correction_level, ErrorCorrectionLevel::H);

        // Nothing is re-derived while the logo is pending
        assert!(studio.is_logo_pending());
        assert!(!studio.refresh());
        assert_eq!(studio.options(), Some(before));
        assert_eq!(renders(&studio), 1);

        release.send(()).unwrap();
        studio.settle().await;
        let options = studio.options().unwrap();
        assert_eq!(options.ec_level, ErrorCorrectionLevel::H);
        assert_eq!(shown_logo(&studio), Some(LogoKey::new(source.id(), 1.0)));
        assert!(studio.last_error().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn published_logo_rerenders_with_held_edits() {
        init_logging();
        let (studio, compositor) = gated_studio();
        let before = studio.options().unwrap();

        let source = LogoSource::new(png([0, 128, 0, 255]));
        let release = compositor.gate(source.id());
        studio.apply(FieldUpdate::Logo(Some(source.clone())));
        studio.apply_event("foregroundColor", "#ff0000").unwrap();
        assert_eq!(studio.options(), Some(before));

        release.send(()).unwrap();
        let expected = Some(LogoKey::new(source.id(), 1.0));
        tokio::time::timeout(Duration::from_secs(5), async {
            while shown_logo(&studio) != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("published logo was never rendered");

        let options = studio.options().unwrap();
        assert_eq!(options.fg_color.to_string(), "#ff0000");
        assert_eq!(options.ec_level, ErrorCorrectionLevel::H);
        assert_eq!(renders(&studio), 2);
    }

    #[tokio::test]
    async fn logo_updates_report_publication() {
        let studio = studio(Configuration::default());
        let mut updates = studio.logo_updates();

        studio.upload_logo(png([1, 2, 3, 255]));
        let state = updates
            .wait_for(|state| state.current().is_some() && !state.is_pending())
            .await
            .unwrap()
            .clone();
        let key = state.current().unwrap();
        assert_eq!(state.processed().map(|logo| logo.key()), Some(key));
    }

    #[tokio::test]
    async fn opacity_change_reprocesses_the_logo() {
        let studio = studio(Configuration::default());
        studio.upload_logo(png([0, 0, 255, 255]));
        studio.settle().await;

        studio.apply_event("logoOpacity", "0.25").unwrap();
        studio.settle().await;

        let options = studio.options().unwrap();
        let processed = options.logo_image.as_ref().unwrap();
        assert_eq!(processed.key().opacity(), 0.25);
        let pixels = processed.decode().unwrap();
        assert!(pixels.pixels().all(|p| (60..=68).contains(&p[3])));
    }

    #[tokio::test]
    async fn removing_the_logo_clears_it_immediately() {
        let studio = studio(Configuration::default());
        studio.upload_logo(png([0, 0, 0, 255]));
        studio.settle().await;
        assert!(studio.options().unwrap().logo_image.is_some());

        studio.remove_logo();
        assert!(studio.options().unwrap().logo_image.is_none());
        assert_eq!(studio.logo_state(), LogoState::default());
        // The level chosen by the upload stays
        assert_eq!(studio.options().unwrap().ec_level, ErrorCorrectionLevel::H);
    }

    #[tokio::test]
    async fn replacing_config_with_a_logo_forces_high_level() {
        let studio = studio(Configuration::default());
        let mut loaded = Configuration::default().with_error_correction(ErrorCorrectionLevel::L);
        loaded.logo = Some(LogoSource::new(png([5, 5, 5, 255])));

        let outcome = studio.replace_config(loaded);
        assert_eq!(outcome.snapshot.error_correction_level, ErrorCorrectionLevel::H);

        studio.settle().await;
        let options = studio.options().unwrap();
        assert_eq!(options.ec_level, ErrorCorrectionLevel::H);
        assert!(options.logo_image.is_some());
    }

    #[tokio::test]
    async fn render_failure_keeps_options_and_last_render() {
        init_logging();
        let studio = studio(Configuration::default());
        let good = studio.rendered().unwrap();

        studio.apply(FieldUpdate::Payload("x".repeat(10_000)));
        assert!(matches!(
            studio.last_error().as_deref(),
            Some(RenderError::DataTooLong { .. })
        ));
        assert_eq!(studio.options().unwrap().value.len(), 10_000);
        assert_eq!(studio.rendered(), Some(good));
        assert!(studio.download(ExportFormat::Svg).is_ok());
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn render(&mut self, options: &RenderOptions) -> Result<RenderedCode, RenderError> {
            Err(RenderError::DataTooLong {
                level: options.ec_level,
            })
        }
    }

    #[tokio::test]
    async fn download_needs_a_render() {
        let studio = Studio::new(Configuration::default(), FailingRenderer).unwrap();
        assert!(studio.options().is_some());
        assert!(matches!(
            studio.download(ExportFormat::Png),
            Err(RenderError::NothingRendered)
        ));
    }

    #[tokio::test]
    async fn download_decodes_to_canvas_size() {
        let mut config = Configuration::default();
        config.size = 300;
        config.quiet_zone = 12;
        let studio = studio(config);

        let png = studio.download(ExportFormat::Png).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (324, 324));
    }

    #[tokio::test]
    async fn loaded_configuration_with_logo_renders_after_settle() {
        let mut config = Configuration::default();
        config.logo = Some(LogoSource::new(png([9, 9, 9, 255])));
        config.error_correction_level = ErrorCorrectionLevel::M;

        let studio = studio(config);
        studio.settle().await;

        let options = studio.options().unwrap();
        assert!(options.logo_image.is_some());
        assert_eq!(options.ec_level, ErrorCorrectionLevel::M);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn superseded_upload_never_shows() {
        init_logging();
        let (studio, compositor) = gated_studio();

        let first = LogoSource::new(png([255, 0, 0, 255]));
        let release = compositor.gate(first.id());

        studio.apply(FieldUpdate::Logo(Some(first.clone())));
        studio.apply_event("logoOpacity", "0.3").unwrap();
        let second = studio.upload_logo(png([0, 255, 0, 255]));
        studio.settle().await;

        let expected = LogoKey::new(second.snapshot.logo.as_ref().unwrap().id(), 0.3);
        release.send(()).unwrap();
        tokio::task::yield_now().await;

        assert!(!studio.refresh());
        let seen = studio.with_renderer(|renderer| renderer.seen.clone());
        for options in &seen {
            if let Some(image) = &options.logo_image {
                assert_eq!(image.key(), expected);
            }
        }
        assert_eq!(shown_logo(&studio), Some(expected));
    }
}
