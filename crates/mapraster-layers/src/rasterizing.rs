//! A layer decorator that serves a cached bitmap of another layer.
//!
//! The wrapped layer is rendered into a single raster feature after a quiet
//! period following view or data changes. The map queries the decorator like
//! any other layer and receives that feature, at whatever zoom it is drawing,
//! until the next pass replaces it.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use thiserror::Error;

use mapraster_core::{
    BBox, DataChanged, DataChangedEvents, Feature, FeatureStore, Layer, SubscriptionId,
};
use mapraster_renderer::{RenderError, Renderer, SoftwareRenderer, Viewport};

use crate::config::{ConfigError, RasterizingConfig};
use crate::disposal::GenerationTracker;
use crate::scheduler::{DebounceScheduler, Task, ThreadScheduler};

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start debounce timer: {0}")]
    Timer(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum RasterizeError {
    #[error("Rasterization failed: {0}")]
    Render(#[from] RenderError),
}

// ── Pass results ──────────────────────────────────────────────────────

/// Why a rasterization pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Disposed,
    /// No finite, positive resolution has been requested yet.
    NoResolution,
    NoExtent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RasterizeOutcome {
    Skipped(SkipReason),
    Installed { generation: u64, viewport: Viewport },
}

/// A map resolution (world units per pixel) known to be finite and positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution(f64);

impl Resolution {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

/// Build the viewport a pass renders for the requested view.
///
/// `multiplier` divides the requested resolution (values above one give a
/// sharper bitmap); `overscan` enlarges the covered area around the same
/// centre.
pub fn create_viewport(extent: &BBox, resolution: f64, multiplier: f64, overscan: f64) -> Viewport {
    let render_resolution = resolution / multiplier;
    Viewport::new(
        extent.centroid(),
        render_resolution,
        extent.width() * overscan / render_resolution,
        extent.height() * overscan / render_resolution,
    )
}

// ── Layer ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ViewState {
    /// Last requested extent.
    extent: Option<BBox>,
    /// Last requested resolution, if usable.
    resolution: Option<Resolution>,
    /// Viewport of the last installed pass.
    current_viewport: Option<Viewport>,
}

struct Inner {
    name: String,
    wrapped: Arc<dyn Layer>,
    config: RasterizingConfig,
    renderer: Arc<dyn Renderer>,
    scheduler: Arc<dyn DebounceScheduler>,
    task: Task,
    cache: FeatureStore,
    tracker: GenerationTracker,
    events: DataChangedEvents,
    view: Mutex<ViewState>,
    /// Held for the whole of a pass; serializes passes and their install step.
    pass: Mutex<()>,
    enabled: AtomicBool,
    disposed: AtomicBool,
    generation: AtomicU64,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl Inner {
    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn arm(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.scheduler.arm(self.config.delay(), self.task.clone());
    }

    fn rasterize(&self) -> Result<RasterizeOutcome, RasterizeError> {
        if !self.enabled.load(Ordering::Acquire) {
            return Ok(RasterizeOutcome::Skipped(SkipReason::Disabled));
        }
        let pass = self.pass.lock().unwrap_or_else(|e| e.into_inner());
        if self.disposed.load(Ordering::Acquire) {
            return Ok(RasterizeOutcome::Skipped(SkipReason::Disposed));
        }

        let (extent, resolution) = {
            let view = self.view();
            (view.extent, view.resolution)
        };
        let Some(resolution) = resolution else {
            log::debug!("Layer '{}': no usable resolution yet, skipping pass", self.name);
            return Ok(RasterizeOutcome::Skipped(SkipReason::NoResolution));
        };
        let Some(extent) = extent else {
            log::debug!("Layer '{}': no extent yet, skipping pass", self.name);
            return Ok(RasterizeOutcome::Skipped(SkipReason::NoExtent));
        };

        let viewport = create_viewport(
            &extent,
            resolution.get(),
            self.config.render_resolution_multiplier,
            self.config.overscan_ratio,
        );
        let layers = [Arc::clone(&self.wrapped)];
        let bitmap = self.renderer.render_to_bitmap_stream(&viewport, &layers)?;
        let bytes = bitmap.len();

        let feature = Arc::new(Feature::raster(bitmap, viewport.extent()));
        let released = self.tracker.commit(&self.cache, vec![feature]);
        self.view().current_viewport = Some(viewport);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        drop(pass);

        log::debug!(
            "Layer '{}': installed generation {} ({}x{} px, {} bytes, {} feature(s) released)",
            self.name,
            generation,
            viewport.width().ceil(),
            viewport.height().ceil(),
            bytes,
            released
        );
        // Published outside the pass lock: each notification follows its own
        // install, but passes finishing back to back on different threads may
        // announce out of order. Events carry no generation; subscribers re-query.
        self.events.publish(&DataChanged::new(&self.name));
        Ok(RasterizeOutcome::Installed {
            generation,
            viewport,
        })
    }
}

fn rasterize_task(inner: Weak<Inner>) -> Task {
    Arc::new(move || {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if let Err(e) = inner.rasterize() {
            log::error!(
                "Layer '{}': {}; keeping the previous raster",
                inner.name,
                e
            );
        }
    })
}

/// Decorator that rasterizes a wrapped layer and serves the bitmap.
///
/// Readers (`features_in_view`) never wait for a pass: the bitmap is rendered
/// without touching the feature store's lock and installed with a single swap.
pub struct RasterizingLayer {
    inner: Arc<Inner>,
}

impl RasterizingLayer {
    /// Wrap `wrapped` using the software renderer and a background timer thread.
    pub fn new(wrapped: Arc<dyn Layer>, config: RasterizingConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let scheduler = Arc::new(ThreadScheduler::new()?);
        Ok(Self::with_parts(
            wrapped,
            config,
            Arc::new(SoftwareRenderer::new()),
            scheduler,
        )?)
    }

    /// Wrap `wrapped` with an explicit renderer and debounce scheduler.
    pub fn with_parts(
        wrapped: Arc<dyn Layer>,
        config: RasterizingConfig,
        renderer: Arc<dyn Renderer>,
        scheduler: Arc<dyn DebounceScheduler>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            name: wrapped.name().to_string(),
            wrapped: Arc::clone(&wrapped),
            config,
            renderer,
            scheduler,
            task: rasterize_task(weak.clone()),
            cache: FeatureStore::new(),
            tracker: GenerationTracker::new(),
            events: DataChangedEvents::new(),
            view: Mutex::new(ViewState::default()),
            pass: Mutex::new(()),
            enabled: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            subscription: Mutex::new(None),
        });

        // Underlying data changes always invalidate the raster.
        let weak = Arc::downgrade(&inner);
        let id = wrapped.data_changed().subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.arm();
            }
        });
        *inner
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(id);

        Ok(Self { inner })
    }

    pub fn config(&self) -> &RasterizingConfig {
        &self.inner.config
    }

    pub fn wrapped(&self) -> &Arc<dyn Layer> {
        &self.inner.wrapped
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    /// Viewport of the last installed pass.
    pub fn current_viewport(&self) -> Option<Viewport> {
        self.inner.view().current_viewport
    }

    /// Number of passes installed so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Run a pass now, bypassing the debounce timer.
    pub fn rasterize(&self) -> Result<RasterizeOutcome, RasterizeError> {
        self.inner.rasterize()
    }

    /// Stop reacting to changes and release every cached bitmap.
    ///
    /// Waits for an in-flight pass to finish. Idempotent.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.scheduler.cancel();
        if let Some(id) = inner
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            inner.wrapped.data_changed().unsubscribe(id);
        }
        let _pass = inner.pass.lock().unwrap_or_else(|e| e.into_inner());
        let released = inner.tracker.release_all(&inner.cache);
        inner.view().current_viewport = None;
        log::debug!(
            "Layer '{}': disposed, {} feature(s) released",
            inner.name,
            released
        );
    }
}

impl Layer for RasterizingLayer {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn envelope(&self) -> Option<BBox> {
        self.inner.wrapped.envelope()
    }

    fn features_in_view(&self, extent: &BBox, resolution: f64) -> Vec<Arc<Feature>> {
        self.inner.cache.features_in_view(extent, resolution)
    }

    fn view_changed(&self, major_change: bool, extent: &BBox, resolution: f64) {
        let inner = &self.inner;
        let config = &inner.config;
        let candidate = create_viewport(extent, resolution, config.render_resolution_multiplier, 1.0);

        let stale = {
            let mut view = inner.view();
            let stale = !config.rerasterize_only_outside_overscan
                || match &view.current_viewport {
                    None => true,
                    Some(current) => {
                        current.resolution() != candidate.resolution()
                            || !current.extent().contains(&candidate.extent())
                    }
                };
            if stale {
                view.extent = Some(*extent);
                view.resolution = Resolution::new(resolution);
            }
            stale
        };

        if stale {
            inner.wrapped.view_changed(major_change, extent, resolution);
            inner.arm();
        } else {
            log::trace!(
                "Layer '{}': view still inside the rasterized area",
                inner.name
            );
        }
    }

    fn abort_fetch(&self) {
        self.inner.wrapped.abort_fetch();
    }

    fn clear_cache(&self) {
        self.inner.wrapped.clear_cache();
    }

    fn data_changed(&self) -> &DataChangedEvents {
        &self.inner.events
    }

    fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }
}

impl Drop for RasterizingLayer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for RasterizingLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterizingLayer")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("generation", &self.generation())
            .finish()
    }
}
