//! Exit-intent detection
//!
//! A one-shot trigger armed by [`ExitIntentDetector::init`]. Either signal
//! fires it:
//! - the pointer leaving through the top edge of the viewport (`clientY <= 0`)
//! - scroll depth reaching a percentage threshold
//!
//! Both signals share one triggered flag, so the callback runs at most once
//! per armed period no matter how many qualifying events arrive.

/// Which signals to listen for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitIntentOptions {
    pub enable_mouse_leave: bool,
    pub enable_scroll_depth: bool,
    /// Scroll percentage (0-100) that fires the trigger
    pub scroll_threshold: f64,
}

impl Default for ExitIntentOptions {
    fn default() -> Self {
        Self {
            enable_mouse_leave: true,
            enable_scroll_depth: false,
            scroll_threshold: 80.0,
        }
    }
}

/// Scroll position of the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Percentage of the scrollable height covered, `None` if the page can't scroll
    pub fn percent(&self) -> Option<f64> {
        let scrollable = self.scroll_height - self.client_height;
        if scrollable <= 0.0 {
            return None;
        }
        Some(self.scroll_top / scrollable * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitIntentState {
    /// No listeners attached
    Detached,
    Armed,
    Triggered,
}

type Callback = Box<dyn FnMut() + Send>;

/// Detector for one page.
#[derive(Default)]
pub struct ExitIntentDetector {
    callback: Option<Callback>,
    mouse_listener: bool,
    scroll_listener: Option<f64>,
    triggered: bool,
}

impl std::fmt::Debug for ExitIntentDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitIntentDetector")
            .field("mouse_listener", &self.mouse_listener)
            .field("scroll_listener", &self.scroll_listener)
            .field("triggered", &self.triggered)
            .finish()
    }
}

impl ExitIntentDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the detector, replacing any previous callback and listeners.
    pub fn init<F>(&mut self, callback: F, options: ExitIntentOptions)
    where
        F: FnMut() + Send + 'static,
    {
        self.triggered = false;
        self.callback = Some(Box::new(callback));
        self.mouse_listener = options.enable_mouse_leave;
        self.scroll_listener = options
            .enable_scroll_depth
            .then_some(options.scroll_threshold);

        tracing::debug!(
            mouse_leave = options.enable_mouse_leave,
            scroll_depth = options.enable_scroll_depth,
            threshold = options.scroll_threshold,
            "Exit intent armed"
        );
    }

    /// Pointer left the document. Returns whether this event fired the trigger.
    pub fn on_mouse_out(&mut self, client_y: f64) -> bool {
        if !self.mouse_listener || client_y > 0.0 {
            return false;
        }
        self.fire("mouse_leave")
    }

    /// Document scrolled. Returns whether this event fired the trigger.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        let Some(threshold) = self.scroll_listener else {
            return false;
        };
        match metrics.percent() {
            Some(percent) if percent >= threshold => self.fire("scroll_depth"),
            _ => false,
        }
    }

    /// Detach listeners and clear the triggered flag.
    pub fn cleanup(&mut self) {
        self.callback = None;
        self.mouse_listener = false;
        self.scroll_listener = None;
        self.triggered = false;
    }

    /// Clear the triggered flag, keeping listeners attached.
    pub fn reset(&mut self) {
        self.triggered = false;
    }

    pub fn has_triggered(&self) -> bool {
        self.triggered
    }

    pub fn state(&self) -> ExitIntentState {
        if self.triggered {
            ExitIntentState::Triggered
        } else if self.mouse_listener || self.scroll_listener.is_some() {
            ExitIntentState::Armed
        } else {
            ExitIntentState::Detached
        }
    }

    fn fire(&mut self, signal: &str) -> bool {
        if self.triggered {
            return false;
        }
        self.triggered = true;
        tracing::debug!(signal, "Exit intent triggered");
        if let Some(callback) = self.callback.as_mut() {
            callback();
        }
        true
    }
}
