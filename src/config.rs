//! Startup configuration values.
//!
//! These are plain values, not CLI flags: the binary fills the struct and
//! hands it to [`crate::bar::Bar::open`]. Negative geometry fields mean
//! "auto-fit to the detected screen space".

#[derive(Debug, Clone)]
pub struct BarConfig {
    /// WM_NAME / WM_CLASS instance for the bar windows.
    pub name: String,
    /// Bar background, `#rgb`/`#rrggbb`/`#aarrggbb`.
    pub background: Option<String>,
    /// Default element foreground.
    pub foreground: Option<String>,
    /// Top-of-screen placement; `false` docks the bar at the bottom.
    pub topbar: bool,
    /// Ordered font patterns. A pattern is tried as a core X font name
    /// first, then as a scalable font file path with an optional
    /// `:size=N` suffix.
    pub fonts: Vec<String>,
    /// Bar width in pixels; negative spans all monitors.
    pub width: i32,
    /// Bar height in pixels; negative derives it from the tallest font.
    pub height: i32,
    /// Horizontal offset from the left edge of the monitor chain.
    pub offset_x: i32,
    /// Vertical offset from the chosen screen edge.
    pub offset_y: i32,
    /// Underline/overline rule thickness in pixels.
    pub underline_thickness: u16,
    /// Per-font-slot vertical glyph offsets. The first entry seeds all
    /// slots; later entries override their own slot.
    pub y_offsets: Vec<i16>,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            name: "limebar".into(),
            background: None,
            foreground: None,
            topbar: true,
            fonts: Vec::new(),
            width: -1,
            height: -1,
            offset_x: 0,
            offset_y: 0,
            underline_thickness: 1,
            y_offsets: Vec::new(),
        }
    }
}
