//! Font loading, glyph coverage, and advance-width caching.
//!
//! A pattern is tried as a core X font name first; if the server rejects
//! it, the pattern is read as a scalable font file path (with an optional
//! `:size=N` suffix) and parsed with ab_glyph. Either way the loaded font
//! lands in the ordered [`FontSet`], which resolves codepoints to the
//! first covering font and answers advance-width queries through a
//! never-evicted open-addressed cache.

use ab_glyph::{Font as _, FontRef, PxScale, ScaleFont};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, Charinfo, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

use crate::error::Error;

pub const MAX_FONT_COUNT: usize = 5;

const GLYPH_CACHE_SLOTS: usize = 1 << 16;

const DEFAULT_SCALABLE_SIZE: f32 = 16.0;

/// Codepoint → rendered advance width, open-addressed with linear probing.
/// Slot count far exceeds any realistic distinct-glyph population, keeping
/// probe chains short. Entries are never evicted; the cache lives as long
/// as the owning font set.
pub struct GlyphWidthCache {
    codepoints: Box<[u32]>,
    widths: Box<[u16]>,
}

impl GlyphWidthCache {
    pub fn new() -> Self {
        Self {
            codepoints: vec![0; GLYPH_CACHE_SLOTS].into_boxed_slice(),
            widths: vec![0; GLYPH_CACHE_SLOTS].into_boxed_slice(),
        }
    }

    /// Cached width for `codepoint`, calling `measure` exactly once on the
    /// first query. Codepoint 0 is the empty-slot sentinel and is never
    /// cached.
    pub fn width_of(&mut self, codepoint: u32, measure: impl FnOnce() -> u16) -> u16 {
        if codepoint == 0 {
            return measure();
        }

        let mut slot = codepoint as usize & (GLYPH_CACHE_SLOTS - 1);
        while self.codepoints[slot] != 0 && self.codepoints[slot] != codepoint {
            slot = (slot + 1) & (GLYPH_CACHE_SLOTS - 1);
        }

        if self.codepoints[slot] == codepoint {
            return self.widths[slot];
        }

        let width = measure();
        self.codepoints[slot] = codepoint;
        self.widths[slot] = width;
        width
    }
}

impl Default for GlyphWidthCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A core (bitmap) X server font with its queried width lookup table.
pub struct CoreFont {
    pub fid: xproto::Font,
    /// Per-codepoint char infos, indexed by `codepoint - char_min`. A zero
    /// `character_width` entry is the "glyph absent" sentinel.
    pub width_lut: Vec<Charinfo>,
    pub char_min: u32,
    pub char_max: u32,
    pub default_width: u16,
}

/// A scalable font parsed with ab_glyph from owned bytes.
///
/// The FontRef<'static> is safe because `_bytes` sits in the same struct
/// and is never moved or dropped while the reference lives; the 'static
/// reference never leaves this module.
pub struct ScalableFont {
    _bytes: Vec<u8>,
    font: FontRef<'static>,
    scale: PxScale,
}

impl ScalableFont {
    fn new(data: Vec<u8>, scale: PxScale) -> Result<Self, ab_glyph::InvalidFont> {
        let font: FontRef<'static> = unsafe {
            let slice: &[u8] = &data;
            let extended: &'static [u8] = &*(slice as *const [u8]);
            FontRef::try_from_slice(extended)?
        };
        Ok(Self { _bytes: data, font, scale })
    }

    pub fn scaled(&self) -> ab_glyph::PxScaleFont<&FontRef<'static>> {
        self.font.as_scaled(self.scale)
    }
}

pub enum Backend {
    Core(CoreFont),
    Scalable(ScalableFont),
}

pub struct LoadedFont {
    pub backend: Backend,
    pub ascent: i16,
    pub descent: i16,
    /// Equalized to the set-wide maximum after loading, so the baseline is
    /// uniform across fonts.
    pub height: i16,
}

impl LoadedFont {
    pub fn has_glyph(&self, codepoint: u32) -> bool {
        match &self.backend {
            Backend::Core(core) => {
                if codepoint < core.char_min || codepoint > core.char_max {
                    return false;
                }
                match core.width_lut.get((codepoint - core.char_min) as usize) {
                    Some(info) => info.character_width != 0,
                    None => true,
                }
            }
            Backend::Scalable(sf) => match char::from_u32(codepoint) {
                Some(ch) => sf.font.glyph_id(ch).0 != 0,
                None => false,
            },
        }
    }

    /// Advance width from the core width table. Scalable fonts go through
    /// the cache in [`FontSet::advance_width`] instead.
    fn core_width(core: &CoreFont, codepoint: u32) -> u16 {
        core.width_lut
            .get(codepoint.wrapping_sub(core.char_min) as usize)
            .map(|info| info.character_width.max(0) as u16)
            .unwrap_or(core.default_width)
    }

    /// Backend glyph query for a scalable font: the larger of the advance
    /// and the outline bounding-box width, guarding against zero-advance
    /// combining-like glyphs.
    fn scalable_width(sf: &ScalableFont, codepoint: u32) -> u16 {
        let Some(ch) = char::from_u32(codepoint) else { return 0 };
        let scaled = sf.scaled();
        let advance = scaled.h_advance(scaled.glyph_id(ch)).ceil() as u16;
        let bbox = scaled
            .outline_glyph(scaled.scaled_glyph(ch))
            .map(|og| og.px_bounds().width().ceil() as u16)
            .unwrap_or(0);
        advance.max(bbox)
    }
}

/// Seam between the layout engine and concrete font storage, so layout
/// logic stays testable without an X connection.
pub trait FontProvider {
    /// First font slot able to draw `codepoint`, honoring a pinned slot.
    fn select(&mut self, codepoint: u32, pinned: Option<usize>) -> Option<usize>;
    /// Advance width of `codepoint` as slot `slot` will draw it.
    fn advance_width(&mut self, slot: usize, codepoint: u32) -> u16;
}

/// Ordered list of loaded fonts plus the shared width cache and per-slot
/// vertical offsets.
pub struct FontSet {
    fonts: Vec<LoadedFont>,
    cache: GlyphWidthCache,
    y_offsets: Vec<i16>,
}

impl FontSet {
    pub fn new(y_offsets: Vec<i16>) -> Self {
        Self { fonts: Vec::new(), cache: GlyphWidthCache::new(), y_offsets }
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn get(&self, slot: usize) -> &LoadedFont {
        &self.fonts[slot]
    }

    pub fn y_offset(&self, slot: usize) -> i16 {
        self.y_offsets
            .get(slot)
            .or_else(|| self.y_offsets.first())
            .copied()
            .unwrap_or(0)
    }

    /// Load one font pattern, trying the core protocol first and a
    /// scalable file second. Failure is soft: the pattern is logged and
    /// skipped, and fallback continues with the remaining fonts.
    pub fn load(&mut self, conn: &RustConnection, pattern: &str) {
        if self.fonts.len() >= MAX_FONT_COUNT {
            tracing::warn!(pattern, "max font count reached, pattern ignored");
            return;
        }

        match self.load_core(conn, pattern) {
            Ok(font) => {
                tracing::info!(pattern, slot = self.fonts.len(), "loaded core font");
                self.fonts.push(font);
                return;
            }
            Err(err) => {
                tracing::debug!(pattern, %err, "core font open failed, trying scalable");
            }
        }

        match Self::load_scalable(pattern) {
            Ok(font) => {
                tracing::info!(pattern, slot = self.fonts.len(), "loaded scalable font");
                self.fonts.push(font);
            }
            Err(err) => {
                tracing::warn!(pattern, %err, "could not load font");
            }
        }
    }

    fn load_core(&self, conn: &RustConnection, pattern: &str) -> Result<LoadedFont, Error> {
        let fid = conn.generate_id()?;
        conn.open_font(fid, pattern.as_bytes())?.check()?;
        let info = conn.query_font(fid)?.reply()?;

        let ascent = info.font_ascent;
        let descent = info.font_descent;
        Ok(LoadedFont {
            backend: Backend::Core(CoreFont {
                fid,
                char_min: u32::from(info.min_byte1) << 8 | u32::from(info.min_char_or_byte2),
                char_max: u32::from(info.max_byte1) << 8 | u32::from(info.max_char_or_byte2),
                default_width: info.max_bounds.character_width.max(0) as u16,
                width_lut: info.char_infos,
            }),
            ascent,
            descent,
            height: ascent + descent,
        })
    }

    fn load_scalable(pattern: &str) -> Result<LoadedFont, Box<dyn std::error::Error>> {
        let (path, size) = match pattern.rsplit_once(":size=") {
            Some((path, size)) => (path, size.parse::<f32>()?),
            None => (pattern, DEFAULT_SCALABLE_SIZE),
        };

        let path = expand_tilde(path);
        let data = std::fs::read(&path)?;
        let sf = ScalableFont::new(data, PxScale::from(size))?;

        let scaled = sf.scaled();
        let ascent = scaled.ascent().ceil() as i16;
        let descent = (-scaled.descent()).ceil() as i16;
        Ok(LoadedFont {
            backend: Backend::Scalable(sf),
            ascent,
            descent,
            height: ascent + descent,
        })
    }

    /// Stretch every font to the tallest height in the set so mixed-font
    /// lines share one baseline.
    pub fn equalize_heights(&mut self) {
        let max = self.max_height();
        for font in &mut self.fonts {
            font.height = max;
        }
    }

    pub fn max_height(&self) -> i16 {
        self.fonts.iter().map(|f| f.height).max().unwrap_or(0)
    }

    /// Release server-side font resources. Called at shutdown; errors at
    /// this point are ignored.
    pub fn close_all(&self, conn: &RustConnection) {
        for font in &self.fonts {
            if let Backend::Core(core) = &font.backend {
                let _ = conn.close_font(core.fid);
            }
        }
    }
}

impl FontProvider for FontSet {
    fn select(&mut self, codepoint: u32, pinned: Option<usize>) -> Option<usize> {
        if let Some(slot) = pinned {
            if self.fonts.get(slot).is_some_and(|f| f.has_glyph(codepoint)) {
                return Some(slot);
            }
        }
        self.fonts.iter().position(|f| f.has_glyph(codepoint))
    }

    fn advance_width(&mut self, slot: usize, codepoint: u32) -> u16 {
        match &self.fonts[slot].backend {
            Backend::Core(core) => LoadedFont::core_width(core, codepoint),
            Backend::Scalable(sf) => self
                .cache
                .width_of(codepoint, || LoadedFont::scalable_width(sf, codepoint)),
        }
    }
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        let home = std::env::var("HOME").unwrap_or_default();
        format!("{home}{rest}")
    } else {
        path.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn cache_measures_once_and_stays_idempotent() {
        let mut cache = GlyphWidthCache::new();
        let calls = Cell::new(0);
        let measure = || {
            calls.set(calls.get() + 1);
            8
        };

        assert_eq!(cache.width_of('a' as u32, measure), 8);
        assert_eq!(calls.get(), 1);

        // Second query must hit without touching the backend.
        assert_eq!(cache.width_of('a' as u32, || unreachable!()), 8);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn colliding_codepoints_probe_to_distinct_slots() {
        let mut cache = GlyphWidthCache::new();
        let a = 65;
        let clash = 65 + GLYPH_CACHE_SLOTS as u32;

        assert_eq!(cache.width_of(a, || 8), 8);
        assert_eq!(cache.width_of(clash, || 16), 16);
        assert_eq!(cache.width_of(a, || unreachable!()), 8);
        assert_eq!(cache.width_of(clash, || unreachable!()), 16);
    }

    fn core_font(char_min: u32, char_max: u32, lut: Vec<Charinfo>) -> LoadedFont {
        LoadedFont {
            backend: Backend::Core(CoreFont {
                fid: 1,
                width_lut: lut,
                char_min,
                char_max,
                default_width: 6,
            }),
            ascent: 10,
            descent: 2,
            height: 12,
        }
    }

    #[test]
    fn core_coverage_requires_range_and_nonzero_width() {
        let lut = vec![
            Charinfo { character_width: 8, ..Default::default() },
            Charinfo { character_width: 0, ..Default::default() },
            Charinfo { character_width: 7, ..Default::default() },
        ];
        let font = core_font(64, 66, lut);

        assert!(font.has_glyph(64));
        // Zero width is the "glyph absent" sentinel.
        assert!(!font.has_glyph(65));
        assert!(font.has_glyph(66));
        assert!(!font.has_glyph(63));
        assert!(!font.has_glyph(67));
    }

    #[test]
    fn core_coverage_without_lut_is_range_only() {
        let font = core_font(32, 126, Vec::new());
        assert!(font.has_glyph(32));
        assert!(font.has_glyph(126));
        assert!(!font.has_glyph(127));
    }

    #[test]
    fn selection_prefers_pinned_slot_when_it_covers() {
        let mut set = FontSet::new(Vec::new());
        set.fonts.push(core_font(32, 126, Vec::new()));
        set.fonts.push(core_font(32, 0xffff, Vec::new()));

        assert_eq!(set.select('a' as u32, None), Some(0));
        assert_eq!(set.select('a' as u32, Some(1)), Some(1));
        // Pinned slot without coverage falls back to scan order.
        assert_eq!(set.select(0x2603, Some(0)), Some(1));
        assert_eq!(set.select(0x10_0000, None), None);
    }

    #[test]
    fn y_offset_defaults_to_first_entry() {
        let set = FontSet::new(vec![3, -1]);
        assert_eq!(set.y_offset(0), 3);
        assert_eq!(set.y_offset(1), -1);
        assert_eq!(set.y_offset(2), 3);

        let empty = FontSet::new(Vec::new());
        assert_eq!(empty.y_offset(0), 0);
    }
}
