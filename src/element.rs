//! Bar elements and the renderer-owned element arena.
//!
//! Elements are the smallest independently positioned and paintable units
//! of bar content. The renderer owns them in an arena; modules hold only
//! [`ElementId`] handles, so a module that shrinks its element set at
//! runtime unregisters the ids and nothing dangles.

use slab::Slab;
use x11rb::protocol::xproto::Window;

use crate::color::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Input kinds, numbered like the X button detail values they arrive as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InputKind {
    ClickLeft = 1,
    ClickMiddle = 2,
    ClickRight = 3,
    ScrollUp = 4,
    ScrollDown = 5,
}

impl InputKind {
    pub fn from_button(detail: u8) -> Option<InputKind> {
        match detail {
            1 => Some(InputKind::ClickLeft),
            2 => Some(InputKind::ClickMiddle),
            3 => Some(InputKind::ClickRight),
            4 => Some(InputKind::ScrollUp),
            5 => Some(InputKind::ScrollDown),
            _ => None,
        }
    }
}

/// The set of input kinds an element responds to, as a small dispatch
/// table: presence means the owning module handles that kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    pub const EMPTY: EventMask = EventMask(0);

    pub fn with(mut self, kind: InputKind) -> EventMask {
        self.0 |= 1 << (kind as u8 - 1);
        self
    }

    pub fn contains(self, kind: InputKind) -> bool {
        self.0 & (1 << (kind as u8 - 1)) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

/// One renderable fragment of bar content.
///
/// `content` is mutated by the owning module, which must set `dirty`
/// afterwards; the decoded buffers, `begin_x`, `width` and `window` are
/// computed by the layout pass and are only meaningful while `dirty` is
/// false.
#[derive(Debug)]
pub struct BarElement {
    pub content: String,
    pub dirty: bool,

    pub foreground: Color,
    pub background: Color,
    pub underline_color: Color,
    pub underline: bool,
    pub overline: bool,

    pub alignment: Alignment,
    /// Pinned font slot; bypasses fallback scanning when it covers the
    /// codepoint.
    pub font_slot: Option<usize>,
    /// Index into the monitor chain this element renders on.
    pub monitor: usize,
    /// Owning module name, for diagnostics and dispatch routing.
    pub module: &'static str,

    pub events: EventMask,

    // Computed by the layout pass.
    pub glyphs: Vec<u32>,
    pub glyph_widths: Vec<u16>,
    pub begin_x: i32,
    pub width: i32,
    pub window: Window,
}

impl BarElement {
    pub fn new(module: &'static str, alignment: Alignment) -> Self {
        Self {
            content: String::new(),
            dirty: true,
            foreground: Color::UNSET,
            background: Color::UNSET,
            underline_color: Color::UNSET,
            underline: false,
            overline: false,
            alignment,
            font_slot: None,
            monitor: 0,
            module,
            events: EventMask::EMPTY,
            glyphs: Vec::new(),
            glyph_widths: Vec::new(),
            begin_x: 0,
            width: 0,
            window: x11rb::NONE,
        }
    }

    pub fn set_content(&mut self, text: &str) {
        if self.content != text {
            self.content.clear();
            self.content.push_str(text);
            self.dirty = true;
        }
    }
}

/// Result of a hit test, routed by the scheduler to the owning module.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch {
    pub element: ElementId,
    pub module: &'static str,
    pub kind: InputKind,
}

/// Arena of elements with stable ids plus the declared order, which is
/// registration order and drives both layout and hit-test priority.
#[derive(Debug, Default)]
pub struct ElementSet {
    slots: Slab<BarElement>,
    order: Vec<ElementId>,
}

impl ElementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, element: BarElement) -> ElementId {
        let id = ElementId(self.slots.insert(element));
        self.order.push(id);
        id
    }

    /// Unregister an element. Modules with a dynamic element set must call
    /// this before abandoning the id.
    pub fn remove(&mut self, id: ElementId) -> Option<BarElement> {
        self.order.retain(|&e| e != id);
        self.slots.try_remove(id.0)
    }

    pub fn get(&self, id: ElementId) -> Option<&BarElement> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut BarElement> {
        self.slots.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in declared order.
    pub fn ordered(&self) -> &[ElementId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &BarElement)> {
        self.order.iter().map(move |&id| (id, &self.slots[id.0]))
    }

    /// First element, in declared order, whose bound window matches, whose
    /// event mask contains `kind`, and whose span contains `x`.
    pub fn hit_test(&self, window: Window, x: i32, kind: InputKind) -> Option<Dispatch> {
        for (id, e) in self.iter() {
            if e.window == window
                && e.events.contains(kind)
                && x >= e.begin_x
                && x < e.begin_x + e.width
            {
                return Some(Dispatch { element: id, module: e.module, kind });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positioned(window: Window, begin_x: i32, width: i32, events: EventMask) -> BarElement {
        let mut e = BarElement::new("test", Alignment::Left);
        e.window = window;
        e.begin_x = begin_x;
        e.width = width;
        e.events = events;
        e.dirty = false;
        e
    }

    #[test]
    fn click_inside_span_matches_exactly_one() {
        let mut set = ElementSet::new();
        let left = EventMask::EMPTY.with(InputKind::ClickLeft);
        let a = set.insert(positioned(7, 0, 24, left));
        set.insert(positioned(7, 24, 10, left));

        let hit = set.hit_test(7, 10, InputKind::ClickLeft).expect("hit");
        assert_eq!(hit.element, a);
        assert_eq!(hit.kind, InputKind::ClickLeft);
    }

    #[test]
    fn span_boundaries_are_half_open() {
        let mut set = ElementSet::new();
        let left = EventMask::EMPTY.with(InputKind::ClickLeft);
        set.insert(positioned(7, 10, 20, left));

        assert!(set.hit_test(7, 9, InputKind::ClickLeft).is_none());
        assert!(set.hit_test(7, 10, InputKind::ClickLeft).is_some());
        assert!(set.hit_test(7, 29, InputKind::ClickLeft).is_some());
        assert!(set.hit_test(7, 30, InputKind::ClickLeft).is_none());
    }

    #[test]
    fn other_window_never_matches() {
        let mut set = ElementSet::new();
        let left = EventMask::EMPTY.with(InputKind::ClickLeft);
        set.insert(positioned(7, 0, 100, left));

        assert!(set.hit_test(8, 50, InputKind::ClickLeft).is_none());
    }

    #[test]
    fn unhandled_kind_does_not_match() {
        let mut set = ElementSet::new();
        set.insert(positioned(7, 0, 100, EventMask::EMPTY.with(InputKind::ScrollUp)));

        assert!(set.hit_test(7, 50, InputKind::ClickLeft).is_none());
        assert!(set.hit_test(7, 50, InputKind::ScrollUp).is_some());
    }

    #[test]
    fn removal_drops_the_element_from_declared_order() {
        let mut set = ElementSet::new();
        let left = EventMask::EMPTY.with(InputKind::ClickLeft);
        let a = set.insert(positioned(7, 0, 10, left));
        let b = set.insert(positioned(7, 10, 10, left));

        set.remove(a);
        assert_eq!(set.ordered(), &[b]);
        assert!(set.hit_test(7, 5, InputKind::ClickLeft).is_none());
    }

    #[test]
    fn button_detail_mapping() {
        assert_eq!(InputKind::from_button(1), Some(InputKind::ClickLeft));
        assert_eq!(InputKind::from_button(5), Some(InputKind::ScrollDown));
        assert_eq!(InputKind::from_button(6), None);
        assert_eq!(InputKind::from_button(0), None);
    }
}
