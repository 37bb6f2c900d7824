//! End-to-end layout and dispatch scenario over the library's pure seams:
//! decode a mixed ASCII/emoji element with a stub font provider, position
//! it, and hit-test clicks against the resulting span.

use limebar::element::{Alignment, BarElement, ElementSet, EventMask, InputKind};
use limebar::font::FontProvider;
use limebar::layout::{decode_element, position_element};

const MONITOR_WIDTH: i32 = 200;
const FAKE_WINDOW: u32 = 42;

/// One font slot covering everything; ASCII glyphs advance 8 px, anything
/// beyond ASCII 16 px.
struct StubFonts;

impl FontProvider for StubFonts {
    fn select(&mut self, _codepoint: u32, _pinned: Option<usize>) -> Option<usize> {
        Some(0)
    }

    fn advance_width(&mut self, _slot: usize, codepoint: u32) -> u16 {
        if codepoint < 0x80 {
            8
        } else {
            16
        }
    }
}

fn laid_out_element(content: &str) -> BarElement {
    let mut element = BarElement::new("scenario", Alignment::Left);
    element.events = EventMask::EMPTY.with(InputKind::ClickLeft);
    element.set_content(content);
    element.window = FAKE_WINDOW;

    decode_element(&mut element, &mut StubFonts);
    let (begin_x, _cursor) =
        position_element(element.alignment, element.width, MONITOR_WIDTH, 0);
    element.begin_x = begin_x;
    element
}

#[test]
fn ascii_plus_emoji_element_lays_out_and_dispatches() {
    // 'a' is one byte, the crying-laughing emoji four; five bytes of
    // content decode to exactly two glyphs.
    let content = "a\u{1f602}";
    assert_eq!(content.len(), 5);

    let element = laid_out_element(content);
    assert_eq!(element.glyphs.len(), 2);
    assert_eq!(element.glyphs[1], 0x1f602);
    assert_eq!(element.glyph_widths, vec![8, 16]);
    assert_eq!(element.width, 24);
    assert_eq!(element.begin_x, 0);

    let mut set = ElementSet::new();
    let id = set.insert(element);

    // A click inside the 24 px span fires the element's handler; one just
    // past the end fires nothing.
    let hit = set.hit_test(FAKE_WINDOW, 10, InputKind::ClickLeft).expect("click at 10 hits");
    assert_eq!(hit.element, id);
    assert_eq!(hit.module, "scenario");

    assert!(set.hit_test(FAKE_WINDOW, 25, InputKind::ClickLeft).is_none());
    assert!(set.hit_test(FAKE_WINDOW + 1, 10, InputKind::ClickLeft).is_none());
}

#[test]
fn mixed_alignment_elements_share_one_pass() {
    let mut fonts = StubFonts;
    let mut set = ElementSet::new();

    let mut left = BarElement::new("left", Alignment::Left);
    left.set_content("abc");
    let mut center = BarElement::new("center", Alignment::Center);
    center.set_content("mid");
    let mut right = BarElement::new("right", Alignment::Right);
    right.set_content("xyzw");

    for element in [&mut left, &mut center, &mut right] {
        decode_element(element, &mut fonts);
    }

    let mut cursor = 0;
    for element in [&mut left, &mut center, &mut right] {
        let (begin_x, next) =
            position_element(element.alignment, element.width, MONITOR_WIDTH, cursor);
        element.begin_x = begin_x;
        cursor = next;
    }

    assert_eq!(left.begin_x, 0);
    assert_eq!(center.begin_x, (MONITOR_WIDTH - 24) / 2);
    assert_eq!(right.begin_x, MONITOR_WIDTH - 32);

    set.insert(left);
    set.insert(center);
    set.insert(right);
    assert_eq!(set.len(), 3);
}

#[test]
fn dirty_flag_gates_redecoding() {
    let mut element = laid_out_element("ab");
    assert!(!element.dirty);
    assert_eq!(element.width, 16);

    // Same content: no dirty flag, the cached layout stands.
    element.set_content("ab");
    assert!(!element.dirty);

    element.set_content("abcd");
    assert!(element.dirty);
    decode_element(&mut element, &mut StubFonts);
    assert_eq!(element.width, 32);
}
