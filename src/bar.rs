//! The renderer: owns the X connection, the monitor chain with its
//! windows and off-screen pixmaps, the font set, and the element arena.
//!
//! `present` runs the layout engine and flushes pixmaps to the visible
//! windows; `poll_events` drains the protocol queue, coalescing redraw
//! requests and hit-testing button presses into dispatch records for the
//! scheduler.

use std::os::unix::io::{AsRawFd, RawFd};

use ab_glyph::{point, ScaleFont};
use x11rb::connection::Connection;
use x11rb::connection::RequestConnection as _;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xinerama::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeGCAux, Colormap, ColormapAlloc, ConnectionExt as _, CreateGCAux,
    CreateWindowAux, Drawable, EventMask, Gcontext, ImageFormat, PropMode, Rectangle, Screen,
    VisualClass, Visualid, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::color::Color;
use crate::config::BarConfig;
use crate::element::{Dispatch, ElementSet, InputKind};
use crate::error::Error;
use crate::font::{Backend, FontProvider, FontSet};
use crate::layout;
use crate::monitor::{self, Monitor, OutputRect};

const DEFAULT_BACKGROUND: Color = Color(0x0000_0000);
const DEFAULT_FOREGROUND: Color = Color(0x1111_1111);

struct Atoms {
    net_wm_window_type: Atom,
    net_wm_window_type_dock: Atom,
    net_wm_desktop: Atom,
    net_wm_strut_partial: Atom,
    net_wm_strut: Atom,
    net_wm_state: Atom,
    net_wm_state_sticky: Atom,
    net_wm_state_above: Atom,
    net_wm_window_opacity: Atom,
}

impl Atoms {
    fn intern(conn: &RustConnection) -> Result<Self, Error> {
        const NAMES: [&[u8]; 9] = [
            b"_NET_WM_WINDOW_TYPE",
            b"_NET_WM_WINDOW_TYPE_DOCK",
            b"_NET_WM_DESKTOP",
            b"_NET_WM_STRUT_PARTIAL",
            b"_NET_WM_STRUT",
            b"_NET_WM_STATE",
            b"_NET_WM_STATE_STICKY",
            b"_NET_WM_STATE_ABOVE",
            b"_NET_WM_WINDOW_OPACITY",
        ];

        // Send every request before reading the first reply so the
        // round-trips overlap.
        let mut cookies = Vec::with_capacity(NAMES.len());
        for name in NAMES {
            cookies.push(conn.intern_atom(false, name)?);
        }
        let mut atoms = [0; 9];
        for (slot, cookie) in atoms.iter_mut().zip(cookies) {
            *slot = cookie.reply()?.atom;
        }

        Ok(Self {
            net_wm_window_type: atoms[0],
            net_wm_window_type_dock: atoms[1],
            net_wm_desktop: atoms[2],
            net_wm_strut_partial: atoms[3],
            net_wm_strut: atoms[4],
            net_wm_state: atoms[5],
            net_wm_state_sticky: atoms[6],
            net_wm_state_above: atoms[7],
            net_wm_window_opacity: atoms[8],
        })
    }
}

pub struct Bar {
    conn: RustConnection,
    depth: u8,
    gc_draw: Gcontext,
    gc_clear: Gcontext,
    gc_attr: Gcontext,
    colormap: Colormap,
    monitors: Vec<Monitor>,
    fonts: FontSet,
    elements: ElementSet,
    height: u16,
    underline_thickness: u16,
    background: Color,
    foreground: Color,
    underline: Color,
    render_buf: Vec<u8>,
    /// Guards against the repaint's own expose notification re-triggering
    /// an identical repaint.
    processing_expose: bool,
}

impl Bar {
    /// Connect, load fonts, discover the monitor chain, and map one dock
    /// window per monitor. Every failure in here is fatal for the
    /// process: a bar without a display, a usable visual, fitting
    /// geometry, or any font cannot render anything meaningful.
    pub fn open(config: &BarConfig) -> Result<Bar, Error> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let screen = conn.setup().roots[screen_num].clone();

        let background = Color::parse(config.background.as_deref(), DEFAULT_BACKGROUND);
        let foreground = Color::parse(config.foreground.as_deref(), DEFAULT_FOREGROUND);
        let underline = foreground;

        let (depth, visual) = choose_visual(&screen)?;
        let colormap = conn.generate_id()?;
        conn.create_colormap(ColormapAlloc::NONE, colormap, screen.root, visual)?;

        let mut fonts = FontSet::new(config.y_offsets.clone());
        for pattern in &config.fonts {
            fonts.load(&conn, pattern);
        }
        if fonts.is_empty() {
            fonts.load(&conn, "fixed");
        }
        if fonts.is_empty() {
            return Err(Error::NoFonts);
        }
        fonts.equalize_heights();

        let mut rects = discover_outputs(&conn, &screen)?;
        monitor::discard_clones(&mut rects);
        monitor::sort_chain(&mut rects);
        let geometry = monitor::carve_chain(&rects, config, fonts.max_height())?;
        if geometry.monitors.is_empty() {
            return Err(Error::GeometryDoesNotFit {
                width: geometry.width,
                height: i32::from(geometry.height),
                x: config.offset_x,
                y: config.offset_y,
            });
        }
        tracing::info!(
            monitors = geometry.monitors.len(),
            width = geometry.width,
            height = geometry.height,
            "monitor chain ready"
        );

        let atoms = Atoms::intern(&conn)?;

        let mut monitors = Vec::with_capacity(geometry.monitors.len());
        for geom in &geometry.monitors {
            let window = conn.generate_id()?;
            let pixmap = conn.generate_id()?;
            conn.create_window(
                depth,
                window,
                screen.root,
                geom.x,
                geom.y,
                geom.width,
                geometry.height,
                0,
                WindowClass::INPUT_OUTPUT,
                visual,
                &CreateWindowAux::new()
                    .background_pixel(background.0)
                    .border_pixel(background.0)
                    .event_mask(EventMask::EXPOSURE | EventMask::BUTTON_PRESS)
                    .colormap(colormap),
            )?;
            conn.create_pixmap(depth, pixmap, window, geom.width, geometry.height)?;
            monitors.push(Monitor { x: geom.x, y: geom.y, width: geom.width, window, pixmap });
        }

        set_ewmh_properties(&conn, &atoms, &monitors, config, geometry.height)?;

        let gc_draw = conn.generate_id()?;
        conn.create_gc(gc_draw, monitors[0].pixmap, &CreateGCAux::new().foreground(foreground.0))?;
        let gc_clear = conn.generate_id()?;
        conn.create_gc(gc_clear, monitors[0].pixmap, &CreateGCAux::new().foreground(background.0))?;
        let gc_attr = conn.generate_id()?;
        conn.create_gc(gc_attr, monitors[0].pixmap, &CreateGCAux::new().foreground(underline.0))?;

        for mon in &monitors {
            fill_rect(&conn, mon.pixmap, gc_clear, 0, 0, mon.width, geometry.height)?;
            conn.map_window(mon.window)?;
            // Some WMs move dock windows on map; pin the position again.
            conn.configure_window(
                mon.window,
                &x11rb::protocol::xproto::ConfigureWindowAux::new()
                    .x(i32::from(mon.x))
                    .y(i32::from(mon.y)),
            )?;
        }
        conn.flush()?;

        Ok(Bar {
            conn,
            depth,
            gc_draw,
            gc_clear,
            gc_attr,
            colormap,
            monitors,
            fonts,
            elements: ElementSet::new(),
            height: geometry.height,
            underline_thickness: config.underline_thickness,
            background,
            foreground,
            underline,
            render_buf: Vec::with_capacity(2048),
            processing_expose: false,
        })
    }

    pub fn elements(&self) -> &ElementSet {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut ElementSet {
        &mut self.elements
    }

    /// File descriptor of the X connection, for the scheduler's poll().
    pub fn connection_fd(&self) -> RawFd {
        self.conn.stream().as_raw_fd()
    }

    /// Run layout across all monitors, paint every element into its
    /// monitor's pixmap, copy the pixmaps to the windows and flush.
    /// Idempotent: with no dirty elements the same pixels come out.
    pub fn present(&mut self) -> Result<(), Error> {
        self.layout_and_paint()?;
        self.copy_to_windows()?;
        self.conn.flush()?;
        Ok(())
    }

    /// Drain all pending events without blocking. Redraw requests are
    /// coalesced and served once after the drain; button presses are
    /// hit-tested into dispatch records for the scheduler to route.
    pub fn poll_events(&mut self) -> Result<Vec<Dispatch>, Error> {
        let mut dispatches = Vec::new();
        let mut redraw = false;

        while let Some(event) = self.conn.poll_for_event()? {
            match event {
                Event::Expose(e) => {
                    if e.count == 0 && !self.processing_expose {
                        redraw = true;
                    }
                }
                Event::ButtonPress(e) => match InputKind::from_button(e.detail) {
                    Some(kind) => {
                        if let Some(dispatch) =
                            self.elements.hit_test(e.event, i32::from(e.event_x), kind)
                        {
                            tracing::debug!(
                                module = dispatch.module,
                                ?kind,
                                x = e.event_x,
                                "click dispatched"
                            );
                            dispatches.push(dispatch);
                        }
                    }
                    None => tracing::debug!(detail = e.detail, "unmapped button ignored"),
                },
                Event::Error(err) => {
                    tracing::warn!(?err, "X error event");
                }
                other => {
                    tracing::debug!(?other, "unhandled event ignored");
                }
            }
        }

        if redraw {
            self.processing_expose = true;
            self.copy_to_windows()?;
            self.conn.flush()?;
            self.processing_expose = false;
        }

        Ok(dispatches)
    }

    fn layout_and_paint(&mut self) -> Result<(), Error> {
        let bar_height = self.height;
        let thickness = self.underline_thickness;
        let default_fg = self.foreground;
        let default_bg = self.background;
        let default_ul = self.underline;
        let depth = self.depth;
        let (gc_draw, gc_clear, gc_attr) = (self.gc_draw, self.gc_clear, self.gc_attr);

        let Self { conn, monitors, fonts, elements, render_buf, .. } = self;

        set_gc_color(conn, gc_clear, default_bg)?;
        for mon in monitors.iter() {
            fill_rect(conn, mon.pixmap, gc_clear, 0, 0, mon.width, bar_height)?;
        }

        let mut cursors = vec![0i32; monitors.len()];
        let order: Vec<_> = elements.ordered().to_vec();

        for id in order {
            let Some(element) = elements.get_mut(id) else { continue };
            let index = element.monitor.min(monitors.len() - 1);
            let mon = &monitors[index];
            element.window = mon.window;

            if element.dirty {
                layout::decode_element(element, fonts);
            }

            let (begin_x, cursor) = layout::position_element(
                element.alignment,
                element.width,
                i32::from(mon.width),
                cursors[index],
            );
            element.begin_x = begin_x;
            cursors[index] = cursor;

            if element.width <= 0 {
                continue;
            }

            let fg = if element.foreground.is_unset() { default_fg } else { element.foreground };
            let bg = if element.background.is_unset() { default_bg } else { element.background };
            let ul = if element.underline_color.is_unset() {
                default_ul
            } else {
                element.underline_color
            };

            set_gc_color(conn, gc_clear, bg)?;
            fill_rect(
                conn,
                mon.pixmap,
                gc_clear,
                begin_x as i16,
                0,
                element.width as u16,
                bar_height,
            )?;
            set_gc_color(conn, gc_draw, fg)?;

            let mut x = begin_x;
            for (i, &codepoint) in element.glyphs.iter().enumerate() {
                let width = element.glyph_widths[i];
                // Re-resolved per glyph: a pinned slot can differ per
                // element while the decoded buffers stay font-agnostic.
                let slot = fonts.select(codepoint, element.font_slot).unwrap_or(0);
                draw_glyph(
                    conn, fonts, render_buf, slot, mon.pixmap, gc_draw, depth, x, width,
                    codepoint, fg, bg, bar_height,
                )?;
                x += i32::from(width);
            }

            if element.underline || element.overline {
                set_gc_color(conn, gc_attr, ul)?;
            }
            if element.overline {
                fill_rect(
                    conn,
                    mon.pixmap,
                    gc_attr,
                    begin_x as i16,
                    0,
                    element.width as u16,
                    thickness,
                )?;
            }
            if element.underline {
                fill_rect(
                    conn,
                    mon.pixmap,
                    gc_attr,
                    begin_x as i16,
                    bar_height.saturating_sub(thickness) as i16,
                    element.width as u16,
                    thickness,
                )?;
            }
        }

        Ok(())
    }

    fn copy_to_windows(&self) -> Result<(), Error> {
        for mon in &self.monitors {
            self.conn.copy_area(
                mon.pixmap,
                mon.window,
                self.gc_draw,
                0,
                0,
                0,
                0,
                mon.width,
                self.height,
            )?;
        }
        Ok(())
    }
}

impl Drop for Bar {
    fn drop(&mut self) {
        self.fonts.close_all(&self.conn);
        for mon in &self.monitors {
            let _ = self.conn.destroy_window(mon.window);
            let _ = self.conn.free_pixmap(mon.pixmap);
        }
        let _ = self.conn.free_gc(self.gc_draw);
        let _ = self.conn.free_gc(self.gc_clear);
        let _ = self.conn.free_gc(self.gc_attr);
        let _ = self.conn.free_colormap(self.colormap);
        let _ = self.conn.flush();
    }
}

/// Prefer a 32-bit TrueColor visual; fall back to the root visual.
fn choose_visual(screen: &Screen) -> Result<(u8, Visualid), Error> {
    for depth in &screen.allowed_depths {
        if depth.depth == 32 {
            for visual in &depth.visuals {
                if visual.class == VisualClass::TRUE_COLOR {
                    return Ok((32, visual.visual_id));
                }
            }
        }
    }
    for depth in &screen.allowed_depths {
        for visual in &depth.visuals {
            if visual.visual_id == screen.root_visual {
                return Ok((depth.depth, visual.visual_id));
            }
        }
    }
    Err(Error::NoVisual)
}

/// Active output rectangles: RandR current configuration first, Xinerama
/// second, the whole root screen as a last resort.
fn discover_outputs(conn: &RustConnection, screen: &Screen) -> Result<Vec<OutputRect>, Error> {
    if conn.extension_information(randr::X11_EXTENSION_NAME)?.is_some() {
        let rects = randr_outputs(conn, screen.root)?;
        if !rects.is_empty() {
            return Ok(rects);
        }
        tracing::warn!("no usable RandR output found");
    }

    if conn.extension_information(xinerama::X11_EXTENSION_NAME)?.is_some()
        && conn.xinerama_is_active()?.reply()?.state != 0
    {
        let rects = xinerama_outputs(conn)?;
        if !rects.is_empty() {
            return Ok(rects);
        }
    }

    Ok(vec![OutputRect {
        x: 0,
        y: 0,
        width: screen.width_in_pixels,
        height: screen.height_in_pixels,
    }])
}

fn randr_outputs(conn: &RustConnection, root: u32) -> Result<Vec<OutputRect>, Error> {
    let resources = conn.randr_get_screen_resources_current(root)?.reply()?;
    let mut rects = Vec::new();

    for output in resources.outputs {
        let info = conn.randr_get_output_info(output, resources.config_timestamp)?.reply()?;
        // Disconnected, or not attached to any CRTC.
        if info.crtc == x11rb::NONE || info.connection != randr::Connection::CONNECTED {
            continue;
        }
        let crtc = conn.randr_get_crtc_info(info.crtc, resources.config_timestamp)?.reply()?;
        rects.push(OutputRect { x: crtc.x, y: crtc.y, width: crtc.width, height: crtc.height });
    }

    Ok(rects)
}

fn xinerama_outputs(conn: &RustConnection) -> Result<Vec<OutputRect>, Error> {
    let reply = conn.xinerama_query_screens()?.reply()?;
    Ok(reply
        .screen_info
        .iter()
        .map(|s| OutputRect { x: s.x_org, y: s.y_org, width: s.width, height: s.height })
        .collect())
}

fn set_ewmh_properties(
    conn: &RustConnection,
    atoms: &Atoms,
    monitors: &[Monitor],
    config: &BarConfig,
    bar_height: u16,
) -> Result<(), Error> {
    let wm_class = format!("{}\0Bar", config.name);

    for mon in monitors {
        let mut strut = [0u32; 12];
        if config.topbar {
            strut[2] = u32::from(bar_height);
            strut[8] = mon.x.max(0) as u32;
            strut[9] = (i32::from(mon.x) + i32::from(mon.width)).max(0) as u32;
        } else {
            strut[3] = u32::from(bar_height);
            strut[10] = mon.x.max(0) as u32;
            strut[11] = (i32::from(mon.x) + i32::from(mon.width)).max(0) as u32;
        }

        conn.change_property32(
            PropMode::REPLACE,
            mon.window,
            atoms.net_wm_window_type,
            AtomEnum::ATOM,
            &[atoms.net_wm_window_type_dock],
        )?;
        conn.change_property32(
            PropMode::APPEND,
            mon.window,
            atoms.net_wm_state,
            AtomEnum::ATOM,
            &[atoms.net_wm_state_sticky, atoms.net_wm_state_above],
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            mon.window,
            atoms.net_wm_desktop,
            AtomEnum::CARDINAL,
            &[0xFFFF_FFFF],
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            mon.window,
            atoms.net_wm_strut_partial,
            AtomEnum::CARDINAL,
            &strut,
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            mon.window,
            atoms.net_wm_strut,
            AtomEnum::CARDINAL,
            &strut[..4],
        )?;
        // Force full opacity to work around compositors.
        conn.change_property32(
            PropMode::REPLACE,
            mon.window,
            atoms.net_wm_window_opacity,
            AtomEnum::CARDINAL,
            &[0xFFFF_FFFF],
        )?;
        conn.change_property8(
            PropMode::REPLACE,
            mon.window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            config.name.as_bytes(),
        )?;
        conn.change_property8(
            PropMode::REPLACE,
            mon.window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            wm_class.as_bytes(),
        )?;
    }

    Ok(())
}

fn set_gc_color(conn: &RustConnection, gc: Gcontext, color: Color) -> Result<(), Error> {
    conn.change_gc(gc, &ChangeGCAux::new().foreground(color.0))?;
    Ok(())
}

fn fill_rect(
    conn: &RustConnection,
    drawable: Drawable,
    gc: Gcontext,
    x: i16,
    y: i16,
    width: u16,
    height: u16,
) -> Result<(), Error> {
    conn.poly_fill_rectangle(drawable, gc, &[Rectangle { x, y, width, height }])?;
    Ok(())
}

/// Draw one glyph at `x`, with the pen sitting on the shared baseline.
fn draw_glyph(
    conn: &RustConnection,
    fonts: &FontSet,
    render_buf: &mut Vec<u8>,
    slot: usize,
    drawable: Drawable,
    gc_draw: Gcontext,
    depth: u8,
    x: i32,
    width: u16,
    codepoint: u32,
    fg: Color,
    bg: Color,
    bar_height: u16,
) -> Result<(), Error> {
    let font = fonts.get(slot);
    let baseline = i32::from(bar_height) / 2 + i32::from(font.height) / 2
        - i32::from(font.descent)
        + i32::from(fonts.y_offset(slot));

    match &font.backend {
        Backend::Core(core) => {
            // Core text requests carry 16-bit characters only.
            if codepoint > 0xffff {
                return Ok(());
            }
            conn.change_gc(gc_draw, &ChangeGCAux::new().font(core.fid))?;
            poly_text16_simple(conn, drawable, gc_draw, x as i16, baseline as i16, codepoint as u16)?;
        }
        Backend::Scalable(sf) => {
            let Some(ch) = char::from_u32(codepoint) else { return Ok(()) };
            let cell_w = usize::from(width);
            let cell_h = usize::from(bar_height);

            render_buf.clear();
            render_buf.resize(cell_w * cell_h * 4, 0);
            for pixel in render_buf.chunks_exact_mut(4) {
                pixel[0] = bg.b();
                pixel[1] = bg.g();
                pixel[2] = bg.r();
                pixel[3] = 0xff;
            }

            let scaled = sf.scaled();
            let mut glyph = scaled.scaled_glyph(ch);
            glyph.position = point(0.0, baseline as f32);

            if let Some(outlined) = scaled.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                let (fg_b, fg_g, fg_r) =
                    (u32::from(fg.b()), u32::from(fg.g()), u32::from(fg.r()));
                outlined.draw(|gx, gy, coverage| {
                    let px = bounds.min.x as i32 + gx as i32;
                    let py = bounds.min.y as i32 + gy as i32;
                    if px >= 0 && px < cell_w as i32 && py >= 0 && py < cell_h as i32 {
                        let idx = (py as usize * cell_w + px as usize) * 4;
                        let alpha = ((coverage * 256.0) as u32).min(256);
                        let inv = 256 - alpha;
                        let blend = |fg_c: u32, cur: u8| ((fg_c * alpha + u32::from(cur) * inv) >> 8) as u8;
                        render_buf[idx] = blend(fg_b, render_buf[idx]);
                        render_buf[idx + 1] = blend(fg_g, render_buf[idx + 1]);
                        render_buf[idx + 2] = blend(fg_r, render_buf[idx + 2]);
                    }
                });
            }

            conn.put_image(
                ImageFormat::Z_PIXMAP,
                drawable,
                gc_draw,
                width,
                bar_height,
                x as i16,
                0,
                0,
                depth,
                render_buf,
            )?;
        }
    }

    Ok(())
}

/// The typed request API cannot express a single wide character, so the
/// TEXTITEM16 is encoded by hand: item length, horizontal delta, then the
/// character in big-endian byte order.
fn poly_text16_simple(
    conn: &RustConnection,
    drawable: Drawable,
    gc: Gcontext,
    x: i16,
    y: i16,
    ch: u16,
) -> Result<(), Error> {
    let item = [1u8, 0u8, (ch >> 8) as u8, ch as u8];
    conn.poly_text16(drawable, gc, x, y, &item)?;
    Ok(())
}
