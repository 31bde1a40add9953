//! Overlay list rendering
//!
//! The three overlay windows (panel list, program list, quit confirmation)
//! are plain white windows drawn with a server-side core font: a title row,
//! a separator, a nine-row viewport onto the element list with continuation
//! arrows, a rectangle around the selected row, and per-overlay help lines.
//! Redraws are driven by Expose events.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt, CoordMode, CreateGCAux, CreateWindowAux, EventMask, Gcontext, Point,
    PropMode, Rectangle, Screen, Segment, Window, WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;
use x11rb::COPY_DEPTH_FROM_PARENT;

const PADDING: i16 = 2;
const MARGIN: i16 = 5;
/// Rows of the element viewport; the selection is kept inside it by
/// scrolling, not by clamping.
pub const VISIBLE_ROWS: usize = 9;
// title + up arrow + viewport + down arrow + help
const TOTAL_ROWS: i16 = 1 + 1 + VISIBLE_ROWS as i16 + 1 + 3;

/// Graphics context plus the font metrics the row layout derives from.
pub struct Painter {
    gc: Gcontext,
    ascent: i16,
    descent: i16,
}

impl Painter {
    /// Open the configured core font (falling back to `fixed`) and build
    /// the shared graphics context.
    pub fn new<C: Connection>(conn: &C, screen: &Screen, font_name: &str) -> Result<Self> {
        let font = conn.generate_id()?;
        if conn.open_font(font, font_name.as_bytes())?.check().is_err() {
            tracing::warn!(font = font_name, "cannot open font, falling back to fixed");
            conn.open_font(font, b"fixed")?.check()?;
        }

        let gc = conn.generate_id()?;
        conn.create_gc(
            gc,
            screen.root,
            &CreateGCAux::new()
                .foreground(screen.black_pixel)
                .background(screen.white_pixel)
                .line_width(2)
                .font(font),
        )?;

        let metrics = conn.query_font(font)?.reply()?;
        Ok(Self {
            gc,
            ascent: metrics.font_ascent,
            descent: metrics.font_descent,
        })
    }

    fn row_height(&self) -> i16 {
        self.ascent + self.descent + 2 * PADDING
    }

    /// Height a list window needs for the fixed row layout.
    pub fn list_height(&self) -> u16 {
        (TOTAL_ROWS * self.row_height() + 4 * PADDING + 2 * MARGIN) as u16
    }

    fn draw_string<C: Connection>(
        &self,
        conn: &C,
        window: Window,
        x: i16,
        y: &mut i16,
        text: &str,
    ) -> Result<()> {
        *y += PADDING + self.ascent;
        if !text.is_empty() {
            let bytes = text.as_bytes();
            let bytes = &bytes[..bytes.len().min(255)];
            conn.image_text8(window, self.gc, x, *y, bytes)?;
        }
        *y += self.descent + PADDING;
        Ok(())
    }

    fn draw_separator<C: Connection>(
        &self,
        conn: &C,
        window: Window,
        width: u16,
        y: &mut i16,
    ) -> Result<()> {
        *y += PADDING;
        conn.poly_segment(
            window,
            self.gc,
            &[Segment { x1: 0, y1: *y, x2: width as i16, y2: *y }],
        )?;
        *y += PADDING;
        Ok(())
    }

    /// Continuation arrow marking that the list extends past the viewport.
    fn draw_arrow<C: Connection>(
        &self,
        conn: &C,
        window: Window,
        width: u16,
        y: &mut i16,
        visible: bool,
        up: bool,
    ) -> Result<()> {
        let x1 = width as i16 / 4;
        let x2 = width as i16 * 2 / 4;
        let x3 = width as i16 * 3 / 4;

        *y += PADDING + self.ascent;
        if visible {
            let (tip_y, base_y) = (*y - self.ascent, *y);
            let (tip, base1, base2) = if up { (tip_y, base_y, base_y) } else { (base_y, tip_y, tip_y) };
            conn.poly_line(
                CoordMode::ORIGIN,
                window,
                self.gc,
                &[
                    Point { x: x1, y: base1 },
                    Point { x: x2, y: tip },
                    Point { x: x3, y: base2 },
                ],
            )?;
        }
        *y += self.descent + PADDING;
        Ok(())
    }

    /// Draw a titled list with a boxed selection and trailing help lines.
    pub fn draw_list<C: Connection>(
        &self,
        conn: &C,
        list: &ListWindow,
        title: &str,
        elements: &[String],
        selected: usize,
        help: &[&str],
    ) -> Result<()> {
        let x = MARGIN;
        let mut y = MARGIN;

        self.draw_string(conn, list.window, x, &mut y, title)?;
        self.draw_separator(conn, list.window, list.width, &mut y)?;

        let start = if selected <= VISIBLE_ROWS / 2 { 0 } else { selected - VISIBLE_ROWS / 2 };
        self.draw_arrow(conn, list.window, list.width, &mut y, start > 0, true)?;

        for row in start..start + VISIBLE_ROWS {
            let Some(element) = elements.get(row) else {
                self.draw_string(conn, list.window, x + PADDING, &mut y, "")?;
                continue;
            };
            if row == selected {
                conn.poly_rectangle(
                    list.window,
                    self.gc,
                    &[Rectangle {
                        x,
                        y,
                        width: (list.width as i16 - 2 * MARGIN) as u16,
                        height: self.row_height() as u16,
                    }],
                )?;
            }
            self.draw_string(conn, list.window, x + PADDING, &mut y, element)?;
        }

        let more_below = elements.len() > start + VISIBLE_ROWS;
        self.draw_arrow(conn, list.window, list.width, &mut y, more_below, false)?;
        self.draw_separator(conn, list.window, list.width, &mut y)?;

        for line in help {
            self.draw_string(conn, list.window, x, &mut y, line)?;
        }
        Ok(())
    }
}

/// One overlay window.
pub struct ListWindow {
    pub window: Window,
    pub width: u16,
}

/// Create an unmapped overlay window on the root.
pub fn create_list_window<C: Connection>(
    conn: &C,
    screen: &Screen,
    x: i16,
    y: i16,
    width: u16,
    height: u16,
    name: &str,
) -> Result<ListWindow> {
    let window = conn.generate_id()?;
    conn.create_window(
        COPY_DEPTH_FROM_PARENT,
        window,
        screen.root,
        x,
        y,
        width,
        height,
        2,
        WindowClass::INPUT_OUTPUT,
        0,
        &CreateWindowAux::new()
            .background_pixel(screen.white_pixel)
            .border_pixel(screen.black_pixel)
            .event_mask(EventMask::EXPOSURE),
    )?;
    conn.change_property8(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_NAME,
        AtomEnum::STRING,
        name.as_bytes(),
    )?;
    tracing::debug!(window, name, "overlay window created");
    Ok(ListWindow { window, width })
}
