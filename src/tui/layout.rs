//! Pure layout computation: given a terminal size and a set of visible
//! hosts, produce a rectangle per host for the current display mode.
//!
//! Kept as free functions over `ratatui::layout::Rect` with no stored
//! state, matching the example dashboard's preference for pure layout
//! functions over a stateful layout object.

use ratatui::layout::Rect;

pub const MIN_TILE_WIDTH: u16 = 40;
pub const MIN_TILE_HEIGHT: u16 = 6;
pub const DEFAULT_AUTO_MINIMIZE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Grid,
    FullScreen,
    Menu,
}

/// Result of a grid computation: one rect per visible slot plus a count
/// of hosts that didn't fit at the minimum tile size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLayout {
    pub tiles: Vec<Rect>,
    pub hidden: usize,
}

/// Tiles `visible_hosts` hosts into a grid inside `area`, searching row
/// counts for the best aspect-ratio fit subject to the minimum tile
/// size. If no row count satisfies the minimums, fits as many
/// minimum-sized tiles as possible and reports the remainder as hidden.
pub fn grid_layout(area: Rect, visible_hosts: usize) -> GridLayout {
    if visible_hosts == 0 {
        return GridLayout { tiles: Vec::new(), hidden: 0 };
    }

    let mut best: Option<(u16, u16, f64)> = None; // (rows, cols, score)
    for rows in 1..=visible_hosts as u16 {
        let cols = ((visible_hosts as u16) + rows - 1) / rows;
        if cols == 0 {
            continue;
        }
        let tile_w = area.width / cols;
        let tile_h = area.height / rows;
        if tile_w < MIN_TILE_WIDTH || tile_h < MIN_TILE_HEIGHT {
            continue;
        }
        let aspect = tile_w as f64 / tile_h.max(1) as f64;
        // Target roughly a 2:1 width:height tile, a readable shape for
        // a handful of log lines per host.
        let score = -(aspect - 2.0).abs();
        if best.map(|(_, _, best_score)| score > best_score).unwrap_or(true) {
            best = Some((rows, cols, score));
        }
    }

    let Some((rows, cols, _)) = best else {
        return fit_at_minimum(area, visible_hosts);
    };

    let tile_w = area.width / cols;
    let tile_h = area.height / rows;
    let mut tiles = Vec::with_capacity(visible_hosts);
    for index in 0..visible_hosts {
        let row = (index as u16) / cols;
        let col = (index as u16) % cols;
        tiles.push(Rect {
            x: area.x + col * tile_w,
            y: area.y + row * tile_h,
            width: tile_w,
            height: tile_h,
        });
    }
    GridLayout { tiles, hidden: 0 }
}

fn fit_at_minimum(area: Rect, visible_hosts: usize) -> GridLayout {
    let cols = (area.width / MIN_TILE_WIDTH).max(1);
    let rows = (area.height / MIN_TILE_HEIGHT).max(1);
    let capacity = (cols as usize) * (rows as usize);
    let shown = visible_hosts.min(capacity);
    let mut tiles = Vec::with_capacity(shown);
    for index in 0..shown {
        let row = (index as u16) / cols;
        let col = (index as u16) % cols;
        tiles.push(Rect {
            x: area.x + col * MIN_TILE_WIDTH,
            y: area.y + row * MIN_TILE_HEIGHT,
            width: MIN_TILE_WIDTH,
            height: MIN_TILE_HEIGHT,
        });
    }
    GridLayout { tiles, hidden: visible_hosts - shown }
}

/// One host occupies the full area minus a 2-row header and 1-row footer.
pub fn full_screen_layout(area: Rect) -> Rect {
    let header = 2u16.min(area.height);
    let footer = 1u16.min(area.height.saturating_sub(header));
    Rect {
        x: area.x,
        y: area.y + header,
        width: area.width,
        height: area.height.saturating_sub(header + footer),
    }
}

/// A box centered over `area`, sized to ⌊0.8·terminal⌋. The grid behind
/// it is left untouched (not recomputed) while the menu is open.
pub fn menu_layout(area: Rect) -> Rect {
    let width = ((area.width as u32 * 8) / 10) as u16;
    let height = ((area.height as u32 * 8) / 10) as u16;
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect { x, y, width, height }
}

/// Band for minimized (completed, past `auto_minimize_timeout`) hosts:
/// one row each, stacked along the bottom of `area`.
pub fn minimized_band_layout(area: Rect, minimized_count: usize) -> Vec<Rect> {
    if minimized_count == 0 {
        return Vec::new();
    }
    let band_height = minimized_count.min(area.height as usize) as u16;
    let band_top = area.y + area.height.saturating_sub(band_height);
    (0..band_height)
        .map(|row| Rect { x: area.x, y: band_top + row, width: area.width, height: 1 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_layout_fits_four_hosts_in_a_reasonable_area() {
        let area = Rect { x: 0, y: 0, width: 160, height: 48 };
        let layout = grid_layout(area, 4);
        assert_eq!(layout.tiles.len(), 4);
        assert_eq!(layout.hidden, 0);
        for tile in &layout.tiles {
            assert!(tile.width >= MIN_TILE_WIDTH);
            assert!(tile.height >= MIN_TILE_HEIGHT);
        }
    }

    #[test]
    fn grid_layout_hides_tiles_below_minimum_size() {
        let area = Rect { x: 0, y: 0, width: 40, height: 6 };
        let layout = grid_layout(area, 5);
        assert!(layout.tiles.len() + layout.hidden == 5);
        assert!(layout.tiles.len() <= 1);
    }

    #[test]
    fn grid_layout_is_empty_for_zero_hosts() {
        let area = Rect { x: 0, y: 0, width: 100, height: 40 };
        let layout = grid_layout(area, 0);
        assert!(layout.tiles.is_empty());
        assert_eq!(layout.hidden, 0);
    }

    #[test]
    fn full_screen_reserves_header_and_footer() {
        let area = Rect { x: 0, y: 0, width: 100, height: 40 };
        let tile = full_screen_layout(area);
        assert_eq!(tile.height, 37);
        assert_eq!(tile.y, 2);
    }

    #[test]
    fn menu_is_centered_and_80_percent_sized() {
        let area = Rect { x: 0, y: 0, width: 100, height: 50 };
        let menu = menu_layout(area);
        assert_eq!(menu.width, 80);
        assert_eq!(menu.height, 40);
        assert_eq!(menu.x, 10);
        assert_eq!(menu.y, 5);
    }

    #[test]
    fn minimized_band_stacks_one_row_per_host() {
        let area = Rect { x: 0, y: 0, width: 100, height: 40 };
        let band = minimized_band_layout(area, 3);
        assert_eq!(band.len(), 3);
        assert_eq!(band[0].height, 1);
        assert_eq!(band[2].y, 39);
    }
}
