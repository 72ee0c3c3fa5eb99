//! Per-player board snapshots with fog of war

use super::board::Cell;

/// Copy `grid` as seen by `uid`.
///
/// A cell stays visible when `uid` owns it or any of its eight neighbours;
/// every other cell is replaced by [`Cell::hidden`].
pub fn fog_of_war(grid: &[Vec<Cell>], uid: &str) -> Vec<Vec<Cell>> {
    grid.iter()
        .enumerate()
        .map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .map(|(col, cell)| {
                    if is_visible(grid, row, col, uid) {
                        Cell {
                            used: false,
                            ..cell.clone()
                        }
                    } else {
                        Cell::hidden()
                    }
                })
                .collect()
        })
        .collect()
}

/// Whether `uid` owns the cell at (row, col) or one adjacent to it
pub fn is_visible(grid: &[Vec<Cell>], row: usize, col: usize, uid: &str) -> bool {
    let rows = row.saturating_sub(1)..=row + 1;
    rows.filter_map(|r| grid.get(r)).any(|cells| {
        (col.saturating_sub(1)..=col + 1)
            .filter_map(|c| cells.get(c))
            .any(|cell| cell.owned_by(uid))
    })
}
