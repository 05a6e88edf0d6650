//! Collage grid geometry

/// Gap between cells and around the grid edge
pub const CELL_SPACING: u32 = 15;

/// Grid layout derived purely from the photo count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollageLayout {
    pub rows: u32,
    pub cols: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub spacing: u32,
}

impl CollageLayout {
    /// Layouts for the supported counts: 1 (full canvas), 4 (2x2 portrait
    /// cells) and 6 (3 rows of 2 landscape cells).
    pub fn for_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(Self {
                rows: 1,
                cols: 1,
                cell_width: 1200,
                cell_height: 1800,
                spacing: 0,
            }),
            4 => Some(Self {
                rows: 2,
                cols: 2,
                cell_width: 600,
                cell_height: 900,
                spacing: CELL_SPACING,
            }),
            6 => Some(Self {
                rows: 3,
                cols: 2,
                cell_width: 750,
                cell_height: 700,
                spacing: CELL_SPACING,
            }),
            _ => None,
        }
    }

    pub fn cells(&self) -> usize {
        (self.rows * self.cols) as usize
    }

    /// Unscaled grid width including edge spacing
    pub fn grid_width(&self) -> u32 {
        self.cols * self.cell_width + (self.cols + 1) * self.spacing
    }

    pub fn grid_height(&self) -> u32 {
        self.rows * self.cell_height + (self.rows + 1) * self.spacing
    }

    pub fn column_x(&self, col: u32) -> u32 {
        self.spacing + col * (self.cell_width + self.spacing)
    }

    pub fn row_y(&self, row: u32) -> u32 {
        self.spacing + row * (self.cell_height + self.spacing)
    }

    /// Top-left corner of cell `index`, filled row-major
    pub fn cell_origin(&self, index: usize) -> (u32, u32) {
        let index = index as u32;
        (self.column_x(index % self.cols), self.row_y(index / self.cols))
    }
}
