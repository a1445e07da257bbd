/// How the tile edge is derived from the device's work-group capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TilePolicy {
    /// `t = floor(sqrt(max_work_group_items) / 2)`, extents rounded up to multiples of `t`.
    #[default]
    RoundUp,
    /// Largest `t <= floor(sqrt(max_work_group_items))` dividing `out_rows * out_cols`.
    ///
    /// Degenerates to `t = 1` for prime-sized outputs.
    ExactDivisor,
}

/// Square tile edge and the padded 2-D dispatch extents.
///
/// `global_x` covers output columns and `global_y` covers output rows. Both
/// are multiples of `tile_edge`, whichever policy produced the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileConfig {
    /// Work-group edge; the local size is `tile_edge x tile_edge`.
    pub tile_edge: usize,
    /// Global extent along the output columns.
    pub global_x: usize,
    /// Global extent along the output rows.
    pub global_y: usize,
}

impl TileConfig {
    /// Select a tile for an `out_rows x out_cols` output.
    pub fn select(
        policy: TilePolicy,
        max_work_group_items: usize,
        out_rows: usize,
        out_cols: usize,
    ) -> Self {
        let tile_edge = match policy {
            TilePolicy::RoundUp => round_up_edge(max_work_group_items),
            TilePolicy::ExactDivisor => {
                exact_divisor_edge(max_work_group_items, out_rows.saturating_mul(out_cols))
            }
        };
        Self {
            tile_edge,
            global_x: round_up_to_multiple(out_cols, tile_edge),
            global_y: round_up_to_multiple(out_rows, tile_edge),
        }
    }

    /// Work-items per group.
    #[inline]
    pub fn local_items(&self) -> usize {
        self.tile_edge * self.tile_edge
    }

    /// Number of work-groups along `(x, y)`.
    #[inline]
    pub fn groups(&self) -> (usize, usize) {
        (self.global_x / self.tile_edge, self.global_y / self.tile_edge)
    }

    /// Check that the config is dispatchable.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.tile_edge == 0 {
            return Err("tile_edge must be non-zero");
        }
        if !self.global_x.is_multiple_of(self.tile_edge) {
            return Err("global_x must be a multiple of tile_edge");
        }
        if !self.global_y.is_multiple_of(self.tile_edge) {
            return Err("global_y must be a multiple of tile_edge");
        }
        Ok(())
    }
}

/// Smallest multiple of `multiple` that is `>= value`.
#[inline]
pub fn round_up_to_multiple(value: usize, multiple: usize) -> usize {
    if multiple == 0 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

fn round_up_edge(max_work_group_items: usize) -> usize {
    (max_work_group_items.isqrt() / 2).max(1)
}

fn exact_divisor_edge(max_work_group_items: usize, total: usize) -> usize {
    let mut t = max_work_group_items.isqrt().max(1);
    if total == 0 {
        return t;
    }
    // a divisor is never larger than the total
    t = t.min(total);
    while !total.is_multiple_of(t) {
        t -= 1;
    }
    t
}

/// Iterator over `(start, len)` blocks of a dimension.
pub struct BlockIterator {
    total: usize,
    block_size: usize,
    current: usize,
}

impl BlockIterator {
    pub fn new(total: usize, block_size: usize) -> Self {
        Self {
            total,
            block_size,
            current: 0,
        }
    }
}

impl Iterator for BlockIterator {
    /// (start, length) of each block
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total {
            return None;
        }

        let start = self.current;
        let len = (self.total - start).min(self.block_size);
        self.current += len;

        Some((start, len))
    }
}
